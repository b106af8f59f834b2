//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling
/// deterministic testing of sliding windows, penalties, TTLs, and retention
/// without sleeping.
///
/// # Examples
///
/// ```
/// use tierguard::infrastructure::mocks::MockClock;
/// use tierguard::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let start = clock.now();
///
/// // Nothing moves until the test says so
/// assert_eq!(clock.now(), start);
///
/// // Advance time explicitly
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
///
/// // Or set to a specific instant
/// let later = start + Duration::from_secs(100);
/// clock.set(later);
/// assert_eq!(clock.now(), later);
/// ```
///
/// # Thread Safety
///
/// `MockClock` is thread-safe and can be cloned to share across threads.
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
///
/// ```
/// use tierguard::infrastructure::mocks::MockClock;
/// use tierguard::application::ports::Clock;
/// use std::time::Duration;
/// use std::thread;
///
/// let clock = MockClock::new();
/// let start = clock.now();
/// let clock_clone = clock.clone();
///
/// let handle = thread::spawn(move || {
///     clock_clone.advance(Duration::from_secs(5));
/// });
///
/// handle.join().unwrap();
/// assert_eq!(clock.now(), start + Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock frozen at the instant of its creation.
    pub fn new() -> Self {
        Self {
            current_time: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Create a mock clock starting at a specific instant.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let mut time = self
            .current_time
            .lock()
            .expect("clock lock poisoned by a panicking test thread");
        *time += duration;
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, instant: Instant) {
        let mut time = self
            .current_time
            .lock()
            .expect("clock lock poisoned by a panicking test thread");
        *time = instant;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self
            .current_time
            .lock()
            .expect("clock lock poisoned by a panicking test thread")
    }
}
