//! Domain layer - pure business logic with no external dependencies.
//!
//! This layer contains the core concepts and invariants of the admission
//! control and caching system:
//! - Subscription tiers and the validated policy table
//! - Sliding rate windows
//! - Per-identity usage state
//! - Admission decisions and deny reasons
//! - Deterministic cache key computation
//!
//! All types in this layer are pure and easily testable.

pub mod decision;
pub mod key;
pub mod tier;
pub mod usage;
pub mod window;
