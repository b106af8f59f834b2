//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Account registry (storage of per-identity admission state)
//! - Admission controller (decision making)
//! - Response cache (tier-weighted storage of computed results)
//! - Sweeper (periodic reclamation)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod accounts;
pub mod cache;
pub mod codec;
pub mod controller;
pub mod metrics;
pub mod ports;
pub mod sweeper;
