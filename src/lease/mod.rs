//! # Lease State
//!
//! Lease records, lifecycle callbacks, and the concurrent cache that is the
//! single piece of state shared across the runtime's execution contexts.

pub mod cache;
pub mod record;

pub use cache::LeaseCache;
pub use record::{LeaseCallback, LeaseCallbacks, LeaseErrorCallback, LeaseRecord, LeaseState};
