//! # Error Types
//!
//! Error taxonomy for the latchkey client runtime using `thiserror`.
//!
//! Every error knows whether it is retryable ([`ClientError::is_retryable`]);
//! the retry driver treats that classification as a pure function of the
//! error and never consults anything else.

pub mod types;

pub use types::{ClientError, Result};
