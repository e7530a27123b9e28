//! # Secret Engines
//!
//! Thin request shaping for the service's secret engines. Each function
//! builds a [`crate::transport::CallDescriptor`] and hands it to the client
//! core; retries, strategy semantics and lease bookkeeping all live below
//! this layer.

pub mod database;
pub mod kv;
pub mod sys;
pub mod token;
pub mod transit;
