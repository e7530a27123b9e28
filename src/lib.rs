//! # Latchkey
//!
//! Latchkey is a client-side runtime for secret-management services that
//! issue time-bound credentials (leases): static secrets, dynamic database
//! credentials, encryption operations, and authentication tokens. It keeps
//! issued material valid for as long as it is needed by renewing or rotating
//! leases in the background, without blocking foreground traffic.
//!
//! ## Architecture
//!
//! ```text
//! Caller -> Execution Strategy -> Response Handle
//!                  |
//!           Transport Invoker  <--  Maintenance Scheduler (periodic)
//!                  |                        |
//!             Lease Cache      -->  Callback Dispatcher
//! ```
//!
//! ## Core Components
//!
//! - **Execution Strategy** ([`exec`]): blocking, deferred, or future-native
//!   result delivery, with deadline-bounded retries shared by every call
//! - **Lease Cache** ([`lease`]): the concurrent source of truth for held
//!   time-bound material
//! - **Maintenance Scheduler** ([`maintenance`]): periodic renew-or-rotate
//!   over the cache, with per-lease jitter and failure isolation
//! - **Transport Invoker** ([`transport`]): one HTTP round trip per call,
//!   outcome classified into a retryability-aware error taxonomy
//! - **Secret Engines** ([`engines`]): thin request shaping per endpoint
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use latchkey::{Client, ClientConfig, Result};
//! use latchkey::engines::database;
//! use latchkey::lease::LeaseCallbacks;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let client = Client::new(config)?;
//!     client.start_maintenance();
//!
//!     let callbacks = LeaseCallbacks::new()
//!         .with_rotate(|record| println!("new credentials under {}", record.key));
//!     let creds = database::generate_credentials(&client, "database", "app", callbacks).await?;
//!     println!("username: {}", creds.value["username"]);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod engines;
pub mod errors;
pub mod exec;
pub mod lease;
pub mod maintenance;
pub mod observability;
pub mod transport;
pub mod types;

// Re-export commonly used types and traits
pub use client::{Client, LeaseOptions};
pub use config::ClientConfig;
pub use errors::{ClientError, Result};
pub use exec::{CallOutcome, ExecutionStrategy, ResponseHandle};
pub use lease::{LeaseCallbacks, LeaseRecord, LeaseState};
pub use observability::init_tracing;
pub use transport::{ApiResponse, CallDescriptor, Method, Transport};
pub use types::SecretString;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
