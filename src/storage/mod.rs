//! Storage Engine Module
//!
//! The in-memory key-value store backing `SET` and `GET`, plus the
//! background task that reclaims expired keys.
//!
//! - [`clock`]: where "now" comes from
//! - [`engine`]: the sharded map and lazy expiry
//! - [`expiry`]: the sweeper task for keys nobody reads
//!
//! ## Example
//!
//! ```
//! use pxkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set("color".to_string(), "teal".to_string(), None);
//! assert_eq!(engine.get("color"), Some("teal".to_string()));
//!
//! // Expires one hour from now
//! engine.set("session".to_string(), "token123".to_string(), Some(3_600_000));
//! ```

pub mod clock;
pub mod engine;
pub mod expiry;

pub use clock::{Clock, SystemClock};
pub use engine::{Entry, StorageEngine, StorageStats};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
