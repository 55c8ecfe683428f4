//! Connection Handler Module
//!
//! Each client connection is handled by its own async task: read bytes,
//! decode requests, execute them, write the replies.
//!
//! The accept loop in `main.rs` spawns [`handle_connection`] once per
//! client. [`ConnectionHandler`] is generic over the stream so tests can
//! drive it with in-memory mocks.
//!
//! ## Example
//!
//! ```ignore
//! use pxkv::connection::{handle_connection, ConnectionStats, DEFAULT_MAX_FRAME_SIZE};
//! use pxkv::commands::CommandHandler;
//! use pxkv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage);
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, stats, DEFAULT_MAX_FRAME_SIZE));
//! ```

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, StatsSnapshot,
    DEFAULT_MAX_FRAME_SIZE,
};
