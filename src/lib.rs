//! # pxkv - A Minimal In-Memory Key-Value Server
//!
//! pxkv speaks a subset of the Redis Serialization Protocol (RESP) over TCP
//! and supports four commands: `PING`, `ECHO`, `SET` (with an optional `PX`
//! expiry in milliseconds) and `GET`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               pxkv                                      │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────┐     │
//! │                     │   RESP      │    │      StorageEngine       │     │
//! │                     │   Decoder   │    │  (sharded, RwLock, TTL)  │     │
//! │                     └─────────────┘    └────────────▲─────────────┘     │
//! │                                                     │                   │
//! │                                        ┌────────────┴─────────────┐     │
//! │                                        │      ExpirySweeper       │     │
//! │                                        │  (Background Tokio Task) │     │
//! │                                        └──────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use pxkv::commands::CommandHandler;
//! use pxkv::connection::{handle_connection, ConnectionStats, DEFAULT_MAX_FRAME_SIZE};
//! use pxkv::storage::{start_expiry_sweeper, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("0.0.0.0:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, handler, stats, DEFAULT_MAX_FRAME_SIZE));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING` → `+PONG`
//! - `ECHO message [message ...]` → `+message ...`
//! - `SET key value [PX milliseconds]` → `+OK`
//! - `GET key` → `+value` or `$-1`
//!
//! Anything else replies `-ERR unknown command`.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP frame reader, request decoder and reply type
//! - [`storage`]: Thread-safe storage engine with TTL support
//! - [`commands`]: Executes commands and builds replies
//! - [`connection`]: Client connection management
//! - [`config`]: Command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::CommandHandler;
pub use config::{CliAction, Config, ConfigError};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{decode, Command, CommandKind, ParseError, RespParser, RespValue};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port pxkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host pxkv binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of pxkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
