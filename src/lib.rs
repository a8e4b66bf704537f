//! UnrealIRCd RPC client library
//!
//! This library provides the core components for talking to an UnrealIRCd
//! JSON-RPC listener:
//!
//! - `rpc` - Connection engine: transport, envelope codec, request
//!   correlation and push-event delivery
//! - `api` - Thin wrappers for log, message and server operations
//! - `models` - Parameter types shared by the wrappers
//!
//! # Example
//!
//! ```ignore
//! use unrealircd_rpc::{Connection, ConnectionOptions, Credentials};
//!
//! let connection = Connection::connect(
//!     "wss://127.0.0.1:8600/",
//!     Credentials::from_api_login("adminpanel:password"),
//!     ConnectionOptions::default().with_tls_verify(false),
//! ).await?;
//!
//! let servers = connection.server().get_all().await?;
//! connection.subscribe(&["all"]).await?;
//! ```

pub mod api;
pub mod models;
pub mod rpc;

pub use models::{LogLevel, Target};
pub use rpc::{
    Connection, ConnectionOptions, ConnectionState, Credentials, Event, Querier, RpcError,
};
