//! JSON-RPC engine for the UnrealIRCd RPC interface.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐        WebSocket (TLS)        ┌─────────────────────┐
//! │   Connection    │  ◄──────────────────────────► │  UnrealIRCd RPC     │
//! │ query/event_loop│   JSON-RPC 2.0 text frames    │  listener           │
//! └─────────────────┘                               └─────────────────────┘
//! ```
//!
//! Requests and responses are correlated by `id`; log events pushed after
//! `log.subscribe` carry no `id` and are queued for
//! [`Connection::event_loop`].
//!
//! # Usage
//!
//! ```ignore
//! use unrealircd_rpc::rpc::{Connection, ConnectionOptions, Credentials};
//!
//! let connection = Connection::connect(
//!     "wss://127.0.0.1:8600/",
//!     Credentials::from_api_login("adminpanel:password"),
//!     ConnectionOptions::default(),
//! ).await?;
//! connection.subscribe(&["all"]).await?;
//! loop {
//!     if let Some(event) = connection.event_loop().await? {
//!         println!("{:?}", event.data);
//!     }
//! }
//! ```

pub mod codec;
mod connection;
mod error;
mod pending;
mod tls;
pub mod transport;

pub use codec::{Envelope, ErrorObject, Event, RequestId, Response};
pub use connection::{Connection, ConnectionOptions, ConnectionState, Credentials, Querier};
pub use error::RpcError;
pub use pending::{PendingRequests, PendingSlot};
pub use transport::{MemoryPeer, Received, TransportReader, TransportWriter};
