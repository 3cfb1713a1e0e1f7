//! # framewire
//!
//! A framed, checksummed binary wire protocol and the RPC correlation and
//! dispatch engines built on top of it.
//!
//! Two peers exchange frames over any ordered, reliable byte stream the
//! caller supplies (the crate is generic over tokio's `AsyncRead` /
//! `AsyncWrite` halves). The calling side matches asynchronous responses
//! back to the call that issued them by correlation id; the serving side
//! dispatches decoded requests to registered handlers.
//!
//! ## Architecture
//!
//! - **Protocol**: 16-byte header (magic, version, kind, correlation id,
//!   payload length), opaque payload, trailing CRC-32C checksum
//! - **Client**: pending-call table, register-before-send, timeout sweep
//! - **Server**: service registry, concurrent handler dispatch
//!
//! ## Example
//!
//! ```ignore
//! use framewire::{RpcClient, RpcServer, ServerConfig, ServiceHandler, ServiceRegistry};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let registry = Arc::new(ServiceRegistry::new().service(
//!     ServiceHandler::new("user").operation("getUserName", |id: u64| async move {
//!         Ok(format!("User{}", id))
//!     }),
//! ));
//!
//! // Stream halves come from any transport (TCP, UDS, in-memory duplex).
//! tokio::spawn(RpcServer::serve(srv_r, srv_w, registry, ServerConfig::default()));
//!
//! let client = RpcClient::start(cli_r, cli_w);
//! let name: String = client
//!     .call_typed("user", "getUserName", &1u64, Duration::from_secs(5))
//!     .await?;
//! assert_eq!(name, "User1");
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod writer;

mod client;
mod pending;
mod server;

pub use client::{ClientBuilder, ClientConfig, RpcClient, DEFAULT_SWEEP_INTERVAL};
pub use codec::{ErrorDescriptor, MsgPackCodec, RequestEnvelope, ResponseEnvelope, WireErrorKind};
pub use error::{FramewireError, Result};
pub use handler::{ServiceHandler, ServiceRegistry};
pub use server::{RpcServer, ServerConfig, DEFAULT_MAX_CONCURRENT_HANDLERS};
pub use writer::{WriterConfig, WriterHandle};
