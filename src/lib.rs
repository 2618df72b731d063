//! Bidirectional JSON-RPC 2.0 transport for the Agent Client Protocol.
//!
//! ACP connects a code editor ("client") and an AI coding agent over a pair
//! of byte streams carrying one JSON message per line. Either peer may issue
//! requests, stream notifications, and answer the other side's requests on
//! the same full-duplex channel.
//!
//! The transport layer ([`Connection`]) provides:
//!
//! - newline-delimited JSON framing with bounded line sizes,
//! - correlation of outbound requests with responses by *canonical* id, so
//!   a peer that answers `"id":1` with `"id":1e0` still routes correctly,
//! - cancellation in both directions via the `$/cancel_request`
//!   notification, carried on [`CancelScope`]s,
//! - the prompt-drain guarantee: a request does not return until every
//!   notification the peer sent before the response has been handled.
//!
//! On top of the transport, [`AgentSideConnection`] and
//! [`ClientSideConnection`] bind [`Agent`] and [`Client`] implementations to
//! the typed protocol surface in [`schema`], including `_`-prefixed
//! extension methods.
//!
//! ```no_run
//! use std::sync::Arc;
//! use acp_rpc::{CancelScope, ClientHandlers, ClientSideConnection};
//! use acp_rpc::{InitializeRequest, PROTOCOL_VERSION};
//!
//! # async fn example(client: Arc<dyn acp_rpc::Client>) -> acp_rpc::Result<()> {
//! // Spawn the agent subprocess elsewhere; wire its stdio here.
//! # let (stdin, stdout) = tokio::io::duplex(1024);
//! let conn = ClientSideConnection::new(ClientHandlers::new(client), stdin, stdout);
//!
//! let ctx = CancelScope::new();
//! let response = conn
//!     .initialize(&ctx, InitializeRequest {
//!         protocol_version: PROTOCOL_VERSION,
//!         ..Default::default()
//!     })
//!     .await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! Diagnostics are emitted as [`tracing`] events; install a subscriber to
//! route them.

mod agent;
mod cancel;
mod client;
mod codec;
mod connection;
mod error;
mod extension;
mod id;
mod queue;
pub mod schema;

pub use agent::{Agent, AgentHandlers, AgentLoader, AgentSideConnection};
pub use cancel::{CancelCause, CancelScope};
pub use client::{Client, ClientHandlers, ClientSideConnection, TerminalHandler};
pub use codec::{INITIAL_LINE_BYTES, MAX_LINE_BYTES};
pub use connection::{Connection, MethodHandler};
pub use error::{
    RequestError, Result, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR, REQUEST_CANCELLED,
};
pub use extension::ExtensionMethodHandler;
pub use queue::UnboundedQueue;
pub use schema::*;
