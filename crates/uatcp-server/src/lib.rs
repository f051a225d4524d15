//! Server-side secure-channel establishment for the uatcp stack.
//!
//! Terminates the `OpenSecureChannel` handshake for incoming connections:
//! frames the chunked byte stream, authenticates peers via X.509
//! certificates, negotiates the symmetric key set, and hands the established
//! channel over to a symmetric-message handler.
//!
//! Layering, leaves first:
//! - [`channel`] / [`registry`]: per-channel key-epoch state and the
//!   process-wide channel table
//! - [`envelope`]: the asymmetric chunk codec
//! - [`queue`]: ordered per-connection crypto offload
//! - [`handshake`] / [`connection`]: the orchestrator and routing pipeline
//! - [`tcp`]: tokio front end feeding connections with bytes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certstore;
pub mod channel;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod queue;
pub mod registry;
pub mod server;
pub mod tcp;
pub mod transport;

pub use certstore::CertificateStore;
pub use channel::{ChannelSecurity, ChannelState, SecureChannel, SecurityEpoch};
pub use config::{ChannelConfig, PROTOCOL_VERSION};
pub use connection::{Connection, SymmetricHandler, SymmetricHandlerFactory};
pub use error::{Error, Result};
pub use handshake::{HandshakeHandler, TokenGrant};
pub use registry::ChannelRegistry;
pub use server::ChannelServer;
pub use transport::{Transport, TransportId};
