//! Transport seam between the channel layer and byte I/O.

use crate::Result;

/// Identity of one transport connection within the process.
pub type TransportId = u64;

/// A byte sink with identity.
///
/// The channel layer only ever writes whole chunks and closes; reading is
/// driven from the outside by whoever owns the socket. A secure channel holds
/// the `Arc<dyn Transport>` it is bound to; the transport itself knows
/// nothing about channels, which keeps the reference graph acyclic.
pub trait Transport: Send + Sync {
    /// Process-unique id of this connection, used to enforce that renewals
    /// arrive on the channel's bound transport.
    fn id(&self) -> TransportId;

    /// Queue one outgoing chunk.
    fn write(&self, data: Vec<u8>) -> Result<()>;

    /// Tear the connection down. Idempotent.
    fn close(&self);
}
