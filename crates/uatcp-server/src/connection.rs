//! Per-connection pipeline: framing, routing, and handler installation.
//!
//! One connection owns a framer, the handshake handler, and, after the first
//! successful issue, a symmetric handler installed in front of it. Routing is
//! by message type: `MSG` goes to the symmetric handler, `OPN` and `CLO` to
//! the handshake handler, and `MSG` before establishment is out of phase.

use crate::handshake::HandshakeHandler;
use crate::server::ChannelServer;
use crate::transport::Transport;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::error;
use uatcp_core::chunk::{FramedChunk, Framer, MessageType};
use uatcp_core::Error as ProtocolError;

/// Handler for symmetric (`MSG`) traffic after channel establishment.
///
/// Provided by the layer above this crate; the connection only routes chunks
/// to it.
pub trait SymmetricHandler: Send {
    /// Handle one framed `MSG` chunk.
    fn on_chunk(&mut self, chunk: FramedChunk) -> Result<()>;
}

/// Creates the symmetric handler once a channel's first token is issued.
pub trait SymmetricHandlerFactory: Send + Sync {
    /// Build the handler for an established channel.
    fn create(&self, channel_id: u32, transport: Arc<dyn Transport>) -> Box<dyn SymmetricHandler>;
}

/// One transport connection's inbound pipeline.
pub struct Connection {
    server: Arc<ChannelServer>,
    transport: Arc<dyn Transport>,
    framer: Framer,
    read_buffer: Vec<u8>,
    handshake: HandshakeHandler,
    symmetric: Option<Box<dyn SymmetricHandler>>,
}

impl Connection {
    /// Build the pipeline for a freshly accepted transport.
    pub fn new(server: Arc<ChannelServer>, transport: Arc<dyn Transport>) -> Self {
        let framer = Framer::new(server.config().receive_buffer_size);
        let handshake = HandshakeHandler::new(server.clone(), transport.clone());
        Self {
            server,
            transport,
            framer,
            read_buffer: Vec::new(),
            handshake,
            symmetric: None,
        }
    }

    /// The channel this connection established or renewed, once known.
    pub fn channel_id(&self) -> Option<u32> {
        self.handshake.channel_id()
    }

    /// Whether the symmetric handler has been installed.
    pub fn symmetric_installed(&self) -> bool {
        self.symmetric.is_some()
    }

    /// Feed received bytes through the framer and dispatch every complete
    /// chunk. On error the connection is failed: buffers released, a fresh
    /// unissued channel removed, the transport closed.
    pub async fn on_data(&mut self, data: &[u8]) -> Result<()> {
        self.read_buffer.extend_from_slice(data);

        loop {
            let chunk = match self.framer.poll(&mut self.read_buffer) {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return Ok(()),
                Err(e) => return self.fail(e.into()),
            };
            if let Err(e) = self.dispatch(chunk).await {
                return self.fail(e);
            }
        }
    }

    /// Tell the pipeline its transport is gone so channel state can be
    /// released.
    pub fn on_transport_closed(&mut self) {
        self.read_buffer.clear();
        self.handshake.on_transport_closed();
    }

    async fn dispatch(&mut self, chunk: FramedChunk) -> Result<()> {
        match chunk.header.message_type {
            MessageType::SecureMessage => match &mut self.symmetric {
                Some(handler) => handler.on_chunk(chunk),
                None => Err(ProtocolError::MessageTypeInvalid(
                    "MSG before secure channel established".into(),
                )
                .into()),
            },
            MessageType::CloseSecureChannel => {
                self.handshake.on_close_chunk(&chunk);
                Ok(())
            }
            MessageType::OpenSecureChannel => {
                if let Some(grant) = self.handshake.on_open_chunk(chunk).await? {
                    if self.symmetric.is_none() {
                        self.symmetric = Some(
                            self.server
                                .symmetric_factory()
                                .create(grant.channel_id, self.transport.clone()),
                        );
                    }
                }
                Ok(())
            }
        }
    }

    fn fail(&mut self, e: Error) -> Result<()> {
        error!(
            status = %e.status(),
            channel_id = ?self.handshake.channel_id(),
            "closing connection: {e}"
        );
        self.handshake.on_failure();
        self.transport.close();
        Err(e)
    }
}
