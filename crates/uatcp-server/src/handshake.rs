//! The asymmetric handshake orchestrator.
//!
//! Accumulates `OPN` chunks, interlocks their security headers, resolves the
//! channel (fresh or renewal), hands the chunk list to the serialization
//! queue for decryption, drives the issue/renew transitions, and writes the
//! encoded response back to the transport.
//!
//! The handler holds only the channel id and looks the channel up in the
//! registry on use; channel, transport, and handler form no reference cycle.

use crate::channel::{ChannelState, SecureChannel, SecurityEpoch};
use crate::config::PROTOCOL_VERSION;
use crate::queue::SerializationQueue;
use crate::server::ChannelServer;
use crate::transport::Transport;
use crate::Result;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use uatcp_core::chunk::{ChunkHeader, ChunkType, FramedChunk};
use uatcp_core::header::AsymmetricSecurityHeader;
use uatcp_core::messages::{
    ChannelSecurityToken, DateTime, Message, OpenSecureChannelRequest, OpenSecureChannelResponse,
    ResponseHeader, SecurityTokenRequestType,
};
use uatcp_core::{Error as ProtocolError, StatusCode};
use uatcp_crypto::{asymmetric, derive_key_set, generate_nonce, SecurityPolicy};

/// Outcome of a completed `OpenSecureChannel` exchange.
#[derive(Debug, Clone, Copy)]
pub struct TokenGrant {
    /// The channel the token was minted for.
    pub channel_id: u32,
    /// Whether this was an Issue or a Renew.
    pub request_type: SecurityTokenRequestType,
}

/// Per-connection handler for `OPN` and `CLO` traffic.
pub struct HandshakeHandler {
    server: Arc<ChannelServer>,
    queue: SerializationQueue,
    transport: Arc<dyn Transport>,
    channel_id: Option<u32>,
    newly_allocated: bool,
    token_issued: bool,
    chunk_buffers: Vec<Vec<u8>>,
    pending_header: Option<AsymmetricSecurityHeader>,
}

impl HandshakeHandler {
    /// Create the handler for one transport connection.
    pub fn new(server: Arc<ChannelServer>, transport: Arc<dyn Transport>) -> Self {
        let queue = SerializationQueue::new(server.config().clone());
        Self {
            server,
            queue,
            transport,
            channel_id: None,
            newly_allocated: false,
            token_issued: false,
            chunk_buffers: Vec::new(),
            pending_header: None,
        }
    }

    /// The channel this connection is working on, once known.
    pub fn channel_id(&self) -> Option<u32> {
        self.channel_id
    }

    /// Handle a `CLO` chunk: close the channel and discard. Terminal, never
    /// an error.
    pub fn on_close_chunk(&mut self, _chunk: &FramedChunk) {
        debug!(channel_id = ?self.channel_id, "received CloseSecureChannel");
        if let Some(channel_id) = self.channel_id.take() {
            if self.server.registry().close(channel_id).is_some() {
                info!(channel_id, "secure channel closed by request");
            }
        }
        self.chunk_buffers.clear();
        self.pending_header = None;
    }

    /// Handle one `OPN` chunk. Returns a [`TokenGrant`] when a final chunk
    /// completed the exchange and the response went out.
    pub async fn on_open_chunk(&mut self, chunk: FramedChunk) -> Result<Option<TokenGrant>> {
        if chunk.header.chunk_type == ChunkType::Abort {
            debug!(channel_id = ?self.channel_id, "message aborted by peer");
            self.chunk_buffers.clear();
            self.pending_header = None;
            // A channel allocated for the abandoned message is released.
            if let Some(channel_id) = self.channel_id {
                if self.newly_allocated && !self.token_issued {
                    self.server.registry().close(channel_id);
                    self.channel_id = None;
                }
            }
            return Ok(None);
        }

        let (security_header, _) =
            AsymmetricSecurityHeader::parse(&chunk.data[ChunkHeader::SIZE..])?;

        let channel = self.resolve_channel(chunk.header.secure_channel_id, &security_header)?;

        match &self.pending_header {
            None => self.pending_header = Some(security_header.clone()),
            Some(first) => {
                if *first != security_header {
                    return Err(ProtocolError::SecurityChecksFailed(
                        "subsequent asymmetric security header did not match".into(),
                    )
                    .into());
                }
            }
        }

        let policy = SecurityPolicy::from_uri(&security_header.security_policy_uri)?;
        {
            let mut channel = channel.lock().expect("channel lock");
            channel.set_security_policy(policy);
            if channel.state() == ChannelState::Unsecured {
                channel.set_state(ChannelState::HandshakePending);
            }

            if let Some(certificate) = &security_header.sender_certificate {
                let public_key = asymmetric::public_key_from_der(certificate)?;
                channel.set_remote_identity(certificate.clone(), public_key);
            }

            if let Some(print) = &security_header.receiver_certificate_thumbprint {
                let entry = self.server.certificates().get(print).ok_or_else(|| {
                    ProtocolError::SecurityChecksFailed(
                        "no certificate for provided thumbprint".into(),
                    )
                })?;
                channel
                    .set_local_identity(entry.certificate_der.clone(), entry.private_key.clone());
            }
        }

        self.chunk_buffers.push(chunk.data);
        if self.chunk_buffers.len() > self.server.config().max_chunk_count {
            return Err(ProtocolError::MessageTooLarge {
                actual: self.chunk_buffers.len(),
                limit: self.server.config().max_chunk_count,
            }
            .into());
        }

        if chunk.header.chunk_type != ChunkType::Final {
            return Ok(None);
        }

        let buffers = std::mem::take(&mut self.chunk_buffers);
        self.pending_header = None;

        let decoded = self.queue.decode(channel.clone(), buffers).await?;
        let message = self.server.codecs().decode_message(&decoded.body)?;
        let Message::OpenSecureChannelRequest(request) = message else {
            return Err(ProtocolError::MessageTypeInvalid(
                "OPN chunk did not carry an OpenSecureChannelRequest".into(),
            )
            .into());
        };

        debug!(
            channel_id = ?self.channel_id,
            request_id = decoded.request_id,
            request_type = ?request.request_type,
            "received OpenSecureChannelRequest"
        );

        match request.request_type {
            SecurityTokenRequestType::Issue => {
                self.issue_token(channel, request, decoded.request_id).await
            }
            SecurityTokenRequestType::Renew => {
                self.renew_token(channel, request, decoded.request_id).await
            }
        }
    }

    /// Release accumulated state after a failed exchange. A channel that was
    /// allocated for this handshake and never issued a token is removed.
    pub fn on_failure(&mut self) {
        self.chunk_buffers.clear();
        self.pending_header = None;
        if let Some(channel_id) = self.channel_id {
            if self.newly_allocated && !self.token_issued {
                self.server.registry().close(channel_id);
                self.channel_id = None;
            }
        }
    }

    /// React to the transport going away: a channel bound to this transport
    /// is closed, one bound elsewhere is left alone.
    pub fn on_transport_closed(&mut self) {
        self.chunk_buffers.clear();
        self.pending_header = None;
        let Some(channel_id) = self.channel_id else {
            return;
        };
        let Some(channel) = self.server.registry().get(channel_id) else {
            return;
        };
        let bound_here = {
            let channel = channel.lock().expect("channel lock");
            channel.bound_transport().map(|t| t.id()) == Some(self.transport.id())
        };
        if bound_here || (self.newly_allocated && !self.token_issued) {
            info!(channel_id, "closing secure channel on transport close");
            self.server.registry().close(channel_id);
        }
    }

    fn resolve_channel(
        &mut self,
        secure_channel_id: u32,
        security_header: &AsymmetricSecurityHeader,
    ) -> Result<Arc<Mutex<SecureChannel>>> {
        if secure_channel_id == 0 {
            // Continuation chunks of an in-flight message reuse the channel
            // allocated for its first chunk.
            if self.pending_header.is_some() {
                let channel_id = self
                    .channel_id
                    .ok_or(ProtocolError::SecureChannelUnknown(0))?;
                return self
                    .server
                    .registry()
                    .get(channel_id)
                    .ok_or_else(|| ProtocolError::SecureChannelUnknown(channel_id).into());
            }

            let (channel_id, channel) = self.server.registry().open();
            self.channel_id = Some(channel_id);
            self.newly_allocated = true;
            self.token_issued = false;
            return Ok(channel);
        }

        let channel = self
            .server
            .registry()
            .get(secure_channel_id)
            .ok_or(ProtocolError::SecureChannelUnknown(secure_channel_id))?;

        {
            let channel = channel.lock().expect("channel lock");

            if channel.remote_certificate() != security_header.sender_certificate.as_deref() {
                return Err(ProtocolError::SecurityChecksFailed(
                    "certificate requesting renewal did not match existing certificate".into(),
                )
                .into());
            }

            if let Some(bound) = channel.bound_transport() {
                if bound.id() != self.transport.id() {
                    return Err(ProtocolError::SecurityChecksFailed(
                        "renewal received from a transport other than the bound transport".into(),
                    )
                    .into());
                }
            }
        }

        self.channel_id = Some(secure_channel_id);
        self.newly_allocated = false;
        Ok(channel)
    }

    async fn issue_token(
        &mut self,
        channel: Arc<Mutex<SecureChannel>>,
        request: OpenSecureChannelRequest,
        request_id: u32,
    ) -> Result<Option<TokenGrant>> {
        let lifetime_ms = self.server.config().secure_channel_lifetime_ms;
        let token_id = self.server.registry().next_token_id();

        let (channel_id, token, server_nonce) = {
            let mut channel = channel.lock().expect("channel lock");
            channel.set_security_mode(request.security_mode);
            let policy = channel.security_policy();

            let keys = if policy.is_security_enabled() {
                let local_nonce = generate_nonce(policy.nonce_len());
                channel.set_nonces(local_nonce, request.client_nonce.clone());
                Some(derive_key_set(
                    policy,
                    channel.remote_nonce(),
                    channel.local_nonce(),
                ))
            } else {
                channel.set_nonces(Vec::new(), Vec::new());
                None
            };

            let token = ChannelSecurityToken {
                channel_id: channel.channel_id(),
                token_id,
                created_at: DateTime::now(),
                revised_lifetime: lifetime_ms as u32,
            };
            channel.issue(SecurityEpoch { keys, token });
            channel.bind_transport(self.transport.clone());

            (channel.channel_id(), token, channel.local_nonce().to_vec())
        };

        let response = OpenSecureChannelResponse {
            response_header: ResponseHeader {
                timestamp: DateTime::now(),
                request_handle: request.request_header.request_handle,
                service_result: StatusCode::GOOD,
            },
            server_protocol_version: PROTOCOL_VERSION,
            security_token: token,
            server_nonce,
        };

        self.send_response(channel, response, request_id).await?;
        Ok(Some(TokenGrant {
            channel_id,
            request_type: SecurityTokenRequestType::Issue,
        }))
    }

    async fn renew_token(
        &mut self,
        channel: Arc<Mutex<SecureChannel>>,
        request: OpenSecureChannelRequest,
        request_id: u32,
    ) -> Result<Option<TokenGrant>> {
        // A renewal needs an established channel; secure_channel_id 0 (which
        // freshly allocates) can never name one.
        if self.newly_allocated {
            return Err(ProtocolError::SecureChannelUnknown(0).into());
        }

        let lifetime_ms = self.server.config().secure_channel_lifetime_ms;
        let token_id = self.server.registry().next_token_id();

        let (channel_id, token, server_nonce) = {
            let mut channel = channel.lock().expect("channel lock");

            if channel.security().is_none() {
                return Err(
                    ProtocolError::SecureChannelUnknown(channel.channel_id()).into(),
                );
            }
            if channel.security_mode() != request.security_mode {
                error!(
                    channel_id = channel.channel_id(),
                    "secure channel renewal requested a different MessageSecurityMode"
                );
                return Err(ProtocolError::SecurityChecksFailed(
                    "renewal requested a different MessageSecurityMode".into(),
                )
                .into());
            }
            channel.set_state(ChannelState::RenewPending);

            let policy = channel.security_policy();
            let keys = if policy.is_security_enabled() {
                let local_nonce = generate_nonce(policy.nonce_len());
                channel.set_nonces(local_nonce, request.client_nonce.clone());
                Some(derive_key_set(
                    policy,
                    channel.remote_nonce(),
                    channel.local_nonce(),
                ))
            } else {
                None
            };

            let token = ChannelSecurityToken {
                channel_id: channel.channel_id(),
                token_id,
                created_at: DateTime::now(),
                revised_lifetime: lifetime_ms as u32,
            };
            channel.renew(SecurityEpoch { keys, token });

            (channel.channel_id(), token, channel.local_nonce().to_vec())
        };

        let response = OpenSecureChannelResponse {
            response_header: ResponseHeader {
                timestamp: DateTime::now(),
                request_handle: request.request_header.request_handle,
                service_result: StatusCode::GOOD,
            },
            server_protocol_version: PROTOCOL_VERSION,
            security_token: token,
            server_nonce,
        };

        self.send_response(channel, response, request_id).await?;
        Ok(Some(TokenGrant {
            channel_id,
            request_type: SecurityTokenRequestType::Renew,
        }))
    }

    async fn send_response(
        &mut self,
        channel: Arc<Mutex<SecureChannel>>,
        response: OpenSecureChannelResponse,
        request_id: u32,
    ) -> Result<()> {
        let token = response.security_token;

        let mut body = Vec::new();
        self.server
            .codecs()
            .encode_message(&Message::OpenSecureChannelResponse(response), &mut body)?;

        let chunks = self.queue.encode(channel, body, request_id).await?;
        for chunk in chunks {
            self.transport.write(chunk)?;
        }

        self.token_issued = true;
        self.server.registry().issued_or_renewed(
            token.channel_id,
            token.token_id,
            self.server.config().secure_channel_lifetime_ms,
        );

        debug!(
            channel_id = token.channel_id,
            token_id = token.token_id,
            request_id,
            "sent OpenSecureChannelResponse"
        );
        Ok(())
    }
}
