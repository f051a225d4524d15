//! Channel and transport configuration.

/// UA-TCP protocol version announced in `OpenSecureChannelResponse`.
pub const PROTOCOL_VERSION: u32 = 0;

/// Negotiated limits and lifetimes for secure channels.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Token lifetime granted on issue and renewal, in milliseconds.
    pub secure_channel_lifetime_ms: u64,
    /// Maximum chunks one message may span.
    pub max_chunk_count: usize,
    /// Largest chunk accepted from the peer, header included.
    pub receive_buffer_size: usize,
    /// Largest chunk written to the peer, header included.
    pub send_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            secure_channel_lifetime_ms: 300_000,
            max_chunk_count: 64,
            receive_buffer_size: 65_536,
            send_buffer_size: 65_536,
        }
    }
}
