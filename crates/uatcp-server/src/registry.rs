//! Process-wide secure-channel registry.
//!
//! The registry is the only shared-mutable structure touched by multiple
//! connections; the map is guarded by a mutex and the id allocators are
//! atomics, so every operation is linearizable. Token lifetime timers run as
//! tokio tasks and race with renewal; the timer re-checks the current token
//! id before closing, which resolves that race.

use crate::channel::{ChannelState, SecureChannel};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Registry of live channels with channel-id and token-id allocation.
pub struct ChannelRegistry {
    channels: Mutex<HashMap<u32, Arc<Mutex<SecureChannel>>>>,
    next_channel_id: AtomicU32,
    next_token_id: AtomicU32,
}

impl ChannelRegistry {
    /// An empty registry. Ids start at 1; 0 is reserved on the wire for
    /// "no channel yet".
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_channel_id: AtomicU32::new(1),
            next_token_id: AtomicU32::new(1),
        }
    }

    /// Allocate a channel id and insert an empty channel under it.
    pub fn open(&self) -> (u32, Arc<Mutex<SecureChannel>>) {
        let channel_id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let channel = Arc::new(Mutex::new(SecureChannel::new(channel_id)));
        self.channels
            .lock()
            .expect("registry lock")
            .insert(channel_id, channel.clone());
        debug!(channel_id, "opened secure channel");
        (channel_id, channel)
    }

    /// Look up a live channel.
    pub fn get(&self, channel_id: u32) -> Option<Arc<Mutex<SecureChannel>>> {
        self.channels
            .lock()
            .expect("registry lock")
            .get(&channel_id)
            .cloned()
    }

    /// Remove a channel, marking it closed. Returns the removed channel.
    pub fn close(&self, channel_id: u32) -> Option<Arc<Mutex<SecureChannel>>> {
        let removed = self
            .channels
            .lock()
            .expect("registry lock")
            .remove(&channel_id);
        if let Some(channel) = &removed {
            channel.lock().expect("channel lock").set_state(ChannelState::Closed);
            debug!(channel_id, "closed secure channel");
        }
        removed
    }

    /// Allocate the next token id. Unique for the process lifetime.
    pub fn next_token_id(&self) -> u32 {
        self.next_token_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.channels.lock().expect("registry lock").len()
    }

    /// Whether no channels are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arm the lifetime timer for a freshly issued or renewed token.
    ///
    /// When the timer fires, the channel is closed only if `token_id` is
    /// still its current token; a renewal in the meantime supersedes the
    /// timer. Closing also tears down the bound transport.
    pub fn issued_or_renewed(self: &Arc<Self>, channel_id: u32, token_id: u32, lifetime_ms: u64) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(lifetime_ms)).await;

            let Some(channel) = registry.get(channel_id) else {
                return;
            };
            let expired = {
                let channel = channel.lock().expect("channel lock");
                channel.current_token_id() == Some(token_id)
            };
            if !expired {
                return;
            }

            info!(channel_id, token_id, "secure channel lifetime expired");
            if let Some(channel) = registry.close(channel_id) {
                let channel = channel.lock().expect("channel lock");
                if let Some(transport) = channel.bound_transport() {
                    transport.close();
                }
            }
        });
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
