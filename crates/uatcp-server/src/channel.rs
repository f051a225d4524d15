//! Per-channel security state: key epochs, certificates, nonces, transport
//! binding.
//!
//! A channel holds at most two key epochs. `previous` is populated only by a
//! renewal and lives until the first symmetric message under the new token
//! arrives (the activation criterion), so in-flight traffic under the old
//! token never loses its keys during rekey.

use crate::transport::Transport;
use std::sync::Arc;
use uatcp_core::messages::{ChannelSecurityToken, MessageSecurityMode};
use uatcp_crypto::{KeySet, RsaPrivateKey, RsaPublicKey, SecurityPolicy};

/// Lifecycle state of a secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Freshly allocated, no handshake traffic seen.
    Unsecured,
    /// `OpenSecureChannel` chunks are being accumulated or decoded.
    HandshakePending,
    /// A token is live; symmetric traffic may flow.
    Secured,
    /// A renewal is being processed on an established channel.
    RenewPending,
    /// Torn down; the registry no longer references the channel.
    Closed,
}

/// One token's worth of key material.
#[derive(Debug, Clone)]
pub struct SecurityEpoch {
    /// Derived keys; `None` under policy `None`.
    pub keys: Option<KeySet>,
    /// The token identifying this epoch.
    pub token: ChannelSecurityToken,
}

/// The channel's live epochs: always a current, at most one previous.
#[derive(Debug, Clone)]
pub struct ChannelSecurity {
    current: SecurityEpoch,
    previous: Option<SecurityEpoch>,
}

impl ChannelSecurity {
    /// Security for a freshly issued token. No previous epoch.
    pub fn new(current: SecurityEpoch) -> Self {
        Self {
            current,
            previous: None,
        }
    }

    /// The active epoch.
    pub fn current(&self) -> &SecurityEpoch {
        &self.current
    }

    /// The pre-renewal epoch, if still inside the overlap window.
    pub fn previous(&self) -> Option<&SecurityEpoch> {
        self.previous.as_ref()
    }

    /// Install a renewed epoch; the old current becomes previous.
    ///
    /// A second renewal before the first activates replaces `previous` with
    /// the epoch that was actually current, never with the new epoch itself.
    pub fn renew(&mut self, next: SecurityEpoch) {
        let old = std::mem::replace(&mut self.current, next);
        self.previous = Some(old);
    }

    /// Record that a symmetric message arrived under `token_id`.
    ///
    /// Once the current token is seen in use the overlap window ends and the
    /// previous epoch is discarded.
    pub fn token_activated(&mut self, token_id: u32) {
        if token_id == self.current.token.token_id {
            self.previous = None;
        }
    }

    /// Look up the epoch a symmetric message's token id refers to.
    pub fn epoch_for_token(&self, token_id: u32) -> Option<&SecurityEpoch> {
        if self.current.token.token_id == token_id {
            Some(&self.current)
        } else {
            self.previous
                .as_ref()
                .filter(|epoch| epoch.token.token_id == token_id)
        }
    }
}

/// Mutable state of one secure channel.
///
/// Mutated only on the owning connection's serialization order; shared
/// through the registry as `Arc<Mutex<SecureChannel>>`.
pub struct SecureChannel {
    channel_id: u32,
    state: ChannelState,
    security_policy: SecurityPolicy,
    security_mode: MessageSecurityMode,
    local_certificate: Option<Vec<u8>>,
    private_key: Option<RsaPrivateKey>,
    remote_certificate: Option<Vec<u8>>,
    remote_public_key: Option<RsaPublicKey>,
    local_nonce: Vec<u8>,
    remote_nonce: Vec<u8>,
    security: Option<ChannelSecurity>,
    bound_transport: Option<Arc<dyn Transport>>,
    send_sequence_number: u32,
}

impl SecureChannel {
    /// A new, unsecured channel.
    pub fn new(channel_id: u32) -> Self {
        Self {
            channel_id,
            state: ChannelState::Unsecured,
            security_policy: SecurityPolicy::None,
            security_mode: MessageSecurityMode::None,
            local_certificate: None,
            private_key: None,
            remote_certificate: None,
            remote_public_key: None,
            local_nonce: Vec::new(),
            remote_nonce: Vec::new(),
            security: None,
            bound_transport: None,
            send_sequence_number: 0,
        }
    }

    /// The channel's registry id.
    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Move the channel to a new lifecycle state.
    pub fn set_state(&mut self, state: ChannelState) {
        self.state = state;
    }

    /// The negotiated security policy.
    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy
    }

    /// Set the policy resolved from the security header.
    pub fn set_security_policy(&mut self, policy: SecurityPolicy) {
        self.security_policy = policy;
    }

    /// The negotiated message security mode.
    pub fn security_mode(&self) -> MessageSecurityMode {
        self.security_mode
    }

    /// Set the mode from the decoded request.
    pub fn set_security_mode(&mut self, mode: MessageSecurityMode) {
        self.security_mode = mode;
    }

    /// The server certificate in use, DER.
    pub fn local_certificate(&self) -> Option<&[u8]> {
        self.local_certificate.as_deref()
    }

    /// The server private key in use.
    pub fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private_key.as_ref()
    }

    /// Install the server certificate and key resolved by thumbprint.
    pub fn set_local_identity(&mut self, certificate_der: Vec<u8>, key: RsaPrivateKey) {
        self.local_certificate = Some(certificate_der);
        self.private_key = Some(key);
    }

    /// The client certificate, DER, as received in the security header.
    pub fn remote_certificate(&self) -> Option<&[u8]> {
        self.remote_certificate.as_deref()
    }

    /// The client's RSA public key.
    pub fn remote_public_key(&self) -> Option<&RsaPublicKey> {
        self.remote_public_key.as_ref()
    }

    /// Install the client certificate and its extracted public key.
    pub fn set_remote_identity(&mut self, certificate_der: Vec<u8>, key: RsaPublicKey) {
        self.remote_certificate = Some(certificate_der);
        self.remote_public_key = Some(key);
    }

    /// The server nonce of the current exchange.
    pub fn local_nonce(&self) -> &[u8] {
        &self.local_nonce
    }

    /// The client nonce of the current exchange.
    pub fn remote_nonce(&self) -> &[u8] {
        &self.remote_nonce
    }

    /// Store both nonces for key derivation.
    pub fn set_nonces(&mut self, local: Vec<u8>, remote: Vec<u8>) {
        self.local_nonce = local;
        self.remote_nonce = remote;
    }

    /// The live key epochs, if a token has been issued.
    pub fn security(&self) -> Option<&ChannelSecurity> {
        self.security.as_ref()
    }

    /// Mutable access for the symmetric layer's activation bookkeeping.
    pub fn security_mut(&mut self) -> Option<&mut ChannelSecurity> {
        self.security.as_mut()
    }

    /// Token id of the current epoch, if any.
    pub fn current_token_id(&self) -> Option<u32> {
        self.security.as_ref().map(|s| s.current().token.token_id)
    }

    /// Install the first epoch. Replaces any existing security outright,
    /// with no previous epoch.
    pub fn issue(&mut self, epoch: SecurityEpoch) {
        self.security = Some(ChannelSecurity::new(epoch));
        self.state = ChannelState::Secured;
    }

    /// Install a renewed epoch, keeping the old one for the overlap window.
    pub fn renew(&mut self, epoch: SecurityEpoch) {
        match &mut self.security {
            Some(security) => security.renew(epoch),
            None => self.security = Some(ChannelSecurity::new(epoch)),
        }
        self.state = ChannelState::Secured;
    }

    /// The transport this channel is bound to.
    pub fn bound_transport(&self) -> Option<&Arc<dyn Transport>> {
        self.bound_transport.as_ref()
    }

    /// Bind the channel to a transport. A channel has exactly one bound
    /// transport at any instant.
    pub fn bind_transport(&mut self, transport: Arc<dyn Transport>) {
        self.bound_transport = Some(transport);
    }

    /// Next send-side sequence number, starting at 1.
    pub fn next_sequence_number(&mut self) -> u32 {
        self.send_sequence_number += 1;
        self.send_sequence_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uatcp_core::messages::DateTime;

    fn token(token_id: u32) -> ChannelSecurityToken {
        ChannelSecurityToken {
            channel_id: 1,
            token_id,
            created_at: DateTime(0),
            revised_lifetime: 300_000,
        }
    }

    fn epoch(token_id: u32) -> SecurityEpoch {
        SecurityEpoch {
            keys: None,
            token: token(token_id),
        }
    }

    #[test]
    fn test_issue_has_no_previous() {
        let mut channel = SecureChannel::new(1);
        channel.issue(epoch(1));

        let security = channel.security().unwrap();
        assert_eq!(security.current().token.token_id, 1);
        assert!(security.previous().is_none());
        assert_eq!(channel.state(), ChannelState::Secured);
    }

    #[test]
    fn test_renew_populates_previous() {
        let mut channel = SecureChannel::new(1);
        channel.issue(epoch(1));
        channel.renew(epoch(2));

        let security = channel.security().unwrap();
        assert_eq!(security.current().token.token_id, 2);
        assert_eq!(security.previous().unwrap().token.token_id, 1);
        assert!(security.previous().unwrap().token.token_id < security.current().token.token_id);
    }

    #[test]
    fn test_second_renewal_before_activation_keeps_real_predecessor() {
        let mut channel = SecureChannel::new(1);
        channel.issue(epoch(1));
        channel.renew(epoch(2));
        // Token 2 never activated; another renewal arrives.
        channel.renew(epoch(3));

        let security = channel.security().unwrap();
        assert_eq!(security.current().token.token_id, 3);
        // Previous is the epoch that was current, never the new one.
        assert_eq!(security.previous().unwrap().token.token_id, 2);
    }

    #[test]
    fn test_activation_discards_previous() {
        let mut channel = SecureChannel::new(1);
        channel.issue(epoch(1));
        channel.renew(epoch(2));

        let security = channel.security_mut().unwrap();
        security.token_activated(1);
        assert!(security.previous().is_some(), "old token does not activate");

        security.token_activated(2);
        assert!(security.previous().is_none());
    }

    #[test]
    fn test_epoch_lookup_during_overlap() {
        let mut channel = SecureChannel::new(1);
        channel.issue(epoch(1));
        channel.renew(epoch(2));

        let security = channel.security().unwrap();
        assert_eq!(security.epoch_for_token(1).unwrap().token.token_id, 1);
        assert_eq!(security.epoch_for_token(2).unwrap().token.token_id, 2);
        assert!(security.epoch_for_token(3).is_none());
    }

    #[test]
    fn test_sequence_numbers_start_at_one() {
        let mut channel = SecureChannel::new(1);
        assert_eq!(channel.next_sequence_number(), 1);
        assert_eq!(channel.next_sequence_number(), 2);
    }
}
