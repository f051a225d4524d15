//! Asymmetric envelope codec for `OPN` chunks.
//!
//! Chunk layout per OPC UA Part 6 §6.7.2/.4:
//!
//! ```text
//! | chunk header | security header | sequence header | body | padding | signature |
//! |---- plaintext on the wire ----|------------ encrypted region ---------------|
//! ```
//!
//! The signature covers everything before it (headers included) and is itself
//! inside the encrypted region. Padding is a size byte followed by that many
//! bytes, each equal to the size, so the byte just before the signature
//! always names the padding length. Under policy `None` the encrypted region
//! is plaintext and carries no padding or signature.

use crate::channel::SecureChannel;
use crate::config::ChannelConfig;
use crate::Result;
use uatcp_core::chunk::{ChunkHeader, ChunkType, MessageType};
use uatcp_core::header::{AsymmetricSecurityHeader, SequenceHeader};
use uatcp_crypto::asymmetric;

/// A message reassembled from one or more decrypted chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Concatenated plaintext bodies.
    pub body: Vec<u8>,
    /// Request id fixed by the first chunk's sequence header.
    pub request_id: u32,
}

/// Decrypt, verify, and reassemble an ordered chunk sequence.
///
/// The channel must already carry the policy and key material the
/// orchestrator resolved from the first chunk's security header; this
/// function re-checks header equality across all chunks, sequence-number
/// monotonicity, and request-id constancy.
pub fn decode_chunks(channel: &SecureChannel, chunks: &[Vec<u8>]) -> Result<DecodedMessage> {
    if chunks.is_empty() {
        return Err(uatcp_core::Error::Decoding("no chunks to decode".into()).into());
    }

    let policy = channel.security_policy();
    let mut body = Vec::new();
    let mut first: Option<(AsymmetricSecurityHeader, u32)> = None;
    let mut last_sequence: Option<u32> = None;

    for chunk in chunks {
        ChunkHeader::parse(chunk)?;
        let (security_header, security_len) =
            AsymmetricSecurityHeader::parse(&chunk[ChunkHeader::SIZE..])?;
        let header_len = ChunkHeader::SIZE + security_len;

        if let Some((expected, _)) = &first {
            if security_header != *expected {
                return Err(uatcp_core::Error::SecurityChecksFailed(
                    "asymmetric security header changed between chunks".into(),
                )
                .into());
            }
        }

        let plaintext = if policy.is_security_enabled() {
            let private_key = channel.private_key().ok_or_else(|| {
                uatcp_core::Error::SecurityChecksFailed("no local private key".into())
            })?;
            let remote_key = channel.remote_public_key().ok_or_else(|| {
                uatcp_core::Error::SecurityChecksFailed("no remote public key".into())
            })?;

            let mut plaintext = asymmetric::decrypt(policy, private_key, &chunk[header_len..])
                .map_err(|e| {
                    uatcp_core::Error::SecurityChecksFailed(format!("decryption failed: {e}"))
                })?;

            let signature_size = asymmetric::signature_len(remote_key);
            if plaintext.len() < signature_size + SequenceHeader::SIZE + 1 {
                return Err(uatcp_core::Error::SecurityChecksFailed(
                    "decrypted chunk too short".into(),
                )
                .into());
            }
            let signature = plaintext.split_off(plaintext.len() - signature_size);

            let mut signed = Vec::with_capacity(header_len + plaintext.len());
            signed.extend_from_slice(&chunk[..header_len]);
            signed.extend_from_slice(&plaintext);
            asymmetric::verify(policy, remote_key, &signed, &signature).map_err(|_| {
                uatcp_core::Error::SecurityChecksFailed("chunk signature invalid".into())
            })?;

            // The byte before the signature names the padding length.
            let padding = *plaintext.last().expect("length checked above") as usize;
            if plaintext.len() < SequenceHeader::SIZE + padding + 1 {
                return Err(uatcp_core::Error::SecurityChecksFailed(
                    "padding exceeds chunk".into(),
                )
                .into());
            }
            plaintext.truncate(plaintext.len() - padding - 1);
            plaintext
        } else {
            chunk[header_len..].to_vec()
        };

        let sequence_header = SequenceHeader::parse(&plaintext)?;
        if let Some(last) = last_sequence {
            if sequence_header.sequence_number <= last {
                return Err(uatcp_core::Error::SecurityChecksFailed(format!(
                    "sequence number {} not after {}",
                    sequence_header.sequence_number, last
                ))
                .into());
            }
        }
        last_sequence = Some(sequence_header.sequence_number);

        match &first {
            None => first = Some((security_header, sequence_header.request_id)),
            Some((_, request_id)) => {
                if sequence_header.request_id != *request_id {
                    return Err(uatcp_core::Error::SecurityChecksFailed(format!(
                        "request id changed mid-message: {} then {}",
                        request_id, sequence_header.request_id
                    ))
                    .into());
                }
            }
        }

        body.extend_from_slice(&plaintext[SequenceHeader::SIZE..]);
    }

    let (_, request_id) = first.expect("at least one chunk");
    Ok(DecodedMessage { body, request_id })
}

/// Split, sign, and encrypt a plaintext message into framed `OPN` chunks.
///
/// Consumes sequence numbers from the channel's send counter; the chunk count
/// is bounded by `config.max_chunk_count` and each chunk by
/// `config.send_buffer_size`.
pub fn encode_chunks(
    channel: &mut SecureChannel,
    message: &[u8],
    request_id: u32,
    config: &ChannelConfig,
) -> Result<Vec<Vec<u8>>> {
    let policy = channel.security_policy();

    let security_header = AsymmetricSecurityHeader {
        security_policy_uri: policy.uri().to_string(),
        sender_certificate: channel.local_certificate().map(<[u8]>::to_vec),
        receiver_certificate_thumbprint: channel
            .remote_certificate()
            .map(asymmetric::thumbprint),
    };
    let header_len = ChunkHeader::SIZE + security_header.encoded_len();

    if policy.is_security_enabled() {
        encode_secured(channel, message, request_id, config, security_header, header_len)
    } else {
        encode_plain(channel, message, request_id, config, security_header, header_len)
    }
}

fn encode_plain(
    channel: &mut SecureChannel,
    message: &[u8],
    request_id: u32,
    config: &ChannelConfig,
    security_header: AsymmetricSecurityHeader,
    header_len: usize,
) -> Result<Vec<Vec<u8>>> {
    let max_body = config
        .send_buffer_size
        .checked_sub(header_len + SequenceHeader::SIZE)
        .filter(|n| *n > 0)
        .ok_or_else(|| uatcp_core::Error::MessageTooLarge {
            actual: header_len + SequenceHeader::SIZE,
            limit: config.send_buffer_size,
        })?;

    let count = message.len().div_ceil(max_body).max(1);
    check_chunk_count(count, config)?;

    let mut chunks = Vec::with_capacity(count);
    for (index, part) in split_message(message, max_body, count).enumerate() {
        let message_size = (header_len + SequenceHeader::SIZE + part.len()) as u32;
        let mut chunk = Vec::with_capacity(message_size as usize);
        chunk_header(channel, index + 1 == count, message_size).serialize_into(&mut chunk);
        security_header.serialize_into(&mut chunk);
        SequenceHeader {
            sequence_number: channel.next_sequence_number(),
            request_id,
        }
        .serialize_into(&mut chunk);
        chunk.extend_from_slice(part);
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn encode_secured(
    channel: &mut SecureChannel,
    message: &[u8],
    request_id: u32,
    config: &ChannelConfig,
    security_header: AsymmetricSecurityHeader,
    header_len: usize,
) -> Result<Vec<Vec<u8>>> {
    let policy = channel.security_policy();
    let remote_key = channel
        .remote_public_key()
        .ok_or_else(|| uatcp_core::Error::SecurityChecksFailed("no remote public key".into()))?
        .clone();
    let local_public = channel
        .private_key()
        .ok_or_else(|| uatcp_core::Error::SecurityChecksFailed("no local private key".into()))?
        .to_public_key();

    let plain_block = asymmetric::plain_block_len(policy, &remote_key)?;
    let cipher_block = asymmetric::cipher_block_len(&remote_key);
    let signature_size = asymmetric::signature_len(&local_public);

    if plain_block > u8::MAX as usize + 1 {
        return Err(uatcp_crypto::Error::Unsupported(
            "peer key too large for single-byte padding".into(),
        )
        .into());
    }

    let max_blocks = config
        .send_buffer_size
        .checked_sub(header_len)
        .map(|n| n / cipher_block)
        .unwrap_or(0);
    let max_body = (max_blocks * plain_block)
        .checked_sub(SequenceHeader::SIZE + 1 + signature_size)
        .filter(|n| *n > 0)
        .ok_or_else(|| uatcp_core::Error::MessageTooLarge {
            actual: header_len + cipher_block,
            limit: config.send_buffer_size,
        })?;

    let count = message.len().div_ceil(max_body).max(1);
    check_chunk_count(count, config)?;

    let mut chunks = Vec::with_capacity(count);
    for (index, part) in split_message(message, max_body, count).enumerate() {
        let raw_len = SequenceHeader::SIZE + part.len() + 1 + signature_size;
        let padding = (plain_block - raw_len % plain_block) % plain_block;
        let plain_len = raw_len + padding;
        let cipher_len = plain_len / plain_block * cipher_block;
        let message_size = (header_len + cipher_len) as u32;

        let mut chunk = Vec::with_capacity(message_size as usize);
        chunk_header(channel, index + 1 == count, message_size).serialize_into(&mut chunk);
        security_header.serialize_into(&mut chunk);

        let mut plaintext = Vec::with_capacity(plain_len);
        SequenceHeader {
            sequence_number: channel.next_sequence_number(),
            request_id,
        }
        .serialize_into(&mut plaintext);
        plaintext.extend_from_slice(part);
        plaintext.push(padding as u8);
        plaintext.resize(plaintext.len() + padding, padding as u8);

        let private_key = channel.private_key().expect("checked above");
        let mut signed = Vec::with_capacity(header_len + plaintext.len());
        signed.extend_from_slice(&chunk);
        signed.extend_from_slice(&plaintext);
        let signature = asymmetric::sign(policy, private_key, &signed)?;
        plaintext.extend_from_slice(&signature);
        debug_assert_eq!(plaintext.len() % plain_block, 0);

        let ciphertext = asymmetric::encrypt(policy, &remote_key, &plaintext)?;
        chunk.extend_from_slice(&ciphertext);
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn chunk_header(channel: &SecureChannel, last: bool, message_size: u32) -> ChunkHeader {
    ChunkHeader {
        message_type: MessageType::OpenSecureChannel,
        chunk_type: if last {
            ChunkType::Final
        } else {
            ChunkType::Intermediate
        },
        message_size,
        secure_channel_id: channel.channel_id(),
    }
}

fn check_chunk_count(count: usize, config: &ChannelConfig) -> Result<()> {
    if count > config.max_chunk_count {
        return Err(uatcp_core::Error::MessageTooLarge {
            actual: count,
            limit: config.max_chunk_count,
        }
        .into());
    }
    Ok(())
}

/// Split `message` into `count` parts of at most `max_body` bytes; an empty
/// message still yields one empty part.
fn split_message(
    message: &[u8],
    max_body: usize,
    count: usize,
) -> impl Iterator<Item = &[u8]> + '_ {
    (0..count).map(move |i| {
        let start = i * max_body;
        let end = usize::min(start + max_body, message.len());
        &message[start..end]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;
    use uatcp_crypto::SecurityPolicy;

    fn generate_identity(name: &str) -> (Vec<u8>, RsaPrivateKey) {
        use rsa::pkcs8::EncodePrivateKey;
        // rcgen signs through ring, which requires >= 2048-bit RSA keys.
        let key = RsaPrivateKey::new(&mut OsRng, 2048).expect("key generation");
        let pkcs8 = key.to_pkcs8_der().expect("pkcs8 export");
        let key_pair = rcgen::KeyPair::try_from(pkcs8.as_bytes()).expect("rcgen key");
        let params = rcgen::CertificateParams::new(vec![name.into()]).expect("params");
        let certificate = params.self_signed(&key_pair).expect("self sign");
        (certificate.der().to_vec(), key)
    }

    fn cached_identities() -> &'static ((Vec<u8>, RsaPrivateKey), (Vec<u8>, RsaPrivateKey)) {
        static IDENTITIES: std::sync::OnceLock<(
            (Vec<u8>, RsaPrivateKey),
            (Vec<u8>, RsaPrivateKey),
        )> = std::sync::OnceLock::new();
        IDENTITIES
            .get_or_init(|| (generate_identity("client"), generate_identity("server")))
    }

    /// A client-side channel and a server-side channel wired to each other.
    fn paired_channels(policy: SecurityPolicy) -> (SecureChannel, SecureChannel) {
        let mut client = SecureChannel::new(7);
        let mut server = SecureChannel::new(7);
        client.set_security_policy(policy);
        server.set_security_policy(policy);

        if policy.is_security_enabled() {
            let ((client_der, client_key), (server_der, server_key)) =
                cached_identities().clone();
            let client_public = client_key.to_public_key();
            let server_public = server_key.to_public_key();

            client.set_local_identity(client_der.clone(), client_key);
            client.set_remote_identity(server_der.clone(), server_public);
            server.set_local_identity(server_der, server_key);
            server.set_remote_identity(client_der, client_public);
        }
        (client, server)
    }

    #[test]
    fn test_roundtrip_policy_none() {
        let (mut client, server) = paired_channels(SecurityPolicy::None);
        let config = ChannelConfig::default();
        let message = b"open secure channel request body".to_vec();

        let chunks = encode_chunks(&mut client, &message, 3, &config).unwrap();
        assert_eq!(chunks.len(), 1);

        let decoded = decode_chunks(&server, &chunks).unwrap();
        assert_eq!(decoded.body, message);
        assert_eq!(decoded.request_id, 3);
    }

    #[test]
    fn test_roundtrip_each_secured_policy() {
        for policy in [
            SecurityPolicy::Basic128Rsa15,
            SecurityPolicy::Basic256,
            SecurityPolicy::Basic256Sha256,
        ] {
            let (mut client, server) = paired_channels(policy);
            let config = ChannelConfig::default();
            let message = vec![0xC3u8; 300];

            let chunks = encode_chunks(&mut client, &message, 9, &config).unwrap();
            let decoded = decode_chunks(&server, &chunks).unwrap();
            assert_eq!(decoded.body, message, "policy {policy:?}");
            assert_eq!(decoded.request_id, 9);
        }
    }

    #[test]
    fn test_multi_chunk_roundtrip() {
        let (mut client, server) = paired_channels(SecurityPolicy::Basic256Sha256);
        // Big enough for the certificate-bearing security header plus a few
        // cipher blocks, small enough to force chunking.
        let config = ChannelConfig {
            send_buffer_size: 2048,
            ..ChannelConfig::default()
        };
        let message: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();

        let chunks = encode_chunks(&mut client, &message, 21, &config).unwrap();
        assert!(chunks.len() > 1, "expected chunking, got {}", chunks.len());
        for chunk in &chunks {
            assert!(chunk.len() <= 2048);
        }
        assert_eq!(
            ChunkHeader::parse(chunks.last().unwrap()).unwrap().chunk_type,
            ChunkType::Final
        );

        let decoded = decode_chunks(&server, &chunks).unwrap();
        assert_eq!(decoded.body, message);
    }

    #[test]
    fn test_chunk_count_limit_enforced() {
        let (mut client, _) = paired_channels(SecurityPolicy::Basic256Sha256);
        let config = ChannelConfig {
            send_buffer_size: 2048,
            max_chunk_count: 2,
            ..ChannelConfig::default()
        };
        let message = vec![0u8; 8192];

        let result = encode_chunks(&mut client, &message, 1, &config);
        assert!(matches!(
            result,
            Err(Error::Protocol(uatcp_core::Error::MessageTooLarge { .. }))
        ));
    }

    #[test]
    fn test_header_mismatch_across_chunks_rejected() {
        let (mut client, server) = paired_channels(SecurityPolicy::None);
        let config = ChannelConfig {
            send_buffer_size: 100,
            ..ChannelConfig::default()
        };
        let message = vec![1u8; 80];

        let mut chunks = encode_chunks(&mut client, &message, 2, &config).unwrap();
        assert!(chunks.len() > 1);

        // Rewrite the second chunk with a different policy URI.
        let tampered_uri = SecurityPolicy::Basic256.uri();
        let old_header_len = ChunkHeader::SIZE
            + AsymmetricSecurityHeader::parse(&chunks[1][ChunkHeader::SIZE..])
                .unwrap()
                .1;
        let tail = chunks[1][old_header_len..].to_vec();
        let mut rebuilt = Vec::new();
        let mut header = ChunkHeader::parse(&chunks[1]).unwrap();
        let new_security = AsymmetricSecurityHeader {
            security_policy_uri: tampered_uri.to_string(),
            sender_certificate: None,
            receiver_certificate_thumbprint: None,
        };
        header.message_size = (ChunkHeader::SIZE + new_security.encoded_len() + tail.len()) as u32;
        header.serialize_into(&mut rebuilt);
        new_security.serialize_into(&mut rebuilt);
        rebuilt.extend_from_slice(&tail);
        chunks[1] = rebuilt;

        let result = decode_chunks(&server, &chunks);
        assert!(matches!(
            result,
            Err(Error::Protocol(uatcp_core::Error::SecurityChecksFailed(_)))
        ));
    }

    #[test]
    fn test_sequence_regression_rejected() {
        let (mut client, server) = paired_channels(SecurityPolicy::None);
        let config = ChannelConfig {
            send_buffer_size: 100,
            ..ChannelConfig::default()
        };
        let message = vec![1u8; 80];

        let mut chunks = encode_chunks(&mut client, &message, 2, &config).unwrap();
        assert!(chunks.len() > 1);

        // Duplicate the first chunk's sequence number into the second.
        let header_len = ChunkHeader::SIZE
            + AsymmetricSecurityHeader::parse(&chunks[1][ChunkHeader::SIZE..])
                .unwrap()
                .1;
        let first_seq = SequenceHeader::parse(
            &chunks[0][ChunkHeader::SIZE
                + AsymmetricSecurityHeader::parse(&chunks[0][ChunkHeader::SIZE..])
                    .unwrap()
                    .1..],
        )
        .unwrap();
        chunks[1][header_len..header_len + 4]
            .copy_from_slice(&first_seq.sequence_number.to_le_bytes());

        let result = decode_chunks(&server, &chunks);
        assert!(matches!(
            result,
            Err(Error::Protocol(uatcp_core::Error::SecurityChecksFailed(_)))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (mut client, server) = paired_channels(SecurityPolicy::Basic256Sha256);
        let config = ChannelConfig::default();
        let message = vec![0x11u8; 64];

        let mut chunks = encode_chunks(&mut client, &message, 5, &config).unwrap();
        let last = chunks[0].len() - 1;
        chunks[0][last] ^= 0x01;

        assert!(decode_chunks(&server, &chunks).is_err());
    }

    #[test]
    fn test_signature_from_wrong_key_rejected() {
        // Client signs with a key that does not match the certificate the
        // server trusts.
        let (_, server) = paired_channels(SecurityPolicy::Basic256Sha256);
        let (mut impostor, _) = paired_channels(SecurityPolicy::Basic256Sha256);

        // Point the impostor at the server's encryption key so decryption
        // succeeds and only the signature check can fail.
        let server_public = server.private_key().unwrap().to_public_key();
        impostor.set_remote_identity(server.remote_certificate().unwrap().to_vec(), server_public);

        let config = ChannelConfig::default();
        let chunks = encode_chunks(&mut impostor, &[0x22u8; 32], 5, &config).unwrap();

        let result = decode_chunks(&server, &chunks);
        assert!(matches!(
            result,
            Err(Error::Protocol(uatcp_core::Error::SecurityChecksFailed(_)))
        ));
    }

    #[test]
    fn test_decode_requires_chunks() {
        let (_, server) = paired_channels(SecurityPolicy::None);
        assert!(decode_chunks(&server, &[]).is_err());
    }
}
