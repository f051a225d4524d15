//! Shared harness for handshake integration tests: a recording transport, a
//! recording symmetric-handler factory, and a client stub built from the same
//! envelope/codec primitives the server uses.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uatcp_core::chunk::FramedChunk;
use uatcp_core::messages::{
    DateTime, Message, MessageSecurityMode, OpenSecureChannelRequest, OpenSecureChannelResponse,
    RequestHeader, SecurityTokenRequestType,
};
use uatcp_core::CodecRegistry;
use uatcp_crypto::{RsaPrivateKey, SecurityPolicy};
use uatcp_server::envelope;
use uatcp_server::{
    CertificateStore, ChannelConfig, ChannelServer, SecureChannel, SymmetricHandler,
    SymmetricHandlerFactory, Transport, TransportId,
};

/// Transport double that records writes and close calls.
pub struct MockTransport {
    id: TransportId,
    writes: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new(id: TransportId) -> Arc<Self> {
        Arc::new(Self {
            id,
            writes: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Drain everything written so far, one entry per chunk.
    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.writes.lock().unwrap())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn write(&self, data: Vec<u8>) -> uatcp_server::Result<()> {
        self.writes.lock().unwrap().push(data);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory double that records which channels got a symmetric handler.
#[derive(Default)]
pub struct RecordingFactory {
    installs: Arc<Mutex<Vec<u32>>>,
}

impl RecordingFactory {
    pub fn new() -> (Box<Self>, Arc<Mutex<Vec<u32>>>) {
        let factory = Box::new(Self::default());
        let installs = factory.installs.clone();
        (factory, installs)
    }
}

impl SymmetricHandlerFactory for RecordingFactory {
    fn create(&self, channel_id: u32, _transport: Arc<dyn Transport>) -> Box<dyn SymmetricHandler> {
        self.installs.lock().unwrap().push(channel_id);
        Box::new(RecordingHandler)
    }
}

struct RecordingHandler;

impl SymmetricHandler for RecordingHandler {
    fn on_chunk(&mut self, _chunk: FramedChunk) -> uatcp_server::Result<()> {
        Ok(())
    }
}

/// Generate an RSA identity: a self-signed DER certificate plus its key.
///
/// rcgen signs through ring, which requires >= 2048-bit RSA keys.
pub fn generate_identity(name: &str) -> (Vec<u8>, RsaPrivateKey) {
    use rsa::pkcs8::EncodePrivateKey;
    let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("key generation");
    let pkcs8 = key.to_pkcs8_der().expect("pkcs8 export");
    let key_pair = rcgen::KeyPair::try_from(pkcs8.as_bytes()).expect("rcgen key");
    let params = rcgen::CertificateParams::new(vec![name.into()]).expect("params");
    let certificate = params.self_signed(&key_pair).expect("self sign");
    (certificate.der().to_vec(), key)
}

/// The client identity shared across a test binary (key generation is slow).
pub fn client_identity() -> (Vec<u8>, RsaPrivateKey) {
    static IDENTITY: std::sync::OnceLock<(Vec<u8>, RsaPrivateKey)> = std::sync::OnceLock::new();
    IDENTITY
        .get_or_init(|| generate_identity("uatcp-client"))
        .clone()
}

/// The server identity shared across a test binary.
pub fn server_identity() -> (Vec<u8>, RsaPrivateKey) {
    static IDENTITY: std::sync::OnceLock<(Vec<u8>, RsaPrivateKey)> = std::sync::OnceLock::new();
    IDENTITY
        .get_or_init(|| generate_identity("uatcp-server"))
        .clone()
}

/// Build a server with no certificates (policy None only).
pub fn plain_server(config: ChannelConfig) -> (Arc<ChannelServer>, Arc<Mutex<Vec<u32>>>) {
    let (factory, installs) = RecordingFactory::new();
    let server = ChannelServer::new(
        config,
        CertificateStore::new(),
        CodecRegistry::with_defaults(),
        factory,
    );
    (server, installs)
}

/// Build a server holding one certificate, returning its DER too.
pub fn secured_server(
    config: ChannelConfig,
) -> (Arc<ChannelServer>, Arc<Mutex<Vec<u32>>>, Vec<u8>) {
    let (server_der, server_key) = server_identity();
    let mut store = CertificateStore::new();
    store.insert(server_der.clone(), server_key);

    let (factory, installs) = RecordingFactory::new();
    let server = ChannelServer::new(config, store, CodecRegistry::with_defaults(), factory);
    (server, installs, server_der)
}

/// Client half of the handshake, sharing the server's wire primitives.
pub struct ClientStub {
    pub policy: SecurityPolicy,
    pub codecs: CodecRegistry,
    pub config: ChannelConfig,
    identity: Option<(Vec<u8>, RsaPrivateKey)>,
    server_certificate: Option<Vec<u8>>,
}

impl ClientStub {
    pub fn unsecured() -> Self {
        Self {
            policy: SecurityPolicy::None,
            codecs: CodecRegistry::with_defaults(),
            config: ChannelConfig::default(),
            identity: None,
            server_certificate: None,
        }
    }

    pub fn secured(
        policy: SecurityPolicy,
        identity: (Vec<u8>, RsaPrivateKey),
        server_certificate: Vec<u8>,
    ) -> Self {
        Self {
            policy,
            codecs: CodecRegistry::with_defaults(),
            config: ChannelConfig::default(),
            identity: Some(identity),
            server_certificate: Some(server_certificate),
        }
    }

    /// A channel mirroring this client's view of the exchange.
    fn channel(&self, secure_channel_id: u32) -> SecureChannel {
        let mut channel = SecureChannel::new(secure_channel_id);
        channel.set_security_policy(self.policy);
        if let Some((der, key)) = &self.identity {
            channel.set_local_identity(der.clone(), key.clone());
        }
        if let Some(server_der) = &self.server_certificate {
            let public = uatcp_crypto::asymmetric::public_key_from_der(server_der)
                .expect("server certificate");
            channel.set_remote_identity(server_der.clone(), public);
        }
        channel
    }

    /// Encode an `OpenSecureChannelRequest` into framed `OPN` chunks.
    pub fn encode_request(
        &self,
        secure_channel_id: u32,
        request: &OpenSecureChannelRequest,
        request_id: u32,
    ) -> Vec<Vec<u8>> {
        let mut body = Vec::new();
        self.codecs
            .encode_message(
                &Message::OpenSecureChannelRequest(request.clone()),
                &mut body,
            )
            .expect("encode request");

        let mut channel = self.channel(secure_channel_id);
        envelope::encode_chunks(&mut channel, &body, request_id, &self.config)
            .expect("encode chunks")
    }

    /// Decode the chunks a [`MockTransport`] captured into the response.
    pub fn decode_response(&self, chunks: &[Vec<u8>]) -> OpenSecureChannelResponse {
        assert!(!chunks.is_empty(), "no response written");
        let channel = self.channel(0);
        let decoded = envelope::decode_chunks(&channel, chunks).expect("decode response");
        match self.codecs.decode_message(&decoded.body).expect("decode message") {
            Message::OpenSecureChannelResponse(response) => response,
            other => panic!("expected OpenSecureChannelResponse, got {other:?}"),
        }
    }
}

/// An `OpenSecureChannelRequest` with the fields the scenarios vary.
pub fn open_request(
    request_type: SecurityTokenRequestType,
    security_mode: MessageSecurityMode,
    client_nonce: Vec<u8>,
    request_handle: u32,
) -> OpenSecureChannelRequest {
    OpenSecureChannelRequest {
        request_header: RequestHeader {
            timestamp: DateTime::now(),
            request_handle,
            return_diagnostics: 0,
            timeout_hint: 10_000,
        },
        client_protocol_version: 0,
        request_type,
        security_mode,
        client_nonce,
        requested_lifetime: 3_600_000,
    }
}

/// Flatten chunks into one byte stream, as a socket would deliver them.
pub fn as_stream(chunks: &[Vec<u8>]) -> Vec<u8> {
    chunks.iter().flatten().copied().collect()
}
