//! The composed server: registry, certificate store, codecs, config, and the
//! symmetric-handler factory, bundled for the per-connection handlers.

use crate::certstore::CertificateStore;
use crate::config::ChannelConfig;
use crate::connection::SymmetricHandlerFactory;
use crate::registry::ChannelRegistry;
use std::sync::Arc;
use uatcp_core::CodecRegistry;

/// Shared dependencies of every connection.
///
/// Built once by the composing program; connections hold an `Arc` and look
/// everything up through it, so nothing here is global state.
pub struct ChannelServer {
    config: ChannelConfig,
    registry: Arc<ChannelRegistry>,
    certificates: CertificateStore,
    codecs: CodecRegistry,
    symmetric_factory: Box<dyn SymmetricHandlerFactory>,
}

impl ChannelServer {
    /// Assemble a server.
    pub fn new(
        config: ChannelConfig,
        certificates: CertificateStore,
        codecs: CodecRegistry,
        symmetric_factory: Box<dyn SymmetricHandlerFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Arc::new(ChannelRegistry::new()),
            certificates,
            codecs,
            symmetric_factory,
        })
    }

    /// Negotiated limits and lifetimes.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The live-channel table.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Server certificates, keyed by thumbprint.
    pub fn certificates(&self) -> &CertificateStore {
        &self.certificates
    }

    /// Message codecs.
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Factory for the handler that takes over symmetric traffic.
    pub fn symmetric_factory(&self) -> &dyn SymmetricHandlerFactory {
        self.symmetric_factory.as_ref()
    }
}
