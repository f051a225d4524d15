//! Per-connection serialization queue for cryptographic work.
//!
//! RSA decrypt/sign and key derivation are too heavy for the connection's
//! read loop, so envelope work is submitted as typed jobs to a dedicated
//! worker task. One worker per queue consumes jobs in submission order, so
//! ordering within a channel is preserved while separate channels progress in
//! parallel. Results return through a oneshot; if the connection died in the
//! meantime the receiver is gone and the result is discarded.

use crate::channel::SecureChannel;
use crate::config::ChannelConfig;
use crate::envelope::{self, DecodedMessage};
use crate::{Error, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

enum Job {
    Decode {
        channel: Arc<Mutex<SecureChannel>>,
        chunks: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<DecodedMessage>>,
    },
    Encode {
        channel: Arc<Mutex<SecureChannel>>,
        message: Vec<u8>,
        request_id: u32,
        reply: oneshot::Sender<Result<Vec<Vec<u8>>>>,
    },
}

/// Ordered crypto work queue backed by one worker task.
pub struct SerializationQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerializationQueue {
    /// Spawn the worker and return its handle.
    pub fn new(config: ChannelConfig) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Decode {
                        channel,
                        chunks,
                        reply,
                    } => {
                        let result = {
                            let channel = channel.lock().expect("channel lock");
                            envelope::decode_chunks(&channel, &chunks)
                        };
                        let _ = reply.send(result);
                    }
                    Job::Encode {
                        channel,
                        message,
                        request_id,
                        reply,
                    } => {
                        let result = {
                            let mut channel = channel.lock().expect("channel lock");
                            envelope::encode_chunks(&mut channel, &message, request_id, &config)
                        };
                        let _ = reply.send(result);
                    }
                }
            }
        });

        Self { tx }
    }

    /// Decrypt and reassemble an `OPN` chunk sequence.
    pub async fn decode(
        &self,
        channel: Arc<Mutex<SecureChannel>>,
        chunks: Vec<Vec<u8>>,
    ) -> Result<DecodedMessage> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Job::Decode {
                channel,
                chunks,
                reply,
            })
            .map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())?
    }

    /// Encrypt and frame a response message into `OPN` chunks.
    pub async fn encode(
        &self,
        channel: Arc<Mutex<SecureChannel>>,
        message: Vec<u8>,
        request_id: u32,
    ) -> Result<Vec<Vec<u8>>> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Job::Encode {
                channel,
                message,
                request_id,
                reply,
            })
            .map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())?
    }
}

fn worker_gone() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "serialization worker terminated",
    ))
}
