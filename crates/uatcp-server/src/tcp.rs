//! Tokio TCP front end.
//!
//! Accepts connections and pumps socket bytes through each connection's
//! pipeline. Writes go through a per-connection task so handlers and timers
//! can queue chunks without holding the socket.

use crate::connection::Connection;
use crate::server::ChannelServer;
use crate::transport::{Transport, TransportId};
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::debug;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

enum WriteOp {
    Data(Vec<u8>),
    Shutdown,
}

/// A live TCP connection as seen by the channel layer.
pub struct TcpTransport {
    id: TransportId,
    tx: mpsc::UnboundedSender<WriteOp>,
    closed: Arc<Notify>,
}

impl Transport for TcpTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn write(&self, data: Vec<u8>) -> Result<()> {
        self.tx.send(WriteOp::Data(data)).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection closed").into()
        })
    }

    fn close(&self) {
        let _ = self.tx.send(WriteOp::Shutdown);
        self.closed.notify_one();
    }
}

/// Accept connections forever, one pipeline task per connection.
pub async fn serve(listener: TcpListener, server: Arc<ChannelServer>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let transport_id = NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(%peer, transport_id, "accepted connection");
        tokio::spawn(handle_connection(stream, transport_id, server.clone()));
    }
}

async fn handle_connection(stream: TcpStream, transport_id: TransportId, server: Arc<ChannelServer>) {
    let _ = stream.set_nodelay(true);
    let (mut read_half, mut write_half) = stream.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let closed = Arc::new(Notify::new());
    let transport = Arc::new(TcpTransport {
        id: transport_id,
        tx,
        closed: closed.clone(),
    });

    let writer = tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            match op {
                WriteOp::Data(data) => {
                    if write_half.write_all(&data).await.is_err() {
                        break;
                    }
                }
                WriteOp::Shutdown => break,
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut connection = Connection::new(server.clone(), transport.clone());
    let mut buf = vec![0u8; server.config().receive_buffer_size];
    loop {
        tokio::select! {
            read = read_half.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if connection.on_data(&buf[..n]).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(transport_id, "read error: {e}");
                    break;
                }
            },
            _ = closed.notified() => break,
        }
    }

    connection.on_transport_closed();
    transport.close();
    let _ = writer.await;
    debug!(transport_id, "connection closed");
}
