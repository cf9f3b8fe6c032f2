//! TCP transport for the covenant router and luminous nodes.
//!
//! Every accepted connection gets a reader (this task) and a writer task
//! joined by a bounded channel; the router only ever sees the channel side
//! through [`ChannelConnection`]. A client may open with a `Hello` naming its
//! peer id; otherwise the server assigns one.
//!
//! Frames that fail to decode are logged and dropped. The connection stays up.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TransportConfig;
use crate::core::codec::{Frame, FrameCodec};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;
use crate::router::{ChannelConnection, Router};

/// Outbound messages buffered per connection before sends start failing
const SEND_QUEUE_CAPACITY: usize = 1024;
/// How long shutdown waits for open connections to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Bind `addr` and serve until CTRL+C.
#[instrument(skip(router, transport))]
pub async fn start_server(addr: &str, router: Arc<Router>, transport: TransportConfig) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(listener, router, transport, shutdown_rx).await
}

/// Accept connections on `listener` until `shutdown_rx` fires, then wait
/// (bounded) for open connections to close.
#[instrument(skip_all, fields(address = ?listener.local_addr().ok()))]
pub async fn start_server_with_shutdown(
    listener: TcpListener,
    router: Arc<Router>,
    transport: TransportConfig,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    info!("Listening for luminous nodes");
    let active_connections = Arc::new(AtomicUsize::new(0));
    let stop = CancellationToken::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server. Waiting for connections to close...");
                stop.cancel();
                router.close_all();

                let timeout = tokio::time::sleep(SHUTDOWN_GRACE);
                tokio::pin!(timeout);
                loop {
                    tokio::select! {
                        _ = &mut timeout => {
                            warn!("Shutdown timeout reached, forcing exit");
                            break;
                        }
                        _ = tokio::time::sleep(Duration::from_millis(100)) => {
                            let connections = active_connections.load(Ordering::SeqCst);
                            if connections == 0 {
                                info!("All connections closed, shutting down");
                                break;
                            }
                            debug!(connections, "Waiting for connections to close");
                        }
                    }
                }
                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        if router.registry().len() >= router.config().max_peers {
                            warn!(peer = %addr, "Peer limit reached, refusing connection");
                            continue;
                        }
                        let router = router.clone();
                        let transport = transport.clone();
                        let active = active_connections.clone();
                        let stop = stop.child_token();
                        active.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, router, transport, stop).await {
                                debug!(peer = %addr, error = %e, "Connection ended with error");
                            }
                            active.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}

/// Serve one peer until either side closes.
#[instrument(skip(stream, router, transport, cancel), fields(peer = %addr))]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    router: Arc<Router>,
    transport: TransportConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let framed = Framed::new(stream, FrameCodec::new(transport.max_frame_size));
    let (mut sink, mut frames) = framed.split();

    // Optional Hello; any other first message is handled after registration
    let hello_timeout = router.config().hello_timeout;
    let mut pending = None;
    let peer_id = match tokio::time::timeout(hello_timeout, frames.next()).await {
        Ok(Some(Ok(frame))) => match Message::from_frame(&frame) {
            Ok(Message::Hello { node_id }) if !node_id.is_empty() => node_id,
            Ok(other) => {
                pending = Some(other);
                uuid::Uuid::new_v4().to_string()
            }
            Err(e) => {
                warn!(error = %e, "Discarding malformed first frame");
                router.metrics().decode_error();
                uuid::Uuid::new_v4().to_string()
            }
        },
        Ok(Some(Err(e))) => return Err(e),
        Ok(None) => return Ok(()),
        Err(_) => uuid::Uuid::new_v4().to_string(),
    };

    let (connection, mut outbound) = ChannelConnection::new(SEND_QUEUE_CAPACITY, cancel.clone());
    // The registry re-checks the peer limit; the accept-time check can race
    let Some(sequence) = router.accept_peer(&peer_id, Arc::new(connection)).await else {
        return Ok(());
    };

    let writer_cancel = cancel.clone();
    let writer_transport = transport.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                next = outbound.recv() => {
                    let Some(message) = next else { break };
                    let frame = match message.to_frame(&writer_transport) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, opcode = message.opcode(), "Failed to encode outbound message");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(frame).await {
                        debug!(error = %e, "Write failed, closing writer");
                        break;
                    }
                }
            }
        }
        writer_cancel.cancel();
        let _ = sink.close().await;
    });

    if let Some(message) = pending {
        router.handle_message(&peer_id, message).await;
    }

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            next = frames.next() => match next {
                Some(Ok(frame)) => match Message::from_frame(&frame) {
                    Ok(message) => router.handle_message(&peer_id, message).await,
                    Err(e) => {
                        warn!(peer = %peer_id, error = %e, "Discarding malformed message");
                        router.metrics().decode_error();
                    }
                },
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            },
        }
    };

    cancel.cancel();
    router.disconnect(&peer_id, sequence);
    let _ = writer.await;
    result
}

/// Client side of a node's connection to a router.
pub struct NodeClient {
    framed: Framed<TcpStream, FrameCodec>,
    transport: TransportConfig,
}

impl NodeClient {
    /// Connect and, when `node_id` is given, announce it with a `Hello`.
    #[instrument(skip(transport))]
    pub async fn connect(addr: &str, node_id: Option<&str>, transport: TransportConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let mut client = Self {
            framed: Framed::new(stream, FrameCodec::new(transport.max_frame_size)),
            transport,
        };
        if let Some(node_id) = node_id {
            client
                .send(&Message::Hello {
                    node_id: node_id.to_string(),
                })
                .await?;
        }
        Ok(client)
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = message.to_frame(&self.transport)?;
        self.framed.send(frame).await
    }

    /// Send an already built frame as is.
    pub async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        self.framed.send(frame).await
    }

    /// Next decodable message. Malformed frames are skipped; `None` once the
    /// router closes the connection.
    pub async fn recv(&mut self) -> Option<Result<Message>> {
        loop {
            match self.framed.next().await? {
                Ok(frame) => match Message::from_frame(&frame) {
                    Ok(message) => return Some(Ok(message)),
                    Err(e) => warn!(error = %e, "Discarding malformed message from router"),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Like [`NodeClient::recv`] but gives up after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Message>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(Ok(message))) => Ok(Some(message)),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Ok(None),
            Err(_) => Err(ProtocolError::Timeout),
        }
    }
}
