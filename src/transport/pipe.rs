//! Named-pipe transport.
//!
//! Uses the `interprocess` local-socket API: a named pipe on Windows, a
//! namespaced Unix domain socket on Linux/macOS. Both sides share the
//! channel name.
//!
//! A listening endpoint accepts exactly one peer and then releases the name,
//! so only one link per channel exists at a time. Each link runs a single
//! task that multiplexes inbound frames, outbound frames and cancellation,
//! and reports [`EndpointEvent::Disconnected`] exactly once when the peer
//! goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use interprocess::local_socket::tokio::{prelude::*, Listener as PipeListener, Stream as PipeStream};
use interprocess::local_socket::{GenericNamespaced, ListenerOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::{Encoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::transport::frame::{frame_payload, FrameCodec, DEFAULT_MAX_FRAME_BYTES};
use crate::transport::{ConnectFuture, Endpoint, EndpointEvent, EventSender, Transport};
use crate::{AppError, Result};

/// Transport over OS named pipes.
#[derive(Debug, Clone)]
pub struct PipeTransport {
    max_frame_bytes: usize,
}

impl PipeTransport {
    /// Create a pipe transport with the default frame limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a pipe transport with a custom frame limit.
    #[must_use]
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

impl Default for PipeTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Endpoint handle shared by the coordinator and the link task.
struct PipeEndpoint {
    channel: String,
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    max_frame_bytes: usize,
}

/// Everything the link task owns.
struct Link {
    events: EventSender,
    outbound: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    max_frame_bytes: usize,
}

fn endpoint_pair(
    channel: &str,
    events: EventSender,
    max_frame_bytes: usize,
) -> (Arc<PipeEndpoint>, Link) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let connected = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();
    let endpoint = Arc::new(PipeEndpoint {
        channel: channel.to_owned(),
        outbound: outbound_tx,
        connected: Arc::clone(&connected),
        cancel: cancel.clone(),
        max_frame_bytes,
    });
    let link = Link {
        events,
        outbound: outbound_rx,
        connected,
        cancel,
        max_frame_bytes,
    };
    (endpoint, link)
}

impl Endpoint for PipeEndpoint {
    fn send(&self, payload: &[u8]) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AppError::NotConnected(format!(
                "no peer on channel '{}'",
                self.channel
            )));
        }
        let line = frame_payload(payload, self.max_frame_bytes)?;
        self.outbound
            .send(line)
            .map_err(|_| AppError::Transport(format!("link on '{}' is closed", self.channel)))
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for PipeEndpoint {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Transport for PipeTransport {
    fn listen(&self, channel: &str, events: EventSender) -> Result<Arc<dyn Endpoint>> {
        let name = channel
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| AppError::Transport(format!("invalid channel name '{channel}': {err}")))?;

        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .map_err(|err| {
                AppError::Transport(format!("failed to bind channel '{channel}': {err}"))
            })?;

        info!(channel, "pipe listening");

        let (endpoint, link) = endpoint_pair(channel, events, self.max_frame_bytes);
        let span = info_span!("pipe_listener", channel = %channel);
        tokio::spawn(accept_one(listener, link).instrument(span));

        Ok(endpoint as Arc<dyn Endpoint>)
    }

    fn connect<'a>(
        &'a self,
        channel: &'a str,
        timeout: Duration,
        events: EventSender,
    ) -> ConnectFuture<'a> {
        Box::pin(async move {
            let name = channel.to_ns_name::<GenericNamespaced>().map_err(|err| {
                AppError::Transport(format!("invalid channel name '{channel}': {err}"))
            })?;

            let stream = match tokio::time::timeout(timeout, PipeStream::connect(name)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => {
                    return Err(AppError::Transport(format!(
                        "connect to '{channel}' failed: {err}"
                    )));
                }
                Err(_) => {
                    return Err(AppError::Transport(format!(
                        "connect to '{channel}' timed out after {}ms",
                        timeout.as_millis()
                    )));
                }
            };

            info!(channel, "pipe connected");

            let (endpoint, link) = endpoint_pair(channel, events, self.max_frame_bytes);
            link.connected.store(true, Ordering::SeqCst);
            let _ = link.events.send(EndpointEvent::Connected);

            let span = info_span!("pipe_link", channel = %channel, side = "connector");
            tokio::spawn(run_link(stream, link).instrument(span));

            Ok(endpoint as Arc<dyn Endpoint>)
        })
    }
}

/// Wait for one peer, then hand the stream to the link loop.
async fn accept_one(listener: PipeListener, link: Link) {
    let stream = tokio::select! {
        () = link.cancel.cancelled() => {
            debug!("listener closed before a peer attached");
            return;
        }
        accepted = listener.accept() => match accepted {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "pipe accept failed");
                let _ = link.events.send(EndpointEvent::Disconnected);
                return;
            }
        }
    };

    // One peer per channel: release the name until this link ends.
    drop(listener);

    info!("peer attached");
    link.connected.store(true, Ordering::SeqCst);
    let _ = link.events.send(EndpointEvent::Connected);
    run_link(stream, link).await;
}

/// Pump frames in both directions until the peer leaves or the endpoint is
/// closed locally.
async fn run_link(stream: PipeStream, link: Link) {
    let Link {
        events,
        mut outbound,
        connected,
        cancel,
        max_frame_bytes,
    } = link;

    let (reader, mut writer) = stream.split();
    let mut frames = FramedRead::new(reader, FrameCodec::with_max_frame_bytes(max_frame_bytes));
    let mut encoder = FrameCodec::with_max_frame_bytes(max_frame_bytes);
    let mut buf = BytesMut::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("link closed locally");
                break;
            }

            frame = frames.next() => match frame {
                Some(Ok(line)) => {
                    debug!(bytes = line.len(), "frame received");
                    if events.send(EndpointEvent::Data(line.into_bytes())).is_err() {
                        debug!("event receiver dropped, closing link");
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!(%err, "pipe read failed");
                    break;
                }
                None => {
                    debug!("peer closed the pipe");
                    break;
                }
            },

            line = outbound.recv() => match line {
                Some(line) => {
                    buf.clear();
                    if let Err(err) = encoder.encode(line, &mut buf) {
                        warn!(%err, "dropping unframeable payload");
                        continue;
                    }
                    if let Err(err) = writer.write_all(&buf).await {
                        warn!(%err, "pipe write failed");
                        break;
                    }
                }
                None => {
                    debug!("endpoint dropped, closing link");
                    break;
                }
            },
        }
    }

    connected.store(false, Ordering::SeqCst);
    if !cancel.is_cancelled() {
        info!("peer detached");
        let _ = events.send(EndpointEvent::Disconnected);
    }
    cancel.cancel();
}
