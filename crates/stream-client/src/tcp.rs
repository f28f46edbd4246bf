//! TCP transport driven by the tokio runtime

use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Collector endpoint settings
#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub collector: SocketAddr,
    /// Fixed local port to bind before connecting
    pub local_port: Option<u16>,
    pub connect_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            collector: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5)), 8080),
            local_port: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

type Tagged = (u64, TransportEvent);

/// [`Transport`] over a real TCP socket.
///
/// Each connection runs as a spawned task that reports back over a
/// channel. Events are tagged with the attempt's generation so anything
/// from an aborted attempt is dropped in [`Transport::poll_event`].
pub struct TcpTransport {
    config: TcpConfig,
    runtime: Handle,
    generation: u64,
    events_tx: mpsc::UnboundedSender<Tagged>,
    events_rx: mpsc::UnboundedReceiver<Tagged>,
    payload: Option<oneshot::Sender<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Create a transport bound to the current tokio runtime
    pub fn new(config: TcpConfig) -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            runtime,
            generation: 0,
            events_tx,
            events_rx,
            payload: None,
            task: None,
        })
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.abort();
        let socket = bind_local(&self.config)?;

        let (payload_tx, payload_rx) = oneshot::channel();
        let task = self.runtime.spawn(run_connection(
            self.config.clone(),
            socket,
            self.generation,
            self.events_tx.clone(),
            payload_rx,
        ));

        self.payload = Some(payload_tx);
        self.task = Some(task);
        debug!("Connecting to {} (attempt {})", self.config.collector, self.generation);
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let payload = self.payload.take().ok_or(TransportError::NotConnected)?;
        payload
            .send(frame.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        // The connection task shuts the stream down itself after sending.
        self.payload = None;
        self.task = None;
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.payload = None;
        self.generation += 1;
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        while let Ok((generation, event)) = self.events_rx.try_recv() {
            if generation == self.generation {
                return Some(event);
            }
            debug!("Dropping stale {:?} from attempt {}", event, generation);
        }
        None
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Bind the fixed local port, if one is configured.
///
/// Runs before the connection task is spawned so a port that cannot be
/// bound is reported by `connect` itself.
fn bind_local(config: &TcpConfig) -> std::io::Result<Option<TcpSocket>> {
    let Some(port) = config.local_port else {
        return Ok(None);
    };

    let (socket, unspecified) = if config.collector.is_ipv4() {
        (TcpSocket::new_v4()?, IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    } else {
        (TcpSocket::new_v6()?, IpAddr::V6(Ipv6Addr::UNSPECIFIED))
    };
    socket.set_reuseaddr(true)?;
    socket.bind(SocketAddr::new(unspecified, port))?;
    Ok(Some(socket))
}

async fn open_stream(
    collector: SocketAddr,
    socket: Option<TcpSocket>,
) -> std::io::Result<TcpStream> {
    match socket {
        Some(socket) => socket.connect(collector).await,
        None => TcpStream::connect(collector).await,
    }
}

async fn run_connection(
    config: TcpConfig,
    socket: Option<TcpSocket>,
    generation: u64,
    events: mpsc::UnboundedSender<Tagged>,
    mut payload: oneshot::Receiver<Vec<u8>>,
) {
    let connecting = open_stream(config.collector, socket);
    let mut stream = match tokio::time::timeout(config.connect_timeout, connecting).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!("Connect to {} failed: {}", config.collector, e);
            let _ = events.send((generation, TransportEvent::ConnectFailed));
            return;
        }
        Err(_) => {
            warn!("Connect to {} timed out", config.collector);
            let _ = events.send((generation, TransportEvent::ConnectFailed));
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    let _ = events.send((generation, TransportEvent::Connected));

    // Nothing is expected from the collector; reading only detects teardown.
    let mut scratch = [0u8; 64];
    let frame = loop {
        tokio::select! {
            frame = &mut payload => match frame {
                Ok(frame) => break frame,
                Err(_) => return,
            },
            read = stream.read(&mut scratch) => match read {
                Ok(0) | Err(_) => {
                    let _ = events.send((generation, TransportEvent::Reset));
                    return;
                }
                Ok(_) => continue,
            },
        }
    };

    let written = async {
        stream.write_all(&frame).await?;
        stream.flush().await?;
        stream.shutdown().await
    }
    .await;

    let event = match written {
        Ok(()) => TransportEvent::Sent,
        Err(e) => {
            warn!("Send to {} failed: {}", config.collector, e);
            TransportEvent::Reset
        }
    };
    let _ = events.send((generation, event));
}
