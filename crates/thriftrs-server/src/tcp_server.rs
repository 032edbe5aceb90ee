use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thriftrs_common::protocol::error::{Result, ThriftError};
use thriftrs_common::transport::{FramedJsonProtocol, DEFAULT_MAX_FRAME_SIZE};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::processor::{Handler, Processor};

/// Connection-level server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Idle limit while waiting for or reading a message. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// Largest accepted frame in bytes.
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(30)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Framed-JSON TCP server.
///
/// Every accepted connection gets its own task, which processes calls
/// strictly one after another until the peer disconnects or a transport
/// error occurs.
pub struct TcpServer {
    listener: TcpListener,
    config: ServerConfig,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:9090")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| ThriftError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self {
            listener,
            config: ServerConfig::default(),
        })
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| ThriftError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Serves `processor` until accepting fails.
    pub async fn run<H: Handler>(self, processor: Arc<Processor<H>>) -> Result<()> {
        self.run_until(processor, std::future::pending()).await
    }

    /// Serves `processor` until `shutdown` completes.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until<H: Handler>(
        self,
        processor: Arc<Processor<H>>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        info!(
            addr = %self.local_addr()?,
            service = processor.service().name(),
            "server listening"
        );
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = self.listener.accept() => accepted
                    .map_err(|e| ThriftError::Connection(format!("Failed to accept connection: {}", e)))?,
                _ = &mut shutdown => {
                    info!("server shutting down");
                    return Ok(());
                }
            };

            debug!(peer = %peer_addr, "connection established");
            if let Err(e) = stream.set_nodelay(true) {
                warn!(peer = %peer_addr, error = %e, "failed to set TCP_NODELAY");
            }

            let processor = processor.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, processor, config).await {
                    error!(peer = %peer_addr, error = %e, "connection error");
                }
            });
        }
    }
}

/// Handles a single connection until the peer closes it.
async fn handle_connection<H: Handler>(
    stream: TcpStream,
    processor: Arc<Processor<H>>,
    config: ServerConfig,
) -> Result<()> {
    let mut proto = FramedJsonProtocol::new(stream)
        .with_max_frame_size(config.max_frame_size)
        .with_read_timeout(config.read_timeout)
        .with_write_timeout(config.write_timeout);

    loop {
        match processor.process(&mut proto).await {
            Ok(()) => {}
            Err(ThriftError::ConnectionClosed) => {
                debug!("connection closed by peer");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}
