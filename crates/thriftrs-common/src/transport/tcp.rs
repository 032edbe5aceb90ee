use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};

use crate::protocol::error::{Result, ThriftError};

/// Connects to a remote endpoint (async).
///
/// This method resolves the address (which may resolve to multiple addresses)
/// and attempts to connect to each until one succeeds. Each attempt is bounded
/// by `timeout`.
///
/// # Arguments
///
/// * `addr` - The address to connect to (e.g., "127.0.0.1:9090")
/// * `timeout` - Upper bound for each connection attempt
///
/// # Returns
///
/// A connected TCP stream with `TCP_NODELAY` set
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let socket_addrs = lookup_host(addr)
        .await
        .map_err(|e| ThriftError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_err = Some(e.to_string()),
            Err(_) => last_err = Some(format!("timed out after {}ms", timeout.as_millis())),
        }
    }

    Err(ThriftError::Connection(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err.unwrap_or_else(|| "no addresses resolved".to_string())
    )))
}

/// Map IO errors to appropriate ThriftError variants
///
/// Converts standard IO errors into domain-specific errors:
/// - Timeouts/would block -> `Timeout`
/// - Connection errors -> `Connection`
/// - Other IO errors -> `Io`
///
/// `timeout` is the deadline the operation ran under, reported in the error.
pub fn map_io_error(err: io::Error, context: &str, timeout: Duration) -> ThriftError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            ThriftError::Timeout(timeout.as_millis() as u64)
        }
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => {
            ThriftError::Connection(format!("{}: Connection lost", context))
        }
        _ => ThriftError::Io(err),
    }
}

/// Runs an I/O future under an optional deadline.
///
/// An expired deadline surfaces as `ErrorKind::TimedOut` so it flows through
/// [`map_io_error`] like an OS-level timeout.
pub(crate) async fn with_deadline<F, T>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))?,
        None => fut.await,
    }
}
