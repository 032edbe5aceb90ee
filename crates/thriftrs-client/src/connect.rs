use std::sync::Arc;
use std::time::Duration;

use thriftrs_common::protocol::error::Result;
use thriftrs_common::protocol::ServiceDescriptor;
use thriftrs_common::transport::{self, FramedJsonProtocol, HttpJsonProtocol};
use thriftrs_trace::{LogSink, Tracker};
use tokio::net::TcpStream;
use tracing::debug;

use crate::client::Client;
use crate::tracked::TrackedClient;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bounds connecting and every call made on the connection.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Connects a Framed-JSON client to `addr` ("host:port").
pub async fn connect_framed(
    addr: &str,
    service: Arc<ServiceDescriptor>,
    config: &ClientConfig,
) -> Result<Client<FramedJsonProtocol<TcpStream>>> {
    let stream = transport::connect(addr, config.timeout).await?;
    debug!(addr, service = service.name(), "framed client connected");
    Ok(Client::new(FramedJsonProtocol::new(stream), service).with_timeout(config.timeout))
}

/// Connects a tracked HTTP-JSON client to `host:port`.
///
/// Calls are labeled with the `iface` `"{package}.{service}"`. Without a
/// tracker, calls are traced as `http_client -> unknown` into a [`LogSink`].
pub async fn connect_http(
    host: &str,
    port: u16,
    service: Arc<ServiceDescriptor>,
    package: &str,
    tracker: Option<Arc<Tracker>>,
    config: &ClientConfig,
) -> Result<TrackedClient<HttpJsonProtocol<TcpStream>>> {
    let addr = format!("{}:{}", host, port);
    let stream = transport::connect(&addr, config.timeout).await?;
    debug!(addr = %addr, service = service.name(), "http client connected");

    let iface = format!("{}.{}", package, service.name());
    let protocol = HttpJsonProtocol::new(stream)
        .with_host(addr)
        .with_timeout(Some(config.timeout));
    let tracker = tracker
        .unwrap_or_else(|| Arc::new(Tracker::new("http_client", "unknown", Arc::new(LogSink))));

    Ok(TrackedClient::new(Client::new(protocol, service), tracker).with_iface(iface))
}

#[cfg(test)]
mod tests {
    use super::*;
    use thriftrs_common::ThriftError;

    #[test]
    fn test_default_config() {
        assert_eq!(ClientConfig::default().timeout, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_connect_framed_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let service = Arc::new(ServiceDescriptor::new("Nothing"));
        let config = ClientConfig {
            timeout: Duration::from_millis(500),
        };
        let err = connect_framed(&addr, service, &config).await.err().unwrap();
        assert!(matches!(err, ThriftError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_http_defaults() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let service = Arc::new(ServiceDescriptor::new("AddressBook"));

        let client = connect_http("127.0.0.1", port, service, "demo", None, &ClientConfig::default())
            .await
            .unwrap();
        assert_eq!(client.tracker().client(), "http_client");
        assert_eq!(client.tracker().server(), "unknown");
        assert_eq!(client.service().name(), "AddressBook");
    }
}
