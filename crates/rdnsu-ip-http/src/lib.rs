// # HTTP IP Resolver
//
// Resolves the caller's public IPv4 address by asking an echo service that
// answers with the client address as plain text.
//
// ## Behavior
//
// - Non-secure (`http://`) endpoint by default
// - The socket is bound to an IPv4 local address, so the answer is always the
//   IPv4 public address even on dual-stack hosts
// - One request per call: no retry, no cache
//
// ## Errors
//
// - Request timed out: `Error::ResolverTimeout` (the engine skips the cycle)
// - Anything else (connection refused, non-2xx status, unparsable body):
//   `Error::Resolver`

use async_trait::async_trait;
use rdnsu_core::traits::IpResolver;
use rdnsu_core::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default echo service
pub const DEFAULT_ENDPOINT: &str = "http://api.ipify.org";

/// Default lookup timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Public IPv4 resolver backed by an HTTP echo service
#[derive(Debug, Clone)]
pub struct HttpIpResolver {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpIpResolver {
    /// Create a resolver for the default echo service
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, DEFAULT_TIMEOUT)
    }

    /// Create a resolver for a specific echo service
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .user_agent(rdnsu_core::user_agent())
            .build()
            .map_err(|e| Error::resolver(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    /// Echo service URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn resolve_v4(&self) -> Result<Ipv4Addr> {
        tracing::debug!("Resolving public IPv4 address via {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::resolver(format!(
                "IP lookup failed with HTTP status {}",
                status
            )));
        }

        let body = response.text().await.map_err(request_error)?;
        let ip = parse_ipv4(&body)?;

        tracing::debug!("Public IPv4 address is {}", ip);
        Ok(ip)
    }
}

fn request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::resolver_timeout(e.to_string())
    } else {
        Error::resolver(format!("IP lookup request failed: {}", e))
    }
}

/// Parse an echo service answer
fn parse_ipv4(body: &str) -> Result<Ipv4Addr> {
    let text = body.trim();
    text.parse()
        .map_err(|_| Error::resolver(format!("Invalid IPv4 address: {:?}", text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a loopback port
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(
            parse_ipv4(" 203.0.113.9\n").unwrap(),
            Ipv4Addr::new(203, 0, 113, 9)
        );
    }

    #[test]
    fn test_parse_rejects_ipv6_and_garbage() {
        assert!(matches!(parse_ipv4("2001:db8::1"), Err(Error::Resolver(_))));
        assert!(matches!(parse_ipv4("<html>"), Err(Error::Resolver(_))));
        assert!(matches!(parse_ipv4(""), Err(Error::Resolver(_))));
    }

    #[test]
    fn test_default_endpoint_is_plain_http() {
        let resolver = HttpIpResolver::new().unwrap();
        assert!(resolver.endpoint().starts_with("http://"));
    }

    #[tokio::test]
    async fn test_resolves_address_from_echo_service() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 12\r\nConnection: close\r\n\r\n203.0.113.9\n",
        )
        .await;
        let resolver = HttpIpResolver::with_endpoint(url, Duration::from_secs(5)).unwrap();

        let ip = resolver.resolve_v4().await.unwrap();

        assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 9));
    }

    #[tokio::test]
    async fn test_error_status_is_fatal() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let resolver = HttpIpResolver::with_endpoint(url, Duration::from_secs(5)).unwrap();

        let err = resolver.resolve_v4().await.unwrap_err();

        assert!(matches!(err, Error::Resolver(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_silent_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let resolver =
            HttpIpResolver::with_endpoint(format!("http://{}", addr), Duration::from_millis(200))
                .unwrap();

        let err = resolver.resolve_v4().await.unwrap_err();

        assert!(matches!(err, Error::ResolverTimeout(_)), "{:?}", err);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_refused_connection_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let resolver =
            HttpIpResolver::with_endpoint(format!("http://{}", addr), Duration::from_secs(5))
                .unwrap();

        let err = resolver.resolve_v4().await.unwrap_err();

        assert!(matches!(err, Error::Resolver(_)), "{:?}", err);
    }
}
