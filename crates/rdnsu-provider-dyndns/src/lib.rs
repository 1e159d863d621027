// # dyndns2 Update Transport
//
// Delivers one update request to a dyndns2-compatible provider:
//
// ```http
// GET {path}?hostname={record}&myip={ip} HTTP/1.1
// Host: {remote_hostname}
// Authorization: Basic base64(user:password)
// User-Agent: Remote DNS Updater/{version}
// ```
//
// The response body is a plain-text code (`good`, `nochg`, `badauth`, ...)
// which this crate returns untouched; interpreting it is the engine's job.
//
// ## Constraints
//
// - Exactly one GET per call, no retry
// - The body is returned whatever the HTTP status, since providers answer
//   `badauth` and friends with non-2xx statuses
// - The password NEVER appears in logs or `Debug` output

use async_trait::async_trait;
use rdnsu_core::traits::{UpdateRequest, UpdateTransport};
use rdnsu_core::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP(S) transport for dyndns2 update requests
#[derive(Debug, Clone)]
pub struct HttpUpdateTransport {
    client: reqwest::Client,
}

impl HttpUpdateTransport {
    /// Create a transport with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a transport with a specific timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        // Providers key the update on the IPv4 the request arrives from
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .build()
            .map_err(|e| Error::transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl UpdateTransport for HttpUpdateTransport {
    async fn send(&self, request: &UpdateRequest) -> Result<String> {
        tracing::debug!("Sending update request: {:?}", request);

        let response = self
            .client
            .get(&request.url)
            .basic_auth(&request.user, Some(&request.password))
            .header(reqwest::header::USER_AGENT, &request.user_agent)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        tracing::debug!("Provider answered with HTTP status {}", status);
        Ok(body)
    }
}

fn request_error(e: reqwest::Error) -> Error {
    let e = e.without_url();
    if e.is_timeout() {
        Error::transport_timeout(e.to_string())
    } else {
        Error::transport(format!("Update request failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Accept one connection, capture the raw request head and answer it
    async fn provider_once(response: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        (format!("http://{}", addr), rx)
    }

    fn request(base: &str) -> UpdateRequest {
        UpdateRequest {
            url: format!("{}/nic/update?hostname=home.example.com&myip=203.0.113.7", base),
            user: "alice".to_string(),
            password: "s3cret".to_string(),
            user_agent: "Remote DNS Updater/0.1.0".to_string(),
        }
    }

    fn header<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
        raw.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }

    #[tokio::test]
    async fn test_sends_get_with_auth_and_user_agent() {
        let (base, captured) = provider_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\ngood",
        )
        .await;
        let transport = HttpUpdateTransport::new().unwrap();

        let body = transport.send(&request(&base)).await.unwrap();
        let raw = captured.await.unwrap();

        assert_eq!(body, "good");
        assert!(
            raw.starts_with(
                "GET /nic/update?hostname=home.example.com&myip=203.0.113.7 HTTP/1.1\r\n"
            ),
            "{}",
            raw
        );
        assert_eq!(header(&raw, "authorization"), Some("Basic YWxpY2U6czNjcmV0"));
        assert_eq!(header(&raw, "user-agent"), Some("Remote DNS Updater/0.1.0"));
    }

    #[tokio::test]
    async fn test_body_returned_for_error_status() {
        let (base, _captured) = provider_once(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 8\r\nConnection: close\r\n\r\nbadauth\n",
        )
        .await;
        let transport = HttpUpdateTransport::new().unwrap();

        let body = transport.send(&request(&base)).await.unwrap();

        assert_eq!(body, "badauth\n");
    }

    #[tokio::test]
    async fn test_silent_provider_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let transport = HttpUpdateTransport::with_timeout(Duration::from_millis(200)).unwrap();
        let err = transport
            .send(&request(&format!("http://{}", addr)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TransportTimeout(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpUpdateTransport::new().unwrap();
        let err = transport
            .send(&request(&format!("http://{}", addr)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)), "{:?}", err);
        assert!(!err.to_string().contains("s3cret"));
    }

    #[test]
    fn test_request_debug_hides_password() {
        let debug = format!("{:?}", request("http://members.example.net"));
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<REDACTED>"));
    }
}
