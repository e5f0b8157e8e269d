use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::traits::{Transport, TransportError};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Target of the reachability probe. Without one the network is assumed up.
    pub probe_url: Option<String>,
    pub probe_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            probe_url: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// reqwest-backed transport posting JSON arrays.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    cfg: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(cfg: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(cfg.connect_timeout)
            .read_timeout(cfg.read_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client, cfg })
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (k, v) in headers {
        let name = HeaderName::from_bytes(k.as_bytes()).map_err(|_| TransportError::InvalidHeader { name: k.clone() })?;
        let value = HeaderValue::from_str(v).map_err(|_| TransportError::InvalidHeader { name: k.clone() })?;
        map.insert(name, value);
    }
    Ok(map)
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_batch(
        &self,
        url: &str,
        payloads: &[Value],
        headers: &BTreeMap<String, String>,
    ) -> Result<u16, TransportError> {
        let headers = header_map(headers)?;
        let body = serde_json::to_vec(payloads).map_err(|e| TransportError::Request(e.to_string()))?;
        debug!("posting {} location(s) to {url}", payloads.len());

        let resp = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status().as_u16();
        debug!("post to {url} returned {status}");
        Ok(status)
    }

    async fn probe_connectivity(&self) -> bool {
        let Some(url) = &self.cfg.probe_url else {
            return true;
        };
        match self.client.head(url).timeout(self.cfg.probe_timeout).send().await {
            Ok(_) => true,
            Err(e) => {
                warn!("connectivity probe to {url} failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// One-shot HTTP server answering every request with `status`.
    fn serve_once(status: u16) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut sock, _)) = listener.accept() {
                let mut buf = [0u8; 8192];
                let _ = sock.read(&mut buf);
                let resp = format!("HTTP/1.1 {status} Custom\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = sock.write_all(resp.as_bytes());
            }
        });
        format!("http://{addr}/locations")
    }

    fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/locations")
    }

    #[tokio::test]
    async fn returns_any_status_code() {
        let t = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let url = serve_once(285);
        let code = t.post_batch(&url, &[serde_json::json!({"lat": 1.0})], &BTreeMap::new()).await.unwrap();
        assert_eq!(code, 285);
    }

    #[tokio::test]
    async fn closed_port_is_transport_failure() {
        let t = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let res = t.post_batch(&closed_port_url(), &[], &BTreeMap::new()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn invalid_header_rejected_before_send() {
        let t = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "v".to_string());
        let res = t.post_batch("http://127.0.0.1:1/", &[], &headers).await;
        assert!(matches!(res, Err(TransportError::InvalidHeader { .. })));
    }

    #[tokio::test]
    async fn silent_server_hits_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((sock, _)) = listener.accept() {
                std::thread::sleep(Duration::from_secs(3));
                drop(sock);
            }
        });

        let t = HttpTransport::new(HttpTransportConfig {
            read_timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        let started = std::time::Instant::now();
        let res = t.post_batch(&format!("http://{addr}/locations"), &[], &BTreeMap::new()).await;
        assert!(res.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn probe_without_url_assumes_reachable() {
        let t = HttpTransport::new(HttpTransportConfig::default()).unwrap();
        assert!(t.probe_connectivity().await);

        let t = HttpTransport::new(HttpTransportConfig {
            probe_url: Some(closed_port_url()),
            ..Default::default()
        })
        .unwrap();
        assert!(!t.probe_connectivity().await);
    }
}
