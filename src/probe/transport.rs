use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;

use super::options::RequestOptions;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    TimedOut,

    #[error("request failed: {0}")]
    Failed(String),
}

#[derive(Clone, Copy, Debug)]
pub struct HttpProbeResponse {
    pub status: u16,
    /// Resolved from the `Content-Length` header when present, otherwise by
    /// reading the body to completion on success responses, otherwise 0.
    pub size: u64,
}

/// Seam between the probe executor and the network. The executor owns all
/// retry, filtering, and rate policy; implementations only move bytes.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Issues one HTTP request with the configured deadline.
    async fn http(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpProbeResponse, TransportError>;

    /// One TCP connect attempt with the configured deadline.
    async fn tcp_connect(&self, host: &str, port: u16) -> Result<(), TransportError>;
}

/// The real transport: a reqwest client for HTTP probes and tokio sockets for
/// TCP probes, both bounded by the per-request timeout.
pub struct NetTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl NetTransport {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:95.0) Gecko/20100101 Firefox/95.0",
            ),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .danger_accept_invalid_hostnames(true)
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            timeout,
        })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::TimedOut
    } else {
        TransportError::Failed(e.to_string())
    }
}

#[async_trait]
impl ProbeTransport for NetTransport {
    async fn http(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpProbeResponse, TransportError> {
        let method = options.method.as_deref().unwrap_or("GET");
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::Failed(format!("invalid method '{method}'")))?;

        let mut request = self.client.request(method, url).timeout(self.timeout);
        for (name, value) in options.headers.iter() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = options.body.as_ref() {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let header_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let size = match header_len {
            Some(len) => len,
            None if response.status().is_success() => {
                response.bytes().await.map_err(classify)?.len() as u64
            }
            None => 0,
        };

        Ok(HttpProbeResponse { status, size })
    }

    async fn tcp_connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
        match time::timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Failed(e.to_string())),
            Err(_) => Err(TransportError::TimedOut),
        }
    }
}
