use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method};

use crate::error::TransportError;

/// Request header sent with every exchange.
pub const KEEP_ALIVE: (&str, &str) = ("Connection", "keep-alive");

/// Target of one stage. Built fresh per stage and dropped afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub path: String,
    pub method: Method,
}

impl RequestContext {
    pub fn get(host: &str, port: u16, tls: bool, path: impl Into<String>) -> Self {
        Self {
            host: host.to_string(),
            port,
            tls,
            path: path.into(),
            method: Method::GET,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Status line and header lines as text, `\r\n` separated.
    pub headers: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Factory for per-stage HTTP sessions.
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    async fn configure(
        &self,
        host: &str,
        port: u16,
        tls: bool,
    ) -> Result<Box<dyn HttpSession>, TransportError>;
}

/// A configured client bound to one server.
#[async_trait]
pub trait HttpSession: Send {
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError>;

    async fn send_request(
        &mut self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError>;

    /// Tears the session down. Safe to call on a session that never connected.
    async fn disconnect(&mut self);
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    max_body: usize,
}

impl ReqwestTransport {
    pub fn new(max_body: usize) -> Self {
        Self { max_body }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn configure(
        &self,
        host: &str,
        port: u16,
        tls: bool,
    ) -> Result<Box<dyn HttpSession>, TransportError> {
        if host.is_empty() || host.contains(['/', ' ']) {
            return Err(TransportError::Configure {
                host: host.to_string(),
                port,
                message: "invalid host name".to_string(),
            });
        }

        let scheme = if tls { "https" } else { "http" };

        Ok(Box::new(ReqwestSession {
            base_url: format!("{scheme}://{host}:{port}"),
            max_body: self.max_body,
            client: None,
        }))
    }
}

struct ReqwestSession {
    base_url: String,
    max_body: usize,
    client: Option<Client>,
}

#[async_trait]
impl HttpSession for ReqwestSession {
    // reqwest opens the socket lazily on the first request; this only
    // prepares a client carrying the connect/receive timeouts.
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        self.client = Some(client);
        Ok(())
    }

    async fn send_request(
        &mut self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = client.request(method, &url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let mut res = request
            .send()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        if res
            .content_length()
            .is_some_and(|len| len > self.max_body as u64)
        {
            return Err(TransportError::TooLarge {
                limit: self.max_body,
            });
        }

        let status = res.status();
        let mut head = format!("{:?} {}\r\n", res.version(), status);
        for (name, value) in res.headers() {
            head.push_str(name.as_str());
            head.push_str(": ");
            head.push_str(&String::from_utf8_lossy(value.as_bytes()));
            head.push_str("\r\n");
        }

        let mut body = Vec::new();
        while let Some(chunk) = res
            .chunk()
            .await
            .map_err(|e| TransportError::Receive(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_body {
                return Err(TransportError::TooLarge {
                    limit: self.max_body,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("{url} -> {status}, {} body bytes", body.len());

        Ok(HttpResponse {
            status: status.as_u16(),
            headers: head,
            body,
        })
    }

    async fn disconnect(&mut self) {
        self.client = None;
    }
}
