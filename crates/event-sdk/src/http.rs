//! HTTP collaborator used for endpoint negotiation.
//!
//! The client only needs "send a request, give me the body".  Keeping that
//! behind [`HttpRequester`] lets embedders reuse their own HTTP stack (proxy,
//! retries, instrumentation) and lets tests script the gateway.

use std::time::Duration;

use async_trait::async_trait;
use lk_domain::error::{Error, Result};
use reqwest::{Client, Method};

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

#[async_trait]
pub trait HttpRequester: Send + Sync + 'static {
    /// Perform `req` and return the raw response body.  Non-2xx statuses
    /// are errors.
    async fn request(&self, req: HttpRequest) -> Result<String>;
}

/// [`HttpRequester`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestRequester {
    http: Client,
}

impl ReqwestRequester {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { http })
    }

    pub fn from_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpRequester for ReqwestRequester {
    async fn request(&self, req: HttpRequest) -> Result<String> {
        let mut rb = self
            .http
            .request(req.method, &req.url)
            .timeout(req.timeout);
        for (name, value) in &req.headers {
            rb = rb.header(name, value);
        }
        if let Some(body) = &req.body {
            rb = rb.json(body);
        }

        let resp = rb.send().await.map_err(|e| from_reqwest(&req.url, e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| from_reqwest(&req.url, e))?;
        if !status.is_success() {
            return Err(Error::Http(format!("{} returned {status}: {body}", req.url)));
        }
        Ok(body)
    }
}

fn from_reqwest(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{url}: {e}"))
    } else {
        Error::Http(format!("{url}: {e}"))
    }
}
