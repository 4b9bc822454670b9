//! `reqwest`-backed transport.
//!
//! # Design
//! `HttpTransport` wraps an injected `reqwest::Client`; there is no
//! process-wide client. `start` spawns the request immediately and returns a
//! `ReqwestReply` that owns the spawned task. Releasing the reply aborts the
//! task if it is still running.

use std::error::Error as _;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use tokio::task::JoinHandle;

use crate::config::AdapterConfig;
use crate::error::{ConfigError, TransportError, TransportErrorKind};
use crate::http::{HttpMethod, HttpRequest};
use crate::inflight::{Completion, InFlight};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self::new(builder.build()?))
    }

    /// Start executing `request`.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self, request: HttpRequest) -> ReqwestReply {
        let mut builder = self.client.request(method(request.method), &request.path);
        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::warn!(header = %name, "skipping invalid request header"),
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!(method = request.method.as_str(), path = %request.path, "starting request");
        ReqwestReply {
            task: Some(tokio::spawn(perform(builder))),
        }
    }
}

/// In-flight `reqwest` request.
#[derive(Debug)]
pub struct ReqwestReply {
    task: Option<JoinHandle<Completion>>,
}

#[async_trait]
impl InFlight for ReqwestReply {
    async fn finished(&mut self) -> Completion {
        let Some(task) = self.task.as_mut() else {
            return Completion::failed(TransportError::new(
                TransportErrorKind::Other,
                "request was released before completing",
            ));
        };
        task.await.unwrap_or_else(|err| {
            Completion::failed(TransportError::new(
                TransportErrorKind::Other,
                format!("request task failed: {err}"),
            ))
        })
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn perform(builder: reqwest::RequestBuilder) -> Completion {
    let response = match builder.send().await {
        Ok(response) => response,
        Err(err) => return Completion::failed(transport_error(&err)),
    };

    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => return Completion::failed(transport_error(&err)).with_response(status, ""),
    };

    if status == 407 {
        return Completion::failed(TransportError::new(
            TransportErrorKind::Authentication,
            "proxy authentication required",
        ))
        .with_response(status, body);
    }
    Completion::response(status, body)
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn transport_error(err: &reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if is_tls_failure(err) {
        TransportErrorKind::Tls
    } else if err.is_connect() {
        TransportErrorKind::ConnectionRefused
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, error_chain(err))
}

/// Whether any underlying cause reports a TLS problem. The outer error is
/// skipped because its text carries the request URL.
fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Render an error with all of its sources, outermost first.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
