//! JSON API client built on the request adapter.
//!
//! # Design
//! `ApiClient` holds a base URL, an optional bearer token, the injected
//! transport and the adapter. It carries no mutable state between calls.
//! Request construction (`build_*`) stays separate from execution so hosts
//! running their own HTTP stack can reuse it with a `HostReply`; the
//! convenience methods (`get`, `post`, ...) run the built request through
//! `HttpTransport` and return a `ResultEnvelope`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::adapter::{PendingEnvelope, RequestAdapter};
use crate::config::AdapterConfig;
use crate::envelope::ResultEnvelope;
use crate::error::{ConfigError, ErrorInfo, ErrorKind};
use crate::http::{HttpMethod, HttpRequest};
use crate::transport::HttpTransport;

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    bearer_token: Option<String>,
    transport: HttpTransport,
    adapter: RequestAdapter,
}

impl ApiClient {
    pub fn new(base_url: &str, transport: HttpTransport, adapter: RequestAdapter) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: None,
            transport,
            adapter,
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            &config.base_url,
            HttpTransport::from_config(config)?,
            RequestAdapter::from_config(config),
        ))
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn adapter(&self) -> &RequestAdapter {
        &self.adapter
    }

    pub fn build_get(&self, path: &str) -> HttpRequest {
        self.build(HttpMethod::Get, path, None)
    }

    pub fn build_delete(&self, path: &str) -> HttpRequest {
        self.build(HttpMethod::Delete, path, None)
    }

    pub fn build_json<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
    ) -> Result<HttpRequest, serde_json::Error> {
        let body = serde_json::to_string(body)?;
        Ok(self.build(method, path, Some(body)))
    }

    fn build(&self, method: HttpMethod, path: &str, body: Option<String>) -> HttpRequest {
        let mut headers = vec![("accept".to_string(), "application/json".to_string())];
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        if let Some(token) = &self.bearer_token {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        HttpRequest {
            method,
            path: format!("{}/{}", self.base_url, path.trim_start_matches('/')),
            headers,
            body,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ResultEnvelope<T> {
        self.send(self.build_get(path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> ResultEnvelope<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Post, path, body).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> ResultEnvelope<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Put, path, body).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> ResultEnvelope<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Patch, path, body).await
    }

    pub async fn delete(&self, path: &str) -> ResultEnvelope<()> {
        self.send(self.build_delete(path)).await
    }

    async fn send_json<B, T>(&self, method: HttpMethod, path: &str, body: &B) -> ResultEnvelope<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        match self.build_json(method, path, body) {
            Ok(request) => self.send(request).await,
            Err(err) => ResultEnvelope::Failure(ErrorInfo::new(
                ErrorKind::UnknownError,
                format!("failed to serialize request body: {err}"),
            )),
        }
    }

    /// Execute a prepared request in the calling task.
    pub async fn send<T: DeserializeOwned>(&self, request: HttpRequest) -> ResultEnvelope<T> {
        self.adapter.execute(|| self.transport.start(request)).await
    }

    /// Execute a prepared request on a spawned task.
    pub fn dispatch<T>(&self, request: HttpRequest) -> PendingEnvelope<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let transport = self.transport.clone();
        self.adapter.dispatch(move || transport.start(request))
    }
}
