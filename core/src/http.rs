//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. A host
//! that runs its own HTTP stack receives an `HttpRequest`, executes it, and
//! hands back an `HttpResponse` through a `HostCompleter`. The bundled
//! `HttpTransport` consumes the same `HttpRequest` values, so request
//! construction is shared by both paths.
//!
//! All fields use owned types (`String`, `Vec`) so values can be moved into
//! spawned tasks or across threads without lifetime concerns.

use crate::inflight::Completion;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
///
/// Built by `ApiClient::build_*` methods.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
///
/// Constructed by a host after executing an `HttpRequest`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl From<HttpResponse> for Completion {
    fn from(response: HttpResponse) -> Self {
        Completion::response(response.status, response.body)
    }
}
