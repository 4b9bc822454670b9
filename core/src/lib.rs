//! Typed result envelopes for asynchronous HTTP requests.
//!
//! # Overview
//! Turns a network call into a `ResultEnvelope<T>`: either the decoded
//! success payload or a classified `ErrorInfo`. Callers never look at status
//! codes or raw bodies.
//!
//! # Design
//! - `RequestAdapter` takes a closure that starts a request and returns an
//!   `InFlight` handle, observes its completion once, classifies it and
//!   releases the handle exactly once.
//! - Expected failures (network errors, server messages, validation errors)
//!   are values inside the envelope, never `Err`.
//! - Transports are injected: `HttpTransport` wraps a caller-supplied
//!   `reqwest::Client`, and `HostReply` lets a host run the HTTP round-trip
//!   itself (host-does-IO).
//! - `ApiClient` layers JSON request building on top for per-resource
//!   wrappers.

pub mod adapter;
pub mod classify;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod inflight;
pub mod transport;

pub use adapter::{Delivery, PendingEnvelope, RequestAdapter};
pub use classify::classify;
pub use client::ApiClient;
pub use config::{AdapterConfig, BodyPolicy};
pub use envelope::ResultEnvelope;
pub use error::{ConfigError, ErrorInfo, ErrorKind, TransportError, TransportErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use inflight::{host_reply, Completion, HostCompleter, HostReply, InFlight};
pub use transport::{HttpTransport, ReqwestReply};
