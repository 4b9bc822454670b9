//! Handles to in-flight network operations.
//!
//! # Design
//! `InFlight` is the seam between the adapter and whatever actually moves
//! bytes. A handle reports its completion once through `finished` and gives
//! back its resources through `release`. The adapter owns the handle for the
//! whole request and calls `release` exactly once, after the completion has
//! been observed or when the request is torn down early.
//!
//! `HostReply` is the handle for hosts that run their own HTTP stack: the
//! host keeps the paired `HostCompleter` and feeds it the response when the
//! round-trip is done.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{TransportError, TransportErrorKind};

/// Raw outcome of a finished network operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// HTTP status, when the transport got as far as receiving one.
    pub status: Option<u16>,
    pub body: String,
    pub error: Option<TransportError>,
}

impl Completion {
    pub fn response(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            body: body.into(),
            error: None,
        }
    }

    pub fn failed(error: TransportError) -> Self {
        Self {
            status: None,
            body: String::new(),
            error: Some(error),
        }
    }

    /// Attach a status and body to a failed completion, for transports that
    /// flag some HTTP statuses as errors but still deliver the body.
    pub fn with_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.status = Some(status);
        self.body = body.into();
        self
    }
}

/// A network operation that has been started and not yet released.
#[async_trait]
pub trait InFlight: Send {
    /// Wait for the operation to finish. Called at most once.
    async fn finished(&mut self) -> Completion;

    /// Free whatever the operation holds (sockets, buffers, tasks).
    fn release(&mut self);
}

#[async_trait]
impl<H: InFlight + ?Sized> InFlight for Box<H> {
    async fn finished(&mut self) -> Completion {
        (**self).finished().await
    }

    fn release(&mut self) {
        (**self).release();
    }
}

/// Create a linked completer/reply pair for host-executed requests.
pub fn host_reply() -> (HostCompleter, HostReply) {
    let (tx, rx) = oneshot::channel();
    (HostCompleter { tx }, HostReply { rx: Some(rx) })
}

/// Host-side half of a `HostReply`.
#[derive(Debug)]
pub struct HostCompleter {
    tx: oneshot::Sender<Completion>,
}

impl HostCompleter {
    /// Deliver the outcome. Returns `false` if the reply was already released.
    pub fn complete(self, completion: impl Into<Completion>) -> bool {
        self.tx.send(completion.into()).is_ok()
    }

    pub fn fail(self, error: TransportError) -> bool {
        self.complete(Completion::failed(error))
    }
}

/// In-flight handle completed by a `HostCompleter`.
#[derive(Debug)]
pub struct HostReply {
    rx: Option<oneshot::Receiver<Completion>>,
}

impl HostReply {
    pub fn is_released(&self) -> bool {
        self.rx.is_none()
    }
}

#[async_trait]
impl InFlight for HostReply {
    async fn finished(&mut self) -> Completion {
        let Some(rx) = self.rx.as_mut() else {
            return Completion::failed(TransportError::new(
                TransportErrorKind::Other,
                "reply was released before completing",
            ));
        };
        rx.await.unwrap_or_else(|_| {
            Completion::failed(TransportError::new(
                TransportErrorKind::Other,
                "host dropped the request without completing it",
            ))
        })
    }

    fn release(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            tracing::trace!("host reply released");
        }
    }
}
