//! The single-request completion adapter.
//!
//! # Design
//! `RequestAdapter` turns one in-flight operation into one `ResultEnvelope`.
//! It carries only the body policy and an optional runtime handle, never
//! per-request state, so a single adapter can serve any number of concurrent
//! requests without locking.
//!
//! Each request moves through the same steps: start the operation, await
//! its completion once, classify, resolve, release. The handle sits inside a
//! `ReleaseGuard` from the moment it exists, so `release` runs exactly once
//! whether the request completes, the caller drops the future, or the
//! observer task is aborted.
//!
//! Cancelling a `PendingEnvelope` stops the result from being delivered. It
//! does not stop the transport; the request runs until its handle is
//! released.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::classify::classify;
use crate::config::{AdapterConfig, BodyPolicy};
use crate::envelope::ResultEnvelope;
use crate::error::{ErrorInfo, ErrorKind};
use crate::inflight::InFlight;

/// What happened to a dispatched request's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The envelope was handed to the waiting `PendingEnvelope`.
    Resolved,
    /// The `PendingEnvelope` was cancelled or dropped first; nothing was sent.
    Suppressed,
}

#[derive(Debug, Clone, Default)]
pub struct RequestAdapter {
    policy: BodyPolicy,
    runtime: Option<Handle>,
}

impl RequestAdapter {
    pub fn new(policy: BodyPolicy) -> Self {
        Self {
            policy,
            runtime: None,
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(config.body_policy)
    }

    /// Spawn dispatched requests on `runtime` instead of the ambient one, so
    /// `dispatch` can be called from threads outside any runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn body_policy(&self) -> BodyPolicy {
        self.policy
    }

    /// Run one operation to completion in the calling task.
    ///
    /// Dropping the returned future before it finishes releases the handle
    /// without classifying anything.
    pub async fn execute<T, H, F>(&self, operation: F) -> ResultEnvelope<T>
    where
        T: DeserializeOwned,
        H: InFlight,
        F: FnOnce() -> H,
    {
        let span = request_span(Uuid::new_v4());
        let guard = ReleaseGuard(span.in_scope(operation));
        observe(guard, self.policy, |envelope: ResultEnvelope<T>| envelope)
            .instrument(span)
            .await
    }

    /// Start one operation and observe it on a spawned task.
    ///
    /// # Panics
    /// Panics if no runtime was configured with `with_runtime` and the call
    /// is made outside a Tokio runtime.
    pub fn dispatch<T, H, F>(&self, operation: F) -> PendingEnvelope<T>
    where
        T: DeserializeOwned + Send + 'static,
        H: InFlight + 'static,
        F: FnOnce() -> H,
    {
        let request_id = Uuid::new_v4();
        let span = request_span(request_id);
        let _runtime = self.runtime.as_ref().map(Handle::enter);
        let guard = ReleaseGuard(span.in_scope(operation));
        let (tx, rx) = oneshot::channel();

        let observer = observe(guard, self.policy, move |envelope: ResultEnvelope<T>| {
            if tx.is_closed() {
                tracing::debug!("caller abandoned the request, result not delivered");
                return Delivery::Suppressed;
            }
            match tx.send(envelope) {
                Ok(()) => Delivery::Resolved,
                Err(_) => Delivery::Suppressed,
            }
        })
        .instrument(span);

        let task = match &self.runtime {
            Some(runtime) => runtime.spawn(observer),
            None => tokio::spawn(observer),
        };

        PendingEnvelope {
            request_id,
            rx,
            task,
        }
    }
}

fn request_span(request_id: Uuid) -> tracing::Span {
    tracing::debug_span!("request", %request_id)
}

/// Await the completion, classify it, hand the envelope to `resolve`, then
/// release the handle.
async fn observe<T, H, R>(
    mut guard: ReleaseGuard<H>,
    policy: BodyPolicy,
    resolve: impl FnOnce(ResultEnvelope<T>) -> R,
) -> R
where
    T: DeserializeOwned,
    H: InFlight,
{
    let completion = guard.0.finished().await;
    tracing::debug!(
        status = ?completion.status,
        transport_error = completion.error.is_some(),
        "request finished"
    );
    let envelope = classify(completion, policy);
    if let Some(error) = envelope.error() {
        tracing::debug!(kind = ?error.kind, message = %error.message, "request failed");
    }
    let outcome = resolve(envelope);
    drop(guard);
    outcome
}

/// Owns an in-flight handle and releases it when dropped.
struct ReleaseGuard<H: InFlight>(H);

impl<H: InFlight> Drop for ReleaseGuard<H> {
    fn drop(&mut self) {
        self.0.release();
        tracing::trace!("in-flight handle released");
    }
}

/// A dispatched request whose envelope has not been taken yet.
///
/// Await it, block on it with `blocking_wait`, or hand it a callback with
/// `on_complete`. Dropping it abandons the result.
#[derive(Debug)]
pub struct PendingEnvelope<T> {
    request_id: Uuid,
    rx: oneshot::Receiver<ResultEnvelope<T>>,
    task: JoinHandle<Delivery>,
}

impl<T> PendingEnvelope<T> {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Abandon the result. The observer will not deliver it, and the
    /// transport keeps running until the completion arrives.
    ///
    /// The returned handle resolves once the observer has run.
    pub fn cancel(mut self) -> JoinHandle<Delivery> {
        self.rx.close();
        tracing::debug!(request_id = %self.request_id, "request cancelled");
        self.task
    }

    /// Block the current thread until the envelope is available.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_wait(self) -> ResultEnvelope<T> {
        self.rx.blocking_recv().unwrap_or_else(|_| lost())
    }

    /// Run `callback` with the envelope once it is available.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: FnOnce(ResultEnvelope<T>) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.await) })
    }
}

impl<T> Future for PendingEnvelope<T> {
    type Output = ResultEnvelope<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| lost()))
    }
}

/// Envelope for an observer that ended without resolving, e.g. because its
/// runtime shut down mid-request.
fn lost<T>() -> ResultEnvelope<T> {
    ResultEnvelope::Failure(ErrorInfo::new(
        ErrorKind::UnknownError,
        "request ended without delivering a result",
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::inflight::{host_reply, Completion, HostCompleter};

    /// Handle that counts `finished` and `release` calls.
    struct CountingReply {
        completion: Option<Completion>,
        finished: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    #[derive(Default)]
    struct Counters {
        finished: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl Counters {
        fn reply(&self, completion: Completion) -> CountingReply {
            CountingReply {
                completion: Some(completion),
                finished: self.finished.clone(),
                released: self.released.clone(),
            }
        }

        fn finished(&self) -> usize {
            self.finished.load(Ordering::SeqCst)
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InFlight for CountingReply {
        async fn finished(&mut self) -> Completion {
            self.finished.fetch_add(1, Ordering::SeqCst);
            self.completion.take().unwrap()
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Wraps a `HostReply` and counts releases.
    struct TrackedHostReply {
        inner: crate::inflight::HostReply,
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InFlight for TrackedHostReply {
        async fn finished(&mut self) -> Completion {
            self.inner.finished().await
        }

        fn release(&mut self) {
            self.inner.release();
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked() -> (HostCompleter, TrackedHostReply, Arc<AtomicUsize>) {
        let (completer, inner) = host_reply();
        let released = Arc::new(AtomicUsize::new(0));
        let reply = TrackedHostReply {
            inner,
            released: released.clone(),
        };
        (completer, reply, released)
    }

    #[tokio::test]
    async fn execute_success_releases_once() {
        let counters = Counters::default();
        let adapter = RequestAdapter::default();

        let envelope: ResultEnvelope<Value> = adapter
            .execute(|| counters.reply(Completion::response(200, r#"{"id": 7, "name": "Acme"}"#)))
            .await;

        assert_eq!(envelope, ResultEnvelope::Success(json!({"id": 7, "name": "Acme"})));
        assert_eq!(counters.finished(), 1);
        assert_eq!(counters.released(), 1);
    }

    #[tokio::test]
    async fn execute_releases_once_on_every_path() {
        let completions = [
            Completion::response(422, r#"{"message": "Invalid data", "errors": {}}"#),
            Completion::response(500, r#"{"message": "Internal failure"}"#),
            Completion::response(200, "not json"),
            Completion::failed(TransportError::new(
                TransportErrorKind::ConnectionRefused,
                "Connection refused",
            )),
        ];

        for completion in completions {
            let counters = Counters::default();
            let envelope: ResultEnvelope<Value> = RequestAdapter::default()
                .execute(|| counters.reply(completion.clone()))
                .await;
            assert_eq!(counters.released(), 1, "{completion:?} -> {envelope:?}");
        }
    }

    #[tokio::test]
    async fn strict_adapter_rejects_malformed_body() {
        let counters = Counters::default();
        let envelope: ResultEnvelope<Value> = RequestAdapter::new(BodyPolicy::Strict)
            .execute(|| counters.reply(Completion::response(200, "not json")))
            .await;
        assert_eq!(envelope.error().unwrap().kind, ErrorKind::UnknownError);
        assert_eq!(counters.released(), 1);
    }

    #[tokio::test]
    async fn dropping_execute_future_releases_handle() {
        let (completer, reply, released) = tracked();
        let adapter = RequestAdapter::default();

        {
            let future = adapter.execute::<Value, _, _>(|| reply);
            tokio::pin!(future);
            let polled = futures_poll_once(future.as_mut()).await;
            assert!(polled.is_none());
        }

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!completer.complete(Completion::response(200, "{}")));
    }

    #[tokio::test]
    async fn dispatch_resolves_exactly_once() {
        let (completer, reply, released) = tracked();
        let pending = RequestAdapter::default().dispatch::<(), _, _>(|| reply);

        assert!(completer.complete(Completion::response(204, "")));
        let envelope = pending.await;

        assert_eq!(envelope, ResultEnvelope::Success(()));
        tokio::task::yield_now().await;
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_request_is_not_resolved() {
        let (completer, reply, released) = tracked();
        let pending = RequestAdapter::default().dispatch::<Value, _, _>(|| reply);

        let observer = pending.cancel();
        assert!(completer.complete(Completion::response(200, r#"{"id": 7}"#)));

        assert_eq!(observer.await.unwrap(), Delivery::Suppressed);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_pending_envelope_is_not_resolved() {
        let (completer, reply, released) = tracked();
        let pending = RequestAdapter::default().dispatch::<Value, _, _>(|| reply);
        let request_id = pending.request_id();
        drop(pending);

        assert!(completer.complete(Completion::response(200, "{}")));
        for _ in 0..100 {
            if released.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(released.load(Ordering::SeqCst), 1, "request {request_id}");
    }

    #[tokio::test]
    async fn on_complete_invokes_callback_once() {
        let (completer, reply, _released) = tracked();
        let pending = RequestAdapter::default().dispatch::<Value, _, _>(|| reply);
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();

        let seen = calls.clone();
        let callback = pending.on_complete(move |envelope| {
            seen.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(envelope);
        });
        completer.fail(TransportError::new(TransportErrorKind::Timeout, "Operation timed out"));

        callback.await.unwrap();
        let envelope = rx.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let error = envelope.error().unwrap();
        assert_eq!(error.kind, ErrorKind::NetworkError);
        assert_eq!(error.message, "Operation timed out");
    }

    #[test]
    fn blocking_wait_from_outside_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let adapter = RequestAdapter::default().with_runtime(runtime.handle().clone());
        let (completer, reply) = host_reply();

        let pending = adapter.dispatch::<Value, _, _>(|| reply);
        std::thread::spawn(move || {
            completer.complete(Completion::response(200, r#"{"id": 7, "name": "Acme"}"#));
        });

        let envelope = pending.blocking_wait();
        assert_eq!(envelope.value(), Some(&json!({"id": 7, "name": "Acme"})));
    }

    #[tokio::test]
    async fn aborted_observer_reports_lost_result() {
        let (_completer, reply, released) = tracked();
        let mut pending = RequestAdapter::default().dispatch::<Value, _, _>(|| reply);
        pending.task.abort();

        let envelope = (&mut pending).await;
        assert_eq!(envelope.error().unwrap().kind, ErrorKind::UnknownError);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_are_independent() {
        let adapter = RequestAdapter::default();
        let mut completers = Vec::new();
        let mut pendings = Vec::new();
        for _ in 0..8 {
            let (completer, reply) = host_reply();
            completers.push(completer);
            pendings.push(adapter.dispatch::<Value, _, _>(|| reply));
        }

        for (i, completer) in completers.into_iter().enumerate().rev() {
            completer.complete(Completion::response(200, format!(r#"{{"n": {i}}}"#)));
        }

        for (i, pending) in pendings.into_iter().enumerate() {
            assert_eq!(pending.await.value(), Some(&json!({"n": i})));
        }
    }

    /// Poll a future once, returning its output if it is ready.
    async fn futures_poll_once<F: Future + Unpin>(mut future: F) -> Option<F::Output> {
        std::future::poll_fn(|cx| match Pin::new(&mut future).poll(cx) {
            Poll::Ready(output) => Poll::Ready(Some(output)),
            Poll::Pending => Poll::Ready(None),
        })
        .await
    }
}
