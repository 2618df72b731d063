//! Bidirectional JSON-RPC 2.0 connection over newline-delimited JSON.
//!
//! A [`Connection`] owns one reader and one writer half of a byte-stream
//! pair. Both peers may issue requests, send notifications, and answer the
//! other side's requests concurrently over the same two streams.
//!
//! Concurrency shape: a dedicated reader task parses and classifies each
//! line; every inbound request and notification runs on its own spawned
//! task so a blocked handler never starves the loop (and a handler may make
//! nested outbound calls on the same connection); a dedicated task emits
//! queued `$/cancel_request` notifications; outbound calls run on their
//! callers' tasks. All writes are serialized through one async mutex.
//!
//! Ordering contract: when [`Connection::request`] returns, every
//! notification handler spawned before the response line was read has
//! finished. Editor UIs rely on this to observe all streamed session updates
//! before a prompt call resolves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info};

use crate::cancel::{CancelCause, CancelScope};
use crate::codec::{NdjsonCodec, INITIAL_LINE_BYTES};
use crate::error::{RequestError, Result, METHOD_NOT_FOUND};
use crate::id::canonical_id_key;
use crate::queue::UnboundedQueue;
use crate::schema::methods::CANCEL_REQUEST;

/// Upper bound on queued `$/cancel_request` notifications awaiting emission.
/// Excess entries are dropped; the local request still completes.
const MAX_PENDING_CANCELS: usize = 1024;

const JSONRPC_VERSION: &str = "2.0";

/// Handles one inbound method call (request or notification).
///
/// `ctx` is cancelled when the peer sends `$/cancel_request` for the request
/// or when the connection shuts down; handlers are expected to return
/// promptly once that happens. The returned value becomes the `result`
/// member of the reply; for notifications it is discarded.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle_method(
        &self,
        ctx: CancelScope,
        method: &str,
        params: Option<&RawValue>,
    ) -> Result<serde_json::Value>;
}

/// The one envelope shape used for every wire message. Which members are
/// populated decides whether a line is a request, response or notification.
#[derive(Debug, Serialize, Deserialize)]
struct AnyMessage {
    #[serde(default)]
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RequestError>,
}

impl AnyMessage {
    fn new() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CancelRequestParams {
    #[serde(rename = "requestId")]
    request_id: Box<RawValue>,
}

type MessageSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, NdjsonCodec>;
type MessageStream = FramedRead<Box<dyn AsyncRead + Send + Unpin>, NdjsonCodec>;

/// Correlation state shared between the reader loop and outbound callers.
/// Critical sections under this lock perform no I/O.
#[derive(Default)]
struct RouteTables {
    /// Outbound requests awaiting a response, by canonical id key.
    pending: HashMap<String, oneshot::Sender<AnyMessage>>,
    /// Inbound requests currently being handled, by canonical id key.
    inflight: HashMap<String, CancelScope>,
}

/// Counts running notification handlers so `request` can drain them before
/// returning.
#[derive(Debug)]
struct NotificationGauge {
    count: watch::Sender<usize>,
}

impl NotificationGauge {
    fn new() -> Self {
        Self {
            count: watch::channel(0).0,
        }
    }

    fn add(&self) {
        self.count.send_modify(|n| *n += 1);
    }

    fn done(&self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }

    async fn drained(&self) {
        let mut rx = self.count.subscribe();
        // wait_for only errors when the sender is dropped, and the gauge
        // outlives every waiter.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

struct ConnectionInner {
    outbound: tokio::sync::Mutex<MessageSink>,
    next_id: AtomicU64,
    tables: Mutex<RouteTables>,
    cancel_queue: UnboundedQueue<String>,
    notifications: NotificationGauge,
    handler: Box<dyn MethodHandler>,
    /// Root scope; cancelled with the disconnect cause when the reader exits.
    scope: CancelScope,
}

/// A JSON-RPC 2.0 connection over line-delimited JSON.
///
/// Construction spawns the reader and cancel-emitter tasks, so it must
/// happen inside a Tokio runtime. Cloning is cheap and clones share the
/// connection.
///
/// Writes from a single caller reach the wire in call order; ordering across
/// concurrent callers is unspecified.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection over `peer_input` (bytes to the peer) and
    /// `peer_output` (bytes from the peer), serving inbound methods with
    /// `handler`.
    pub fn new<W, R>(handler: impl MethodHandler + 'static, peer_input: W, peer_output: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let outbound = FramedWrite::new(
            Box::new(peer_input) as Box<dyn AsyncWrite + Send + Unpin>,
            NdjsonCodec::new(),
        );
        let inbound = FramedRead::with_capacity(
            Box::new(peer_output) as Box<dyn AsyncRead + Send + Unpin>,
            NdjsonCodec::new(),
            INITIAL_LINE_BYTES,
        );

        let inner = Arc::new(ConnectionInner {
            outbound: tokio::sync::Mutex::new(outbound),
            next_id: AtomicU64::new(0),
            tables: Mutex::new(RouteTables::default()),
            cancel_queue: UnboundedQueue::new(),
            notifications: NotificationGauge::new(),
            handler: Box::new(handler),
            scope: CancelScope::new(),
        });

        tokio::spawn(send_cancel_requests(inner.clone()));
        tokio::spawn(receive(inner.clone(), inbound));

        Self { inner }
    }

    /// Completes when the reader loop has exited (peer disconnect or stream
    /// error). Pending requests fail with "peer disconnected" at that point.
    pub async fn closed(&self) {
        self.inner.scope.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.scope.is_cancelled()
    }

    /// Send a request and await its typed response.
    ///
    /// On success this does not return until every notification handler
    /// spawned before the response was read has completed. Cancelling `ctx`
    /// enqueues a best-effort `$/cancel_request` to the peer and returns
    /// promptly with the mapped error even if the peer has stopped reading.
    pub async fn request<P, R>(
        &self,
        ctx: &CancelScope,
        method: &str,
        params: Option<P>,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let (message, id_key) = self.prepare_request(method, params)?;

        let (tx, rx) = oneshot::channel();
        self.inner
            .tables
            .lock()
            .unwrap()
            .pending
            .insert(id_key.clone(), tx);

        if let Err(err) = send_message(&self.inner, &message).await {
            self.remove_pending(&id_key);
            return Err(err);
        }

        let response = self.wait_for_response(ctx, rx, &id_key).await?;

        // Drain every notification handler spawned before the response line
        // was read, so the caller observes all updates the peer sent first.
        self.inner.notifications.drained().await;

        if let Some(err) = response.error {
            return Err(err);
        }
        let raw = response.result.as_deref().map_or("null", RawValue::get);
        serde_json::from_str(raw).map_err(|err| RequestError::internal_error().data(err.to_string()))
    }

    /// Send a notification. Never allocates correlation state; fails up
    /// front when `ctx` is already done.
    pub async fn notify<P: Serialize>(
        &self,
        ctx: &CancelScope,
        method: &str,
        params: Option<P>,
    ) -> Result<()> {
        if ctx.deadline_expired() {
            ctx.cancel(CancelCause::DeadlineExceeded);
        }
        if ctx.is_cancelled() {
            let cause = ctx
                .cause()
                .map_or_else(|| "context cancelled".to_string(), |cause| cause.to_string());
            return Err(RequestError::internal_error().data(cause));
        }

        let mut message = AnyMessage::new();
        message.method = Some(method.to_string());
        if let Some(params) = params {
            message.params = Some(
                serde_json::value::to_raw_value(&params)
                    .map_err(|err| RequestError::invalid_params().data(err.to_string()))?,
            );
        }
        send_message(&self.inner, &message).await
    }

    fn prepare_request<P: Serialize>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<(AnyMessage, String)> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id_key = id.to_string();
        let id_raw = RawValue::from_string(id_key.clone())
            .map_err(|err| RequestError::internal_error().data(err.to_string()))?;

        let mut message = AnyMessage::new();
        message.id = Some(id_raw);
        message.method = Some(method.to_string());
        if let Some(params) = params {
            message.params = Some(
                serde_json::value::to_raw_value(&params)
                    .map_err(|err| RequestError::invalid_params().data(err.to_string()))?,
            );
        }
        Ok((message, id_key))
    }

    async fn wait_for_response(
        &self,
        ctx: &CancelScope,
        rx: oneshot::Receiver<AnyMessage>,
        id_key: &str,
    ) -> Result<AnyMessage> {
        tokio::select! {
            response = rx => match response {
                Ok(message) => Ok(message),
                // The reader loop tore the mailbox down without replying.
                Err(_) => {
                    self.remove_pending(id_key);
                    Err(peer_disconnected())
                }
            },
            () = caller_done(ctx) => {
                // When the connection dropped at the same moment, prefer
                // reporting peer disconnect and skip queueing a cancel
                // notification to a dead peer.
                if self.is_closed() {
                    self.remove_pending(id_key);
                    return Err(peer_disconnected());
                }
                self.enqueue_cancel_request(id_key);
                self.remove_pending(id_key);
                Err(RequestError::from_cancel_cause(ctx.cause().as_ref()))
            }
            () = self.closed() => {
                self.remove_pending(id_key);
                Err(peer_disconnected())
            }
        }
    }

    fn remove_pending(&self, id_key: &str) {
        self.inner.tables.lock().unwrap().pending.remove(id_key);
    }

    /// Queue a best-effort `$/cancel_request` for the peer. Non-blocking; a
    /// full queue drops the entry so the caller's return is never delayed by
    /// a peer that stopped reading.
    fn enqueue_cancel_request(&self, id_key: &str) {
        if id_key.trim().is_empty() || self.is_closed() {
            return;
        }
        if self.inner.cancel_queue.len() >= MAX_PENDING_CANCELS {
            debug!(
                queue_len = MAX_PENDING_CANCELS,
                "dropping $/cancel_request due to full queue"
            );
            return;
        }
        self.inner.cancel_queue.push(id_key.to_string());
    }
}

/// Resolves when the caller's scope is done, recording the deadline cause
/// when the deadline fires first.
async fn caller_done(ctx: &CancelScope) {
    tokio::select! {
        () = ctx.cancelled() => {}
        () = ctx.deadline_elapsed() => ctx.cancel(CancelCause::DeadlineExceeded),
    }
}

fn peer_disconnected() -> RequestError {
    RequestError::internal_error().data("peer disconnected before response")
}

async fn send_message(inner: &ConnectionInner, message: &AnyMessage) -> Result<()> {
    let line = serde_json::to_string(message)
        .map_err(|err| RequestError::internal_error().data(err.to_string()))?;
    let mut outbound = inner.outbound.lock().await;
    outbound
        .send(line)
        .await
        .map_err(|err| RequestError::internal_error().data(err.to_string()))
}

/// Decode a `params` member, treating an absent one as `null`.
pub(crate) fn decode_params<T: DeserializeOwned>(params: Option<&RawValue>) -> Result<T> {
    let raw = params.map_or("null", RawValue::get);
    serde_json::from_str(raw).map_err(|err| RequestError::invalid_params().data(err.to_string()))
}

/// Encode a handler result for the `result` member.
pub(crate) fn encode_result<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|err| RequestError::internal_error().data(err.to_string()))
}

// ── Reader loop ───────────────────────────────────────────────────────────────

async fn receive(inner: Arc<ConnectionInner>, mut frames: MessageStream) {
    while let Some(next) = frames.next().await {
        let line = match next {
            Ok(line) => line,
            Err(err) => {
                error!(%err, "failed to read incoming frame");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message: AnyMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(err) => {
                error!(%err, raw = %line, "failed to parse incoming message");
                continue;
            }
        };

        let method = message.method.as_deref().unwrap_or("");

        // $/cancel_request is handled synchronously so a request followed
        // immediately by its cancel observes the cancellation once its
        // worker starts; it does not join the notification ordering.
        if message.id.is_none() && method == CANCEL_REQUEST {
            handle_cancel_request(&inner, &message);
            continue;
        }

        if message.id.is_some() && method.is_empty() {
            deliver_response(&inner, message);
        } else if !method.is_empty() {
            match message.id.as_deref() {
                Some(id) => {
                    let id_key = match canonical_id_key(id.get()) {
                        Ok(key) => key,
                        Err(err) => {
                            error!(%err, id = id.get(), "failed to canonicalize inbound request id");
                            id.get().to_string()
                        }
                    };
                    let ctx = inner.scope.child();
                    inner
                        .tables
                        .lock()
                        .unwrap()
                        .inflight
                        .insert(id_key.clone(), ctx.clone());
                    tokio::spawn(run_request_worker(inner.clone(), message, id_key, ctx));
                }
                None => {
                    // Count the handler before spawning it: a response read
                    // later on this task must wait for this notification.
                    inner.notifications.add();
                    tokio::spawn(run_notification_worker(inner.clone(), message));
                }
            }
        } else {
            error!(raw = %line, "received message with neither id nor method");
        }
    }

    inner
        .scope
        .cancel(CancelCause::Other("peer connection closed".to_string()));
    inner.cancel_queue.close();
    // Drop outstanding mailboxes; waiters also observe the scope directly.
    inner.tables.lock().unwrap().pending.clear();
    info!("peer connection closed");
}

fn deliver_response(inner: &Arc<ConnectionInner>, message: AnyMessage) {
    let Some(id) = message.id.as_deref() else {
        return;
    };
    let id_key = match canonical_id_key(id.get()) {
        Ok(key) => key,
        Err(err) => {
            error!(%err, id = id.get(), "failed to canonicalize response id");
            id.get().to_string()
        }
    };

    let sender = inner.tables.lock().unwrap().pending.remove(&id_key);
    // No entry means the request was already cancelled or never ours.
    if let Some(sender) = sender {
        let _ = sender.send(message);
    }
}

fn handle_cancel_request(inner: &Arc<ConnectionInner>, message: &AnyMessage) {
    let Some(params) = message.params.as_deref() else {
        error!("received $/cancel_request without params");
        return;
    };
    let params: CancelRequestParams = match serde_json::from_str(params.get()) {
        Ok(params) => params,
        Err(err) => {
            error!(%err, "failed to parse $/cancel_request params");
            return;
        }
    };

    let raw_id = params.request_id.get();
    if raw_id.trim().is_empty() {
        error!("received $/cancel_request without requestId");
        return;
    }
    let id_key = match canonical_id_key(raw_id) {
        Ok(key) => key,
        Err(err) => {
            error!(%err, id = raw_id, "failed to canonicalize $/cancel_request requestId");
            raw_id.to_string()
        }
    };

    let scope = inner.tables.lock().unwrap().inflight.get(&id_key).cloned();
    if let Some(scope) = scope {
        scope.cancel(CancelCause::Cancelled);
    }
}

/// Removes the inflight entry even when the handler panics.
struct InflightGuard {
    inner: Arc<ConnectionInner>,
    id_key: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inner
            .tables
            .lock()
            .unwrap()
            .inflight
            .remove(&self.id_key);
    }
}

async fn run_request_worker(
    inner: Arc<ConnectionInner>,
    message: AnyMessage,
    id_key: String,
    ctx: CancelScope,
) {
    let _guard = InflightGuard {
        inner: inner.clone(),
        id_key,
    };

    let method = message.method.as_deref().unwrap_or("").to_string();
    let outcome = inner
        .handler
        .handle_method(ctx, &method, message.params.as_deref())
        .await;

    let mut reply = AnyMessage::new();
    reply.id = message.id;
    match outcome {
        Ok(value) => match serde_json::value::to_raw_value(&value) {
            Ok(raw) => reply.result = Some(raw),
            Err(err) => {
                reply.error = Some(RequestError::internal_error().data(err.to_string()));
            }
        },
        Err(err) => reply.error = Some(err),
    }

    // The peer may already be gone; a failed reply write is not an error of
    // this connection.
    if let Err(err) = send_message(&inner, &reply).await {
        debug!(%err, method = %method, "failed to send response");
    }
}

/// Decrements the gauge even when the handler panics.
struct NotificationGuard {
    inner: Arc<ConnectionInner>,
}

impl Drop for NotificationGuard {
    fn drop(&mut self) {
        self.inner.notifications.done();
    }
}

async fn run_notification_worker(inner: Arc<ConnectionInner>, message: AnyMessage) {
    let _guard = NotificationGuard {
        inner: inner.clone(),
    };

    let method = message.method.as_deref().unwrap_or("").to_string();
    let ctx = inner.scope.clone();
    if let Err(err) = inner
        .handler
        .handle_method(ctx, &method, message.params.as_deref())
        .await
    {
        // Unknown extension notifications are ignored without logging.
        if err.code == METHOD_NOT_FOUND && method.starts_with('_') {
            return;
        }
        error!(method = %method, %err, "failed to handle notification");
    }
}

// ── Cancel emitter ────────────────────────────────────────────────────────────

async fn send_cancel_requests(inner: Arc<ConnectionInner>) {
    while let Some(id_key) = inner.cancel_queue.pop().await {
        // Canonical keys for locally assigned ids are plain integers, so the
        // key doubles as the raw JSON id.
        let request_id = match RawValue::from_string(id_key) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(%err, "failed to send $/cancel_request");
                continue;
            }
        };
        let params = CancelRequestParams { request_id };

        let mut message = AnyMessage::new();
        message.method = Some(CANCEL_REQUEST.to_string());
        match serde_json::value::to_raw_value(&params) {
            Ok(raw) => message.params = Some(raw),
            Err(err) => {
                debug!(%err, "failed to send $/cancel_request");
                continue;
            }
        }

        if let Err(err) = send_message(&inner, &message).await {
            debug!(%err, "failed to send $/cancel_request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gauge_drains_immediately_when_idle() {
        let gauge = NotificationGauge::new();
        gauge.drained().await;
    }

    #[tokio::test]
    async fn gauge_waits_for_done() {
        let gauge = Arc::new(NotificationGauge::new());
        gauge.add();
        gauge.add();

        let waiter = tokio::spawn({
            let gauge = gauge.clone();
            async move { gauge.drained().await }
        });

        gauge.done();
        assert!(!waiter.is_finished());
        gauge.done();
        waiter.await.unwrap();
    }

    #[test]
    fn decode_params_treats_missing_as_null() {
        let value: Option<u32> = decode_params(None).unwrap();
        assert_eq!(value, None);

        let err = decode_params::<u32>(None).unwrap_err();
        assert_eq!(err.code, crate::error::INVALID_PARAMS);
    }
}
