//! Cause-carrying cancellation scopes.
//!
//! [`CancelScope`] wraps a [`CancellationToken`] with the two extra pieces
//! the transport needs: the *cause* of a cancellation (so it can be mapped to
//! the right JSON-RPC error code) and an optional deadline. Child scopes are
//! derived per inbound request so a `$/cancel_request` from the peer cancels
//! exactly one handler.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scope was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelCause {
    /// Explicit cancellation, locally or via `$/cancel_request`.
    Cancelled,
    /// The scope's deadline elapsed.
    DeadlineExceeded,
    /// Any other cause, e.g. peer disconnect.
    Other(String),
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Cancelled => f.write_str("cancelled"),
            CancelCause::DeadlineExceeded => f.write_str("deadline exceeded"),
            CancelCause::Other(text) => f.write_str(text),
        }
    }
}

#[derive(Debug)]
struct Shared {
    token: CancellationToken,
    cause: OnceLock<CancelCause>,
    deadline: Option<Instant>,
    parent: Option<Arc<Shared>>,
}

/// A cancellation scope handed to method handlers and passed to outbound
/// calls.
///
/// Cancelling a scope cancels every scope derived from it via
/// [`child`](CancelScope::child); the cause recorded on the ancestor is
/// visible from descendants. Cloning is cheap and clones share state.
#[derive(Debug, Clone)]
pub struct CancelScope {
    shared: Arc<Shared>,
}

impl CancelScope {
    /// A fresh root scope with no deadline.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                token: CancellationToken::new(),
                cause: OnceLock::new(),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// A root scope whose deadline elapses after `timeout`.
    ///
    /// The deadline is passive: it is enforced at the transport's suspension
    /// points rather than by a background timer, and a call that observes it
    /// records [`CancelCause::DeadlineExceeded`] on the scope.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                token: CancellationToken::new(),
                cause: OnceLock::new(),
                deadline: Some(Instant::now() + timeout),
                parent: None,
            }),
        }
    }

    /// Derive a child scope. The child is cancelled when this scope is, and
    /// inherits this scope's deadline; cancelling the child leaves the parent
    /// untouched.
    pub fn child(&self) -> Self {
        Self {
            shared: Arc::new(Shared {
                token: self.shared.token.child_token(),
                cause: OnceLock::new(),
                deadline: self.shared.deadline,
                parent: Some(self.shared.clone()),
            }),
        }
    }

    /// Cancel the scope with the given cause. The first cause wins; later
    /// calls only re-fire the (idempotent) token cancellation.
    pub fn cancel(&self, cause: CancelCause) {
        let _ = self.shared.cause.set(cause);
        self.shared.token.cancel();
    }

    /// Completes once the scope (or an ancestor) has been cancelled.
    pub async fn cancelled(&self) {
        self.shared.token.cancelled().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// The recorded cause, searching ancestors when this scope was cancelled
    /// transitively.
    pub fn cause(&self) -> Option<CancelCause> {
        if let Some(cause) = self.shared.cause.get() {
            return Some(cause.clone());
        }
        let mut current = self.shared.parent.as_ref();
        while let Some(shared) = current {
            if let Some(cause) = shared.cause.get() {
                return Some(cause.clone());
            }
            current = shared.parent.as_ref();
        }
        None
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.shared.deadline
    }

    pub(crate) fn deadline_expired(&self) -> bool {
        self.shared
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Completes when the deadline elapses; pends forever without one.
    pub(crate) async fn deadline_elapsed(&self) {
        match self.shared.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}
