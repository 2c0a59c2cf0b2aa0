//! Async cancellation tokens with parent-child propagation.
//!
//! Provides the cooperative cancellation model used by workflows and tasks.
//! A [`CancellationTokenSource`] owns the right to cancel; the
//! [`CancellationToken`]s it hands out can only observe. Sources may be
//! derived from an existing token, in which case cancelling the parent also
//! cancels the derived source, but not the other way around.
//!
//! # Cooperative Cancellation Patterns
//!
//! ## 1. Polling Pattern
//!
//! ```ignore
//! while !token.is_cancelled() {
//!     // Do work
//!     tokio::time::sleep(Duration::from_millis(100)).await;
//! }
//! ```
//!
//! ## 2. Async Wait Pattern
//!
//! ```ignore
//! tokio::select! {
//!     _ = token.cancelled() => {
//!         // Handle cancellation
//!     }
//!     result = do_work() => {
//!         // Handle completion
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
    /// Sources derived from this token
    children: Mutex<Vec<Weak<TokenState>>>,
}

impl TokenState {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(
            &mut *self
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Thread-safe, read-only view of a cancellation state.
///
/// Tokens are cheap to clone; every clone observes the same state. A token
/// created with [`Default`] is never cancelled.
///
/// # Example
///
/// ```
/// use dagflow_runtime::CancellationTokenSource;
///
/// let source = CancellationTokenSource::new();
/// let token1 = source.token();
/// let token2 = token1.clone();
///
/// source.cancel();
///
/// assert!(token1.is_cancelled());
/// assert!(token2.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Returns true if the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Waits until the token is cancelled.
    ///
    /// Completes immediately if it already is. Intended for use in
    /// `tokio::select!` next to the actual work.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the check so a concurrent cancel is not missed
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Returns an owned future that completes when this token is cancelled.
    pub fn wait_cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let token = self.clone();
        async move { token.cancelled().await }
    }

    /// Derives a new source whose token is cancelled together with this one.
    pub fn child_source(&self) -> CancellationTokenSource {
        CancellationTokenSource::child_of(self)
    }
}

/// Owner of a cancellation token.
///
/// # Parent-Child Hierarchy
///
/// [`child_of`](Self::child_of) links a new source to an existing token:
/// cancelling the parent cancels the child, cancelling the child leaves the
/// parent untouched.
///
/// # Example
///
/// ```
/// use dagflow_runtime::CancellationTokenSource;
///
/// let parent = CancellationTokenSource::new();
/// let child = parent.token().child_source();
///
/// child.cancel();
/// assert!(child.is_cancelled());
/// assert!(!parent.is_cancelled());
///
/// let other = parent.token().child_source();
/// parent.cancel();
/// assert!(other.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationTokenSource {
    token: CancellationToken,
}

impl CancellationTokenSource {
    /// Creates a new source with a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that is cancelled whenever `parent` is.
    pub fn child_of(parent: &CancellationToken) -> Self {
        let child = Self::new();
        {
            let mut children = parent
                .state
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.token.state));
        }
        // The parent may have been cancelled before the child was linked
        if parent.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Returns a token observing this source.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the token and every source derived from it.
    ///
    /// Idempotent. All tasks waiting in [`CancellationToken::cancelled`] are woken.
    pub fn cancel(&self) {
        self.token.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
