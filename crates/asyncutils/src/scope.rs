//! Binding async work to the lifetime of its owner.

use futures::future::FusedFuture;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFutureOwned};

/// The lifetime of a view (or anything else that owns async work).
///
/// Futures bound to a scope resolve to `None` as soon as the scope closes,
/// without being polled again. Whatever they would have done on completion
/// (mutating a snapshot, publishing a refresh) never happens.
///
/// Clones share the same lifetime; [`child`](Self::child) scopes close with
/// their parent but can also be closed on their own.
///
/// # Examples
///
/// ```
/// use tabula_asyncutils::Scope;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scope = Scope::new();
/// assert_eq!(scope.bind(async { 1 }).await, Some(1));
///
/// scope.close();
/// assert_eq!(scope.bind(async { 2 }).await, None);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scope {
    token: CancellationToken,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that closes when this one does.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token() }
    }

    pub fn close(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Closing scope");
        }
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the scope is closed.
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }

    /// Close the scope when the returned guard is dropped.
    pub fn guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Bind a future to this scope.
    pub fn bind<F: Future>(&self, future: F) -> Scoped<F> {
        Scoped {
            future,
            closed: self.token.clone().cancelled_owned(),
            terminated: false,
        }
    }

    /// Spawn a future onto the runtime, bound to this scope.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.bind(future))
    }
}

pin_project! {
    /// A future bound to a [`Scope`]; see [`Scope::bind`].
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Scoped<F> {
        #[pin]
        future: F,
        #[pin]
        closed: WaitForCancellationFutureOwned,
        terminated: bool,
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = Option<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        // Closing wins over a future that happens to be ready in the same poll.
        if this.closed.poll(cx).is_ready() {
            *this.terminated = true;
            return Poll::Ready(None);
        }
        match this.future.poll(cx) {
            Poll::Ready(output) => {
                *this.terminated = true;
                Poll::Ready(Some(output))
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F: Future> FusedFuture for Scoped<F> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}
