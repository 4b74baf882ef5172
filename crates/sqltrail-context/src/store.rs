//! Task-scoped ambient storage for the current [`Context`].
//!
//! Every logical task that wants a context runs inside a scope
//! ([`scope`], [`scope_empty`] or [`inherit`]). The scope owns one slot;
//! [`set`] and [`merge`] rewrite that slot and [`current`] reads it. Scopes
//! travel with the future, not with the thread polling it, so two requests
//! multiplexed on one worker never see each other's slot.
//!
//! ```ignore
//! // Per-request entry point
//! let ctx = Context::new().with("userID", user.id).with("apiEndpoint", path);
//! store::scope(ctx, handle_request(req)).await;
//!
//! // Deep inside the handler
//! store::merge(Context::new().with("step", "checkout"))?;
//!
//! // Handing work to another task keeps the context as of now
//! spawn(store::inherit(send_receipt(order)));
//! ```

use crate::Context;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;

tokio::task_local! {
    static CURRENT: RefCell<Option<Context>>;
}

/// Returned by [`set`], [`merge`] and [`clear`] when no scope is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeError;

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no context scope is active for this task")
    }
}

impl std::error::Error for ScopeError {}

/// The context visible to the calling task, if any.
pub fn current() -> Option<Context> {
    CURRENT
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten()
}

/// Whether the calling task runs inside a scope.
pub fn is_scoped() -> bool {
    CURRENT.try_with(|_| ()).is_ok()
}

/// Replace the context for the rest of this task.
///
/// Futures already handed to [`inherit`] keep the snapshot they took.
pub fn set(context: Context) -> Result<(), ScopeError> {
    CURRENT
        .try_with(|slot| {
            *slot.borrow_mut() = Some(context);
        })
        .map_err(|_| ScopeError)
}

/// Shallow-merge `partial` into the visible context (an empty one if unset).
pub fn merge(partial: Context) -> Result<(), ScopeError> {
    CURRENT
        .try_with(|slot| {
            let mut slot = slot.borrow_mut();
            let mut merged = slot.take().unwrap_or_default();
            merged.merge(partial);
            *slot = Some(merged);
        })
        .map_err(|_| ScopeError)
}

/// Remove the context for the rest of this task.
pub fn clear() -> Result<(), ScopeError> {
    CURRENT
        .try_with(|slot| {
            slot.borrow_mut().take();
        })
        .map_err(|_| ScopeError)
}

/// Run `future` with `context` visible to it.
pub fn scope<F>(context: Context, future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    tracing::trace!(keys = context.len(), "Entering context scope");
    CURRENT.scope(RefCell::new(Some(context)), future)
}

/// Run `future` in a fresh scope that starts without a context.
pub fn scope_empty<F>(future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CURRENT.scope(RefCell::new(None), future)
}

/// Wrap a future that is about to be spawned so it starts from the caller's
/// current context.
///
/// The child gets its own slot: later `set` calls in the parent do not reach
/// it, and `set` calls in the child do not leak back.
pub fn inherit<F>(future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CURRENT.scope(RefCell::new(current()), future)
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<R>(context: Context, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(RefCell::new(Some(context)), f)
}
