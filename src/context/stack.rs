use super::RequestContext;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

// Keyed per coroutine so a handler that yields keeps its own stack; plain
// threads get thread-local storage.
may::coroutine_local!(static STACK: RefCell<Vec<RequestContext>> = RefCell::new(Vec::new()));

/// Errors from context resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// No context is active on the calling coroutine or thread
    NotInitialized,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::NotInitialized => write!(f, "Context is not initialized yet"),
        }
    }
}

impl std::error::Error for ContextError {}

/// Keeps a context current until dropped.
///
/// Guards nest: dropping one restores whatever was current before it was
/// created.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ContextGuard {
    ctx: RequestContext,
    // Guards are tied to the coroutine whose stack they pushed onto.
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            // Normally the top; out-of-order drops remove the matching entry.
            if let Some(pos) = stack.iter().rposition(|c| c.same(&self.ctx)) {
                stack.remove(pos);
            }
            debug!(request_id = %self.ctx.id(), depth = stack.len(), "Context exited");
        });
    }
}

/// Make `ctx` the current context of the calling coroutine.
pub fn enter(ctx: &RequestContext) -> ContextGuard {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(ctx.clone());
        debug!(request_id = %ctx.id(), depth = stack.len(), "Context entered");
    });
    ContextGuard {
        ctx: ctx.clone(),
        _not_send: PhantomData,
    }
}

/// The innermost active context of the calling coroutine.
///
/// # Errors
///
/// [`ContextError::NotInitialized`] outside of any request.
pub fn current() -> Result<RequestContext, ContextError> {
    STACK.with(|stack| stack.borrow().last().cloned().ok_or(ContextError::NotInitialized))
}

/// Number of contexts active on the calling coroutine.
#[must_use]
pub fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}
