//! Object dispatch: resolving path segments against a controller tree.
//!
//! Per request a controller goes through exactly three steps: find the
//! member named by the head segment, validate the handler's contract against
//! the remaining segments and the request, then serve it. A member that is
//! itself a dispatcher receives the remaining segments and repeats the same
//! steps.

use crate::action::{Action, Arguments, FormGuard, HandlerMeta};
use crate::context::RequestContext;
use crate::status::{HandlerError, HandlerResult, HttpStatus};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Anything that can answer a request given the remaining path segments.
///
/// Implementations are built once at startup and shared read-only between
/// requests.
pub trait Dispatch: Send + Sync {
    /// Resolve and invoke a handler for `segments`.
    ///
    /// # Errors
    ///
    /// HTTP conditions (`404`, `405`, ...) for routing failures and whatever
    /// the invoked handler fails with.
    fn dispatch(&self, ctx: &RequestContext, segments: &[String]) -> HandlerResult;
}

impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    fn dispatch(&self, ctx: &RequestContext, segments: &[String]) -> HandlerResult {
        (**self).dispatch(ctx, segments)
    }
}

/// A named entry of a controller.
#[derive(Clone)]
pub enum Member {
    /// A handler with dispatch metadata
    Action(Action),
    /// A nested dispatcher; receives the remaining segments
    Controller(Arc<dyn Dispatch>),
    /// A name that exists on the controller but is not dispatchable
    Opaque,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Action(action) => f.debug_tuple("Action").field(action.meta()).finish(),
            Member::Controller(_) => f.write_str("Controller(..)"),
            Member::Opaque => f.write_str("Opaque"),
        }
    }
}

/// Name → member table shared by the controller flavours.
#[derive(Clone, Default)]
pub(crate) struct Members {
    entries: Vec<(String, Member)>,
}

impl Members {
    pub(crate) fn insert(&mut self, name: &str, member: Member) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = member,
            None => self.entries.push((name.to_string(), member)),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Member> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, m)| m)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// A node of the routing tree.
///
/// The head segment selects a member by name; when it names nothing (or
/// there is no segment) the default action, `index`, receives all
/// segments.
///
/// ```rust
/// use brrtweb::action;
/// use brrtweb::body::Body;
/// use brrtweb::dispatcher::Controller;
///
/// let root = Controller::new()
///     .action("index", action::text().params(2).handler(|_ctx, args| {
///         Ok(Body::from(format!("{}, {}", &args[0], &args[1])))
///     }))
///     .mount("admin", Controller::new().action("index", action::text().handler(|_, _| {
///         Ok(Body::from("admin"))
///     })));
/// assert!(root.member("admin").is_some());
/// ```
#[derive(Clone)]
pub struct Controller {
    members: Members,
    default_action: String,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: Members::default(),
            default_action: "index".to_string(),
        }
    }

    /// Register an action under `name`.
    #[must_use]
    pub fn action(mut self, name: &str, action: Action) -> Self {
        self.members.insert(name, Member::Action(action));
        self
    }

    /// Mount a child dispatcher under `name`.
    #[must_use]
    pub fn mount<D: Dispatch + 'static>(mut self, name: &str, child: D) -> Self {
        self.members.insert(name, Member::Controller(Arc::new(child)));
        self
    }

    /// Declare a name that is not dispatchable; requests to it get `404`.
    #[must_use]
    pub fn opaque(mut self, name: &str) -> Self {
        self.members.insert(name, Member::Opaque);
        self
    }

    /// Name of the member that handles requests no member name matches.
    #[must_use]
    pub fn default_action(mut self, name: &str) -> Self {
        self.default_action = name.to_string();
        self
    }

    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.names()
    }

    fn find_handler<'a>(&'a self, segments: &'a [String]) -> (Option<&'a Member>, &'a [String]) {
        match segments.split_first() {
            Some((head, tail)) if self.members.get(head).is_some() => (self.members.get(head), tail),
            _ => (self.members.get(&self.default_action), segments),
        }
    }
}

impl Dispatch for Controller {
    fn dispatch(&self, ctx: &RequestContext, segments: &[String]) -> HandlerResult {
        let (member, remaining) = self.find_handler(segments);
        debug!(
            request_id = %ctx.id(),
            segments = ?segments,
            remaining = remaining.len(),
            found = member.is_some(),
            "Controller resolved member"
        );
        invoke(ctx, member, remaining)
    }
}

/// Run a resolved member: descend into a child dispatcher, or validate and
/// serve an action.
pub(crate) fn invoke(ctx: &RequestContext, member: Option<&Member>, remaining: &[String]) -> HandlerResult {
    match member {
        Some(Member::Controller(child)) => child.dispatch(ctx, remaining),
        Some(Member::Action(action)) => {
            validate_handler(ctx, action.meta(), remaining)?;
            serve_handler(ctx, action, remaining.to_vec())
        }
        Some(Member::Opaque) | None => Err(HttpStatus::not_found().into()),
    }
}

fn form_is_empty(form: &Value) -> bool {
    match form {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Check an action's contract against the request.
///
/// # Errors
///
/// `404` on arity mismatch, `405` on a disallowed verb, the configured
/// status when a form guard is violated.
pub fn validate_handler(ctx: &RequestContext, meta: &HandlerMeta, remaining: &[String]) -> Result<(), HttpStatus> {
    if !meta.accepts(remaining.len()) {
        debug!(
            request_id = %ctx.id(),
            given = remaining.len(),
            min = meta.min_args,
            max = ?meta.max_args,
            "Arity mismatch"
        );
        return Err(HttpStatus::not_found());
    }

    if !meta.verbs.allows(ctx.method()) {
        return Err(HttpStatus::method_not_allowed());
    }

    let guarded = meta.prevent_empty_form != FormGuard::Off
        || meta.prevent_form != FormGuard::Off
        || meta.form_whitelist.is_some();
    if !guarded {
        return Ok(());
    }

    let form = ctx.form()?;
    let form = form.borrow();
    let empty = form_is_empty(&form);
    meta.prevent_empty_form.check(empty, || {
        HttpStatus::bad_request().with_info("Empty form is not allowed")
    })?;
    meta.prevent_form.check(!empty, || {
        HttpStatus::bad_request().with_info("Form is not allowed")
    })?;
    if let (Some(whitelist), Value::Object(fields)) = (&meta.form_whitelist, &*form) {
        if let Some(field) = fields.keys().find(|k| !whitelist.fields.contains(k)) {
            return Err(whitelist.failure(field));
        }
    }
    Ok(())
}

/// Apply an action's response metadata, bind its keyword parameters and
/// invoke it.
///
/// # Errors
///
/// Whatever the handler fails with; an argument-binding failure becomes
/// `404`.
pub fn serve_handler(ctx: &RequestContext, action: &Action, positional: Vec<String>) -> HandlerResult {
    let meta = action.meta();
    ctx.set_response_encoding(meta.encoding.as_deref());
    ctx.set_response_content_type(meta.content_type.as_deref());

    let keywords = if meta.keywords.is_empty() {
        Vec::new()
    } else {
        let query = ctx.query();
        let query = query.borrow();
        meta.keywords
            .iter()
            .map(|(name, default)| {
                let value = query.get(name).cloned().unwrap_or_else(|| default.clone());
                (name.clone(), value)
            })
            .collect()
    };

    let args = Arguments::new(positional, keywords);
    match action.call(ctx, &args) {
        Err(HandlerError::Argument(detail)) => {
            debug!(request_id = %ctx.id(), detail = %detail, "Argument binding failed");
            Err(HttpStatus::not_found().into())
        }
        other => other,
    }
}
