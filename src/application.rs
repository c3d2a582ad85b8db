//! # Application
//!
//! The response pipeline: one [`Application::handle`] call turns a
//! [`RawRequest`] into a committed [`Response`].
//!
//! ## Request Flow
//!
//! 1. A fresh [`RequestContext`] is created and entered
//! 2. [`Hooks::begin_request`] runs
//! 3. One trailing slash is stripped and the path split into segments
//! 4. The root dispatcher produces a [`crate::body::Body`]
//! 5. The body is normalized into a chunk stream and its first chunk pulled
//!    eagerly, so a failure there still decides the status line
//! 6. HTTP conditions are rendered; anything else is logged and returned as
//!    an [`UnhandledError`]
//! 7. [`Hooks::begin_response`] runs, cookies become `Set-Cookie` headers,
//!    and the status and headers are committed
//! 8. The remaining chunks are encoded lazily while the caller pulls them
//! 9. [`Hooks::end_response`] runs and the context is exited, exactly once,
//!    on every path
//!
//! Statuses without a body (`204` and `304` by default) drop the
//! `Content-Type` header and skip streaming entirely.

use crate::body::{Chunk, ChunkStream};
use crate::config::Settings;
use crate::context::{self, RequestContext};
use crate::dispatcher::Dispatch;
use crate::server::request::RawRequest;
use crate::server::response::{Response, ResponseBody};
use crate::status::{HandlerError, HttpStatus};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle callbacks of an [`Application`]. Every method defaults to a
/// no-op.
pub trait Hooks: Send + Sync {
    /// Called once, when the application is created.
    fn app_init(&self) {}

    /// Called after the context is entered, before dispatch. A failure is
    /// handled exactly like a handler failure.
    ///
    /// # Errors
    ///
    /// Any [`HandlerError`]; HTTP conditions become the response.
    fn begin_request(&self, _ctx: &RequestContext) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called once the status is known, before headers are committed.
    fn begin_response(&self, _ctx: &RequestContext) {}

    /// Called when the response is finished or abandoned.
    fn end_response(&self, _ctx: &RequestContext) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}

/// An unrecognized failure that escaped before headers were committed.
///
/// The context is already exited and `end_response` has run. A transport
/// can still answer with [`UnhandledError::status`], a generic `500` whose
/// detail depends on debug mode.
#[derive(Debug)]
pub struct UnhandledError {
    pub error: HandlerError,
    pub status: HttpStatus,
}

impl UnhandledError {
    /// Rendered body for the generic `500` response.
    #[must_use]
    pub fn body(&self) -> String {
        format!("{}\n{}", self.status.text(), self.status.info().unwrap_or(""))
    }
}

impl fmt::Display for UnhandledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unhandled error: {}", self.error)
    }
}

impl std::error::Error for UnhandledError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// The request/response cycle around a root dispatcher.
#[derive(Clone)]
pub struct Application {
    root: Arc<dyn Dispatch>,
    hooks: Arc<dyn Hooks>,
    settings: Option<Arc<Settings>>,
    no_body_statuses: Vec<u16>,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("settings", &self.settings)
            .field("no_body_statuses", &self.no_body_statuses)
            .finish_non_exhaustive()
    }
}

/// Outcome of everything that happens before headers are committed.
enum Produced {
    Body(Option<Chunk>, Option<ChunkStream>),
    Condition(HttpStatus),
}

impl Application {
    /// An application without hooks.
    pub fn new<D: Dispatch + 'static>(root: D) -> Self {
        Self::with_hooks(root, NoHooks)
    }

    /// An application with lifecycle hooks; `app_init` runs here.
    pub fn with_hooks<D: Dispatch + 'static, H: Hooks + 'static>(root: D, hooks: H) -> Self {
        let app = Self {
            root: Arc::new(root),
            hooks: Arc::new(hooks),
            settings: None,
            no_body_statuses: vec![204, 304],
        };
        app.hooks.app_init();
        app
    }

    /// Pin settings instead of reading the process-wide slot per request.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(Arc::new(settings));
        self
    }

    /// Replace the set of statuses answered without a body.
    #[must_use]
    pub fn no_body_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.no_body_statuses = statuses.into_iter().collect();
        self
    }

    fn context_for(&self, request: RawRequest) -> RequestContext {
        match &self.settings {
            Some(settings) => RequestContext::with_settings(request, Arc::clone(settings)),
            None => RequestContext::new(request),
        }
    }

    /// Run the pipeline for one request.
    ///
    /// # Errors
    ///
    /// [`UnhandledError`] when a failure that is not an HTTP condition
    /// escapes before the first body chunk.
    pub fn handle(&self, request: RawRequest) -> Result<Response, UnhandledError> {
        let started = Instant::now();
        let ctx = self.context_for(request);
        let guard = context::enter(&ctx);

        let (status, first, rest) = match self.produce(&ctx) {
            Ok(Produced::Body(first, rest)) => ("200 OK".to_string(), first, rest),
            Ok(Produced::Condition(status)) => {
                if status.code() >= 500 {
                    warn!(request_id = %ctx.id(), status = %status, "Request failed");
                }
                let rendered = status.render(&ctx);
                (status.status_line(), Some(Chunk::Text(rendered)), None)
            }
            Err(err) => {
                error!(
                    request_id = %ctx.id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    error = ?err,
                    "Internal Server Error"
                );
                let status = match &err {
                    HandlerError::Internal(inner) => HttpStatus::internal_error_for(inner, ctx.debug()),
                    other => HttpStatus::internal_server_error().with_info(other.to_string()),
                };
                self.hooks.end_response(&ctx);
                drop(guard);
                return Err(UnhandledError { error: err, status });
            }
        };

        self.hooks.begin_response(&ctx);

        let code = status.split_whitespace().next().and_then(|c| c.parse::<u16>().ok());
        let no_body = code.is_some_and(|code| self.no_body_statuses.contains(&code));
        if no_body {
            ctx.response_headers_mut().remove("content-type");
        }
        {
            let cookies = ctx.take_response_cookies();
            let mut headers = ctx.response_headers_mut();
            for cookie in cookies {
                headers.add("Set-Cookie", cookie.to_header_value());
            }
        }
        let headers = ctx.response_headers().to_vec();

        info!(
            request_id = %ctx.id(),
            method = %ctx.method(),
            path = %ctx.path(),
            status = %status,
            latency_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );

        let body = if no_body {
            ResponseBody::finished(ctx, Arc::clone(&self.hooks), guard)
        } else {
            ResponseBody::new(ctx, first, rest, Arc::clone(&self.hooks), guard)
        };
        Ok(Response::new(status, headers, body))
    }

    /// Steps 2 to 5: hooks, dispatch, body normalization and the eager
    /// first chunk. HTTP conditions are returned as such.
    fn produce(&self, ctx: &RequestContext) -> Result<Produced, HandlerError> {
        let outcome = self.begin_and_dispatch(ctx);
        match outcome {
            Ok(produced) => Ok(produced),
            Err(HandlerError::Status(status)) => Ok(Produced::Condition(status)),
            Err(HandlerError::Argument(detail)) => {
                debug!(request_id = %ctx.id(), detail = %detail, "Argument binding failed");
                Ok(Produced::Condition(HttpStatus::not_found()))
            }
            Err(err) => Err(err),
        }
    }

    fn begin_and_dispatch(&self, ctx: &RequestContext) -> Result<Produced, HandlerError> {
        self.hooks.begin_request(ctx)?;

        let path = ctx.path();
        let path = path.strip_suffix('/').unwrap_or(&path).to_string();
        ctx.set_path(path.clone());
        let segments = split_segments(&path);
        debug!(request_id = %ctx.id(), method = %ctx.method(), segments = ?segments, "Dispatching");

        let mut stream = self.root.dispatch(ctx, &segments)?.into_chunks()?;
        match stream.next() {
            None => Ok(Produced::Body(None, None)),
            Some(Ok(first)) => Ok(Produced::Body(Some(first), Some(stream))),
            Some(Err(err)) => Err(err),
        }
    }
}

/// Path segments after the leading `/`; an empty path has none.
pub(crate) fn split_segments(path: &str) -> Vec<String> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_segments() {
        assert!(split_segments("").is_empty());
        assert!(split_segments("/").is_empty());
        assert_eq!(split_segments("/1/2"), vec!["1", "2"]);
        assert_eq!(split_segments("/a//b"), vec!["a", "", "b"]);
        assert_eq!(split_segments("/foo/"), vec!["foo", ""]);
    }

    #[test]
    fn test_unhandled_error_body() {
        let err = UnhandledError {
            error: HandlerError::internal("boom"),
            status: HttpStatus::internal_server_error().with_info("detail"),
        };
        assert_eq!(err.body(), "Internal Server Error\ndetail");
        assert!(err.to_string().contains("boom"));
    }
}
