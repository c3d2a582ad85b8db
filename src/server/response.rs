use crate::application::Hooks;
use crate::body::{Chunk, ChunkStream};
use crate::context::{ContextGuard, RequestContext};
use crate::status::HandlerError;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// A response whose status line and headers are committed.
///
/// The body is pulled chunk by chunk through [`Response::into_body`] (or
/// [`Response::collect`]); the request context stays current until the
/// body is exhausted or dropped, and the `end_response` hook runs exactly
/// once at that point.
pub struct Response {
    status: String,
    headers: Vec<(String, String)>,
    body: ResponseBody,
}

impl Response {
    pub(crate) fn new(status: String, headers: Vec<(String, String)>, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Status line, e.g. `200 OK`.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Numeric status code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status
            .split_whitespace()
            .next()
            .and_then(|code| code.parse().ok())
            .unwrap_or(500)
    }

    /// Reason text of the status line.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.status.split_once(' ').map_or("", |(_, reason)| reason)
    }

    /// Headers in emission order; names keep the case they were set with.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers named `name` (case-insensitive).
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Drain the body into one buffer.
    ///
    /// # Errors
    ///
    /// The failure that interrupted the stream, after any diagnostic chunk
    /// already produced has been appended.
    pub fn collect(self) -> Result<Vec<u8>, (Vec<u8>, HandlerError)> {
        let mut out = Vec::new();
        for chunk in self.body {
            match chunk {
                Ok(bytes) => out.extend(bytes),
                Err(err) => return Err((out, err)),
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Encoded body chunks of a committed response.
///
/// A failure after the first chunk cannot change the status any more: it is
/// logged, followed by its message as a diagnostic chunk in debug mode, and
/// then yielded as the final `Err` item.
pub struct ResponseBody {
    ctx: RequestContext,
    first: Option<Chunk>,
    rest: Option<ChunkStream>,
    failure: Option<HandlerError>,
    hooks: Arc<dyn Hooks>,
    guard: Option<ContextGuard>,
}

impl ResponseBody {
    pub(crate) fn new(
        ctx: RequestContext,
        first: Option<Chunk>,
        rest: Option<ChunkStream>,
        hooks: Arc<dyn Hooks>,
        guard: ContextGuard,
    ) -> Self {
        Self {
            ctx,
            first,
            rest,
            failure: None,
            hooks,
            guard: Some(guard),
        }
    }

    /// A body that is already finished; hooks run immediately.
    pub(crate) fn finished(ctx: RequestContext, hooks: Arc<dyn Hooks>, guard: ContextGuard) -> Self {
        let mut body = Self::new(ctx, None, None, hooks, guard);
        body.finish();
        body
    }

    /// Run `end_response` and exit the context, once.
    fn finish(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.rest = None;
            self.hooks.end_response(&self.ctx);
            debug!(request_id = %self.ctx.id(), "Response finished");
            drop(guard);
        }
    }

    fn fail(&mut self, err: HandlerError) -> Option<Result<Vec<u8>, HandlerError>> {
        error!(request_id = %self.ctx.id(), error = %err, "Exception while serving the response");
        self.rest = None;
        if self.ctx.debug() {
            let diagnostic = err.to_string().into_bytes();
            self.failure = Some(err);
            return Some(Ok(diagnostic));
        }
        self.finish();
        Some(Err(err))
    }
}

impl Iterator for ResponseBody {
    type Item = Result<Vec<u8>, HandlerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.failure.take() {
            self.finish();
            return Some(Err(err));
        }
        if let Some(chunk) = self.first.take() {
            return match self.ctx.encode_response(chunk) {
                Ok(bytes) => Some(Ok(bytes)),
                Err(err) => self.fail(err),
            };
        }
        let next = match self.rest.as_mut() {
            Some(stream) => stream.next(),
            None => None,
        };
        match next {
            Some(Ok(chunk)) => match self.ctx.encode_response(chunk) {
                Ok(bytes) => Some(Ok(bytes)),
                Err(err) => self.fail(err),
            },
            Some(Err(err)) => self.fail(err),
            None => {
                self.finish();
                None
            }
        }
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.finish();
    }
}
