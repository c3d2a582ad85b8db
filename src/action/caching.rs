use super::HandlerFn;
use crate::body::Body;
use crate::context::RequestContext;
use crate::status::HttpStatus;
use std::fmt;
use std::sync::Arc;

/// Entity tag used by the `etag`/`ifmatch` wrappers.
#[derive(Clone)]
pub enum Tag {
    /// A fixed tag
    Literal(String),
    /// Evaluated on every request; `None` skips the check
    Dynamic(Arc<dyn Fn() -> Option<String> + Send + Sync>),
    /// Derived from the handler's result, so the handler always runs. It sees
    /// the body after JSON or chunked wrapping; `None` skips the check
    FromBody(Arc<dyn Fn(&Body) -> Option<String> + Send + Sync>),
}

impl Tag {
    /// A tag computed per request.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Tag::Dynamic(Arc::new(f))
    }

    /// A tag read from the body the handler returned.
    pub fn from_body<F>(f: F) -> Self
    where
        F: Fn(&Body) -> Option<String> + Send + Sync + 'static,
    {
        Tag::FromBody(Arc::new(f))
    }

    /// The tag known before invocation.
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        match self {
            Tag::Literal(tag) => Some(tag.clone()),
            Tag::Dynamic(f) => f(),
            Tag::FromBody(_) => None,
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Literal(tag) => f.debug_tuple("Literal").field(tag).finish(),
            Tag::Dynamic(_) => f.write_str("Dynamic(..)"),
            Tag::FromBody(_) => f.write_str("FromBody(..)"),
        }
    }
}

impl From<&str> for Tag {
    fn from(tag: &str) -> Self {
        Tag::Literal(tag.to_string())
    }
}

impl From<String> for Tag {
    fn from(tag: String) -> Self {
        Tag::Literal(tag)
    }
}

impl From<u64> for Tag {
    fn from(tag: u64) -> Self {
        Tag::Literal(tag.to_string())
    }
}

type Check = fn(&RequestContext, &str) -> Result<(), HttpStatus>;

fn wrap_check(inner: HandlerFn, tag: Tag, check: Check) -> HandlerFn {
    Arc::new(move |ctx, args| {
        if let Tag::FromBody(derive) = &tag {
            let body = inner(ctx, args)?;
            if let Some(tag) = derive(&body) {
                check(ctx, &tag)?;
            }
            return Ok(body);
        }
        if let Some(tag) = tag.resolve() {
            check(ctx, &tag)?;
        }
        inner(ctx, args)
    })
}

pub(super) fn wrap_etag(inner: HandlerFn, tag: Tag) -> HandlerFn {
    wrap_check(inner, tag, RequestContext::etag_none_match)
}

pub(super) fn wrap_ifmatch(inner: HandlerFn, tag: Tag) -> HandlerFn {
    wrap_check(inner, tag, RequestContext::etag_match)
}
