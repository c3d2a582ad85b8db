//! # HTTP Status Conditions
//!
//! Handlers short-circuit normal flow by returning an [`HttpStatus`] as the
//! error of their `Result`. The pipeline turns it into a status line, a small
//! body and any extra headers the condition carries (`Location` for
//! redirects, `X-Reason` for a debugging hint).
//!
//! Anything else a handler fails with is a [`HandlerError::Internal`]: it is
//! logged, rendered as a generic `500` and handed back to the transport.
//!
//! ```rust
//! use brrtweb::status::HttpStatus;
//!
//! let redirect = HttpStatus::found("http://example.com/");
//! assert_eq!(redirect.status_line(), "302 Found");
//! assert_eq!(redirect.header("location"), Some("http://example.com/"));
//!
//! let custom = HttpStatus::custom("600 Custom exception");
//! assert_eq!(custom.code(), 600);
//! ```

use crate::context::RequestContext;
use serde_json::json;
use std::fmt;

/// A recognized HTTP status condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatus {
    code: u16,
    text: String,
    info: Option<String>,
    headers: Vec<(String, String)>,
}

macro_rules! predefined {
    ($($(#[$doc:meta])* $name:ident => $code:expr, $text:expr, $info:expr;)*) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $name() -> Self {
                Self::with_defaults($code, $text, $info)
            }
        )*
    };
}

impl HttpStatus {
    /// A status with the given code and reason text, without info.
    #[must_use]
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            info: None,
            headers: Vec::new(),
        }
    }

    fn with_defaults(code: u16, text: &str, info: &str) -> Self {
        Self {
            code,
            text: text.to_string(),
            info: Some(info.to_string()),
            headers: Vec::new(),
        }
    }

    /// A status for `code` using the canonical reason phrase.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        let text = http::StatusCode::from_u16(code)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status");
        Self::new(code, text)
    }

    /// Parse a `"CODE text"` status line such as `"600 Custom exception"`.
    ///
    /// When the text is missing the canonical reason is used; an unparsable
    /// code yields a `500`.
    #[must_use]
    pub fn custom(status_line: &str) -> Self {
        Self::custom_or(status_line, None)
    }

    /// Like [`HttpStatus::custom`], using `fallback_text` when the line has
    /// no reason text.
    #[must_use]
    pub fn custom_or(status_line: &str, fallback_text: Option<&str>) -> Self {
        let line = status_line.trim();
        let (code, text) = match line.split_once(' ') {
            Some((code, text)) => (code, Some(text.trim())),
            None => (line, None),
        };
        let Ok(code) = code.parse::<u16>() else {
            return Self::internal_server_error().with_info(format!("invalid status line: {line}"));
        };
        let mut status = Self::from_code(code);
        match (text, fallback_text) {
            (Some(text), _) if !text.is_empty() => status.text = text.to_string(),
            (_, Some(fallback)) => status.text = fallback.to_string(),
            _ => {}
        }
        status
    }

    predefined! {
        created => 201, "Created", "";
        accepted => 202, "Accepted", "";
        non_authoritative_information => 203, "Non-Authoritative Information", "";
        no_content => 204, "No Content", "";
        reset_content => 205, "Reset Content", "";
        partial_content => 206, "Partial Content", "";
        /// 304; carries no body.
        not_modified => 304, "Not Modified", "";
        bad_request => 400, "Bad Request", "Bad request syntax or unsupported method";
        unauthorized => 401, "Unauthorized", "No permission -- see authorization schemes";
        forbidden => 403, "Forbidden", "Request forbidden -- authorization will not help";
        not_found => 404, "Not Found", "Nothing matches the given URI";
        method_not_allowed => 405, "Method Not Allowed", "Specified method is invalid for this resource";
        conflict => 409, "Conflict", "Request conflict";
        gone => 410, "Gone", "URI no longer exists and has been permanently removed";
        precondition_failed => 412, "Precondition Failed", "Request cannot be fulfilled";
        internal_server_error => 500, "Internal Server Error", "Server got itself in trouble";
        bad_gateway => 502, "Bad Gateway", "";
    }

    /// `301 Moved Permanently` with a `Location` header.
    #[must_use]
    pub fn moved_permanently(location: &str) -> Self {
        Self::with_defaults(301, "Moved Permanently", "Object moved permanently")
            .with_header("Location", location)
    }

    /// `302 Found` with a `Location` header.
    #[must_use]
    pub fn found(location: &str) -> Self {
        Self::with_defaults(302, "Found", "Object moved temporarily").with_header("Location", location)
    }

    /// Internal error whose info is the error chain in debug mode and a
    /// generic sentence otherwise.
    #[must_use]
    pub fn internal_error_for(error: &anyhow::Error, debug: bool) -> Self {
        let status = Self::internal_server_error();
        if debug {
            status.with_info(format!("{error:?}"))
        } else {
            status
        }
    }

    /// Replace the reason text (the status line uses it).
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Replace the explanatory body text.
    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Attach an `X-Reason` debugging hint.
    #[must_use]
    pub fn with_reason(self, reason: &str) -> Self {
        self.with_header("X-Reason", reason)
    }

    /// Attach an extra response header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        self.code
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    /// `"<code> <text>"`
    #[must_use]
    pub fn status_line(&self) -> String {
        format!("{} {}", self.code, self.text)
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First extra header with this name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Apply the extra headers to the context and produce the body.
    ///
    /// A JSON body is produced when the response content type is already
    /// `application/json`; otherwise the response is switched to UTF-8
    /// `text/plain`.
    pub fn render(&self, ctx: &RequestContext) -> String {
        {
            let mut headers = ctx.response_headers_mut();
            for (name, value) in &self.headers {
                headers.add(name, value.as_str());
            }
        }
        if ctx.response_content_type().as_deref() == Some("application/json") {
            if ctx.response_encoding().is_none() {
                ctx.set_response_encoding(Some("utf-8"));
                ctx.set_response_content_type(Some("application/json"));
            }
            json!({
                "message": self.text,
                "description": self.info,
            })
            .to_string()
        } else {
            ctx.set_response_encoding(Some("utf-8"));
            ctx.set_response_content_type(Some("text/plain"));
            format!("{}\n{}", self.text, self.info.as_deref().unwrap_or(""))
        }
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

impl std::error::Error for HttpStatus {}

/// Error returned by handlers, hooks and dispatchers.
#[derive(Debug)]
pub enum HandlerError {
    /// A recognized HTTP condition; rendered and sent to the client
    Status(HttpStatus),
    /// Handler arguments could not be bound; dispatch reports `404`
    Argument(String),
    /// Anything else; logged and propagated to the transport
    Internal(anyhow::Error),
}

/// Result type for handler bodies.
pub type HandlerResult<T = crate::body::Body> = Result<T, HandlerError>;

impl HandlerError {
    /// The HTTP condition, if this is one.
    #[must_use]
    pub fn as_status(&self) -> Option<&HttpStatus> {
        match self {
            HandlerError::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Build an internal error from a message.
    pub fn internal(message: impl fmt::Display) -> Self {
        HandlerError::Internal(anyhow::anyhow!("{message}"))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Status(status) => write!(f, "{status}"),
            HandlerError::Argument(detail) => write!(f, "argument mismatch: {detail}"),
            HandlerError::Internal(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandlerError::Status(status) => Some(status),
            HandlerError::Argument(_) => None,
            HandlerError::Internal(err) => Some(err.as_ref()),
        }
    }
}

impl From<HttpStatus> for HandlerError {
    fn from(status: HttpStatus) -> Self {
        HandlerError::Status(status)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Internal(err)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        HandlerError::Internal(err.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Internal(err.into())
    }
}
