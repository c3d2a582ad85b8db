//! # Actions
//!
//! An [`Action`] is a handler closure plus its [`HandlerMeta`]: allowed verbs,
//! response encoding and content type, the number of path segments it
//! accepts, the query parameters bound to it by name, and the form guards
//! dispatch enforces before calling it.
//!
//! Metadata is built once, when the controller tree is assembled, and never
//! changes afterwards.
//!
//! ```rust
//! use brrtweb::action::{self, Action};
//! use brrtweb::body::Body;
//!
//! // index(a, b)
//! let index: Action = action::text()
//!     .params(2)
//!     .handler(|_ctx, args| Ok(Body::from(format!("{}, {}", args[0], args[1]))));
//! assert_eq!(index.meta().min_args, 2);
//! assert_eq!(index.meta().max_args, Some(2));
//!
//! // search(*, q=None) restricted to GET
//! let search = action::json()
//!     .verbs(["get"])
//!     .keyword("q", serde_json::Value::Null)
//!     .handler(|_ctx, args| Ok(args.keyword("q").cloned().unwrap_or_default().into()));
//! assert!(search.meta().verbs.allows("get"));
//! assert!(!search.meta().verbs.allows("put"));
//! ```

mod caching;
mod chunked;

pub use caching::Tag;
pub use chunked::ChunkedFraming;

use crate::body::Body;
use crate::context::RequestContext;
use crate::status::{HandlerError, HandlerResult, HttpStatus};
use crate::validator::RequestValidator;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::ops::Index;
use std::str::FromStr;
use std::sync::Arc;

/// Handler closure: receives the context and its bound arguments.
pub type HandlerFn = Arc<dyn Fn(&RequestContext, &Arguments) -> HandlerResult + Send + Sync>;

/// Positional path segments and keyword parameters bound to one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    positional: Vec<String>,
    keywords: Vec<(String, Value)>,
}

impl Arguments {
    #[must_use]
    pub fn new(positional: Vec<String>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    /// Positional arguments only.
    #[must_use]
    pub fn positional_only<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self::new(segments.into_iter().map(Into::into).collect(), Vec::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    #[must_use]
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// Convert a positional argument.
    ///
    /// # Errors
    ///
    /// `404 Not Found` when the argument is missing or does not convert: a
    /// URL segment that is not of the expected type names nothing.
    pub fn parse<T: FromStr>(&self, index: usize) -> Result<T, HttpStatus> {
        self.get(index)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(HttpStatus::not_found)
    }

    /// Convert an optional positional argument; `None` when absent.
    ///
    /// # Errors
    ///
    /// `404 Not Found` when present but not convertible.
    pub fn parse_opt<T: FromStr>(&self, index: usize) -> Result<Option<T>, HttpStatus> {
        match self.get(index) {
            Some(raw) => raw.parse().map(Some).map_err(|_| HttpStatus::not_found()),
            None => Ok(None),
        }
    }

    /// A keyword parameter (query value, or its declared default).
    #[must_use]
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// A keyword parameter as a string, when it is one.
    #[must_use]
    pub fn keyword_str(&self, name: &str) -> Option<&str> {
        self.keyword(name).and_then(Value::as_str)
    }

    pub fn keywords(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keywords.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Index<usize> for Arguments {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.positional[index]
    }
}

/// HTTP methods an action answers to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Verbs {
    #[default]
    Any,
    /// Lower-cased method names
    Only(Vec<String>),
}

impl Verbs {
    /// Whether `method` (lower-cased) is accepted.
    #[must_use]
    pub fn allows(&self, method: &str) -> bool {
        match self {
            Verbs::Any => true,
            Verbs::Only(verbs) => verbs.iter().any(|v| v == "any" || v == method),
        }
    }
}

/// Form policy checked by dispatch before an action runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormGuard {
    #[default]
    Off,
    /// Reject with the default status
    Reject,
    /// Reject with a custom `"CODE text"` status
    RejectWith(String),
}

impl FormGuard {
    fn failure(&self, default: fn() -> HttpStatus) -> Option<HttpStatus> {
        match self {
            FormGuard::Off => None,
            FormGuard::Reject => Some(default()),
            FormGuard::RejectWith(line) => Some(HttpStatus::custom(line)),
        }
    }

    pub(crate) fn check(&self, violated: bool, default: fn() -> HttpStatus) -> Result<(), HttpStatus> {
        match self.failure(default) {
            Some(status) if violated => Err(status),
            _ => Ok(()),
        }
    }
}

/// Allowed form field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWhitelist {
    pub fields: Vec<String>,
    /// Custom `"CODE text"` status; `400 Bad Request` otherwise
    pub status: Option<String>,
}

impl FieldWhitelist {
    pub(crate) fn failure(&self, field: &str) -> HttpStatus {
        let status = match &self.status {
            Some(line) => HttpStatus::custom(line),
            None => HttpStatus::bad_request(),
        };
        status.with_info(format!("Invalid field: {field}"))
    }
}

/// Dispatch contract of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerMeta {
    pub verbs: Verbs,
    /// Response encoding; `None` sends raw bytes
    pub encoding: Option<String>,
    /// Response content type; `None` removes the header
    pub content_type: Option<String>,
    /// Required positional segments
    pub min_args: usize,
    /// Maximum positional segments; `None` is unlimited
    pub max_args: Option<usize>,
    /// Query-bound parameters with their defaults, in declaration order
    pub keywords: Vec<(String, Value)>,
    /// Declared acceptance of arbitrary keyword parameters. Recorded only:
    /// undeclared query keys are never bound.
    pub variadic_keywords: bool,
    pub prevent_empty_form: FormGuard,
    pub prevent_form: FormGuard,
    pub form_whitelist: Option<FieldWhitelist>,
}

impl HandlerMeta {
    /// Whether `count` positional segments are within the arity bounds.
    #[must_use]
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }
}

/// A dispatchable handler.
#[derive(Clone)]
pub struct Action {
    meta: Arc<HandlerMeta>,
    handler: HandlerFn,
}

impl Action {
    /// Start building an action with default metadata.
    #[must_use]
    pub fn builder() -> ActionBuilder {
        ActionBuilder::new()
    }

    #[must_use]
    pub fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    /// Invoke the handler.
    ///
    /// # Errors
    ///
    /// Whatever the handler returns.
    pub fn call(&self, ctx: &RequestContext, args: &Arguments) -> HandlerResult {
        (self.handler)(ctx, args)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("meta", &self.meta).finish_non_exhaustive()
    }
}

/// Builder for [`Action`].
///
/// Wrappers run in a fixed order regardless of the order the builder
/// methods are called in, outermost first: validation, `etag`/`ifmatch`,
/// chunked framing, JSON serialization, the handler.
#[derive(Clone)]
pub struct ActionBuilder {
    verbs: Verbs,
    encoding: Option<String>,
    content_type: Option<String>,
    required: usize,
    optional: usize,
    variadic: bool,
    keywords: Vec<(String, Value)>,
    variadic_keywords: bool,
    prevent_empty_form: FormGuard,
    prevent_form: FormGuard,
    form_whitelist: Option<FieldWhitelist>,
    jsonify: bool,
    chunked: Option<Option<(String, Option<String>)>>,
    etag: Option<Tag>,
    ifmatch: Option<Tag>,
    validator: Option<Arc<RequestValidator>>,
}

impl Default for ActionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            verbs: Verbs::Any,
            encoding: Some("utf-8".to_string()),
            content_type: None,
            required: 0,
            optional: 0,
            variadic: false,
            keywords: Vec::new(),
            variadic_keywords: false,
            prevent_empty_form: FormGuard::Off,
            prevent_form: FormGuard::Off,
            form_whitelist: None,
            jsonify: false,
            chunked: None,
            etag: None,
            ifmatch: None,
            validator: None,
        }
    }

    /// Restrict to these methods (any case). `"any"` accepts everything.
    #[must_use]
    pub fn verbs<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let verbs: Vec<String> = verbs
            .into_iter()
            .map(|v| v.as_ref().to_ascii_lowercase())
            .collect();
        self.verbs = if verbs.iter().any(|v| v == "any") {
            Verbs::Any
        } else {
            Verbs::Only(verbs)
        };
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: Option<&str>) -> Self {
        self.encoding = encoding.map(str::to_string);
        self
    }

    #[must_use]
    pub fn content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(str::to_string);
        self
    }

    /// Number of required positional segments.
    #[must_use]
    pub fn params(mut self, count: usize) -> Self {
        self.required = count;
        self
    }

    /// Number of optional positional segments after the required ones.
    #[must_use]
    pub fn optional(mut self, count: usize) -> Self {
        self.optional = count;
        self
    }

    /// Accept any number of extra positional segments.
    #[must_use]
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Bind a query parameter by name, with a default when absent.
    #[must_use]
    pub fn keyword(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.keywords.push((name.to_string(), default.into()));
        self
    }

    /// Declare acceptance of arbitrary keyword parameters.
    #[must_use]
    pub fn variadic_keywords(mut self) -> Self {
        self.variadic_keywords = true;
        self
    }

    /// Reject requests whose form is empty.
    #[must_use]
    pub fn prevent_empty_form(mut self, status: Option<&str>) -> Self {
        self.prevent_empty_form = status.map_or(FormGuard::Reject, |s| FormGuard::RejectWith(s.to_string()));
        self
    }

    /// Reject requests that carry any form field.
    #[must_use]
    pub fn prevent_form(mut self, status: Option<&str>) -> Self {
        self.prevent_form = status.map_or(FormGuard::Reject, |s| FormGuard::RejectWith(s.to_string()));
        self
    }

    /// Reject form fields outside `fields`.
    #[must_use]
    pub fn form_whitelist<I, S>(mut self, fields: I, status: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.form_whitelist = Some(FieldWhitelist {
            fields: fields.into_iter().map(Into::into).collect(),
            status: status.map(str::to_string),
        });
        self
    }

    /// Serialize the handler's return value as JSON.
    ///
    /// Accepted at the top level: arrays, objects, strings, integers and
    /// booleans (treated as integers). Floats, `null` and byte or chunk
    /// bodies are internal errors; nested values are unrestricted.
    #[must_use]
    pub fn jsonify(mut self) -> Self {
        self.jsonify = true;
        self
    }

    /// Frame the body with chunked transfer encoding, optionally announcing
    /// and sending a trailer.
    #[must_use]
    pub fn chunked(mut self, trailer: Option<(&str, Option<&str>)>) -> Self {
        self.chunked = Some(trailer.map(|(field, value)| (field.to_string(), value.map(str::to_string))));
        self
    }

    /// Answer `304` when `If-None-Match` matches the tag; announce the tag
    /// otherwise.
    #[must_use]
    pub fn etag(mut self, tag: impl Into<Tag>) -> Self {
        self.etag = Some(tag.into());
        self
    }

    /// Require `If-Match` to match the tag (`412` otherwise).
    #[must_use]
    pub fn ifmatch(mut self, tag: impl Into<Tag>) -> Self {
        self.ifmatch = Some(tag.into());
        self
    }

    /// Validate the form and query before the handler runs.
    #[must_use]
    pub fn validate(mut self, validator: RequestValidator) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    fn meta(&self) -> HandlerMeta {
        HandlerMeta {
            verbs: self.verbs.clone(),
            encoding: self.encoding.clone(),
            content_type: self.content_type.clone(),
            min_args: self.required,
            max_args: (!self.variadic).then_some(self.required + self.optional),
            keywords: self.keywords.clone(),
            variadic_keywords: self.variadic_keywords,
            prevent_empty_form: self.prevent_empty_form.clone(),
            prevent_form: self.prevent_form.clone(),
            form_whitelist: self.form_whitelist.clone(),
        }
    }

    /// Finish with the handler closure.
    pub fn handler<F>(self, f: F) -> Action
    where
        F: Fn(&RequestContext, &Arguments) -> HandlerResult + Send + Sync + 'static,
    {
        let meta = Arc::new(self.meta());
        let mut handler: HandlerFn = Arc::new(f);

        if self.jsonify {
            handler = jsonify(handler);
        }
        if let Some(trailer) = self.chunked {
            handler = chunked::wrap(handler, trailer);
        }
        if let Some(tag) = self.etag {
            handler = caching::wrap_etag(handler, tag);
        }
        if let Some(tag) = self.ifmatch {
            handler = caching::wrap_ifmatch(handler, tag);
        }
        if let Some(validator) = self.validator {
            handler = Arc::new(move |ctx, args| {
                validator.validate_context(ctx)?;
                handler(ctx, args)
            });
        }
        Action { meta, handler }
    }

    /// Finish with a closure returning any serializable value; the value is
    /// converted to JSON before the JSON wrapper renders it.
    pub fn serialize<T, F>(self, f: F) -> Action
    where
        T: Serialize,
        F: Fn(&RequestContext, &Arguments) -> Result<T, HandlerError> + Send + Sync + 'static,
    {
        self.jsonify().handler(move |ctx, args| {
            let value = serde_json::to_value(f(ctx, args)?)?;
            Ok(Body::Value(value))
        })
    }
}

fn jsonify(inner: HandlerFn) -> HandlerFn {
    Arc::new(move |ctx, args| {
        let value = match inner(ctx, args)? {
            Body::Value(Value::Null) | Body::Empty => {
                return Err(HandlerError::internal("Cannot encode to json: null"))
            }
            Body::Value(Value::Number(n)) if n.is_f64() => {
                return Err(HandlerError::internal(format!(
                    "Cannot encode to json: {n} is not an integer"
                )))
            }
            Body::Value(value) => value,
            Body::Text(text) => Value::String(text),
            Body::Bytes(_) | Body::Stream(_) => {
                return Err(HandlerError::internal(
                    "Cannot encode to json: expected a value, got a byte or chunk stream",
                ))
            }
        };
        Ok(Body::Text(serde_json::to_string_pretty(&value)?))
    })
}

/// Action with no fixed content type (the header is removed).
#[must_use]
pub fn action() -> ActionBuilder {
    ActionBuilder::new()
}

/// `text/html` action.
#[must_use]
pub fn html() -> ActionBuilder {
    ActionBuilder::new().content_type(Some("text/html"))
}

/// `text/plain` action.
#[must_use]
pub fn text() -> ActionBuilder {
    ActionBuilder::new().content_type(Some("text/plain"))
}

/// `application/json` action whose return value is serialized.
#[must_use]
pub fn json() -> ActionBuilder {
    ActionBuilder::new()
        .content_type(Some("application/json"))
        .jsonify()
}

/// `application/xml` action.
#[must_use]
pub fn xml() -> ActionBuilder {
    ActionBuilder::new().content_type(Some("application/xml"))
}

/// `application/octet-stream` action that sends raw bytes.
#[must_use]
pub fn binary() -> ActionBuilder {
    ActionBuilder::new()
        .content_type(Some("application/octet-stream"))
        .encoding(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::server::request::RawRequest;
    use serde_json::json;

    fn ctx() -> RequestContext {
        RequestContext::with_settings(RawRequest::new("GET", "/"), Arc::new(Settings::default()))
    }

    fn text_of(body: Body) -> String {
        match body {
            Body::Text(s) => s,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_arity_from_builder() {
        let fixed = action().params(1).optional(1).handler(|_, _| Ok(Body::Empty));
        assert_eq!(fixed.meta().min_args, 1);
        assert_eq!(fixed.meta().max_args, Some(2));
        assert!(!fixed.meta().accepts(0));
        assert!(fixed.meta().accepts(2));
        assert!(!fixed.meta().accepts(3));

        let open = action().params(1).variadic().handler(|_, _| Ok(Body::Empty));
        assert_eq!(open.meta().max_args, None);
        assert!(open.meta().accepts(10));
    }

    #[test]
    fn test_verbs_normalized() {
        let a = action().verbs(["GET", "Post"]).handler(|_, _| Ok(Body::Empty));
        assert!(a.meta().verbs.allows("get"));
        assert!(a.meta().verbs.allows("post"));
        assert!(!a.meta().verbs.allows("put"));
        let any = action().verbs(["any"]).handler(|_, _| Ok(Body::Empty));
        assert_eq!(any.meta().verbs, Verbs::Any);
    }

    #[test]
    fn test_presets() {
        assert_eq!(action().meta().content_type, None);
        assert_eq!(action().meta().encoding.as_deref(), Some("utf-8"));
        assert_eq!(html().meta().content_type.as_deref(), Some("text/html"));
        assert_eq!(xml().meta().content_type.as_deref(), Some("application/xml"));
        let bin = binary().meta();
        assert_eq!(bin.encoding, None);
        assert_eq!(bin.content_type.as_deref(), Some("application/octet-stream"));
    }

    #[test]
    fn test_json_serializes_values() {
        let a = json().handler(|_, _| Ok(Body::Value(json!({"a": 1}))));
        let out = text_of(a.call(&ctx(), &Arguments::default()).unwrap());
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({"a": 1}));

        let s = json().handler(|_, _| Ok(Body::from("hi")));
        assert_eq!(text_of(s.call(&ctx(), &Arguments::default()).unwrap()), "\"hi\"");
    }

    #[test]
    fn test_json_rejects_null() {
        let a = json().handler(|_, _| Ok(Body::Value(Value::Null)));
        assert!(matches!(
            a.call(&ctx(), &Arguments::default()),
            Err(HandlerError::Internal(_))
        ));
    }

    #[test]
    fn test_json_top_level_scalars() {
        let float = json().handler(|_, _| Ok(Body::Value(json!(1.5))));
        assert!(matches!(
            float.call(&ctx(), &Arguments::default()),
            Err(HandlerError::Internal(_))
        ));

        let int = json().handler(|_, _| Ok(Body::Value(json!(7))));
        assert_eq!(text_of(int.call(&ctx(), &Arguments::default()).unwrap()), "7");
        let flag = json().handler(|_, _| Ok(Body::Value(json!(true))));
        assert_eq!(text_of(flag.call(&ctx(), &Arguments::default()).unwrap()), "true");
        // floats nested in containers are fine
        let nested = json().handler(|_, _| Ok(Body::Value(json!([0.5]))));
        assert!(nested.call(&ctx(), &Arguments::default()).is_ok());
    }

    #[test]
    fn test_serialize_struct() {
        #[derive(Serialize)]
        struct Pet {
            name: &'static str,
        }
        let a = json().serialize(|_, _| Ok(Pet { name: "rex" }));
        let out = text_of(a.call(&ctx(), &Arguments::default()).unwrap());
        assert!(out.contains("\"rex\""));
    }

    #[test]
    fn test_arguments_parse() {
        let args = Arguments::positional_only(["12", "abc"]);
        assert_eq!(args.parse::<u32>(0).unwrap(), 12);
        assert_eq!(args.parse::<u32>(1).unwrap_err().code(), 404);
        assert_eq!(args.parse::<u32>(5).unwrap_err().code(), 404);
        assert_eq!(args.parse_opt::<u32>(5).unwrap(), None);
        assert_eq!(&args[1], "abc");
    }

    #[test]
    fn test_form_guard_statuses() {
        assert!(FormGuard::Off.check(true, HttpStatus::bad_request).is_ok());
        assert!(FormGuard::Reject.check(false, HttpStatus::bad_request).is_ok());
        assert_eq!(
            FormGuard::Reject
                .check(true, HttpStatus::bad_request)
                .unwrap_err()
                .code(),
            400
        );
        let custom = FormGuard::RejectWith("777 Form Not Allowed".into())
            .check(true, HttpStatus::bad_request)
            .unwrap_err();
        assert_eq!(custom.status_line(), "777 Form Not Allowed");
    }
}
