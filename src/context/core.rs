use super::form::{parse_form, ParsedForm, UploadedFile};
use crate::body::Chunk;
use crate::config::{self, Settings};
use crate::cookies::{HttpCookie, RequestCookies};
use crate::ids::RequestId;
use crate::server::headers::Headers;
use crate::server::request::{parse_query_string, RawRequest};
use crate::status::{HandlerError, HttpStatus};
use once_cell::unsync::OnceCell;
use serde_json::{Map, Value};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Shared, mutable per-request value. Changes made through one handle are
/// seen by every later access on the same context.
pub type Shared<T> = Rc<RefCell<T>>;

/// Per-request state: parsed request facts plus the response in progress.
///
/// Cloning is cheap and yields a handle to the same request. Every lazily
/// parsed field is computed at most once per context.
#[derive(Clone)]
pub struct RequestContext {
    inner: Rc<Inner>,
}

struct Inner {
    id: RequestId,
    settings: Arc<Settings>,
    request: RefCell<RawRequest>,
    path: RefCell<String>,

    method: OnceCell<String>,
    scheme: OnceCell<String>,
    request_uri: OnceCell<String>,
    content_type: OnceCell<Option<String>>,
    content_length: OnceCell<Option<usize>>,
    query: OnceCell<Shared<Map<String, Value>>>,
    form: OnceCell<Result<(Shared<Value>, Rc<[UploadedFile]>), HttpStatus>>,
    cookies: OnceCell<Shared<RequestCookies>>,

    response_headers: RefCell<Headers>,
    response_encoding: RefCell<Option<String>>,
    response_cookies: RefCell<Vec<HttpCookie>>,
}

impl RequestContext {
    /// Create a context using the process-wide settings.
    #[must_use]
    pub fn new(request: RawRequest) -> Self {
        Self::with_settings(request, config::settings())
    }

    /// Create a context with explicit settings.
    #[must_use]
    pub fn with_settings(request: RawRequest, settings: Arc<Settings>) -> Self {
        Self::build(request, settings, OnceCell::new())
    }

    fn build(
        request: RawRequest,
        settings: Arc<Settings>,
        form: OnceCell<Result<(Shared<Value>, Rc<[UploadedFile]>), HttpStatus>>,
    ) -> Self {
        let id = RequestId::from_header_or_new(request.headers.get("x-request-id"));
        let path = request.path.clone();
        Self {
            inner: Rc::new(Inner {
                id,
                settings,
                request: RefCell::new(request),
                path: RefCell::new(path),
                method: OnceCell::new(),
                scheme: OnceCell::new(),
                request_uri: OnceCell::new(),
                content_type: OnceCell::new(),
                content_length: OnceCell::new(),
                query: OnceCell::new(),
                form,
                cookies: OnceCell::new(),
                response_headers: RefCell::new(Headers::new()),
                response_encoding: RefCell::new(None),
                response_cookies: RefCell::new(Vec::new()),
            }),
        }
    }

    /// A context for a sub-request sharing this request's headers, settings
    /// and id, with its own method, target and pre-parsed form.
    ///
    /// Used for batch sub-dispatch, where each operation must see its own
    /// method, path, query and form.
    #[must_use]
    pub fn derive(&self, method: &str, target: &str, form: Value) -> Self {
        let mut request = RawRequest::new(method, target);
        {
            let parent = self.inner.request.borrow();
            request.headers = parent.headers.clone();
            request.scheme = parent.scheme.clone();
            request.host = parent.host.clone();
            request.port = parent.port;
            request.script_name = parent.script_name.clone();
        }
        request.headers.remove("content-length");
        let preset = Ok((Rc::new(RefCell::new(form)), Rc::from(Vec::new())));
        Self::build(
            request,
            Arc::clone(&self.inner.settings),
            OnceCell::with_value(preset),
        )
    }

    /// Whether two handles refer to the same request.
    #[must_use]
    pub fn same(&self, other: &RequestContext) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    /// Settings snapshot taken when the context was created.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.inner.settings.debug
    }

    /// Request method, lower-cased.
    pub fn method(&self) -> &str {
        self.inner
            .method
            .get_or_init(|| self.inner.request.borrow().method.to_ascii_lowercase())
    }

    /// Request path (without the query string).
    #[must_use]
    pub fn path(&self) -> String {
        self.inner.path.borrow().clone()
    }

    /// Rewrite the path seen by dispatch.
    pub fn set_path(&self, path: impl Into<String>) {
        *self.inner.path.borrow_mut() = path.into();
    }

    /// `http` or `https`.
    pub fn scheme(&self) -> &str {
        self.inner
            .scheme
            .get_or_init(|| self.inner.request.borrow().scheme.clone())
    }

    /// Full request URI, including the query string.
    pub fn request_uri(&self) -> &str {
        self.inner.request_uri.get_or_init(|| {
            let req = self.inner.request.borrow();
            let default_port = match req.scheme.as_str() {
                "https" => 443,
                _ => 80,
            };
            let mut uri = format!("{}://{}", req.scheme, req.host);
            if req.port != default_port {
                uri.push_str(&format!(":{}", req.port));
            }
            uri.push_str(&req.script_name);
            uri.push_str(if req.path.is_empty() { "/" } else { &req.path });
            if !req.query_string.is_empty() {
                uri.push('?');
                uri.push_str(&req.query_string);
            }
            uri
        })
    }

    /// A request header value.
    #[must_use]
    pub fn request_header(&self, name: &str) -> Option<String> {
        self.inner.request.borrow().headers.get(name).map(str::to_string)
    }

    /// Request media type, without parameters.
    pub fn request_content_type(&self) -> Option<&str> {
        self.inner
            .content_type
            .get_or_init(|| {
                self.inner
                    .request
                    .borrow()
                    .headers
                    .get("content-type")
                    .and_then(|ct| ct.split(';').next())
                    .map(|ct| ct.trim().to_ascii_lowercase())
                    .filter(|ct| !ct.is_empty())
            })
            .as_deref()
    }

    /// Declared request body length.
    pub fn request_content_length(&self) -> Option<usize> {
        *self
            .inner
            .content_length
            .get_or_init(|| self.inner.request.borrow().content_length)
    }

    /// Query string mapping. A repeated key maps to an array of strings.
    pub fn query(&self) -> Shared<Map<String, Value>> {
        Rc::clone(self.inner.query.get_or_init(|| {
            let parsed = parse_query_string(&self.inner.request.borrow().query_string);
            Rc::new(RefCell::new(parsed))
        }))
    }

    /// Parsed request body.
    ///
    /// An object for urlencoded and multipart bodies (empty when there is no
    /// body), any JSON value for `application/json`.
    ///
    /// # Errors
    ///
    /// `400 Bad Request` when the body cannot be read or parsed. The failure
    /// is memoized like a successful parse.
    pub fn form(&self) -> Result<Shared<Value>, HttpStatus> {
        self.parsed_form().map(|(form, _)| form)
    }

    /// Files uploaded with a `multipart/form-data` body.
    ///
    /// # Errors
    ///
    /// Same as [`RequestContext::form`].
    pub fn files(&self) -> Result<Rc<[UploadedFile]>, HttpStatus> {
        self.parsed_form().map(|(_, files)| files)
    }

    fn parsed_form(&self) -> Result<(Shared<Value>, Rc<[UploadedFile]>), HttpStatus> {
        let parsed = self.inner.form.get_or_init(|| {
            let content_type = self.request_header("content-type");
            let content_length = self.request_content_length();
            let mut body = self.inner.request.borrow_mut().take_body();
            parse_form(
                self.request_content_type(),
                content_type.as_deref(),
                content_length,
                body.as_mut(),
            )
            .map(|ParsedForm { fields, files }| {
                debug!(request_id = %self.inner.id, file_count = files.len(), "Form parsed");
                (Rc::new(RefCell::new(fields)), Rc::from(files))
            })
        });
        match parsed {
            Ok((form, files)) => Ok((Rc::clone(form), Rc::clone(files))),
            Err(status) => Err(status.clone()),
        }
    }

    /// Cookies sent by the client.
    pub fn cookies(&self) -> Shared<RequestCookies> {
        Rc::clone(self.inner.cookies.get_or_init(|| {
            let parsed = self
                .inner
                .request
                .borrow()
                .headers
                .get("cookie")
                .map(RequestCookies::parse)
                .unwrap_or_default();
            Rc::new(RefCell::new(parsed))
        }))
    }

    /// Response headers in progress.
    pub fn response_headers(&self) -> Ref<'_, Headers> {
        self.inner.response_headers.borrow()
    }

    pub fn response_headers_mut(&self) -> RefMut<'_, Headers> {
        self.inner.response_headers.borrow_mut()
    }

    /// Encoding applied to text chunks; `None` sends raw bytes.
    #[must_use]
    pub fn response_encoding(&self) -> Option<String> {
        self.inner.response_encoding.borrow().clone()
    }

    pub fn set_response_encoding(&self, encoding: Option<&str>) {
        *self.inner.response_encoding.borrow_mut() = encoding.map(str::to_string);
    }

    /// Response media type, without the charset suffix.
    #[must_use]
    pub fn response_content_type(&self) -> Option<String> {
        self.response_headers()
            .get("content-type")
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_string())
    }

    /// Set the response media type. The charset is taken from the response
    /// encoding; `None` removes the header.
    pub fn set_response_content_type(&self, content_type: Option<&str>) {
        let value = content_type.map(|ct| match self.response_encoding() {
            Some(encoding) => format!("{ct}; charset={encoding}"),
            None => ct.to_string(),
        });
        let mut headers = self.response_headers_mut();
        match value {
            Some(value) => headers.set("Content-Type", value),
            None => {
                headers.remove("content-type");
            }
        }
    }

    /// Queue an outgoing cookie.
    pub fn add_cookie(&self, cookie: HttpCookie) {
        self.inner.response_cookies.borrow_mut().push(cookie);
    }

    /// Create an outgoing cookie with defaults from this context's settings.
    pub fn new_cookie(&self, name: &str, value: &str) -> HttpCookie {
        HttpCookie::with_settings(name, value, &self.inner.settings)
    }

    #[must_use]
    pub fn response_cookies(&self) -> Vec<HttpCookie> {
        self.inner.response_cookies.borrow().clone()
    }

    /// Drain the outgoing cookies; each is emitted once.
    pub(crate) fn take_response_cookies(&self) -> Vec<HttpCookie> {
        std::mem::take(&mut *self.inner.response_cookies.borrow_mut())
    }

    /// Encode a chunk for the wire.
    ///
    /// # Errors
    ///
    /// Text with no response encoding, bytes with one, an unknown encoding
    /// or a character the encoding cannot represent.
    pub fn encode_response(&self, chunk: Chunk) -> Result<Vec<u8>, HandlerError> {
        match (self.response_encoding(), chunk) {
            (Some(encoding), Chunk::Text(text)) => encode(&text, &encoding),
            (None, Chunk::Bytes(bytes)) => Ok(bytes),
            (Some(encoding), Chunk::Bytes(_)) => Err(HandlerError::internal(format!(
                "The response encoding is {encoding}, a text chunk is expected"
            ))),
            (None, Chunk::Text(_)) => Err(HandlerError::internal(
                "The response encoding is not set, a byte chunk is expected",
            )),
        }
    }
}

fn encode(text: &str, encoding: &str) -> Result<Vec<u8>, HandlerError> {
    let normalized = encoding.to_ascii_lowercase().replace('_', "-");
    match normalized.as_str() {
        "utf-8" | "utf8" => Ok(text.as_bytes().to_vec()),
        "ascii" | "us-ascii" => {
            if text.is_ascii() {
                Ok(text.as_bytes().to_vec())
            } else {
                Err(HandlerError::internal(format!("Cannot encode {text:?} as {encoding}")))
            }
        }
        "latin-1" | "latin1" | "iso-8859-1" => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).ok())
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| HandlerError::internal(format!("Cannot encode {text:?} as {encoding}"))),
        _ => Err(HandlerError::internal(format!("Unknown encoding: {encoding}"))),
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.inner.id)
            .field("path", &*self.inner.path.borrow())
            .field("response_headers", &*self.inner.response_headers.borrow())
            .finish_non_exhaustive()
    }
}
