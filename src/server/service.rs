use super::request::RawRequest;
use super::response::Response as AppResponse;
use crate::application::Application;
use may_minihttp::{HttpService, Request, Response};
use std::io::{self, Read};
use tracing::{debug, error};

/// Headers the transport frames itself.
const TRANSPORT_HEADERS: [&str; 2] = ["content-length", "transfer-encoding"];

/// Header lines and status reason of the response being written.
///
/// `may_minihttp` takes `&'static str` lines but copies them into the
/// connection's write buffer as soon as `call` returns, before the next
/// request on that connection is served. Lines live here until then.
#[derive(Debug, Default)]
struct LineBuffer {
    lines: Vec<String>,
}

impl LineBuffer {
    fn reset(&mut self) {
        self.lines.clear();
    }

    fn hold(&mut self, line: String) -> &'static str {
        let held: *const str = line.as_str();
        self.lines.push(line);
        // SAFETY: the heap text stays put when the `String` moves into the
        // buffer and is only freed by `reset` or drop. Both happen after the
        // transport encoded the response that borrowed it: `reset` runs at
        // the start of the next `call` and the service is owned by its
        // connection.
        unsafe { &*held }
    }
}

impl Clone for LineBuffer {
    fn clone(&self) -> Self {
        Self::default()
    }
}

/// Serves an [`Application`] over `may_minihttp`.
///
/// Each call runs the whole pipeline on the connection's coroutine: the
/// request body is read up front, the response body is buffered and handed
/// to the transport, which adds its own framing headers. Every connection
/// works on its own clone.
#[derive(Clone, Debug)]
pub struct AppService {
    app: Application,
    lines: LineBuffer,
}

impl AppService {
    #[must_use]
    pub fn new(app: Application) -> Self {
        Self {
            app,
            lines: LineBuffer::default(),
        }
    }

    #[must_use]
    pub fn application(&self) -> &Application {
        &self.app
    }
}

/// Build a [`RawRequest`] from the transport's request. The path is
/// percent-decoded; the query string is kept raw.
pub fn raw_request(req: Request) -> io::Result<RawRequest> {
    let method = req.method().to_string();
    let target = req.path().to_string();
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.clone(), None),
    };
    let path = match urlencoding::decode(&path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => path,
    };
    let mut raw = RawRequest::new(&method, "/");
    raw.path = path;
    raw.query_string = query.unwrap_or_default();

    let mut declared_length = None;
    for header in req.headers() {
        let value = String::from_utf8_lossy(header.value);
        if header.name.eq_ignore_ascii_case("content-length") {
            declared_length = value.trim().parse::<usize>().ok();
        }
        raw = raw.header(header.name, &value);
    }

    let mut body = Vec::new();
    req.body().read_to_end(&mut body)?;
    if declared_length.is_some() || !body.is_empty() {
        raw = raw.payload(body);
    }
    debug!(method = %raw.method, path = %raw.path, content_length = ?raw.content_length, "Request received");
    Ok(raw)
}

/// Copy a committed response onto the transport, buffering its body.
///
/// A failure while streaming is already logged by the pipeline; whatever was
/// produced before it is sent.
fn write_response(res: &mut Response, response: AppResponse, lines: &mut LineBuffer) {
    res.status_code(usize::from(response.status_code()), lines.hold(response.reason().to_string()));
    for (name, value) in response.headers() {
        if TRANSPORT_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        res.header(lines.hold(format!("{name}: {value}")));
    }
    let body = match response.collect() {
        Ok(body) => body,
        Err((partial, _)) => partial,
    };
    res.body_vec(body);
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        self.lines.reset();
        let raw = raw_request(req)?;
        match self.app.handle(raw) {
            Ok(response) => write_response(res, response, &mut self.lines),
            Err(unhandled) => {
                error!(error = %unhandled, "Unhandled error before the response was committed");
                res.status_code(500, "Internal Server Error");
                res.header("Content-Type: text/plain; charset=utf-8");
                res.body_vec(unhandled.body().into_bytes());
            }
        }
        Ok(())
    }
}
