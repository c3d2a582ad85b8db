use super::headers::Headers;
use serde_json::{Map, Value};
use std::fmt;
use std::io::{Cursor, Read};
use tracing::debug;

/// Raw request facts handed over by the transport.
///
/// This is the equivalent of a CGI/WSGI environment: the transport has
/// already parsed HTTP framing, and the framework only reads from here.
/// Everything derived from it (query mapping, form, cookies) is computed
/// lazily by [`crate::context::RequestContext`].
pub struct RawRequest {
    /// Request method as sent by the client (any case)
    pub method: String,
    /// Request path, without the query string
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query_string: String,
    /// Request headers (case-insensitive)
    pub headers: Headers,
    /// Declared body length, `None` when the client did not send one
    pub content_length: Option<usize>,
    /// URL scheme (`http` or `https`)
    pub scheme: String,
    /// Host the request was addressed to (without port)
    pub host: String,
    /// Server port
    pub port: u16,
    /// Mount point of the application
    pub script_name: String,
    body: Box<dyn Read>,
}

impl fmt::Debug for RawRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_string", &self.query_string)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl RawRequest {
    /// Create a request for `target`, which may carry a `?query` suffix.
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };
        Self {
            method: method.to_string(),
            path: path.to_string(),
            query_string: query.to_string(),
            headers: Headers::new(),
            content_length: None,
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 80,
            script_name: String::new(),
            body: Box::new(std::io::empty()),
        }
    }

    /// Add a request header. `Host` also updates [`RawRequest::host`].
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if name.eq_ignore_ascii_case("host") {
            let (host, port) = split_host(value);
            self.host = host.to_string();
            if let Some(port) = port {
                self.port = port;
            }
        }
        self.headers.add(name, value);
        self
    }

    /// Attach a body with the given content type; the length is declared.
    #[must_use]
    pub fn body(mut self, content_type: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        self.content_length = Some(bytes.len());
        self.headers.set("Content-Type", content_type);
        self.body = Box::new(Cursor::new(bytes));
        self
    }

    /// Attach body bytes as received, keeping the headers untouched.
    #[must_use]
    pub fn payload(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        self.content_length = Some(bytes.len());
        self.body = Box::new(Cursor::new(bytes));
        self
    }

    /// Attach a body reader without declaring its length.
    #[must_use]
    pub fn body_reader(mut self, content_type: &str, reader: impl Read + 'static) -> Self {
        self.content_length = None;
        self.headers.set("Content-Type", content_type);
        self.body = Box::new(reader);
        self
    }

    /// Attach a JSON document as the body.
    #[must_use]
    pub fn json_body(self, value: &Value) -> Self {
        self.body("application/json", value.to_string())
    }

    /// Attach `application/x-www-form-urlencoded` fields as the body.
    #[must_use]
    pub fn form_body(self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.body("application/x-www-form-urlencoded", encoded)
    }

    /// Use `https` as the scheme.
    #[must_use]
    pub fn secure(mut self) -> Self {
        self.scheme = "https".to_string();
        if self.port == 80 {
            self.port = 443;
        }
        self
    }

    /// Take the body reader, leaving an empty one behind.
    pub(crate) fn take_body(&mut self) -> Box<dyn Read> {
        std::mem::replace(&mut self.body, Box::new(std::io::empty()))
    }
}

fn split_host(value: &str) -> (&str, Option<u16>) {
    // `[::1]:8080` keeps its brackets; a bare IPv6 literal has no port.
    let port_sep = match value.rfind(']') {
        Some(end) => value[end..].find(':').map(|i| end + i),
        None if value.matches(':').count() == 1 => value.find(':'),
        None => None,
    };
    match port_sep {
        Some(i) => match value[i + 1..].parse() {
            Ok(port) => (&value[..i], Some(port)),
            Err(_) => (value, None),
        },
        None => (value, None),
    }
}

/// Parse a `Cookie` header into ordered `(name, value)` pairs.
///
/// Malformed pairs without a name are skipped; surrounding double quotes are
/// removed from values.
pub fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse a query string (or urlencoded body) into a mapping.
///
/// Blank values are kept. A key that appears once maps to a string, a key
/// that repeats maps to an array of strings in arrival order. Malformed
/// pairs never fail the parse.
pub fn parse_query_string(query: &str) -> Map<String, Value> {
    let mut result = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        insert_multi(&mut result, key.into_owned(), Value::String(value.into_owned()));
    }
    debug!(param_count = result.len(), "Query string parsed");
    result
}

/// Insert a value, collapsing repeated keys into an array.
///
/// Values inserted here are scalars or file descriptors, never arrays, so an
/// existing array always means the key was seen more than once.
pub(crate) fn insert_multi(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies("a=b; c=\"d\";; =x; e");
        assert_eq!(
            cookies,
            vec![
                ("a".to_string(), "b".to_string()),
                ("c".to_string(), "d".to_string()),
                ("e".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_parse_query_keeps_blank_and_repeats() {
        let q = parse_query_string("a=1&b=&c=2&c=3&c=4");
        assert_eq!(q.get("a"), Some(&json!("1")));
        assert_eq!(q.get("b"), Some(&json!("")));
        assert_eq!(q.get("c"), Some(&json!(["2", "3", "4"])));
    }

    #[test]
    fn test_parse_query_tolerates_garbage() {
        let q = parse_query_string("&&=&x&y=%zz");
        assert_eq!(q.get("x"), Some(&json!("")));
        assert!(q.contains_key("y"));
    }

    #[test]
    fn test_new_splits_target() {
        let req = RawRequest::new("GET", "/a/b?x=1")
            .header("Host", "example.com:8080");
        assert_eq!(req.path, "/a/b");
        assert_eq!(req.query_string, "x=1");
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, 8080);
    }
}
