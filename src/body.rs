//! Handler return values and their normalization into a chunk stream.
//!
//! A handler may produce nothing, a single atomic string or byte buffer, a
//! lazily evaluated stream of chunks, or a JSON value. The response pipeline
//! calls [`Body::into_chunks`] to turn any of these into one pull-based
//! iterator.

use crate::status::HandlerError;
use serde_json::Value;
use std::fmt;

/// One piece of a response body, before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Text, encoded with the response encoding
    Text(String),
    /// Raw bytes, only valid when the response encoding is `None`
    Bytes(Vec<u8>),
}

impl Chunk {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Chunk::Text(s) => s.len(),
            Chunk::Bytes(b) => b.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Chunk {
    fn from(s: String) -> Self {
        Chunk::Text(s)
    }
}

impl From<&str> for Chunk {
    fn from(s: &str) -> Self {
        Chunk::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(b: Vec<u8>) -> Self {
        Chunk::Bytes(b)
    }
}

impl From<&[u8]> for Chunk {
    fn from(b: &[u8]) -> Self {
        Chunk::Bytes(b.to_vec())
    }
}

/// Pull-based chunk producer. An `Err` item aborts the stream.
pub type ChunkStream = Box<dyn Iterator<Item = Result<Chunk, HandlerError>>>;

/// What a handler returns.
pub enum Body {
    /// No body
    Empty,
    /// A single text chunk, never iterated piecewise
    Text(String),
    /// A single byte chunk
    Bytes(Vec<u8>),
    /// Lazily produced chunks; evaluated after the handler returns
    Stream(ChunkStream),
    /// A JSON value: `null`/falsy is empty, a string is one chunk, an array
    /// of strings is one chunk per element; anything else is an error
    Value(Value),
}

impl Body {
    /// Stream infallible chunks.
    pub fn stream<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        I::IntoIter: 'static,
        C: Into<Chunk>,
    {
        Body::Stream(Box::new(chunks.into_iter().map(|c| Ok(c.into()))))
    }

    /// Stream chunks that may fail mid-way.
    pub fn try_stream<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<C, HandlerError>>,
        I::IntoIter: 'static,
        C: Into<Chunk>,
    {
        Body::Stream(Box::new(chunks.into_iter().map(|r| r.map(Into::into))))
    }

    /// Stream produced by a closure called until it returns `None`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut() -> Option<Result<Chunk, HandlerError>> + 'static,
    {
        Body::Stream(Box::new(std::iter::from_fn(f)))
    }

    /// Normalize into a single chunk stream.
    ///
    /// # Errors
    ///
    /// Returns an internal error when a JSON value has no body shape (a bare
    /// number, a non-empty object, an array with non-string elements).
    pub fn into_chunks(self) -> Result<ChunkStream, HandlerError> {
        match self {
            Body::Empty => Ok(empty()),
            Body::Text(s) if s.is_empty() => Ok(empty()),
            Body::Text(s) => Ok(single(Chunk::Text(s))),
            Body::Bytes(b) if b.is_empty() => Ok(empty()),
            Body::Bytes(b) => Ok(single(Chunk::Bytes(b))),
            Body::Stream(stream) => Ok(stream),
            Body::Value(value) => value_chunks(value),
        }
    }
}

fn empty() -> ChunkStream {
    Box::new(std::iter::empty())
}

fn single(chunk: Chunk) -> ChunkStream {
    Box::new(std::iter::once(Ok(chunk)))
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn value_chunks(value: Value) -> Result<ChunkStream, HandlerError> {
    if is_falsy(&value) {
        return Ok(empty());
    }
    match value {
        Value::String(s) => Ok(single(Chunk::Text(s))),
        Value::Array(items) => {
            let chunks = items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(Chunk::Text(s)),
                    other => Err(HandlerError::internal(format!(
                        "Invalid body element, expected a string: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(chunks.into_iter().map(Ok)))
        }
        other => Err(HandlerError::internal(format!(
            "Invalid return value, expected a string, bytes or an iterable: {other}"
        ))),
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Text(s) => f.debug_tuple("Body::Text").field(s).finish(),
            Body::Bytes(b) => f.debug_tuple("Body::Bytes").field(&b.len()).finish(),
            Body::Stream(_) => f.write_str("Body::Stream(..)"),
            Body::Value(v) => f.debug_tuple("Body::Value").field(v).finish(),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Empty
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(b)
    }
}

impl From<Value> for Body {
    fn from(v: Value) -> Self {
        Body::Value(v)
    }
}
