use super::HandlerFn;
use crate::body::{Body, Chunk, ChunkStream};
use crate::context::RequestContext;
use crate::status::HandlerError;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Reframes a chunk stream with chunked transfer encoding.
///
/// Every chunk becomes `<hex byte length>\r\n<chunk>\r\n`; the stream ends
/// with `0\r\n`, the optional trailer line and a blank line. A failure in
/// the inner stream is sent as one last framed chunk holding the error
/// message, followed by the terminator: the status line is already out.
pub struct ChunkedFraming {
    inner: Option<ChunkStream>,
    ctx: RequestContext,
    trailer: Option<(String, String)>,
    pending: VecDeque<Chunk>,
}

impl ChunkedFraming {
    #[must_use]
    pub fn new(inner: ChunkStream, ctx: RequestContext, trailer: Option<(String, String)>) -> Self {
        Self {
            inner: Some(inner),
            ctx,
            trailer,
            pending: VecDeque::new(),
        }
    }

    /// A control chunk in the representation the response expects.
    fn control(&self, text: String) -> Chunk {
        if self.ctx.response_encoding().is_some() {
            Chunk::Text(text)
        } else {
            Chunk::Bytes(text.into_bytes())
        }
    }

    fn frame(&mut self, chunk: Chunk) {
        match chunk {
            Chunk::Text(text) => {
                self.pending
                    .push_back(Chunk::Text(format!("{:x}\r\n{text}\r\n", text.len())));
            }
            Chunk::Bytes(bytes) => {
                let mut framed = format!("{:x}\r\n", bytes.len()).into_bytes();
                framed.extend_from_slice(&bytes);
                framed.extend_from_slice(b"\r\n");
                self.pending.push_back(Chunk::Bytes(framed));
            }
        }
    }

    fn finish(&mut self, error: Option<&HandlerError>) {
        self.inner = None;
        if let Some(err) = error {
            warn!(request_id = %self.ctx.id(), error = %err, "Chunked stream failed");
            let message = err.to_string();
            let framed = self.control(format!("{:x}\r\n{message}\r\n", message.len()));
            self.pending.push_back(framed);
        }
        let zero = self.control("0\r\n".to_string());
        self.pending.push_back(zero);
        if error.is_none() {
            if let Some((field, value)) = &self.trailer {
                let line = self.control(format!("{field}: {value}\r\n"));
                self.pending.push_back(line);
            }
        }
        let end = self.control("\r\n".to_string());
        self.pending.push_back(end);
    }
}

impl Iterator for ChunkedFraming {
    type Item = Result<Chunk, HandlerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(Ok(chunk));
            }
            let inner = self.inner.as_mut()?;
            match inner.next() {
                Some(Ok(chunk)) if chunk.is_empty() => {}
                Some(Ok(chunk)) => self.frame(chunk),
                Some(Err(err)) => self.finish(Some(&err)),
                None => self.finish(None),
            }
        }
    }
}

pub(super) fn wrap(inner: HandlerFn, trailer: Option<(String, Option<String>)>) -> HandlerFn {
    Arc::new(move |ctx, args| {
        let body = inner(ctx, args)?;
        {
            let mut headers = ctx.response_headers_mut();
            headers.add("Transfer-Encoding", "chunked");
            if let Some((field, _)) = &trailer {
                headers.add("Trailer", field.as_str());
            }
        }
        let trailer_line = trailer
            .as_ref()
            .and_then(|(field, value)| value.as_ref().map(|v| (field.clone(), v.clone())));
        let stream = body.into_chunks()?;
        Ok(Body::Stream(Box::new(ChunkedFraming::new(
            stream,
            ctx.clone(),
            trailer_line,
        ))))
    })
}
