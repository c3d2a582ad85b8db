use crate::body::{Body, Chunk};
use crate::context::RequestContext;
use crate::cookies::http_date;
use crate::dispatcher::Dispatch;
use crate::status::{HandlerError, HandlerResult, HttpStatus};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Size of each chunk a file is streamed in.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Serves files under a base directory (or a single file).
///
/// The remaining path segments are joined onto the base. `..` segments are
/// resolved lexically and may not climb above the base; the resolved file
/// must also really live under it once symlinks are followed. Both
/// violations answer `403 Forbidden`. A directory is answered with its
/// default document, or `404 Not Found` when none is configured or it does
/// not exist. Any failure to open or read the file is a `404`.
#[derive(Debug, Clone)]
pub struct Static {
    base_dir: PathBuf,
    default_document: Option<String>,
}

impl Static {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
            default_document: Some("index.html".to_string()),
        }
    }

    #[must_use]
    pub fn with_default_document(mut self, name: Option<&str>) -> Self {
        self.default_document = name.map(str::to_string);
        self
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub fn default_document(&self) -> Option<&str> {
        self.default_document.as_deref()
    }

    /// Join `segments` onto the base, resolving `.` and `..` lexically.
    fn map_path(&self, segments: &[String]) -> Result<PathBuf, HttpStatus> {
        let mut relative: Vec<&std::ffi::OsStr> = Vec::new();
        for segment in segments {
            match segment.as_str() {
                "" | "." => {}
                ".." => {
                    if relative.pop().is_none() {
                        return Err(HttpStatus::forbidden());
                    }
                }
                other => {
                    let mut components = Path::new(other).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(name)), None) => relative.push(name),
                        _ => return Err(HttpStatus::forbidden()),
                    }
                }
            }
        }
        let mut path = self.base_dir.clone();
        path.extend(relative);
        Ok(path)
    }

    /// Resolve the file to serve, following symlinks and the default
    /// document.
    fn resolve(&self, segments: &[String]) -> Result<PathBuf, HttpStatus> {
        let base = fs::canonicalize(&self.base_dir).map_err(|_| HttpStatus::not_found())?;
        let mut path = fs::canonicalize(self.map_path(segments)?).map_err(|_| HttpStatus::not_found())?;
        if !path.starts_with(&base) {
            return Err(HttpStatus::forbidden());
        }
        if path.is_dir() {
            let document = self.default_document.as_deref().ok_or_else(HttpStatus::not_found)?;
            path = fs::canonicalize(path.join(document)).map_err(|_| HttpStatus::not_found())?;
            if !path.starts_with(&base) {
                return Err(HttpStatus::forbidden());
            }
        }
        if !path.is_file() {
            return Err(HttpStatus::not_found());
        }
        Ok(path)
    }
}

impl Dispatch for Static {
    fn dispatch(&self, ctx: &RequestContext, segments: &[String]) -> HandlerResult {
        let path = self.resolve(segments)?;
        let file = File::open(&path).map_err(|_| HttpStatus::not_found())?;
        let metadata = file.metadata().map_err(|_| HttpStatus::not_found())?;
        debug!(request_id = %ctx.id(), path = %path.display(), size = metadata.len(), "Serving static file");

        ctx.set_response_encoding(None);
        ctx.set_response_content_type(Some(content_type(&path)));
        {
            let mut headers = ctx.response_headers_mut();
            headers.set("Content-Length", metadata.len().to_string());
            if let Ok(modified) = metadata.modified() {
                headers.set("Last-Modified", http_date(&DateTime::<Utc>::from(modified)));
            }
        }
        Ok(Body::Stream(Box::new(FileChunks { file: Some(file) })))
    }
}

/// Reads a file in [`CHUNK_SIZE`] pieces; a read failure ends the stream
/// with `404`.
struct FileChunks {
    file: Option<File>,
}

impl Iterator for FileChunks {
    type Item = Result<Chunk, HandlerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.file.as_mut()?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        match read_full(file, &mut buffer) {
            Ok(0) => {
                self.file = None;
                None
            }
            Ok(n) => {
                buffer.truncate(n);
                Some(Ok(Chunk::Bytes(buffer)))
            }
            Err(err) => {
                self.file = None;
                Some(Err(HttpStatus::not_found().with_info(err.to_string()).into()))
            }
        }
    }
}

fn read_full(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Content type guessed from the file extension.
#[must_use]
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|s| s.to_str()).unwrap_or("").to_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "wasm" => "application/wasm",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
