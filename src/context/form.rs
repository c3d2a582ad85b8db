//! Request body parsing for [`RequestContext::form`](super::RequestContext::form).
//!
//! Supported bodies: `application/json`, `application/x-www-form-urlencoded`
//! and `multipart/form-data`. Uploaded files are kept out of the form
//! mapping; the mapping holds a small descriptor object for each file field
//! and the content is available through
//! [`RequestContext::files`](super::RequestContext::files).

use crate::server::request::{insert_multi, parse_query_string};
use crate::status::HttpStatus;
use memchr::memmem;
use serde_json::{json, Map, Value};
use std::io::{Cursor, Read};
use tracing::debug;

const MAX_BOUNDARY_LEN: usize = 70;

/// A file received in a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name
    pub field: String,
    /// Client-supplied file name
    pub filename: String,
    /// Declared part content type
    pub content_type: Option<String>,
    data: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Raw content as a readable stream.
    #[must_use]
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.data)
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Content decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    fn descriptor(&self) -> Value {
        json!({
            "filename": self.filename,
            "content_type": self.content_type,
            "size": self.data.len(),
        })
    }
}

/// Parsed body: the field mapping plus any uploaded files.
#[derive(Debug, Default)]
pub(crate) struct ParsedForm {
    pub fields: Value,
    pub files: Vec<UploadedFile>,
}

/// Parse a request body according to its content type.
///
/// `content_type` is the full header value (parameters included);
/// `media_type` is its lower-cased part before `;`.
pub(crate) fn parse_form(
    media_type: Option<&str>,
    content_type: Option<&str>,
    content_length: Option<usize>,
    body: &mut dyn Read,
) -> Result<ParsedForm, HttpStatus> {
    match media_type {
        Some("application/json") => {
            let length = content_length.ok_or_else(|| {
                HttpStatus::bad_request().with_info("Content-Length required for a JSON body")
            })?;
            let mut buf = vec![0; length];
            body.read_exact(&mut buf)
                .map_err(|_| HttpStatus::bad_request().with_info("Cannot read the request body"))?;
            let fields = serde_json::from_slice(&buf)
                .map_err(|e| HttpStatus::bad_request().with_info(format!("Cannot parse the request: {e}")))?;
            Ok(ParsedForm {
                fields,
                files: Vec::new(),
            })
        }
        Some("application/x-www-form-urlencoded") => {
            let buf = read_body(body, content_length)?;
            let text = std::str::from_utf8(&buf)
                .map_err(|_| HttpStatus::bad_request().with_info("Cannot parse the request"))?;
            Ok(ParsedForm {
                fields: Value::Object(parse_query_string(text)),
                files: Vec::new(),
            })
        }
        Some("multipart/form-data") => {
            let boundary = parse_boundary(content_type.unwrap_or(""))?;
            let buf = read_body(body, content_length)?;
            parse_multipart(&buf, &boundary)
        }
        _ => Ok(ParsedForm {
            fields: Value::Object(Map::new()),
            files: Vec::new(),
        }),
    }
}

fn read_body(body: &mut dyn Read, content_length: Option<usize>) -> Result<Vec<u8>, HttpStatus> {
    let mut buf = Vec::new();
    let result = match content_length {
        Some(length) => {
            buf.resize(length, 0);
            body.read_exact(&mut buf)
        }
        None => body.read_to_end(&mut buf).map(|_| ()),
    };
    result.map_err(|_| HttpStatus::bad_request().with_info("Cannot read the request body"))?;
    Ok(buf)
}

fn parse_boundary(content_type: &str) -> Result<String, HttpStatus> {
    for param in content_type.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = value.trim().trim_matches('"');
            if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
                break;
            }
            return Ok(boundary.to_string());
        }
    }
    Err(HttpStatus::bad_request().with_info("Invalid multipart boundary"))
}

fn malformed(detail: &str) -> HttpStatus {
    HttpStatus::bad_request().with_info(format!("Cannot parse the request: {detail}"))
}

fn parse_multipart(body: &[u8], boundary: &str) -> Result<ParsedForm, HttpStatus> {
    let delimiter = format!("--{boundary}");
    let needle = format!("\r\n{delimiter}").into_bytes();
    let next_part = memmem::Finder::new(&needle);
    let header_end = memmem::Finder::new(b"\r\n\r\n");

    let mut fields = Map::new();
    let mut files = Vec::new();

    let mut pos = if body.starts_with(delimiter.as_bytes()) {
        0
    } else {
        next_part
            .find(body)
            .map(|i| i + 2)
            .ok_or_else(|| malformed("missing boundary"))?
    };

    loop {
        pos += delimiter.len();
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            break;
        }
        if !rest.starts_with(b"\r\n") {
            return Err(malformed("expected CRLF after boundary"));
        }
        pos += 2;

        let (headers, data_start) = if body[pos..].starts_with(b"\r\n") {
            ("", pos + 2)
        } else {
            let end = header_end
                .find(&body[pos..])
                .ok_or_else(|| malformed("unterminated part headers"))?;
            let headers = std::str::from_utf8(&body[pos..pos + end])
                .map_err(|_| malformed("invalid part headers"))?;
            (headers, pos + end + 4)
        };

        let data_end = next_part
            .find(&body[data_start..])
            .map(|i| data_start + i)
            .ok_or_else(|| malformed("unexpected end of body"))?;
        let data = &body[data_start..data_end];

        let mut disposition = None;
        let mut part_type = None;
        for line in headers.split("\r\n") {
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if name.eq_ignore_ascii_case("content-disposition") {
                    disposition = Some(value.trim());
                } else if name.eq_ignore_ascii_case("content-type") {
                    part_type = Some(value.trim().to_string());
                }
            }
        }
        let (name, filename) =
            parse_content_disposition(disposition.ok_or_else(|| malformed("missing Content-Disposition"))?)?;

        match filename {
            Some(filename) => {
                let file = UploadedFile {
                    field: name.clone(),
                    filename,
                    content_type: part_type,
                    data: data.to_vec(),
                };
                insert_multi(&mut fields, name, file.descriptor());
                files.push(file);
            }
            None => {
                let value = String::from_utf8_lossy(data).into_owned();
                insert_multi(&mut fields, name, Value::String(value));
            }
        }

        pos = data_end + 2;
    }

    debug!(field_count = fields.len(), file_count = files.len(), "Multipart body parsed");
    Ok(ParsedForm {
        fields: Value::Object(fields),
        files,
    })
}

fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), HttpStatus> {
    let mut name = None;
    let mut filename = None;
    for param in value.split(';').skip(1) {
        if let Some((key, raw)) = param.split_once('=') {
            let raw = raw.trim();
            let unquoted = raw
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(raw)
                .to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(unquoted),
                "filename" => filename = Some(unquoted),
                _ => {}
            }
        }
    }
    let name = name.ok_or_else(|| malformed("missing field name"))?;
    Ok((name, filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(media: &str, content_type: &str, body: &[u8]) -> Result<ParsedForm, HttpStatus> {
        parse_form(
            Some(media),
            Some(content_type),
            Some(body.len()),
            &mut Cursor::new(body.to_vec()),
        )
    }

    #[test]
    fn test_json_requires_length() {
        let err = parse_form(
            Some("application/json"),
            Some("application/json"),
            None,
            &mut Cursor::new(b"{}".to_vec()),
        )
        .unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_malformed_json_is_bad_request() {
        let err = parse("application/json", "application/json", b"{oops").unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_urlencoded_repeats_and_blanks() {
        let form = parse(
            "application/x-www-form-urlencoded",
            "application/x-www-form-urlencoded",
            b"a=1&b=&c=2&c=3",
        )
        .unwrap();
        assert_eq!(form.fields, json!({"a": "1", "b": "", "c": ["2", "3"]}));
    }

    #[test]
    fn test_unknown_content_type_is_empty_mapping() {
        let form = parse("text/plain", "text/plain", b"whatever").unwrap();
        assert_eq!(form.fields, json!({}));
    }

    #[test]
    fn test_multipart_fields_and_files() {
        let body = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"a\"\r\n\r\n\
1\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"b\"\r\n\r\n\
2\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"b\"\r\n\r\n\
3\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"c\"; filename=\"cat.jpg\"\r\n\
Content-Type: image/jpeg\r\n\r\n\
\xff\xd8\xff\r\n\
--XyZ--\r\n";
        let form = parse(
            "multipart/form-data",
            "multipart/form-data; boundary=XyZ",
            body,
        )
        .unwrap();
        assert_eq!(form.fields["a"], json!("1"));
        assert_eq!(form.fields["b"], json!(["2", "3"]));
        assert_eq!(form.fields["c"]["filename"], json!("cat.jpg"));
        assert_eq!(form.files.len(), 1);
        assert_eq!(form.files[0].bytes(), b"\xff\xd8\xff");
        assert_eq!(form.files[0].content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_multipart_empty_is_empty_mapping() {
        let form = parse(
            "multipart/form-data",
            "multipart/form-data; boundary=XyZ",
            b"--XyZ--\r\n",
        )
        .unwrap();
        assert_eq!(form.fields, json!({}));
    }

    #[test]
    fn test_multipart_errors() {
        assert!(parse("multipart/form-data", "multipart/form-data", b"").is_err());
        let truncated = b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1";
        assert!(parse(
            "multipart/form-data",
            "multipart/form-data; boundary=XyZ",
            truncated
        )
        .is_err());
    }
}
