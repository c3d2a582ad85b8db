//! Conditional-request helpers (`ETag`, `If-Match`, `If-None-Match`).

use super::RequestContext;
use crate::status::HttpStatus;

/// Whether `tag` appears in an `If-Match`/`If-None-Match` header value.
///
/// Accepts a comma-separated list of bare or quoted tags, weak tags and `*`.
fn tag_listed(header: &str, tag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        if candidate == "*" {
            return true;
        }
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        let candidate = candidate
            .strip_prefix('"')
            .and_then(|c| c.strip_suffix('"'))
            .unwrap_or(candidate);
        candidate == tag
    })
}

impl RequestContext {
    /// Whether the client's cached copy (`If-None-Match`) differs from `tag`.
    ///
    /// `force` reports the copy as expired regardless of the header.
    #[must_use]
    pub fn expired(&self, tag: &str, force: bool) -> bool {
        if force {
            return true;
        }
        match self.request_header("if-none-match") {
            Some(header) => !tag_listed(&header, tag),
            None => true,
        }
    }

    /// Generic revalidation: when `matches(tag)` is false, fail with the
    /// status produced by `failure`; otherwise, if `add_headers` is set,
    /// announce the tag with `ETag` and `Cache-Control: must-revalidate`.
    ///
    /// # Errors
    ///
    /// The status returned by `failure`.
    pub fn must_revalidate<M, F>(
        &self,
        tag: &str,
        matches: M,
        failure: F,
        add_headers: bool,
    ) -> Result<(), HttpStatus>
    where
        M: FnOnce(&RequestContext, &str) -> bool,
        F: FnOnce() -> HttpStatus,
    {
        if !matches(self, tag) {
            return Err(failure());
        }
        if add_headers {
            let mut headers = self.response_headers_mut();
            headers.set("Cache-Control", "must-revalidate");
            headers.set("ETag", tag);
        }
        Ok(())
    }

    /// Require `If-Match` to name `tag`.
    ///
    /// # Errors
    ///
    /// `412 Precondition Failed` when the header is missing or names another
    /// tag.
    pub fn etag_match(&self, tag: &str) -> Result<(), HttpStatus> {
        self.must_revalidate(
            tag,
            |ctx, tag| {
                ctx.request_header("if-match")
                    .is_some_and(|header| tag_listed(&header, tag))
            },
            HttpStatus::precondition_failed,
            true,
        )
    }

    /// Answer `304` when `If-None-Match` names `tag`.
    ///
    /// # Errors
    ///
    /// `304 Not Modified` when the client already has this version.
    pub fn etag_none_match(&self, tag: &str) -> Result<(), HttpStatus> {
        self.must_revalidate(
            tag,
            |ctx, tag| ctx.expired(tag, false),
            HttpStatus::not_modified,
            true,
        )
    }
}
