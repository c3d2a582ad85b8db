//! Request cookies and outgoing `Set-Cookie` directives.

use crate::config::Settings;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// `strftime` format of HTTP dates (RFC 7231 IMF-fixdate).
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Expiry literal that makes a browser drop the cookie immediately.
pub const ALREADY_EXPIRED: &str = "Sat, 01 Jan 2000 00:00:01 GMT";

/// Format a timestamp as an HTTP date.
#[must_use]
pub fn http_date(at: &DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Cookies sent by the client, in header order.
///
/// A name that repeats keeps its first position and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCookies {
    entries: Vec<(String, String)>,
}

impl RequestCookies {
    /// Parse a `Cookie` header value.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut cookies = Self::default();
        for (name, value) in crate::server::request::parse_cookies(header) {
            cookies.insert(name, value);
        }
        cookies
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a value, replacing any existing one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(index).1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cookie expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expires {
    /// An absolute point in time
    At(DateTime<Utc>),
    /// A preformatted date string, sent as is
    Literal(String),
}

impl fmt::Display for Expires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expires::At(at) => f.write_str(&http_date(at)),
            Expires::Literal(s) => f.write_str(s),
        }
    }
}

/// An outgoing cookie (RFC 2109).
///
/// `domain`, `secure` and `http_only` default from the settings the cookie is
/// created with.
///
/// ```rust
/// use brrtweb::config::Settings;
/// use brrtweb::cookies::HttpCookie;
///
/// let cookie = HttpCookie::with_settings("theme", "dark", &Settings::default());
/// assert_eq!(cookie.to_header_value(), "theme=dark; path=/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCookie {
    pub name: String,
    pub value: Option<String>,
    pub path: Option<String>,
    pub expires: Option<Expires>,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl HttpCookie {
    /// Create a cookie using the process-wide settings for defaults.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_settings(name, value, &crate::config::settings())
    }

    /// Create a cookie using `settings` for defaults.
    pub fn with_settings(
        name: impl Into<String>,
        value: impl Into<String>,
        settings: &Settings,
    ) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            value: (!value.is_empty()).then_some(value),
            path: Some("/".to_string()),
            expires: None,
            domain: settings.domain.clone(),
            secure: settings.cookie.secure,
            http_only: settings.cookie.http_only,
        }
    }

    /// A cookie the browser should delete.
    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(name, "").with_expires(Expires::Literal(ALREADY_EXPIRED.to_string()))
    }

    #[must_use]
    pub fn with_path(mut self, path: Option<&str>) -> Self {
        self.path = path.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_expires(mut self, expires: Expires) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Expire `seconds` from now.
    #[must_use]
    pub fn with_max_age(self, seconds: i64) -> Self {
        self.with_expires(Expires::At(Utc::now() + Duration::seconds(seconds)))
    }

    #[must_use]
    pub fn with_domain(mut self, domain: Option<&str>) -> Self {
        self.domain = domain.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Value of the `Set-Cookie` header for this cookie.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}=", self.name);
        if let Some(value) = &self.value {
            out.push_str(value);
        }
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            out.push_str("; domain=");
            out.push_str(domain);
        }
        if let Some(expires) = &self.expires {
            out.push_str("; expires=");
            out.push_str(&expires.to_string());
        }
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            out.push_str("; path=");
            out.push_str(path);
        }
        if self.secure {
            out.push_str("; secure");
        }
        if self.http_only {
            out.push_str("; httponly");
        }
        out
    }
}
