use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
/// Most responses carry ≤16 headers (JSF: no heap in hot path)
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage.
///
/// Names are `Arc<str>` because the same few names (Content-Type, Set-Cookie,
/// ETag) are pushed on every request.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Ordered, case-insensitive header multimap.
///
/// Insertion order is kept and duplicate names are allowed, which is what
/// `Set-Cookie` needs. Lookups compare names ASCII case-insensitively
/// (RFC 7230).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: HeaderVec,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing header with the same name.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((Arc::from(name), value.into()));
    }

    /// Replace every header with this name by a single new value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.add(name, value);
    }

    /// Remove every header with this name. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// First value for the given name.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for the given name, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned `(name, value)` pairs, as handed to a transport.
    #[must_use]
    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.add(k, v);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut h = Headers::new();
        h.add("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert!(h.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_duplicates_kept_in_order() {
        let mut h = Headers::new();
        h.add("Set-Cookie", "a=1");
        h.add("X-Other", "x");
        h.add("set-cookie", "b=2");
        let cookies: Vec<_> = h.get_all("Set-Cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_set_replaces_all() {
        let mut h = Headers::new();
        h.add("ETag", "1");
        h.add("etag", "2");
        h.set("ETag", "3");
        assert_eq!(h.get_all("etag").count(), 1);
        assert_eq!(h.get("ETag"), Some("3"));
        assert_eq!(h.remove("etag"), 1);
        assert!(h.is_empty());
    }
}
