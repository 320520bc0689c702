//! The response head as the handler builds it.
//!
//! Headers are kept as ordered `(name, value)` pairs and written verbatim in insertion order.
//! A handful of names are intercepted when set: they feed typed fields that the header
//! encoder turns into wire bytes itself.

use http::StatusCode;

use crate::protocol::SetCookie;
use crate::utils::eq_ignore_case;

/// Caching flags the handler sets and the header encoder honors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub no_cache: bool,
    /// Private unless the response varies on something.
    pub no_cache_unless_vary: bool,
    pub private: bool,
    app_controlled: bool,
}

impl CachePolicy {
    /// Whether the handler set its own `Cache-Control`, which switches off the policy flags.
    #[inline]
    pub fn is_app_controlled(&self) -> bool {
        self.app_controlled
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    status: StatusCode,
    reason: Option<String>,
    headers: Vec<(String, String)>,
    footers: Vec<(String, String)>,
    content_type: Option<String>,
    content_length: Option<u64>,
    cookies: Vec<SetCookie>,
    cache: CachePolicy,
    close_requested: bool,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: Vec::new(),
            footers: Vec::new(),
            content_type: None,
            content_length: None,
            cookies: Vec::new(),
            cache: CachePolicy::default(),
            close_requested: false,
        }
    }
}

impl ResponseHead {
    /// Resets every field while keeping allocated capacity.
    pub fn clear(&mut self) {
        self.status = StatusCode::OK;
        self.reason = None;
        self.headers.clear();
        self.footers.clear();
        self.content_type = None;
        self.content_length = None;
        self.cookies.clear();
        self.cache = CachePolicy::default();
        self.close_requested = false;
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.reason = None;
    }

    pub fn set_status_with_reason(&mut self, status: StatusCode, reason: impl Into<String>) {
        self.status = status;
        self.reason = Some(reason.into());
    }

    /// The explicit reason phrase, otherwise the canonical one.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().or_else(|| self.status.canonical_reason()).unwrap_or("")
    }

    #[inline]
    pub(crate) fn has_explicit_reason(&self) -> bool {
        self.reason.is_some()
    }

    /// Replaces every header named `name` with a single `name: value`.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        if self.set_special(&name, &value) {
            return;
        }
        self.remove_stored(&name);
        self.headers.push((name, value));
    }

    /// Appends `name: value`, keeping earlier headers of the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        if self.set_special(&name, &value) {
            return;
        }
        self.headers.push((name, value));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| eq_ignore_case(key.as_bytes(), name.as_bytes())).map(|(_, v)| v.as_str())
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn remove_header(&mut self, name: &str) {
        if eq_ignore_case(name.as_bytes(), b"content-type") {
            self.content_type = None;
        } else if eq_ignore_case(name.as_bytes(), b"content-length") {
            self.content_length = None;
        }
        self.remove_stored(name);
    }

    /// Stored headers in insertion order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Sets a trailer sent after the last chunk. Registering any footer forces chunked framing.
    pub fn set_footer(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.footers.retain(|(key, _)| !eq_ignore_case(key.as_bytes(), name.as_bytes()));
        self.footers.push((name, value.into()));
    }

    pub fn add_footer(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.footers.push((name.into(), value.into()));
    }

    pub fn footers(&self) -> &[(String, String)] {
        &self.footers
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub(crate) fn clear_content_type(&mut self) {
        self.content_type = None;
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.content_length = Some(length);
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn add_cookie(&mut self, cookie: SetCookie) {
        self.cookies.push(cookie);
    }

    pub fn cookies(&self) -> &[SetCookie] {
        &self.cookies
    }

    #[inline]
    pub fn cache_policy(&self) -> &CachePolicy {
        &self.cache
    }

    #[inline]
    pub fn cache_policy_mut(&mut self) -> &mut CachePolicy {
        &mut self.cache
    }

    /// Whether the handler asked for `Connection: close`.
    #[inline]
    pub fn is_close_requested(&self) -> bool {
        self.close_requested
    }

    fn remove_stored(&mut self, name: &str) {
        self.headers.retain(|(key, _)| !eq_ignore_case(key.as_bytes(), name.as_bytes()));
    }

    /// Intercepts headers backed by typed fields. Returns `true` when the header is consumed.
    fn set_special(&mut self, name: &str, value: &str) -> bool {
        let key = name.as_bytes();
        match key.first().map(u8::to_ascii_lowercase) {
            Some(b'c') if eq_ignore_case(key, b"content-type") => {
                self.content_type = Some(value.to_owned());
                true
            }
            Some(b'c') if eq_ignore_case(key, b"content-length") => {
                self.content_length = value.trim().parse().ok();
                true
            }
            Some(b'c') if eq_ignore_case(key, b"connection") => {
                if eq_ignore_case(value.trim().as_bytes(), b"close") {
                    self.close_requested = true;
                    return true;
                }
                false
            }
            Some(b'c') if eq_ignore_case(key, b"cache-control") => {
                let value = value.trim_start().as_bytes();
                let shared_only = [&b"max-age"[..], b"s-maxage", b"x-anonymous"]
                    .iter()
                    .any(|prefix| value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix));
                if !shared_only {
                    self.cache.app_controlled = true;
                }
                false
            }
            // the date line is always written by the encoder
            Some(b'd') if eq_ignore_case(key, b"date") => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut head = ResponseHead::default();
        head.add_header("X-Trace", "a");
        head.add_header("x-trace", "b");
        head.add_header("Vary", "Accept");
        head.set_header("X-TRACE", "c");

        let headers: Vec<_> = head.headers().collect();
        assert_eq!(headers, vec![("Vary", "Accept"), ("X-TRACE", "c")]);
    }

    #[test]
    fn test_special_headers_are_consumed() {
        let mut head = ResponseHead::default();
        head.set_header("Content-Type", "text/plain");
        head.set_header("content-length", " 42 ");
        head.set_header("Connection", "close");
        head.set_header("Date", "Sun, 06 Nov 1994 08:49:37 GMT");

        assert_eq!(head.content_type(), Some("text/plain"));
        assert_eq!(head.content_length(), Some(42));
        assert!(head.is_close_requested());
        assert_eq!(head.headers().count(), 0);

        head.remove_header("Content-Length");
        assert_eq!(head.content_length(), None);
    }

    #[test]
    fn test_cache_control_marks_app_controlled() {
        let mut head = ResponseHead::default();
        head.set_header("Cache-Control", "max-age=60");
        assert!(!head.cache_policy().is_app_controlled());

        head.set_header("Cache-Control", "no-store");
        assert!(head.cache_policy().is_app_controlled());
        assert_eq!(head.header("cache-control"), Some("no-store"));
    }

    #[test]
    fn test_reason_defaults_to_canonical() {
        let mut head = ResponseHead::default();
        assert_eq!(head.reason(), "OK");

        head.set_status_with_reason(StatusCode::NOT_FOUND, "Gone Fishing");
        assert_eq!(head.reason(), "Gone Fishing");

        head.set_status(StatusCode::NOT_FOUND);
        assert_eq!(head.reason(), "Not Found");

        head.clear();
        assert_eq!(head.status(), StatusCode::OK);
    }
}
