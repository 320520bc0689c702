//! Cookie wire syntax.
//!
//! Request side: the `Cookie` header value is scanned in place into [`CookieSpan`]s, both the
//! classic `a=1; b=2` form and the versioned form with `$Version`, `$Path`, `$Domain` and
//! `$Port` attributes.
//!
//! Response side: [`SetCookie`] renders the classic `Set-Cookie` form and the quoted
//! `Set-Cookie2` form for versioned cookies.

use std::ops::Range;
use std::time::{Duration, SystemTime};

use bytes::{BufMut, BytesMut};

use crate::protocol::{Span, SpanRef};
use crate::utils::{eq_ignore_case, put_decimal, trim_end_ws};

/// `expires` value used for a cookie that must be dropped right away.
const EXPIRED: &[u8] = b"Thu, 01-Dec-1994 16:00:00 GMT";

/// Keeps computed expiry dates within what an HTTP date can express.
const MAX_AGE_LIMIT: u64 = 100 * 365 * 24 * 60 * 60;

/// One request cookie, as spans into the header buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieSpan {
    pub name: Span,
    pub value: Span,
    pub path: Option<Span>,
    pub domain: Option<Span>,
    pub port: Option<Span>,
    pub version: u8,
}

/// A resolved request cookie.
#[derive(Debug, Clone, Copy)]
pub struct RequestCookie<'a> {
    pub name: SpanRef<'a>,
    pub value: SpanRef<'a>,
    pub path: Option<SpanRef<'a>>,
    pub domain: Option<SpanRef<'a>>,
    pub port: Option<SpanRef<'a>>,
    pub version: u8,
}

#[inline]
fn is_separator(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b';' | b',')
}

/// Scans one `Cookie` header value. `base` is the offset of `value` in the header buffer.
pub(crate) fn scan_cookies(value: &[u8], base: usize, cookies: &mut Vec<CookieSpan>) {
    let span = |r: Range<usize>| Span::from_range(base + r.start..base + r.end);
    let end = value.len();
    let mut version = 0u8;
    let mut i = 0;

    while i < end {
        while i < end && is_separator(value[i]) {
            i += 1;
        }
        if i >= end {
            break;
        }

        let special = value[i] == b'$';
        if special {
            i += 1;
        }

        let name_start = i;
        while i < end && !matches!(value[i], b'=' | b';' | b',' | b' ' | b'\t') {
            i += 1;
        }
        let name = name_start..i;

        while i < end && matches!(value[i], b' ' | b'\t') {
            i += 1;
        }

        let mut val = i..i;
        if i < end && value[i] == b'=' {
            i += 1;
            while i < end && matches!(value[i], b' ' | b'\t') {
                i += 1;
            }

            if i < end && value[i] == b'"' {
                i += 1;
                let start = i;
                while i < end && value[i] != b'"' {
                    i += 1;
                }
                val = start..i;
                if i < end {
                    i += 1;
                }
            } else {
                let start = i;
                while i < end && value[i] != b';' && value[i] != b',' {
                    i += 1;
                }
                val = start..start + trim_end_ws(&value[start..i]).len();
            }
        }

        let name_bytes = &value[name.clone()];
        if special {
            if eq_ignore_case(name_bytes, b"Version") {
                version = value[val].first().filter(|b| b.is_ascii_digit()).map_or(0, |b| b - b'0');
            } else if let Some(last) = cookies.last_mut() {
                if eq_ignore_case(name_bytes, b"Path") {
                    last.path = Some(span(val));
                } else if eq_ignore_case(name_bytes, b"Domain") {
                    last.domain = Some(span(val));
                } else if eq_ignore_case(name_bytes, b"Port") {
                    last.port = Some(span(val));
                }
            }
        } else if !name.is_empty() {
            cookies.push(CookieSpan { name: span(name), value: span(val), path: None, domain: None, port: None, version });
        }
    }
}

/// A cookie sent with the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    port: Option<String>,
    comment: Option<String>,
    max_age: Option<i64>,
    secure: bool,
    http_only: bool,
    version: u8,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            port: None,
            comment: None,
            max_age: None,
            secure: false,
            http_only: false,
            version: 0,
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Lifetime in seconds. `0` expires the cookie, a negative value keeps it for the session.
    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Renders the `Set-Cookie` value.
    pub(crate) fn write_classic(&self, dst: &mut BytesMut, now: SystemTime, force_http_only: bool) {
        dst.put_slice(self.name.as_bytes());
        dst.put_u8(b'=');
        dst.put_slice(self.value.as_bytes());

        if let Some(domain) = &self.domain {
            dst.put_slice(b"; domain=");
            dst.put_slice(domain.as_bytes());
        }

        if let Some(path) = &self.path {
            dst.put_slice(if self.version > 0 { b"; Path=" } else { b"; path=" });
            dst.put_slice(path.as_bytes());
        }

        if let Some(max_age) = self.max_age {
            if max_age >= 0 {
                dst.put_slice(b"; expires=");
                put_expires(dst, now, max_age.unsigned_abs());
            }
            if self.version > 0 {
                dst.put_slice(b"; Max-Age=");
                put_max_age(dst, max_age);
            }
        }

        if self.version > 0 {
            dst.put_slice(b"; Version=");
            put_decimal(dst, u64::from(self.version));
            if let Some(comment) = &self.comment {
                dst.put_slice(b"; Comment=");
                dst.put_slice(comment.as_bytes());
            }
        }

        if self.secure {
            dst.put_slice(b"; secure");
        }

        if self.http_only || force_http_only {
            dst.put_slice(b"; HttpOnly");
        }
    }

    /// Renders the `Set-Cookie2` value.
    pub(crate) fn write_versioned(&self, dst: &mut BytesMut, force_http_only: bool) {
        dst.put_slice(self.name.as_bytes());
        dst.put_u8(b'=');
        put_quoted(dst, &self.value);

        let attributes: [(&[u8], &Option<String>); 3] =
            [(b"; Domain=", &self.domain), (b"; Path=", &self.path), (b"; Port=", &self.port)];
        for (key, value) in attributes {
            if let Some(value) = value {
                dst.put_slice(key);
                put_quoted(dst, value);
            }
        }

        if let Some(max_age) = self.max_age {
            dst.put_slice(b"; Max-Age=");
            put_max_age(dst, max_age);
        }

        if let Some(comment) = &self.comment {
            dst.put_slice(b"; Comment=");
            put_quoted(dst, comment);
        }

        dst.put_slice(b"; Version=");
        put_decimal(dst, u64::from(self.version));

        if self.secure {
            dst.put_slice(b"; Secure");
        }

        if self.http_only || force_http_only {
            dst.put_slice(b"; HttpOnly");
        }
    }
}

fn put_max_age(dst: &mut BytesMut, max_age: i64) {
    if max_age < 0 {
        dst.put_u8(b'-');
    }
    put_decimal(dst, max_age.unsigned_abs());
}

/// `Wdy, DD-Mon-YYYY HH:MM:SS GMT`, the date form classic cookies use.
fn put_expires(dst: &mut BytesMut, now: SystemTime, max_age: u64) {
    if max_age == 0 {
        dst.put_slice(EXPIRED);
        return;
    }

    let at = now.checked_add(Duration::from_secs(max_age.min(MAX_AGE_LIMIT))).unwrap_or(now);
    let mut date = httpdate::fmt_http_date(at).into_bytes();
    date[7] = b'-';
    date[11] = b'-';
    dst.put_slice(&date);
}

fn put_quoted(dst: &mut BytesMut, value: &str) {
    dst.put_u8(b'"');
    for b in value.bytes() {
        if b == b'"' || b == b'\\' {
            dst.put_u8(b'\\');
        }
        dst.put_u8(b);
    }
    dst.put_u8(b'"');
}
