//! Cached `Date` header line.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use httpdate::fmt_http_date;

const PREFIX: &[u8] = b"\r\nDate: ";
const DATE_LEN: usize = 29;
const LINE_LEN: usize = PREFIX.len() + DATE_LEN + 4;
/// Offset of the seconds digits inside the line.
const SECONDS_AT: usize = PREFIX.len() + 23;

/// The `Date` line that ends every response head, `\r\nDate: <IMF-fixdate>\r\n\r\n`.
///
/// The full date is formatted once a minute; within a minute only the two seconds digits are
/// patched in place. The time is passed in, so tests can pin it.
#[derive(Debug, Clone)]
pub struct DateCache {
    line: [u8; LINE_LEN],
    secs: u64,
    valid: bool,
}

impl Default for DateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DateCache {
    pub fn new() -> Self {
        let mut line = [0u8; LINE_LEN];
        line[..PREFIX.len()].copy_from_slice(PREFIX);
        line[LINE_LEN - 4..].copy_from_slice(b"\r\n\r\n");
        Self { line, secs: 0, valid: false }
    }

    pub fn update(&mut self, now: SystemTime) {
        let secs = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
        if self.valid && secs == self.secs {
            return;
        }

        if self.valid && secs / 60 == self.secs / 60 {
            let s = secs % 60;
            self.line[SECONDS_AT] = b'0' + (s / 10) as u8;
            self.line[SECONDS_AT + 1] = b'0' + (s % 10) as u8;
        } else {
            let date = fmt_http_date(UNIX_EPOCH + Duration::from_secs(secs));
            self.line[PREFIX.len()..PREFIX.len() + DATE_LEN].copy_from_slice(&date.as_bytes()[..DATE_LEN]);
        }

        self.secs = secs;
        self.valid = true;
    }

    /// The line including the blank line that ends the head. A chunked head stops one CRLF
    /// short: the first chunk header supplies it.
    pub fn line(&self, chunked: bool) -> &[u8] {
        if chunked { &self.line[..LINE_LEN - 2] } else { &self.line[..] }
    }
}
