//! Char to byte conversion for `print`.

use std::fmt;

use crate::protocol::ResponseError;

/// Output encodings the response stream can convert chars into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1.
    Latin1,
    /// US-ASCII.
    Ascii,
}

impl OutputEncoding {
    /// Looks up an encoding by one of its common labels, ignoring case.
    ///
    /// # Errors
    /// Returns [`ResponseError::UnsupportedEncoding`] for any other label.
    pub fn for_label(label: &str) -> Result<Self, ResponseError> {
        let trimmed = label.trim();
        let matches = |names: &[&str]| names.iter().any(|name| trimmed.eq_ignore_ascii_case(name));

        if matches(&["utf-8", "utf8"]) {
            Ok(Self::Utf8)
        } else if matches(&["iso-8859-1", "iso8859-1", "iso_8859-1", "latin1"]) {
            Ok(Self::Latin1)
        } else if matches(&["us-ascii", "ascii"]) {
            Ok(Self::Ascii)
        } else {
            Err(ResponseError::unsupported_encoding(label))
        }
    }

    /// The name reported in `Content-Type`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "iso-8859-1",
            Self::Ascii => "us-ascii",
        }
    }

    /// Appends `chars` in this encoding. Chars the encoding can't represent become `?`.
    pub fn encode_into(self, chars: &str, dst: &mut Vec<u8>) {
        let limit = match self {
            Self::Utf8 => {
                dst.extend_from_slice(chars.as_bytes());
                return;
            }
            Self::Latin1 => 0xFF,
            Self::Ascii => 0x7F,
        };

        dst.reserve(chars.len());
        dst.extend(chars.chars().map(|c| u8::try_from(u32::from(c)).ok().filter(|b| u32::from(*b) <= limit).unwrap_or(b'?')));
    }
}

impl fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
