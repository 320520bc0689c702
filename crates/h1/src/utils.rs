//! Small helpers shared by the codec and connection layers.

use bytes::{BufMut, BytesMut};

/// Returns early with `$error` when `$predicate` does not hold.
///
/// Works like `assert!` but produces an `Err` instead of panicking:
///
/// ```ignore
/// ensure!(keys.len() < max_headers, ParseError::too_many_headers(max_headers));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// ASCII case-insensitive comparison of a header-ish token against a literal.
#[inline]
pub(crate) fn eq_ignore_case(bytes: &[u8], literal: &[u8]) -> bool {
    bytes.len() == literal.len() && bytes.eq_ignore_ascii_case(literal)
}

/// Trims trailing bytes that are `<= b' '`, the way header values are cleaned.
#[inline]
pub(crate) fn trim_end_ws(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b > b' ').map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Writes `n` in decimal without going through the formatting machinery.
pub(crate) fn put_decimal(dst: &mut BytesMut, mut n: u64) {
    let mut buf = [0u8; 20];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = DIGITS[(n % 10) as usize];
        n /= 10;
        if n == 0 {
            break;
        }
    }
    dst.put_slice(&buf[i..]);
}

const DIGITS: &[u8; 10] = b"0123456789";
