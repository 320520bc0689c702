use std::error::Error;
use std::io;
use std::io::ErrorKind;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("response state error: {source}")]
    StateError {
        #[from]
        source: ResponseError,
    },

    #[error("lifecycle error: {source}")]
    LifecycleError {
        #[from]
        source: LifecycleError,
    },

    #[error("handler error: {source}")]
    HandlerError { source: Box<dyn Error + Send + Sync> },
}

impl HttpError {
    pub fn handler<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::HandlerError { source: e.into() }
    }

    /// Whether this error was caused by the peer going away.
    pub fn is_client_disconnect(&self) -> bool {
        match self {
            HttpError::RequestError { source } => source.is_client_disconnect(),
            HttpError::ResponseError { source } => source.is_client_disconnect(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("HTTP/1.1 request without host")]
    MissingHost,

    #[error("{method} requires content-length")]
    LengthRequired { method: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("unexpected end of stream inside the request body")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn length_required(method: &[u8]) -> Self {
        Self::LengthRequired { method: String::from_utf8_lossy(method).into_owned() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Malformed requests are answered with `400 Bad Request`.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, ParseError::UnexpectedEof | ParseError::Io { .. })
    }

    pub fn is_client_disconnect(&self) -> bool {
        match self {
            ParseError::UnexpectedEof => true,
            ParseError::Io { source } => is_disconnect(source.kind()),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("client disconnect: {source}")]
    ClientDisconnect { source: io::Error },

    #[error("io error: {source}")]
    Io { source: io::Error },
}

impl SendError {
    /// Wraps a socket error, separating client disconnects from other failures.
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        let source = e.into();
        if is_disconnect(source.kind()) { Self::ClientDisconnect { source } } else { Self::Io { source } }
    }

    pub fn is_client_disconnect(&self) -> bool {
        matches!(self, SendError::ClientDisconnect { .. })
    }
}

impl From<io::Error> for SendError {
    fn from(e: io::Error) -> Self {
        Self::io(e)
    }
}

/// Misuse of the response stream that leaves it usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("can't change the buffer size after the response is committed")]
    BufferSizeAfterCommit,

    #[error("can't clear the response buffer after the response is committed")]
    ClearAfterCommit,

    #[error("can't upgrade after the response is committed")]
    UpgradeAfterCommit,

    #[error("unsupported encoding: {name}")]
    UnsupportedEncoding { name: String },
}

impl ResponseError {
    pub fn unsupported_encoding<S: ToString>(name: S) -> Self {
        Self::UnsupportedEncoding { name: name.to_string() }
    }
}

/// Internal consistency failures of the request/response state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("illegal transition: can't {action} when {state}")]
    IllegalTransition { state: &'static str, action: &'static str },

    #[error("connection has a suspended request pending")]
    PendingAsync,

    #[error("connection has no active request")]
    NoActiveRequest,
}

impl LifecycleError {
    pub fn illegal(state: &'static str, action: &'static str) -> Self {
        Self::IllegalTransition { state, action }
    }
}

pub(crate) fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::WriteZero
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_classifies_disconnect() {
        let e = SendError::io(io::Error::from(ErrorKind::BrokenPipe));
        assert!(e.is_client_disconnect());

        let e = SendError::from(io::Error::from(ErrorKind::PermissionDenied));
        assert!(!e.is_client_disconnect());

        let e: HttpError = SendError::io(io::Error::from(ErrorKind::ConnectionReset)).into();
        assert!(e.is_client_disconnect());
    }

    #[test]
    fn test_parse_error_kinds() {
        assert!(ParseError::MissingHost.is_malformed());
        assert!(ParseError::invalid_body("bad chunk").is_malformed());
        assert!(!ParseError::UnexpectedEof.is_malformed());
        assert!(ParseError::UnexpectedEof.is_client_disconnect());
        assert_eq!(ParseError::length_required(b"POST").to_string(), "POST requires content-length");
    }
}
