//! Hook points for a response cache.
//!
//! The engine decides nothing about caching policy. It offers two seams: a [`CacheTap`] sees
//! the committed body of a `200` response as it goes out, and a [`CachedResponse`] can be
//! replayed through [`ResponseStream::send_cached`](super::ResponseStream::send_cached)
//! instead of running the normal write path.

use std::fmt::Debug;

use bytes::Bytes;
use http::StatusCode;
use tracing::debug;

use crate::protocol::ResponseHead;

/// Receives a copy of the response body bytes.
pub trait CacheTap: Send + Debug {
    fn write(&mut self, data: &[u8]);

    /// The response completed; `head` is the head that was sent.
    fn finish(self: Box<Self>, head: &ResponseHead);

    /// The response can't be cached: it failed, was not a `200`, or grew too large.
    fn abort(self: Box<Self>) {}
}

/// A stored response to send in place of running the handler's write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { status, headers: Vec::new(), content_type: None, body: body.into() }
    }
}

/// The tap of the current response, bounded by the configured cache length.
#[derive(Debug)]
pub(crate) struct CacheSlot {
    tap: Option<Box<dyn CacheTap>>,
    written: u64,
    max_length: u64,
}

impl CacheSlot {
    pub(crate) fn new(max_length: u64) -> Self {
        Self { tap: None, written: 0, max_length }
    }

    pub(crate) fn set(&mut self, tap: Box<dyn CacheTap>) {
        self.kill();
        self.tap = Some(tap);
        self.written = 0;
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.tap.is_some()
    }

    /// Called when the head is committed. Only `200` responses are recorded.
    pub(crate) fn start(&mut self, status: StatusCode) {
        if self.tap.is_some() && status != StatusCode::OK {
            debug!(status = status.as_u16(), "response not cacheable");
            self.kill();
        }
    }

    pub(crate) fn write(&mut self, data: &[u8]) {
        let Some(tap) = self.tap.as_mut() else {
            return;
        };

        self.written += data.len() as u64;
        if self.written > self.max_length {
            debug!(max_length = self.max_length, "response too large for cache");
            self.kill();
            return;
        }
        tap.write(data);
    }

    pub(crate) fn finish(&mut self, head: &ResponseHead) {
        if let Some(tap) = self.tap.take() {
            tap.finish(head);
        }
    }

    pub(crate) fn kill(&mut self) {
        if let Some(tap) = self.tap.take() {
            tap.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Records into a shared cell so tests can look after the tap was consumed.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingTap {
        pub(crate) state: Arc<Mutex<TapState>>,
    }

    #[derive(Debug, Default)]
    pub(crate) struct TapState {
        pub(crate) body: Vec<u8>,
        pub(crate) finished: bool,
        pub(crate) aborted: bool,
    }

    impl CacheTap for RecordingTap {
        fn write(&mut self, data: &[u8]) {
            self.state.lock().body.extend_from_slice(data);
        }

        fn finish(self: Box<Self>, _head: &ResponseHead) {
            self.state.lock().finished = true;
        }

        fn abort(self: Box<Self>) {
            self.state.lock().aborted = true;
        }
    }

    #[test]
    fn test_bounded_by_max_length() {
        let tap = RecordingTap::default();
        let mut slot = CacheSlot::new(4);
        slot.set(Box::new(tap.clone()));
        slot.start(StatusCode::OK);

        slot.write(b"abc");
        assert!(slot.is_active());
        slot.write(b"de");
        assert!(!slot.is_active());

        let state = tap.state.lock();
        assert_eq!(state.body, b"abc");
        assert!(state.aborted);
    }

    #[test]
    fn test_only_ok_is_recorded() {
        let tap = RecordingTap::default();
        let mut slot = CacheSlot::new(1024);
        slot.set(Box::new(tap.clone()));
        slot.start(StatusCode::NOT_FOUND);
        slot.write(b"missing");
        slot.finish(&ResponseHead::default());

        let state = tap.state.lock();
        assert!(state.body.is_empty());
        assert!(state.aborted);
        assert!(!state.finished);
    }
}
