//! State machines of one response and one connection.

use crate::protocol::LifecycleError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Open,
    Closing,
    Closed,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Open => "open",
            Phase::Closing => "closing",
            Phase::Closed => "closed",
        }
    }
}

/// State of a response stream.
///
/// `head_only` and `committed` are independent flags that only ever get set. The phase moves
/// forward from open through closing to closed. Closing twice is a no-op; everything else
/// that would move backwards is an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamState {
    head_only: bool,
    committed: bool,
    phase: Phase,
}

impl StreamState {
    #[inline]
    pub fn is_head_only(&self) -> bool {
        self.head_only
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    #[inline]
    pub fn is_closing(&self) -> bool {
        self.phase == Phase::Closing
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn set_head_only(&mut self) -> Result<(), LifecycleError> {
        if self.phase == Phase::Closed {
            return Err(LifecycleError::illegal(self.phase.name(), "drop the body"));
        }
        self.head_only = true;
        Ok(())
    }

    /// Marks the head as written. Returns `false` when it already was.
    pub fn commit(&mut self) -> Result<bool, LifecycleError> {
        if self.committed {
            return Ok(false);
        }
        if self.phase == Phase::Closed {
            return Err(LifecycleError::illegal(self.phase.name(), "commit"));
        }
        self.committed = true;
        Ok(true)
    }

    /// Enters closing. Returns `false` when the stream is already closed.
    pub fn begin_close(&mut self) -> Result<bool, LifecycleError> {
        match self.phase {
            Phase::Open => {
                self.phase = Phase::Closing;
                Ok(true)
            }
            Phase::Closed => Ok(false),
            Phase::Closing => Err(LifecycleError::illegal(self.phase.name(), "close")),
        }
    }

    pub fn finish_close(&mut self) -> Result<(), LifecycleError> {
        match self.phase {
            Phase::Open => Err(LifecycleError::illegal(self.phase.name(), "finish closing")),
            Phase::Closing | Phase::Closed => {
                self.phase = Phase::Closed;
                Ok(())
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Keep-alive budget of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    max: usize,
    served: usize,
    killed: bool,
}

impl KeepAlive {
    /// `max` requests at most; 0 serves a single request.
    pub fn new(max: usize) -> Self {
        Self { max, served: 0, killed: false }
    }

    /// Whether another request may follow the current one.
    #[inline]
    pub fn has_capacity(&self) -> bool {
        !self.killed && self.served + 1 < self.max
    }

    #[inline]
    pub fn kill(&mut self) {
        self.killed = true;
    }

    #[inline]
    pub fn record_request(&mut self) {
        self.served += 1;
    }

    #[inline]
    pub fn served(&self) -> usize {
        self.served
    }

    /// Whether the connection may read another request. The first request is always read.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.killed && self.served < self.max.max(1)
    }
}

/// Flags the handler sets on the request in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestLifecycle {
    pending_async: bool,
    duplex: bool,
}

impl RequestLifecycle {
    /// Leaves the request open after the handler returns, to be completed later.
    #[inline]
    pub fn suspend(&mut self) {
        self.pending_async = true;
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.pending_async
    }

    #[inline]
    pub fn set_duplex(&mut self) {
        self.duplex = true;
    }

    #[inline]
    pub fn is_duplex(&self) -> bool {
        self.duplex
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_state_moves_forward() {
        let mut state = StreamState::default();
        assert!(state.finish_close().is_err());

        assert!(state.commit().unwrap());
        assert!(!state.commit().unwrap());
        state.set_head_only().unwrap();

        assert!(state.begin_close().unwrap());
        assert!(state.is_closing());
        assert_eq!(state.begin_close(), Err(LifecycleError::illegal("closing", "close")));
        state.finish_close().unwrap();

        assert!(state.is_closed());
        assert!(state.is_committed());
        assert!(state.is_head_only());
        assert!(!state.begin_close().unwrap());
        assert!(state.set_head_only().is_err());

        state.reset();
        assert_eq!(state, StreamState::default());
    }

    #[test]
    fn test_commit_after_close() {
        let mut state = StreamState::default();
        state.begin_close().unwrap();
        assert!(state.commit().unwrap());

        let mut state = StreamState::default();
        state.begin_close().unwrap();
        state.finish_close().unwrap();
        assert!(matches!(state.commit(), Err(LifecycleError::IllegalTransition { action: "commit", .. })));
    }

    #[test]
    fn test_keepalive_budget() {
        let mut keepalive = KeepAlive::new(2);
        assert!(keepalive.has_capacity());
        keepalive.record_request();
        assert!(keepalive.is_alive());
        assert!(!keepalive.has_capacity());
        keepalive.record_request();
        assert!(!keepalive.is_alive());

        let mut keepalive = KeepAlive::new(100);
        keepalive.kill();
        assert!(!keepalive.has_capacity());
        assert!(!keepalive.is_alive());

        let mut keepalive = KeepAlive::new(0);
        assert!(keepalive.is_alive());
        assert!(!keepalive.has_capacity());
        keepalive.record_request();
        assert!(!keepalive.is_alive());
    }
}
