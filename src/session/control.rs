// src/session/control.rs  -  Per-session state + cancellation flag (one lock)
use crate::lock;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Diagnostic "CQ CQ CQ" on the monitor device
    Test,
    /// Operator text on the output device
    Send,
}

impl SessionKind {
    pub fn label(self) -> &'static str {
        match self {
            SessionKind::Test => "test",
            SessionKind::Send => "send",
        }
    }
}

/// Idle → Starting → Streaming → (Stopping) → Completed | Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    Completed,
    Cancelled,
}

impl SessionState {
    /// Holds (or is about to hold) a device connection.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Streaming | SessionState::Stopping)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

#[derive(Debug)]
struct Inner {
    state:            SessionState,
    cancel_requested: bool,
}

/// Shared between the playback worker and any thread that wants to cancel
/// it. Held only for short reads/writes, never across a device write.
#[derive(Debug)]
pub struct SessionControl {
    inner:   Mutex<Inner>,
    changed: Condvar,
}

impl Default for SessionControl {
    fn default() -> Self { Self::new() }
}

impl SessionControl {
    pub fn new() -> Self {
        Self {
            inner:   Mutex::new(Inner { state: SessionState::Idle, cancel_requested: false }),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> SessionState { lock(&self.inner).state }

    pub fn is_cancel_requested(&self) -> bool { lock(&self.inner).cancel_requested }

    /// Fire-and-forget, idempotent. Observed at the next chunk boundary.
    pub fn cancel(&self) {
        let mut g = lock(&self.inner);
        if !g.cancel_requested {
            g.cancel_requested = true;
            log::debug!("[session] cancel requested in state {:?}", g.state);
        }
    }

    /// Idle → Starting. False from any other state.
    pub fn begin(&self) -> bool {
        let mut g = lock(&self.inner);
        if g.state != SessionState::Idle {
            return false;
        }
        g.state = SessionState::Starting;
        g.cancel_requested = false;
        drop(g);
        self.changed.notify_all();
        true
    }

    /// Starting → Streaming, unless a cancel already arrived.
    pub(crate) fn enter_streaming(&self) -> bool {
        self.checkpoint() && self.transition(SessionState::Starting, SessionState::Streaming)
    }

    /// Chunk-boundary check. On cancel, moves to Stopping and returns false.
    pub(crate) fn checkpoint(&self) -> bool {
        let mut g = lock(&self.inner);
        if !g.cancel_requested {
            return true;
        }
        if g.state.is_active() {
            g.state = SessionState::Stopping;
        }
        drop(g);
        self.changed.notify_all();
        false
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut g = lock(&self.inner);
        if g.state != from {
            return false;
        }
        g.state = to;
        drop(g);
        self.changed.notify_all();
        true
    }

    pub(crate) fn set_state(&self, to: SessionState) {
        lock(&self.inner).state = to;
        self.changed.notify_all();
    }

    /// Block until `pred(state)` holds or `timeout` passes.
    pub fn wait_until(&self, timeout: Duration, pred: impl Fn(SessionState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = lock(&self.inner);
        while !pred(g.state) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            g = self.changed.wait_timeout(g, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_only_from_idle() {
        let c = SessionControl::new();
        assert!(c.begin());
        assert_eq!(c.state(), SessionState::Starting);
        assert!(!c.begin());
    }

    #[test]
    fn cancel_is_idempotent_and_seen_at_checkpoint() {
        let c = SessionControl::new();
        c.begin();
        assert!(c.enter_streaming());
        assert!(c.checkpoint());
        c.cancel();
        c.cancel();
        assert!(!c.checkpoint());
        assert_eq!(c.state(), SessionState::Stopping);
    }

    #[test]
    fn cancel_before_streaming_blocks_entry() {
        let c = SessionControl::new();
        c.begin();
        c.cancel();
        assert!(!c.enter_streaming());
        assert_eq!(c.state(), SessionState::Stopping);
    }

    #[test]
    fn wait_until_sees_change_from_other_thread() {
        let c = std::sync::Arc::new(SessionControl::new());
        let c2 = std::sync::Arc::clone(&c);
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            c2.set_state(SessionState::Completed);
        });
        assert!(c.wait_until(Duration::from_secs(2), SessionState::is_finished));
        h.join().expect("join");
    }

    #[test]
    fn wait_until_times_out() {
        let c = SessionControl::new();
        assert!(!c.wait_until(Duration::from_millis(10), SessionState::is_finished));
    }
}
