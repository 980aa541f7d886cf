// src/autosend.rs  -  Debounced delta sender for a growing text buffer
//
// The caller owns the text buffer and reports every change. After the buffer
// has been quiet for `delay`, the part not yet acknowledged is handed to the
// engine. Acknowledgement is driven by CharacterSent events, one per char.

use crate::error::{EngineError, Result};
use crate::session::Engine;
use std::time::{Duration, Instant};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(300);

/// What the auto-sender needs from the engine.
pub trait SendTarget {
    fn is_busy(&self) -> bool;
    fn send_text(&self, text: &str) -> Result<()>;
}

impl SendTarget for Engine {
    fn is_busy(&self) -> bool { Engine::is_busy(self) }
    fn send_text(&self, text: &str) -> Result<()> { self.send(text) }
}

#[derive(Debug, Clone)]
pub struct AutoSend {
    enabled:      bool,
    armed:        bool,
    delay:        Duration,
    /// Latest snapshot of the caller's buffer
    text:         String,
    /// Chars of `text` confirmed transmitted
    acknowledged: usize,
    /// Everything confirmed transmitted, in order
    sent:         String,
    /// Chars handed to the engine and not yet confirmed
    in_flight:    usize,
    /// Leading part of `in_flight` that still maps onto `text`; the rest
    /// belongs to text edited away since dispatch
    live:         usize,
    /// Outstanding confirmations from before a clear; not logged in `sent`
    muted:        usize,
    deadline:     Option<Instant>,
}

impl AutoSend {
    pub fn new(delay: Duration) -> Self {
        Self {
            enabled:      false,
            armed:        false,
            delay,
            text:         String::new(),
            acknowledged: 0,
            sent:         String::new(),
            in_flight:    0,
            live:         0,
            muted:        0,
            deadline:     None,
        }
    }

    pub fn is_enabled(&self) -> bool { self.enabled }
    pub fn is_armed(&self) -> bool { self.armed }
    pub fn acknowledged_len(&self) -> usize { self.acknowledged }
    pub fn sent_text(&self) -> &str { &self.sent }
    pub fn deadline(&self) -> Option<Instant> { self.deadline }
    pub fn in_flight(&self) -> usize { self.in_flight }

    /// Untransmitted tail of the buffer.
    pub fn pending(&self) -> String {
        self.text.chars().skip(self.acknowledged).collect()
    }

    pub fn set_enabled(&mut self, on: bool, now: Instant) {
        self.enabled = on;
        log::info!("[autosend] {}", if on { "enabled" } else { "disabled" });
        if on {
            let text = self.text.clone();
            self.on_text_changed(&text, now);
        } else {
            self.armed = false;
            self.deadline = None;
        }
    }

    /// Report the full current buffer after any edit.
    pub fn on_text_changed(&mut self, text: &str, now: Instant) {
        let kept = self.text.chars()
            .zip(text.chars())
            .take_while(|(a, b)| a == b)
            .count();
        self.text.clear();
        self.text.push_str(text);

        // confirmations still to come for chars at or past `kept` no longer
        // describe this buffer
        self.live = self.live.min(kept.saturating_sub(self.acknowledged));

        if text.is_empty() {
            if self.armed {
                log::debug!("[autosend] buffer cleared  →  disarmed");
            }
            self.armed = false;
            self.deadline = None;
            self.acknowledged = 0;
            self.muted = self.in_flight;
            self.sent.clear();
            return;
        }

        if kept < self.acknowledged {
            // Edited inside what was already sent: clamp and resend from there.
            log::warn!("[autosend] edit at {kept} < {} acknowledged  →  clamped", self.acknowledged);
            self.acknowledged = kept;
        }

        let len = text.chars().count();
        self.armed = self.enabled;
        if self.armed && len > self.acknowledged {
            self.deadline = Some(now + self.delay);
        }
    }

    /// One character confirmed on air. Confirmations for text edited away
    /// since dispatch do not move the cursor.
    pub fn on_character_sent(&mut self, ch: char) {
        let tracked = self.in_flight > 0;
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.muted > 0 {
            self.muted -= 1;
        } else {
            self.sent.push(ch);
        }
        if tracked {
            if self.live == 0 {
                log::debug!("[autosend] {ch:?} confirmed for edited text  →  cursor unchanged");
                return;
            }
            self.live -= 1;
        }
        let len = self.text.chars().count();
        if self.acknowledged < len {
            self.acknowledged += 1;
        }
    }

    /// The engine finished (or cancelled) a send. Anything typed meanwhile
    /// goes out after one more quiet window.
    pub fn on_send_completed(&mut self, now: Instant) {
        self.in_flight = 0;
        self.live = 0;
        self.muted = 0;
        if self.armed && self.deadline.is_none() && !self.pending().is_empty() {
            self.deadline = Some(now + self.delay);
        }
    }

    /// Call from the main loop. Returns the text handed to the engine, if any.
    pub fn poll(&mut self, now: Instant, target: &impl SendTarget) -> Option<String> {
        let due = self.deadline.is_some_and(|d| now >= d);
        if !due {
            return None;
        }
        self.deadline = None;
        if !self.armed {
            return None;
        }
        self.dispatch(now, target, true)
    }

    /// Send the pending tail now, without waiting for the quiet window.
    /// Works whether or not auto-send is enabled.
    pub fn flush(&mut self, now: Instant, target: &impl SendTarget) -> Option<String> {
        self.deadline = None;
        self.dispatch(now, target, self.armed)
    }

    fn dispatch(&mut self, now: Instant, target: &impl SendTarget, retry: bool) -> Option<String> {
        // In flight: the engine may already be idle while the last
        // CharacterSent events are still queued for us.
        if self.in_flight > 0 || target.is_busy() {
            if retry {
                self.deadline = Some(now + self.delay);
            }
            return None;
        }

        let delta = self.pending();
        if delta.is_empty() {
            return None;
        }
        match target.send_text(&delta) {
            Ok(()) => {
                log::debug!("[autosend] sending {:?}", delta);
                self.in_flight = delta.chars().count();
                self.live = self.in_flight;
                self.muted = 0;
                Some(delta)
            }
            Err(EngineError::Busy) => {
                if retry {
                    self.deadline = Some(now + self.delay);
                }
                None
            }
            Err(e) => {
                log::warn!("[autosend] send failed: {e}");
                None
            }
        }
    }
}

impl Default for AutoSend {
    fn default() -> Self { Self::new(DEFAULT_DELAY) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeTarget {
        busy: bool,
        sent: RefCell<Vec<String>>,
    }

    impl SendTarget for FakeTarget {
        fn is_busy(&self) -> bool { self.busy }
        fn send_text(&self, text: &str) -> Result<()> {
            self.sent.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    fn armed(now: Instant) -> AutoSend {
        let mut a = AutoSend::new(Duration::from_millis(300));
        a.set_enabled(true, now);
        a
    }

    #[test]
    fn sends_only_the_unacknowledged_delta() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        a.on_text_changed("CQD", t0);
        for c in "CQD".chars() { a.on_character_sent(c); }
        assert_eq!(a.acknowledged_len(), 3);

        a.on_text_changed("CQDX", t0);
        let target = FakeTarget::default();
        assert_eq!(a.poll(t0 + Duration::from_millis(300), &target).as_deref(), Some("X"));
        assert_eq!(*target.sent.borrow(), vec!["X".to_string()]);
    }

    #[test]
    fn delta_after_three_acknowledged_is_dx() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        a.on_text_changed("CQ ", t0);
        for c in "CQ ".chars() { a.on_character_sent(c); }
        a.on_text_changed("CQ DX", t0);
        let target = FakeTarget::default();
        assert_eq!(a.poll(t0 + Duration::from_secs(1), &target).as_deref(), Some("DX"));
    }

    #[test]
    fn waits_for_quiescence_and_restarts_on_each_change() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        let target = FakeTarget::default();

        a.on_text_changed("C", t0);
        assert_eq!(a.poll(t0 + Duration::from_millis(200), &target), None);
        a.on_text_changed("CQ", t0 + Duration::from_millis(200));
        // 300 ms after the first keystroke, but only 100 ms after the last
        assert_eq!(a.poll(t0 + Duration::from_millis(300), &target), None);
        assert_eq!(a.poll(t0 + Duration::from_millis(500), &target).as_deref(), Some("CQ"));
        // single-shot
        assert_eq!(a.poll(t0 + Duration::from_millis(900), &target), None);
    }

    #[test]
    fn busy_engine_defers_instead_of_sending() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        a.on_text_changed("TEST", t0);
        let busy = FakeTarget { busy: true, ..Default::default() };
        assert_eq!(a.poll(t0 + Duration::from_millis(300), &busy), None);
        assert!(busy.sent.borrow().is_empty());
        assert!(a.deadline().is_some());

        let idle = FakeTarget::default();
        assert_eq!(a.poll(t0 + Duration::from_millis(600), &idle).as_deref(), Some("TEST"));
    }

    #[test]
    fn unconfirmed_send_blocks_a_duplicate() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        let target = FakeTarget::default();
        a.on_text_changed("CQ", t0);
        assert_eq!(a.poll(t0 + Duration::from_millis(300), &target).as_deref(), Some("CQ"));
        assert_eq!(a.in_flight(), 2);

        // engine already idle, events not drained yet
        a.on_text_changed("CQ DE", t0 + Duration::from_millis(310));
        assert_eq!(a.poll(t0 + Duration::from_millis(610), &target), None);

        a.on_character_sent('C');
        a.on_character_sent('Q');
        a.on_send_completed(t0 + Duration::from_millis(700));
        assert_eq!(a.poll(t0 + Duration::from_millis(1000), &target).as_deref(), Some(" DE"));
        assert_eq!(target.sent.borrow().len(), 2);
    }

    #[test]
    fn completion_reschedules_text_typed_during_send() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        let target = FakeTarget::default();
        a.on_text_changed("K", t0);
        a.poll(t0 + Duration::from_millis(300), &target);
        a.on_character_sent('K');
        a.on_text_changed("K 73", t0 + Duration::from_millis(350));
        // engine still keying the tail of "K"
        let busy = FakeTarget { busy: true, ..Default::default() };
        assert_eq!(a.poll(t0 + Duration::from_millis(650), &busy), None);
        assert_eq!(a.poll(t0 + Duration::from_millis(950), &busy), None);
        a.on_send_completed(t0 + Duration::from_millis(1000));
        assert!(a.deadline().is_some());
        assert_eq!(a.poll(t0 + Duration::from_millis(1300), &target).as_deref(), Some(" 73"));
    }

    #[test]
    fn flush_sends_immediately_even_when_disabled() {
        let t0 = Instant::now();
        let mut a = AutoSend::default();
        let target = FakeTarget::default();
        a.on_text_changed("73", t0);
        assert_eq!(a.flush(t0, &target).as_deref(), Some("73"));
        assert_eq!(a.in_flight(), 2);
        // nothing new until the engine confirms
        assert_eq!(a.flush(t0, &target), None);
        assert_eq!(a.deadline(), None);
    }

    #[test]
    fn clearing_mid_send_ignores_the_old_sends_confirmations() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        let target = FakeTarget::default();
        a.on_text_changed("HELLO", t0);
        assert_eq!(a.poll(t0 + Duration::from_millis(300), &target).as_deref(), Some("HELLO"));
        a.on_character_sent('H');

        // Ctrl-U, then new text while "ELLO" is still keying
        a.on_text_changed("", t0 + Duration::from_millis(400));
        a.on_text_changed("CQ", t0 + Duration::from_millis(450));
        for c in "ELLO".chars() { a.on_character_sent(c); }
        assert_eq!(a.acknowledged_len(), 0);
        assert_eq!(a.pending(), "CQ");
        assert_eq!(a.sent_text(), "");

        a.on_send_completed(t0 + Duration::from_millis(900));
        assert_eq!(a.poll(t0 + Duration::from_secs(5), &target).as_deref(), Some("CQ"));
        assert_eq!(*target.sent.borrow(), vec!["HELLO".to_string(), "CQ".to_string()]);
    }

    #[test]
    fn backspace_into_in_flight_text_resends_the_edit() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        let target = FakeTarget::default();
        a.on_text_changed("HELLO", t0);
        a.poll(t0 + Duration::from_millis(300), &target);
        a.on_character_sent('H');

        let t1 = t0 + Duration::from_millis(400);
        a.on_text_changed("HELL", t1);
        a.on_text_changed("HEL", t1);
        a.on_text_changed("HELP", t1);
        for c in "ELLO".chars() { a.on_character_sent(c); }
        // only "HEL" of the new buffer was actually keyed
        assert_eq!(a.acknowledged_len(), 3);
        assert_eq!(a.sent_text(), "HELLO");

        a.on_send_completed(t1);
        assert_eq!(a.poll(t1 + Duration::from_secs(1), &target).as_deref(), Some("P"));
    }

    #[test]
    fn appending_during_a_send_keeps_its_confirmations_live() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        let target = FakeTarget::default();
        a.on_text_changed("CQ", t0);
        a.poll(t0 + Duration::from_millis(300), &target);
        a.on_text_changed("CQ DX", t0 + Duration::from_millis(310));
        a.on_character_sent('C');
        a.on_character_sent('Q');
        assert_eq!(a.acknowledged_len(), 2);
        assert_eq!(a.pending(), " DX");
    }

    #[test]
    fn disabled_controller_never_sends() {
        let t0 = Instant::now();
        let mut a = AutoSend::default();
        a.on_text_changed("CQ", t0);
        assert!(!a.is_armed());
        assert_eq!(a.poll(t0 + Duration::from_secs(5), &FakeTarget::default()), None);
    }

    #[test]
    fn clearing_buffer_disarms_and_resets_cursor() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        a.on_text_changed("CQ", t0);
        a.on_character_sent('C');
        a.on_text_changed("", t0);
        assert!(!a.is_armed());
        assert_eq!(a.deadline(), None);
        assert_eq!(a.acknowledged_len(), 0);
        assert_eq!(a.sent_text(), "");
        assert_eq!(a.poll(t0 + Duration::from_secs(1), &FakeTarget::default()), None);
    }

    #[test]
    fn shrinking_below_cursor_clamps_and_resends_tail() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        a.on_text_changed("CQ CQ", t0);
        for c in "CQ CQ".chars() { a.on_character_sent(c); }
        a.on_text_changed("CQ", t0);
        assert_eq!(a.acknowledged_len(), 2);
        a.on_text_changed("CQ DE", t0);
        assert_eq!(a.pending(), " DE");
    }

    #[test]
    fn acknowledgement_is_monotonic_and_bounded_by_text() {
        let t0 = Instant::now();
        let mut a = armed(t0);
        a.on_text_changed("AB", t0);
        a.on_character_sent('A');
        a.on_character_sent('B');
        a.on_character_sent('C');
        assert_eq!(a.acknowledged_len(), 2);
        assert_eq!(a.sent_text(), "ABC");
    }

    #[test]
    fn enabling_later_picks_up_existing_text() {
        let t0 = Instant::now();
        let mut a = AutoSend::default();
        a.on_text_changed("QRZ", t0);
        a.set_enabled(true, t0);
        assert!(a.is_armed());
        let target = FakeTarget::default();
        assert_eq!(a.poll(t0 + DEFAULT_DELAY, &target).as_deref(), Some("QRZ"));
    }
}
