// src/session/coordinator.rs  -  Engine: admission control + session lifecycle
//
// At most one session (Test or Send) is active engine-wide. The admission
// check and the Idle → Starting transition happen under the same `gate`
// lock; the slot is cleared by the worker itself, after it has released the
// device and before it reports the outcome.

use super::control::{SessionKind, SessionState};
use super::playback::{PlaybackOutcome, PlaybackSession, Program};
use super::task::WorkerTask;
use crate::audio::{DeviceFactory, StreamParams};
use crate::error::{EngineError, Result};
use crate::lock;
use crate::morse::{encode, synthesize, synthesize_marked, SampleBuffer, Timing, DEFAULT_SAMPLE_RATE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed diagnostic phrase for the test tone.
pub const TEST_PHRASE: &str = "CQ CQ CQ";
/// Silence between repetitions of a looping test.
pub const TEST_REPEAT_PAUSE: Duration = Duration::from_secs(1);

/// Events delivered to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    TestCompleted,
    SendCompleted,
    CharacterSent(char),
    DeviceError(String),
}

/// Accepted parameter ranges; checked at the call boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub min_wpm:     u32,
    pub max_wpm:     u32,
    pub min_tone_hz: f32,
    pub max_tone_hz: f32,
}

impl Default for Limits {
    fn default() -> Self {
        Self { min_wpm: 5, max_wpm: 60, min_tone_hz: 100.0, max_tone_hz: 3000.0 }
    }
}

impl Limits {
    pub fn check_wpm(&self, wpm: u32) -> Result<()> {
        if (self.min_wpm..=self.max_wpm).contains(&wpm) {
            Ok(())
        } else {
            Err(EngineError::InvalidParameter(format!(
                "wpm {wpm} outside {}..={}", self.min_wpm, self.max_wpm
            )))
        }
    }

    pub fn check_tone(&self, hz: f32) -> Result<()> {
        if hz.is_finite() && (self.min_tone_hz..=self.max_tone_hz).contains(&hz) {
            Ok(())
        } else {
            Err(EngineError::InvalidParameter(format!(
                "tone {hz} Hz outside {}..={} Hz", self.min_tone_hz, self.max_tone_hz
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub sample_rate:    u32,
    pub tone_hz:        f32,
    pub wpm:            u32,
    /// Send sessions
    pub output_device:  Option<String>,
    /// Test sessions
    pub monitor_device: Option<String>,
    pub block_size:     usize,
    /// Bounded wait in stop_test / stop_send
    pub stop_timeout:   Duration,
    /// Loop the test phrase until stopped
    pub test_repeat:    bool,
    pub limits:         Limits,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate:    DEFAULT_SAMPLE_RATE,
            tone_hz:        700.0,
            wpm:            20,
            output_device:  None,
            monitor_device: None,
            block_size:     1024,
            stop_timeout:   Duration::from_secs(1),
            test_repeat:    false,
            limits:         Limits::default(),
        }
    }
}

impl EngineSettings {
    fn params(&self, kind: SessionKind) -> StreamParams {
        let device = match kind {
            SessionKind::Test => self.monitor_device.clone(),
            SessionKind::Send => self.output_device.clone(),
        };
        StreamParams::mono(device, self.sample_rate, self.block_size)
    }
}

struct ActiveSession {
    id:   u64,
    kind: SessionKind,
    task: WorkerTask,
}

struct Inner {
    factory:  Arc<dyn DeviceFactory>,
    settings: Mutex<EngineSettings>,
    gate:     Mutex<Option<Arc<ActiveSession>>>,
    events:   Sender<EngineEvent>,
    next_id:  AtomicU64,
}

impl Inner {
    fn emit(&self, ev: EngineEvent) {
        // receiver gone = nobody listening; not an engine failure
        let _ = self.events.send(ev);
    }
}

/// The engine, constructed once by the application root.
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(factory: Arc<dyn DeviceFactory>, settings: EngineSettings) -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel();
        log::info!(
            "[engine] backend={} rate={} tone={}Hz wpm={} block={}",
            factory.name(), settings.sample_rate, settings.tone_hz, settings.wpm, settings.block_size
        );
        let inner = Arc::new(Inner {
            factory,
            settings: Mutex::new(settings),
            gate:     Mutex::new(None),
            events:   tx,
            next_id:  AtomicU64::new(1),
        });
        (Self { inner }, rx)
    }

    pub fn settings(&self) -> EngineSettings { lock(&self.inner.settings).clone() }

    pub fn set_frequency(&self, hz: f32) -> Result<()> {
        let mut s = lock(&self.inner.settings);
        s.limits.check_tone(hz)?;
        s.tone_hz = hz;
        Ok(())
    }

    pub fn set_wpm(&self, wpm: u32) -> Result<()> {
        let mut s = lock(&self.inner.settings);
        s.limits.check_wpm(wpm)?;
        s.wpm = wpm;
        Ok(())
    }

    /// Kind of the session currently holding the gate, if any.
    pub fn active_kind(&self) -> Option<SessionKind> {
        lock(&self.inner.gate).as_ref().map(|a| a.kind)
    }

    pub fn is_busy(&self) -> bool { self.active_kind().is_some() }

    pub fn session_state(&self, kind: SessionKind) -> SessionState {
        match lock(&self.inner.gate).as_ref() {
            Some(a) if a.kind == kind => a.task.control().state(),
            _ => SessionState::Idle,
        }
    }

    // ── Test ──────────────────────────────────────────────────────────────────

    pub fn start_test(&self, tone_hz: f32, wpm: u32) -> Result<()> {
        let settings = self.validated(tone_hz, wpm)?;
        self.reject_if_busy(SessionKind::Test)?;

        let timing = Timing::from_wpm(wpm);
        let phrase = synthesize(&encode(TEST_PHRASE), tone_hz, &timing, settings.sample_rate);
        let program = if settings.test_repeat {
            let mut samples = phrase.samples().to_vec();
            let pause = (TEST_REPEAT_PAUSE.as_secs_f64() * settings.sample_rate as f64) as usize;
            samples.resize(samples.len() + pause, 0.0);
            Program::looping(SampleBuffer::new(samples, settings.sample_rate))
        } else {
            Program::once(phrase)
        };
        self.admit(SessionKind::Test, program, settings.params(SessionKind::Test))
    }

    pub fn stop_test(&self) { self.stop(SessionKind::Test); }

    /// Start the test if nothing is active, stop it if it is running.
    /// Returns true when a test was started.
    pub fn toggle_test(&self) -> Result<bool> {
        if self.active_kind() == Some(SessionKind::Test) {
            self.stop_test();
            return Ok(false);
        }
        let s = self.settings();
        self.start_test(s.tone_hz, s.wpm)?;
        Ok(true)
    }

    // ── Send ──────────────────────────────────────────────────────────────────

    pub fn start_send(&self, text: &str, tone_hz: f32, wpm: u32) -> Result<()> {
        let settings = self.validated(tone_hz, wpm)?;
        if text.is_empty() {
            return Err(EngineError::InvalidParameter("nothing to send".into()));
        }
        self.reject_if_busy(SessionKind::Send)?;

        let timing = Timing::from_wpm(wpm);
        let (buffer, marks) = synthesize_marked(text, tone_hz, &timing, settings.sample_rate);
        self.admit(SessionKind::Send, Program::marked(buffer, marks), settings.params(SessionKind::Send))
    }

    /// `start_send` at the current frequency / speed.
    pub fn send(&self, text: &str) -> Result<()> {
        let s = self.settings();
        self.start_send(text, s.tone_hz, s.wpm)
    }

    pub fn stop_send(&self) { self.stop(SessionKind::Send); }

    // ── internals ─────────────────────────────────────────────────────────────

    fn validated(&self, tone_hz: f32, wpm: u32) -> Result<EngineSettings> {
        let s = self.settings();
        s.limits.check_tone(tone_hz)?;
        s.limits.check_wpm(wpm)?;
        Ok(s)
    }

    /// Cheap early rejection so a busy engine does not synthesize for nothing.
    /// `admit` repeats the check authoritatively.
    fn reject_if_busy(&self, kind: SessionKind) -> Result<()> {
        if let Some(active) = self.active_kind() {
            log::debug!("[engine] {kind:?} rejected: {active:?} active");
            return Err(EngineError::Busy);
        }
        Ok(())
    }

    fn admit(&self, kind: SessionKind, program: Program, params: StreamParams) -> Result<()> {
        let mut gate = lock(&self.inner.gate);
        if let Some(active) = gate.as_ref() {
            log::debug!("[engine] {kind:?} rejected: {:?} active", active.kind);
            return Err(EngineError::Busy);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let session = PlaybackSession::new(kind);
        session.control().begin();
        let control = Arc::clone(session.control());
        let inner = Arc::clone(&self.inner);
        let name = format!("cw-{}-{id}", kind.label());

        let task = WorkerTask::spawn(&name, control, move |_| {
            run_worker(&inner, id, &session, &program, &params);
        })?;

        log::info!("[engine] {kind:?} session #{id} started");
        *gate = Some(Arc::new(ActiveSession { id, kind, task }));
        Ok(())
    }

    fn stop(&self, kind: SessionKind) {
        let active = match lock(&self.inner.gate).as_ref() {
            Some(a) if a.kind == kind => Arc::clone(a),
            _ => return,
        };
        let timeout = lock(&self.inner.settings).stop_timeout;
        log::info!("[engine] stopping {kind:?} session #{}", active.id);
        active.task.stop(timeout);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let active = lock(&self.inner.gate).clone();
        if let Some(a) = active {
            let timeout = lock(&self.inner.settings).stop_timeout;
            a.task.stop(timeout);
        }
    }
}

fn run_worker(inner: &Inner, id: u64, session: &PlaybackSession, program: &Program, params: &StreamParams) {
    let kind = session.kind();
    let outcome = session.run(&*inner.factory, params, program, |ch| {
        inner.emit(EngineEvent::CharacterSent(ch));
    });

    // device is released; free the slot before announcing
    let finished = {
        let mut gate = lock(&inner.gate);
        match gate.as_ref() {
            Some(a) if a.id == id => gate.take(),
            _ => None,
        }
    };
    drop(finished);

    let completed = match kind {
        SessionKind::Test => EngineEvent::TestCompleted,
        SessionKind::Send => EngineEvent::SendCompleted,
    };
    match outcome {
        PlaybackOutcome::Completed | PlaybackOutcome::Cancelled => {
            log::info!("[engine] {kind:?} session #{id} finished: {outcome:?}");
            inner.emit(completed);
        }
        PlaybackOutcome::OpenFailed(e) => {
            inner.emit(EngineEvent::DeviceError(e.to_string()));
        }
        PlaybackOutcome::WriteFailed(e) => {
            inner.emit(EngineEvent::DeviceError(e.to_string()));
            inner.emit(completed);
        }
    }
}
