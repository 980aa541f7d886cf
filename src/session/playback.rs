// src/session/playback.rs  -  Chunked streaming of one program to one device connection
//
// The worker opens the device, then writes the buffer in `block_size` chunks.
// Before every chunk it checks the session's cancel flag, so a cancel takes
// effect within roughly one chunk of playback (1024 / 44100 s ≈ 23 ms at the
// reference settings) plus whatever the device already has queued.
// The connection is released on every exit path: completion, cancel, write
// error, and unwinding (DeviceGuard::drop).

use super::control::{SessionControl, SessionKind, SessionState};
use crate::audio::{AudioSink, DeviceFactory, StreamParams};
use crate::error::EngineError;
use crate::morse::{CharMark, SampleBuffer};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// What a session plays: the samples plus optional per-character marks.
#[derive(Debug, Clone)]
pub struct Program {
    pub buffer: SampleBuffer,
    pub marks:  Vec<CharMark>,
    /// Replay until cancelled
    pub repeat: bool,
}

impl Program {
    pub fn once(buffer: SampleBuffer) -> Self {
        Self { buffer, marks: Vec::new(), repeat: false }
    }

    pub fn marked(buffer: SampleBuffer, marks: Vec<CharMark>) -> Self {
        Self { buffer, marks, repeat: false }
    }

    pub fn looping(buffer: SampleBuffer) -> Self {
        Self { buffer, marks: Vec::new(), repeat: true }
    }
}

#[derive(Debug)]
pub enum PlaybackOutcome {
    /// Every chunk written and drained
    Completed,
    /// Cancel observed at a chunk boundary
    Cancelled,
    /// Device never opened; session is back to Idle
    OpenFailed(EngineError),
    /// Write/drain failed mid-stream; session ended Cancelled
    WriteFailed(EngineError),
}

/// stop + close on drop.
struct DeviceGuard(Box<dyn AudioSink>);

impl Deref for DeviceGuard {
    type Target = dyn AudioSink;
    fn deref(&self) -> &Self::Target { &*self.0 }
}

impl DerefMut for DeviceGuard {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut *self.0 }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.0.stop();
        self.0.close();
    }
}

pub struct PlaybackSession {
    kind:    SessionKind,
    control: Arc<SessionControl>,
}

impl PlaybackSession {
    pub fn new(kind: SessionKind) -> Self {
        Self { kind, control: Arc::new(SessionControl::new()) }
    }

    pub fn kind(&self) -> SessionKind { self.kind }
    pub fn control(&self) -> &Arc<SessionControl> { &self.control }
    pub fn state(&self) -> SessionState { self.control.state() }
    pub fn cancel(&self) { self.control.cancel(); }

    /// Run to completion on the calling (worker) thread. `on_char` fires
    /// once per mark, in order, after the chunk that crosses it is written.
    pub fn run(
        &self,
        factory: &dyn DeviceFactory,
        params:  &StreamParams,
        program: &Program,
        mut on_char: impl FnMut(char),
    ) -> PlaybackOutcome {
        if self.control.state() == SessionState::Idle {
            self.control.begin();
        }

        let sink = match factory.open(params) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("[playback] {:?}: device open failed: {e}", self.kind);
                self.control.set_state(SessionState::Idle);
                return PlaybackOutcome::OpenFailed(e);
            }
        };
        let mut device = DeviceGuard(sink);

        let result = if self.control.enter_streaming() {
            log::debug!(
                "[playback] {:?}: streaming {} samples ({:.2}s) in chunks of {}",
                self.kind,
                program.buffer.len(),
                program.buffer.duration_secs(),
                params.block_size
            );
            self.stream(&mut device, params.block_size.max(1), program, &mut on_char)
        } else {
            Ok(false)
        };

        // release before anyone hears about the outcome
        drop(device);

        match result {
            Ok(true) => {
                self.control.set_state(SessionState::Completed);
                PlaybackOutcome::Completed
            }
            Ok(false) => {
                log::info!("[playback] {:?}: cancelled", self.kind);
                self.control.set_state(SessionState::Cancelled);
                PlaybackOutcome::Cancelled
            }
            Err(e) => {
                log::warn!("[playback] {:?}: {e}", self.kind);
                self.control.set_state(SessionState::Cancelled);
                PlaybackOutcome::WriteFailed(e)
            }
        }
    }

    /// Ok(true) = played out, Ok(false) = cancelled.
    fn stream(
        &self,
        device:  &mut DeviceGuard,
        block:   usize,
        program: &Program,
        on_char: &mut impl FnMut(char),
    ) -> Result<bool, EngineError> {
        let samples = program.buffer.samples();
        let repeat = program.repeat && !samples.is_empty();
        loop {
            let mut marks = program.marks.iter().peekable();
            let mut cursor = 0;
            for chunk in samples.chunks(block) {
                if !self.control.checkpoint() {
                    return Ok(false);
                }
                device.write(chunk)?;
                cursor += chunk.len();
                while let Some(m) = marks.next_if(|m| m.end <= cursor) {
                    on_char(m.ch);
                }
            }
            if !repeat {
                if !self.control.checkpoint() {
                    return Ok(false);
                }
                device.drain()?;
                marks.for_each(|m| on_char(m.ch));
                return Ok(true);
            }
        }
    }
}
