// src/lib.rs  -  cw-autosend engine
//
// text → morse::encode → morse::synthesize → session::PlaybackSession → audio device
//
// `session::Engine` admits at most one Test or Send session at a time and
// reports progress as `EngineEvent`s; `autosend::AutoSend` feeds it the
// untransmitted tail of a growing text buffer.

pub mod audio;
pub mod autosend;
pub mod config;
pub mod error;
pub mod morse;
pub mod session;
pub mod tui;

pub use autosend::{AutoSend, SendTarget};
pub use error::{EngineError, Result};
pub use session::{Engine, EngineEvent, EngineSettings, SessionKind, SessionState};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, recovering the data if a previous holder panicked. Session state
/// stays meaningful after a worker panic, so poisoning is not fatal here.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
