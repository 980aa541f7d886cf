// src/session/mod.rs  -  Playback sessions and the engine that coordinates them
pub mod control;
pub mod coordinator;
pub mod playback;
pub mod task;

pub use control::{SessionControl, SessionKind, SessionState};
pub use coordinator::{Engine, EngineEvent, EngineSettings, Limits, TEST_PHRASE};
pub use playback::{PlaybackOutcome, PlaybackSession, Program};
pub use task::WorkerTask;
