// src/morse/timing.rs  -  WPM -> element durations (PARIS standard)
use std::time::Duration;

/// PARIS: one word = 50 units.
pub const UNITS_PER_WORD: f64 = 50.0;

/// All timing derived from a single unit length, in seconds.
///
/// Not cached anywhere: the synthesizer derives a fresh `Timing` on every
/// call, so a WPM change takes effect on the next transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub dot:        f64,  // 1 unit
    pub dash:       f64,  // 3 units
    pub elem_gap:   f64,  // 1 unit  (between dits/dahs in same char)
    pub word_gap:   f64,  // 7 units (word boundary token)
}

impl Timing {
    /// unit = 60 / (50 * wpm). Range checking is the caller's job.
    pub fn from_wpm(wpm: u32) -> Self {
        debug_assert!(wpm > 0, "wpm must be validated before timing is derived");
        let unit = 60.0 / (UNITS_PER_WORD * wpm.max(1) as f64);
        Self {
            dot:      unit,
            dash:     unit * 3.0,
            elem_gap: unit,
            word_gap: unit * 7.0,
        }
    }

    pub fn dot_duration(&self) -> Duration { Duration::from_secs_f64(self.dot) }
    pub fn word_gap_duration(&self) -> Duration { Duration::from_secs_f64(self.word_gap) }
}
