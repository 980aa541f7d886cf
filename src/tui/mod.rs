// src/tui/mod.rs  -  ratatui terminal interface
#[cfg(feature = "tui")]
mod inner;
#[cfg(feature = "tui")]
pub use inner::Tui;

/// Everything the interactive screen shows. Rebuilt by the main loop each tick.
#[derive(Debug, Default, Clone)]
pub struct UiState {
    pub wpm:            u32,
    pub tone_hz:        f32,
    pub output_device:  String,
    pub monitor_device: String,
    /// Operator's text buffer
    pub buffer:         String,
    /// Leading chars of `buffer` already on air
    pub acknowledged:   usize,
    pub autosend:       bool,
    pub test_active:    bool,
    pub send_active:    bool,
    /// Everything keyed so far this run
    pub sent_log:       String,
    pub status:         String,
}

impl UiState {
    /// (already sent, still pending) halves of the buffer
    pub fn split_buffer(&self) -> (&str, &str) {
        let at = self.buffer
            .char_indices()
            .nth(self.acknowledged)
            .map_or(self.buffer.len(), |(i, _)| i);
        self.buffer.split_at(at)
    }
}

#[cfg(not(feature = "tui"))]
pub struct Tui;
#[cfg(not(feature = "tui"))]
impl Tui {
    pub fn new() -> anyhow::Result<Self> { Ok(Self) }
    pub fn draw(&mut self, _state: &UiState) -> anyhow::Result<()> { Ok(()) }
    pub fn cleanup(&mut self) {}
}
