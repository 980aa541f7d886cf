// src/audio/mod.rs  -  Device connection traits + cpal / null backends
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// What a session asks the device layer for.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    /// Device name (or substring); `None` = host default
    pub device:      Option<String>,
    pub sample_rate: u32,
    pub channels:    u16,
    /// Frames per device block, also the playback chunk size
    pub block_size:  usize,
}

impl StreamParams {
    pub fn mono(device: Option<String>, sample_rate: u32, block_size: usize) -> Self {
        Self { device, sample_rate, channels: 1, block_size }
    }

    /// Playback time of one block; the cancellation-latency bound.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.max(1) as f64)
    }
}

/// One open output connection. Owned by exactly one playback worker and
/// never shared, so implementations need not be `Send`.
pub trait AudioSink {
    /// Queue one chunk (blocking until the device has room)
    fn write(&mut self, chunk: &[f32]) -> Result<()>;
    /// Block until queued audio has been played
    fn drain(&mut self) -> Result<()> { Ok(()) }
    /// Halt output and discard anything still queued
    fn stop(&mut self);
    /// Release the device. Must be idempotent.
    fn close(&mut self);
}

/// Opens device connections on behalf of playback sessions.
pub trait DeviceFactory: Send + Sync {
    fn open(&self, params: &StreamParams) -> Result<Box<dyn AudioSink>>;
    fn name(&self) -> &str;
}

// ── cpal backend ─────────────────────────────────────────────────────────────
#[cfg(feature = "audio-cpal")]
mod cpal_backend;
#[cfg(feature = "audio-cpal")]
pub use cpal_backend::{CpalFactory, CpalSink};

/// Null backend (no sound; sleeps through each chunk so timing feels real)
pub struct NullFactory;

impl DeviceFactory for NullFactory {
    fn open(&self, params: &StreamParams) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(NullSink { sample_rate: params.sample_rate.max(1) }))
    }
    fn name(&self) -> &str { "null" }
}

pub struct NullSink {
    sample_rate: u32,
}

impl AudioSink for NullSink {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        std::thread::sleep(Duration::from_secs_f64(chunk.len() as f64 / self.sample_rate as f64));
        Ok(())
    }
    fn stop(&mut self)  {}
    fn close(&mut self) {}
}

/// Factory: returns the best available backend
pub fn create_factory(no_audio: bool) -> Arc<dyn DeviceFactory> {
    if no_audio {
        log::info!("[audio] --no-audio: using null backend");
        return Arc::new(NullFactory);
    }
    #[cfg(feature = "audio-cpal")]
    {
        Arc::new(CpalFactory::default())
    }
    #[cfg(not(feature = "audio-cpal"))]
    {
        log::warn!("[audio] built without audio-cpal  →  using null backend");
        Arc::new(NullFactory)
    }
}

/// Output device names for `--list-devices`
pub fn list_output_devices() -> Vec<String> {
    #[cfg(feature = "audio-cpal")]
    {
        cpal_backend::list_output_devices()
    }
    #[cfg(not(feature = "audio-cpal"))]
    {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn block_duration_at_reference_rate_is_about_23ms() {
        let p = StreamParams::mono(None, 44_100, 1024);
        let ms = p.block_duration().as_secs_f64() * 1000.0;
        assert!((ms - 23.22).abs() < 0.01, "{ms}");
    }

    #[test]
    fn null_sink_paces_writes() {
        let mut sink = NullFactory.open(&StreamParams::mono(None, 1000, 10)).expect("open");
        let t0 = Instant::now();
        sink.write(&[0.0; 20]).expect("write");
        assert!(t0.elapsed() >= Duration::from_millis(20));
        sink.stop();
        sink.close();
        sink.close();
    }
}
