// src/audio/cpal_backend.rs  -  cpal output stream fed from a bounded sample queue
use crate::error::{EngineError, Result};
use crate::lock;
use super::{AudioSink, DeviceFactory, StreamParams};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Extra time a blocked write/drain waits beyond the queued audio before the
/// device is declared stalled.
const STALL_SLACK: Duration = Duration::from_secs(1);
const WAIT_STEP:   Duration = Duration::from_millis(20);

struct Queue {
    samples: VecDeque<f32>,
    failed:  Option<String>,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

#[derive(Debug, Default)]
pub struct CpalFactory;

impl DeviceFactory for CpalFactory {
    fn open(&self, params: &StreamParams) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(CpalSink::open(params)?))
    }
    fn name(&self) -> &str { "cpal" }
}

pub struct CpalSink {
    shared:      Arc<Shared>,
    stream:      Option<Stream>,
    sample_rate: u32,
    /// Writes block while more than this many samples are queued
    high_water:  usize,
}

impl CpalSink {
    pub fn open(params: &StreamParams) -> Result<Self> {
        let host   = cpal::default_host();
        let device = select_output_device(&host, params.device.as_deref())?;
        let format = device.default_output_config()
            .map_err(EngineError::device)?
            .sample_format();

        let config = cpal::StreamConfig {
            channels:    params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(params.block_size as u32),
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue { samples: VecDeque::new(), failed: None }),
            ready: Condvar::new(),
        });

        let st = Arc::clone(&shared);
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, st)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, st)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, st)?,
            other             => return Err(EngineError::Device(format!("Unsupported sample format {other:?}"))),
        };
        stream.play().map_err(EngineError::device)?;

        log::info!(
            "[cpal] opened '{}' @ {} Hz, block {}",
            device.name().unwrap_or_else(|_| "?".into()),
            params.sample_rate,
            params.block_size
        );
        Ok(Self {
            shared,
            stream: Some(stream),
            sample_rate: params.sample_rate.max(1),
            high_water:  params.block_size.max(1) * 2,
        })
    }

    fn queued_duration(&self, queued: usize) -> Duration {
        Duration::from_secs_f64(queued as f64 / self.sample_rate as f64)
    }

    /// Wait until at most `limit` samples are queued.
    fn wait_for_room(&self, limit: usize) -> Result<()> {
        let mut q = lock(&self.shared.queue);
        let deadline = Instant::now() + self.queued_duration(q.samples.len()) + STALL_SLACK;
        loop {
            if let Some(e) = &q.failed {
                return Err(EngineError::Device(e.clone()));
            }
            if q.samples.len() <= limit {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(EngineError::Device("output stream stalled".into()));
            }
            q = self.shared.ready.wait_timeout(q, WAIT_STEP)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        if self.stream.is_none() {
            return Err(EngineError::Device("stream already closed".into()));
        }
        self.wait_for_room(self.high_water)?;
        lock(&self.shared.queue).samples.extend(chunk.iter().copied());
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.wait_for_room(0)
    }

    fn stop(&mut self) {
        if let Some(s) = &self.stream {
            if let Err(e) = s.pause() {
                log::debug!("[cpal] pause failed: {e}");
            }
        }
        lock(&self.shared.queue).samples.clear();
        self.shared.ready.notify_all();
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("[cpal] stream closed");
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) { self.close(); }
}

fn build_stream<S>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Shared>,
) -> Result<Stream>
where S: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>
{
    let ch = config.channels.max(1) as usize;
    let err_shared = Arc::clone(&shared);
    let stream = device.build_output_stream(
        config,
        move |data: &mut [S], _: &cpal::OutputCallbackInfo| {
            let mut q = lock(&shared.queue);
            for frame in data.chunks_mut(ch) {
                let out = S::from_sample(q.samples.pop_front().unwrap_or(0.0));
                for smp in frame.iter_mut() { *smp = out; }
            }
            drop(q);
            shared.ready.notify_all();
        },
        move |e| {
            log::error!("[cpal] stream error: {e}");
            lock(&err_shared.queue).failed = Some(e.to_string());
            err_shared.ready.notify_all();
        },
        None,
    ).map_err(EngineError::device)?;
    Ok(stream)
}

fn select_output_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device> {
    match wanted.filter(|w| !w.is_empty()) {
        None => host.default_output_device()
            .ok_or_else(|| EngineError::Device("No output device".into())),
        Some(want) => {
            let devices = host.output_devices().map_err(EngineError::device)?;
            let mut fallback = None;
            for d in devices {
                let Ok(name) = d.name() else { continue };
                if name == want {
                    return Ok(d);
                }
                if fallback.is_none() && name.contains(want) {
                    fallback = Some(d);
                }
            }
            fallback.ok_or_else(|| EngineError::Device(format!("Output device '{want}' not found")))
        }
    }
}

pub(super) fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    let default = host.default_output_device().and_then(|d| d.name().ok());
    let mut out = Vec::new();
    match host.output_devices() {
        Ok(devices) => {
            for d in devices {
                if let Ok(name) = d.name() {
                    let tag = if default.as_deref() == Some(name.as_str()) { "  (default)" } else { "" };
                    out.push(format!("{name}{tag}"));
                }
            }
        }
        Err(e) => log::warn!("[cpal] cannot enumerate output devices: {e}"),
    }
    out
}
