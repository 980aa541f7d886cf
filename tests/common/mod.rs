//! Scripted in-memory audio device shared by the integration tests

#![allow(dead_code)]

use cw_autosend::audio::{AudioSink, DeviceFactory, StreamParams};
use cw_autosend::{Engine, EngineError, EngineEvent, EngineSettings, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the fake device misbehaves.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub fail_open:        bool,
    /// Writes that succeed before every later write fails
    pub fail_write_after: Option<usize>,
    /// Blocking time per write, standing in for the device consuming a block
    pub write_delay:      Duration,
}

#[derive(Debug, Default)]
pub struct Stats {
    pub opens:   AtomicUsize,
    pub closes:  AtomicUsize,
    pub writes:  AtomicUsize,
    pub samples: AtomicUsize,
    pub devices: Mutex<Vec<Option<String>>>,
}

impl Stats {
    pub fn opens(&self) -> usize { self.opens.load(Ordering::SeqCst) }
    pub fn closes(&self) -> usize { self.closes.load(Ordering::SeqCst) }
    pub fn writes(&self) -> usize { self.writes.load(Ordering::SeqCst) }
    pub fn samples(&self) -> usize { self.samples.load(Ordering::SeqCst) }
    pub fn is_released(&self) -> bool { self.opens() == self.closes() }
}

pub struct ScriptedFactory {
    pub script: Script,
    pub stats:  Arc<Stats>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self { script, stats: Arc::new(Stats::default()) }
    }
}

impl DeviceFactory for ScriptedFactory {
    fn open(&self, params: &StreamParams) -> Result<Box<dyn AudioSink>> {
        self.stats.devices.lock().unwrap().push(params.device.clone());
        if self.script.fail_open {
            return Err(EngineError::device("no such device"));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSink {
            script: self.script.clone(),
            stats:  Arc::clone(&self.stats),
            writes: 0,
            closed: false,
        }))
    }

    fn name(&self) -> &str { "scripted" }
}

struct ScriptedSink {
    script: Script,
    stats:  Arc<Stats>,
    writes: usize,
    closed: bool,
}

impl AudioSink for ScriptedSink {
    fn write(&mut self, chunk: &[f32]) -> Result<()> {
        assert!(!self.closed, "write after close");
        if self.script.fail_write_after.is_some_and(|n| self.writes >= n) {
            return Err(EngineError::device("device unplugged"));
        }
        std::thread::sleep(self.script.write_delay);
        self.writes += 1;
        self.stats.writes.fetch_add(1, Ordering::SeqCst);
        self.stats.samples.fetch_add(chunk.len(), Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {}

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Small blocks at a low rate keep tests fast while exercising chunking.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        sample_rate:  8_000,
        wpm:          60,
        block_size:   128,
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

pub fn engine_with(script: Script, settings: EngineSettings) -> (Engine, Receiver<EngineEvent>, Arc<Stats>) {
    let factory = ScriptedFactory::new(script);
    let stats = Arc::clone(&factory.stats);
    let (engine, rx) = Engine::new(Arc::new(factory), settings);
    (engine, rx, stats)
}

/// Collect events until `done` matches one (inclusive) or the timeout hits.
pub fn collect_until(
    rx: &Receiver<EngineEvent>,
    timeout: Duration,
    done: impl Fn(&EngineEvent) -> bool,
) -> Vec<EngineEvent> {
    let deadline = std::time::Instant::now() + timeout;
    let mut out = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(std::time::Instant::now());
        match rx.recv_timeout(left) {
            Ok(ev) => {
                let stop = done(&ev);
                out.push(ev);
                if stop {
                    return out;
                }
            }
            Err(_) => return out,
        }
    }
}

pub fn sent_chars(events: &[EngineEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::CharacterSent(c) => Some(*c),
            _ => None,
        })
        .collect()
}
