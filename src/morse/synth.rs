// src/morse/synth.rs  -  Symbol string -> sample buffer (sine bursts + silence)
use super::encoder::{char_symbols, MorseSymbols, Symbol};
use super::Timing;
use std::f64::consts::TAU;
use std::sync::Arc;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Mono f32 samples at a fixed rate. Immutable once synthesized; cloning
/// shares the underlying storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples:     Arc<[f32]>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples: samples.into(), sample_rate }
    }

    pub fn samples(&self) -> &[f32] { &self.samples }
    pub fn len(&self) -> usize { self.samples.len() }
    pub fn is_empty(&self) -> bool { self.samples.is_empty() }
    pub fn sample_rate(&self) -> u32 { self.sample_rate }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Sample index in a buffer at which a source character has been fully played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharMark {
    pub ch:  char,
    pub end: usize,
}

/// Segment lengths always truncate (floor) so totals are reproducible.
fn seconds_to_samples(secs: f64, sample_rate: u32) -> usize {
    (secs * sample_rate as f64) as usize
}

struct Writer {
    out:         Vec<f32>,
    frequency:   f64,
    sample_rate: u32,
}

impl Writer {
    /// Tone burst; phase restarts at 0 for every burst.
    fn tone(&mut self, secs: f64) {
        let n = seconds_to_samples(secs, self.sample_rate);
        let step = TAU * self.frequency / self.sample_rate as f64;
        self.out.extend((0..n).map(|i| (step * i as f64).sin() as f32));
    }

    fn silence(&mut self, secs: f64) {
        let n = seconds_to_samples(secs, self.sample_rate);
        self.out.resize(self.out.len() + n, 0.0);
    }

    /// Walk symbols. The inter-element gap follows an element only when
    /// another element of the same character comes next, never after the
    /// last one, so a lone "E" is exactly one dot long.
    fn symbols(&mut self, symbols: impl Iterator<Item = Symbol>, t: &Timing) {
        let mut iter = symbols.peekable();
        while let Some(sym) = iter.next() {
            match sym {
                Symbol::Dot  => self.tone(t.dot),
                Symbol::Dash => self.tone(t.dash),
                Symbol::Space => {
                    self.silence(t.word_gap);
                    continue;
                }
            }
            if iter.peek().is_some_and(|s| s.is_element()) {
                self.silence(t.elem_gap);
            }
        }
    }
}

/// Render a symbol string at `frequency` Hz.
pub fn synthesize(symbols: &MorseSymbols, frequency: f32, timing: &Timing, sample_rate: u32) -> SampleBuffer {
    let mut w = Writer { out: Vec::new(), frequency: frequency as f64, sample_rate };
    w.symbols(symbols.symbols(), timing);
    SampleBuffer::new(w.out, sample_rate)
}

/// Same audio as `synthesize(&encode(text), ..)`, plus one [`CharMark`] per
/// source character so playback can report progress character by character.
pub fn synthesize_marked(
    text:        &str,
    frequency:   f32,
    timing:      &Timing,
    sample_rate: u32,
) -> (SampleBuffer, Vec<CharMark>) {
    let mut w = Writer { out: Vec::new(), frequency: frequency as f64, sample_rate };
    let mut marks = Vec::with_capacity(text.len());

    for (i, ch) in text.chars().enumerate() {
        if i > 0 {
            // the single-space joiner between characters
            w.silence(timing.word_gap);
        }
        w.symbols(char_symbols(ch).chars().filter_map(Symbol::from_char), timing);
        marks.push(CharMark { ch, end: w.out.len() });
    }
    (SampleBuffer::new(w.out, sample_rate), marks)
}
