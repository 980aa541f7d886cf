// src/morse/mod.rs  -  Timing, Encoder, Synthesizer
pub mod encoder;
pub mod synth;
pub mod timing;

pub use encoder::{encode, MorseSymbols, Symbol};
pub use synth::{synthesize, synthesize_marked, CharMark, SampleBuffer, DEFAULT_SAMPLE_RATE};
pub use timing::Timing;
