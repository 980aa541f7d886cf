// src/config.rs  -  Runtime configuration (CLI + TOML)
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::session::{EngineSettings, Limits};

/// The example config is embedded directly in the binary at compile time.
/// Users can write it out with:  cw-autosend --write-config
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml.example");

// ── CLI ───────────────────────────────────────────────────────────────────────
#[derive(Parser, Debug, Default)]
#[command(
    name    = "cw-autosend",
    about   = "CW transmit engine: test tone, send text, auto-send while typing",
    version,
)]
pub struct Cli {
    /// Config file path (default: ~/.config/cw-autosend/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Send speed in WPM (default: 20)
    #[arg(long)]
    pub wpm: Option<u32>,

    /// CW tone frequency Hz (default: 700)
    #[arg(long)]
    pub tone: Option<f32>,

    /// Output device name or substring for sending (default: system default)
    #[arg(long)]
    pub device: Option<String>,

    /// Monitor device name or substring for the test tone (default: system default)
    #[arg(long)]
    pub monitor_device: Option<String>,

    /// Sample rate Hz (default: 44100)
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Quiet time before auto-send transmits new text, ms (default: 300)
    #[arg(long)]
    pub autosend_delay: Option<u64>,

    /// Loop the test phrase until stopped
    #[arg(long, action)]
    pub test_repeat: bool,

    /// Use the silent backend (no audio device needed)
    #[arg(long, action)]
    pub no_audio: bool,

    /// Play "CQ CQ CQ" on the monitor device and exit
    #[arg(long, action, conflicts_with = "send")]
    pub test: bool,

    /// Send this text once and exit
    #[arg(long, value_name = "TEXT")]
    pub send: Option<String>,

    /// List available audio output devices and exit
    #[arg(long, action)]
    pub list_devices: bool,

    /// Write the built-in default config.toml to the config path and exit.
    /// Use --config <PATH> to write to a custom location.
    #[arg(long, action)]
    pub write_config: bool,

    /// Print the built-in default config.toml to stdout and exit
    #[arg(long, action)]
    pub print_config: bool,
}

// ── TOML file structure ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    pub audio:    Option<AudioCfg>,
    pub morse:    Option<MorseCfg>,
    pub autosend: Option<AutoSendCfg>,
    pub limits:   Option<LimitsCfg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioCfg {
    pub output_device:   Option<String>,
    pub monitor_device:  Option<String>,
    pub sample_rate:     Option<u32>,
    pub block_size:      Option<usize>,
    pub stop_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MorseCfg {
    pub wpm:         Option<u32>,
    pub tone_hz:     Option<f32>,
    pub test_repeat: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSendCfg {
    pub enabled:  Option<bool>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsCfg {
    pub min_wpm:     Option<u32>,
    pub max_wpm:     Option<u32>,
    pub min_tone_hz: Option<f32>,
    pub max_tone_hz: Option<f32>,
}

// ── Resolved / merged config ──────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub wpm:               u32,
    pub tone_hz:           f32,
    pub sample_rate:       u32,
    /// Frames per device write; bounds cancellation latency
    pub block_size:        usize,
    /// Empty = system default
    pub output_device:     String,
    pub monitor_device:    String,
    pub stop_timeout_ms:   u64,
    pub test_repeat:       bool,
    pub autosend_enabled:  bool,
    pub autosend_delay_ms: u64,
    pub no_audio:          bool,
    pub limits:            Limits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            wpm:               20,
            tone_hz:           700.0,
            sample_rate:       44_100,
            block_size:        1024,
            output_device:     String::new(),
            monitor_device:    String::new(),
            stop_timeout_ms:   1000,
            test_repeat:       false,
            autosend_enabled:  true,
            autosend_delay_ms: 300,
            no_audio:          false,
            limits:            Limits::default(),
        }
    }
}

// ── Config loader ─────────────────────────────────────────────────────────────
impl AppConfig {
    /// Write the embedded default config to disk.
    /// Returns the path it was written to.
    pub fn write_default_config(cli: &Cli) -> Result<PathBuf> {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating config directory {:?}", parent))?;
        }
        std::fs::write(&path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("Writing config to {:?}", path))?;
        Ok(path)
    }

    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        let mut cfg = Self::from_file(&path)?;
        cfg.apply_cli(cli);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overlaid with the TOML file at `path`, if it exists.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Reading config {:?}", path))?;
            let fc: FileConfig = toml::from_str(&raw)
                .with_context(|| format!("Parsing config {:?}", path))?;
            cfg.apply_file(&fc);
        } else {
            log::info!(
                "[config] no config file at {}  →  defaults (run `cw-autosend --write-config` to create one)",
                path.display()
            );
        }
        Ok(cfg)
    }

    fn apply_file(&mut self, fc: &FileConfig) {
        if let Some(a) = &fc.audio {
            if let Some(v) = &a.output_device  { self.output_device   = v.clone(); }
            if let Some(v) = &a.monitor_device { self.monitor_device  = v.clone(); }
            if let Some(v) = a.sample_rate     { self.sample_rate     = v; }
            if let Some(v) = a.block_size      { self.block_size      = v; }
            if let Some(v) = a.stop_timeout_ms { self.stop_timeout_ms = v; }
        }
        if let Some(m) = &fc.morse {
            if let Some(v) = m.wpm         { self.wpm         = v; }
            if let Some(v) = m.tone_hz     { self.tone_hz     = v; }
            if let Some(v) = m.test_repeat { self.test_repeat = v; }
        }
        if let Some(s) = &fc.autosend {
            if let Some(v) = s.enabled  { self.autosend_enabled  = v; }
            if let Some(v) = s.delay_ms { self.autosend_delay_ms = v; }
        }
        if let Some(l) = &fc.limits {
            if let Some(v) = l.min_wpm     { self.limits.min_wpm     = v; }
            if let Some(v) = l.max_wpm     { self.limits.max_wpm     = v; }
            if let Some(v) = l.min_tone_hz { self.limits.min_tone_hz = v; }
            if let Some(v) = l.max_tone_hz { self.limits.max_tone_hz = v; }
        }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = cli.wpm             { self.wpm               = v; }
        if let Some(v) = cli.tone            { self.tone_hz           = v; }
        if let Some(v) = &cli.device         { self.output_device     = v.clone(); }
        if let Some(v) = &cli.monitor_device { self.monitor_device    = v.clone(); }
        if let Some(v) = cli.sample_rate     { self.sample_rate       = v; }
        if let Some(v) = cli.autosend_delay  { self.autosend_delay_ms = v; }
        if cli.test_repeat                   { self.test_repeat       = true; }
        if cli.no_audio                      { self.no_audio          = true; }
    }

    /// Range checks the UI layer owns before anything reaches the engine.
    pub fn validate(&self) -> Result<()> {
        self.limits.check_wpm(self.wpm).context("morse.wpm")?;
        self.limits.check_tone(self.tone_hz).context("morse.tone_hz")?;
        if self.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be > 0");
        }
        if self.block_size == 0 {
            anyhow::bail!("audio.block_size must be > 0");
        }
        if self.tone_hz * 2.0 >= self.sample_rate as f32 {
            anyhow::bail!("tone {} Hz is above Nyquist for {} Hz", self.tone_hz, self.sample_rate);
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            sample_rate:    self.sample_rate,
            tone_hz:        self.tone_hz,
            wpm:            self.wpm,
            output_device:  non_empty(&self.output_device),
            monitor_device: non_empty(&self.monitor_device),
            block_size:     self.block_size,
            stop_timeout:   Duration::from_millis(self.stop_timeout_ms),
            test_repeat:    self.test_repeat,
            limits:         self.limits,
        }
    }

    pub fn autosend_delay(&self) -> Duration { Duration::from_millis(self.autosend_delay_ms) }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn default_config_path() -> PathBuf {
    dirs_next().join("cw-autosend").join("config.toml")
}

fn dirs_next() -> PathBuf {
    if let Ok(v) = std::env::var("XDG_CONFIG_HOME") { return PathBuf::from(v); }
    if let Ok(v) = std::env::var("APPDATA")          { return PathBuf::from(v); }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_default();
    PathBuf::from(home).join(".config")
}
