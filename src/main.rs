// src/main.rs  -  cw-autosend entry point
use anyhow::{bail, Result};
use clap::Parser;
use cw_autosend::audio;
use cw_autosend::config::{self, AppConfig, Cli};
use cw_autosend::session::TEST_PHRASE;
use cw_autosend::{Engine, EngineEvent, SessionKind};
use std::io::Write;
use std::sync::mpsc::Receiver;

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    // ── --print-config  ───────────────────────────────────────────────────────
    if cli.print_config {
        print!("{}", config::DEFAULT_CONFIG_TOML);
        return Ok(());
    }

    // ── --write-config  ───────────────────────────────────────────────────────
    if cli.write_config {
        let path = AppConfig::write_default_config(&cli)?;
        println!("Config written to: {}", path.display());
        println!("Edit it to set your devices, WPM, tone, etc.");
        return Ok(());
    }

    // ── --list-devices  ───────────────────────────────────────────────────────
    if cli.list_devices {
        let devices = audio::list_output_devices();
        if devices.is_empty() {
            println!("No audio output devices found.");
        } else {
            println!("Available output devices:");
            for d in &devices { println!("  {d}"); }
        }
        return Ok(());
    }

    // ── Load config ───────────────────────────────────────────────────────────
    let cfg = AppConfig::load(&cli)?;

    // ── Engine ────────────────────────────────────────────────────────────────
    let factory = audio::create_factory(cfg.no_audio);
    let (engine, events) = Engine::new(factory, cfg.engine_settings());

    if cli.test {
        engine.start_test(cfg.tone_hz, cfg.wpm)?;
        println!("Playing {TEST_PHRASE:?} at {} WPM, {} Hz", cfg.wpm, cfg.tone_hz);
        return wait_for(&events, SessionKind::Test);
    }

    if let Some(text) = &cli.send {
        engine.start_send(&text.to_uppercase(), cfg.tone_hz, cfg.wpm)?;
        return wait_for(&events, SessionKind::Send);
    }

    interactive(&engine, &events, &cfg)
}

/// Block until the session of `kind` reports back, echoing keyed chars.
fn wait_for(events: &Receiver<EngineEvent>, kind: SessionKind) -> Result<()> {
    let mut out = std::io::stdout();
    while let Ok(ev) = events.recv() {
        match ev {
            EngineEvent::CharacterSent(c) => {
                print!("{c}");
                out.flush()?;
            }
            EngineEvent::TestCompleted if kind == SessionKind::Test => break,
            EngineEvent::SendCompleted if kind == SessionKind::Send => {
                println!();
                break;
            }
            EngineEvent::DeviceError(e) => bail!("audio device error: {e}"),
            _ => {}
        }
    }
    Ok(())
}

// ── Interactive mode ──────────────────────────────────────────────────────────
#[cfg(feature = "tui")]
fn interactive(engine: &Engine, events: &Receiver<EngineEvent>, cfg: &AppConfig) -> Result<()> {
    let mut tui = cw_autosend::tui::Tui::new()?;
    let result = console::run(&mut tui, engine, events, cfg);
    tui.cleanup();
    result?;
    println!("\n73 de cw-autosend!\n");
    Ok(())
}

/// Without the terminal UI: one line of stdin = one send.
#[cfg(not(feature = "tui"))]
fn interactive(engine: &Engine, events: &Receiver<EngineEvent>, _cfg: &AppConfig) -> Result<()> {
    println!("Type a line and press Enter to send it. Ctrl-D quits.");
    for line in std::io::stdin().lines() {
        let text = line?.trim().to_uppercase();
        if text.is_empty() {
            continue;
        }
        match engine.send(&text) {
            Ok(()) => wait_for(events, SessionKind::Send)?,
            Err(e) => eprintln!("{e}"),
        }
    }
    Ok(())
}

#[cfg(feature = "tui")]
mod console {
    use anyhow::Result;
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
    use cw_autosend::config::AppConfig;
    use cw_autosend::morse::encoder::char_to_morse;
    use cw_autosend::tui::{Tui, UiState};
    use cw_autosend::{AutoSend, Engine, EngineEvent, SessionKind};
    use std::sync::mpsc::Receiver;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Chars of on-air history kept for display
    const SENT_LOG_MAX: usize = 2000;
    const WPM_STEP:     u32   = 1;
    const TONE_STEP:    f32   = 10.0;

    pub fn run(tui: &mut Tui, engine: &Engine, events: &Receiver<EngineEvent>, cfg: &AppConfig) -> Result<()> {
        let mut autosend = AutoSend::new(cfg.autosend_delay());
        autosend.set_enabled(cfg.autosend_enabled, Instant::now());

        let mut buffer   = String::new();
        let mut sent_log = String::new();
        let mut status   = String::from("Ready");

        // ── Main loop ─────────────────────────────────────────────────────────
        let tick = Duration::from_millis(10);
        'main: loop {
            let now = Instant::now();

            // ── Keyboard ──────────────────────────────────────────────────────
            while event::poll(Duration::from_millis(0))? {
                let Event::Key(k) = event::read()? else { continue };
                if k.kind == KeyEventKind::Release {
                    continue;
                }
                let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);

                match k.code {
                    KeyCode::Char('c') if ctrl => break 'main,
                    KeyCode::Char('u') if ctrl => {
                        buffer.clear();
                        autosend.on_text_changed(&buffer, now);
                    }
                    KeyCode::Esc => match engine.active_kind() {
                        Some(SessionKind::Send) => {
                            engine.stop_send();
                            // otherwise the rest would go out after the next quiet window
                            autosend.set_enabled(false, now);
                            status = "Send stopped  (auto-send off, F3 to re-enable)".into();
                        }
                        Some(SessionKind::Test) => {
                            engine.stop_test();
                            status = "Test stopped".into();
                        }
                        None => break 'main,
                    },
                    KeyCode::F(2) => {
                        status = match engine.toggle_test() {
                            Ok(true)  => "Test: CQ CQ CQ".into(),
                            Ok(false) => "Test stopped".into(),
                            Err(e)    => format!("Test: {e}"),
                        };
                    }
                    KeyCode::F(3) => {
                        autosend.set_enabled(!autosend.is_enabled(), now);
                    }
                    KeyCode::Up | KeyCode::Down => {
                        let wpm = engine.settings().wpm;
                        let wpm = if k.code == KeyCode::Up { wpm + WPM_STEP } else { wpm.saturating_sub(WPM_STEP) };
                        if let Err(e) = engine.set_wpm(wpm) { status = e.to_string(); }
                    }
                    KeyCode::Left | KeyCode::Right => {
                        let hz = engine.settings().tone_hz;
                        let hz = if k.code == KeyCode::Right { hz + TONE_STEP } else { hz - TONE_STEP };
                        if let Err(e) = engine.set_frequency(hz) { status = e.to_string(); }
                    }
                    KeyCode::Enter => {
                        if let Some(text) = autosend.flush(now, engine) {
                            status = format!("Sending {text:?}");
                        }
                    }
                    KeyCode::Backspace => {
                        buffer.pop();
                        autosend.on_text_changed(&buffer, now);
                    }
                    KeyCode::Char(c) if !ctrl && char_to_morse(c).is_some() => {
                        buffer.push(c.to_ascii_uppercase());
                        autosend.on_text_changed(&buffer, now);
                    }
                    _ => {}
                }
            }

            // ── Engine events ─────────────────────────────────────────────────
            while let Ok(ev) = events.try_recv() {
                match ev {
                    EngineEvent::CharacterSent(c) => {
                        autosend.on_character_sent(c);
                        sent_log.push(c);
                    }
                    EngineEvent::SendCompleted => {
                        autosend.on_send_completed(now);
                        status = "Send complete".into();
                    }
                    EngineEvent::TestCompleted => status = "Test complete".into(),
                    EngineEvent::DeviceError(e) => {
                        log::warn!("[main-loop] device error: {e}");
                        if autosend.in_flight() > 0 {
                            // a failed device would fail every retry too
                            autosend.on_send_completed(now);
                            autosend.set_enabled(false, now);
                        }
                        status = format!("Device error: {e}");
                    }
                }
            }
            trim_front(&mut sent_log, SENT_LOG_MAX);

            // ── Auto-send ─────────────────────────────────────────────────────
            if let Some(text) = autosend.poll(now, engine) {
                status = format!("Sending {text:?}");
            }

            // ── Draw ──────────────────────────────────────────────────────────
            let settings = engine.settings();
            let active   = engine.active_kind();
            let ui = UiState {
                wpm:            settings.wpm,
                tone_hz:        settings.tone_hz,
                output_device:  settings.output_device.unwrap_or_default(),
                monitor_device: settings.monitor_device.unwrap_or_default(),
                buffer:         buffer.clone(),
                acknowledged:   autosend.acknowledged_len(),
                autosend:       autosend.is_enabled(),
                test_active:    active == Some(SessionKind::Test),
                send_active:    active == Some(SessionKind::Send),
                sent_log:       sent_log.clone(),
                status:         status.clone(),
            };
            tui.draw(&ui)?;

            thread::sleep(tick);
        }

        engine.stop_send();
        engine.stop_test();
        Ok(())
    }

    fn trim_front(s: &mut String, max_chars: usize) {
        let n = s.chars().count();
        if n > max_chars {
            let cut = s.char_indices().nth(n - max_chars).map_or(0, |(i, _)| i);
            s.drain(..cut);
        }
    }
}
