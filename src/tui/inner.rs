// src/tui/inner.rs  -  ratatui layout
use anyhow::Result;
use crossterm::{execute, terminal::{self, EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Terminal,
};
use super::UiState;
use std::io::stdout;

pub struct Tui {
    terminal: Terminal<CrosstermBackend<std::io::Stdout>>,
}

impl Tui {
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut out = stdout();
        execute!(out, EnterAlternateScreen)?;
        let backend  = CrosstermBackend::new(out);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    pub fn cleanup(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
    }

    pub fn draw(&mut self, s: &UiState) -> Result<()> {
        self.terminal.draw(|f| {
            let area = f.area();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),  // header / status bar
                    Constraint::Min(4),     // keyed so far
                    Constraint::Min(5),     // input buffer
                    Constraint::Length(3),  // footer hints
                ])
                .split(area);

            // ── Header ────────────────────────────────────────────────────
            let on_air = if s.send_active {
                "  SENDING"
            } else if s.test_active {
                "  TEST"
            } else {
                ""
            };
            let header = Paragraph::new(format!(
                " CW Auto-Send  |  {}WPM  {:.0}Hz  |  OUT: {}  MON: {}  |  AUTO: {}{}",
                s.wpm, s.tone_hz,
                device_label(&s.output_device), device_label(&s.monitor_device),
                if s.autosend { "on" } else { "off" }, on_air,
            ))
            .style(Style::default().fg(Color::Black).bg(Color::Cyan)
                   .add_modifier(Modifier::BOLD));
            f.render_widget(header, chunks[0]);

            // ── Sent log ──────────────────────────────────────────────────
            let sent_block = Paragraph::new(Line::from(Span::styled(
                    s.sent_log.clone(),
                    Style::default().fg(Color::Green),
                )))
                .block(Block::default()
                    .title(" ON AIR ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Green)))
                .wrap(Wrap { trim: false });
            f.render_widget(sent_block, chunks[1]);

            // ── Buffer ────────────────────────────────────────────────────
            let (done, pending) = s.split_buffer();
            let lines: Vec<Line> = vec![
                Line::from(vec![
                    Span::styled("TEXT:    ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                    Span::styled(done.to_string(), Style::default().fg(Color::DarkGray)),
                    Span::styled(pending.to_string(), Style::default().fg(Color::White)),
                    Span::styled("_", Style::default().fg(Color::Cyan)),
                ]),
                Line::from(vec![
                    Span::styled("STATUS:  ", Style::default().fg(Color::DarkGray)),
                    Span::styled(s.status.clone(), Style::default().fg(Color::Magenta)),
                ]),
            ];
            let input_block = Paragraph::new(lines)
                .block(Block::default()
                    .title(" YOUR TEXT ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow)))
                .wrap(Wrap { trim: false });
            f.render_widget(input_block, chunks[2]);

            // ── Footer ────────────────────────────────────────────────────
            let footer = Paragraph::new(
                " Type to send   Enter = send now   F2 = test   F3 = auto on/off   \
                 ↑↓ = WPM   ←→ = tone   Ctrl-U = clear   Esc = stop / quit"
            )
            .style(Style::default().fg(Color::DarkGray).bg(Color::Black));
            f.render_widget(footer, chunks[3]);
        })?;
        Ok(())
    }
}

fn device_label(name: &str) -> &str {
    if name.is_empty() { "default" } else { name }
}
