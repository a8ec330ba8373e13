use std::collections::VecDeque;
use std::time::Instant;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};

use bomberlan::ServerEvent;

use crate::server::{PlayerInfo, ServerStats};

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub secs: u64,
    pub level: LogLevel,
    pub message: String,
}

pub struct TuiState {
    started: Instant,
    log: VecDeque<LogEntry>,
    /// Lines scrolled up from the newest entry.
    scroll: usize,
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            log: VecDeque::new(),
            scroll: 0,
        }
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    fn push(&mut self, level: LogLevel, message: String) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(LogEntry {
            secs: self.started.elapsed().as_secs(),
            level,
            message,
        });
    }

    pub fn record(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Started { addr } => self.log_info(format!("Listening on {}", addr)),
            ServerEvent::ClientConnected { connection } => {
                self.log_info(format!("Connection {} opened", connection))
            }
            ServerEvent::ClientDisconnected { connection, name } => match name {
                Some(name) => self.log_info(format!("{} left (connection {})", name, connection)),
                None => self.log_info(format!("Connection {} closed", connection)),
            },
            ServerEvent::LoginAccepted {
                id,
                name,
                registered,
            } => self.log_info(format!(
                "{} logged in as player {}{}",
                name,
                id,
                if registered { " (new account)" } else { "" }
            )),
            ServerEvent::LoginRejected {
                connection,
                name,
                rejection,
            } => self.log_warn(format!(
                "Login for {} on connection {} rejected: {:?}",
                name, connection, rejection
            )),
            ServerEvent::Chat { name, message } => self.log_info(format!("<{}> {}", name, message)),
            ServerEvent::PlayerEliminated { id } => {
                self.log_info(format!("Player {} eliminated", id))
            }
            ServerEvent::RoundOver { message, .. } => {
                self.log_info(format!("Round over: {}", message))
            }
            ServerEvent::ProtocolError {
                connection,
                message,
            } => self.log_error(format!("Connection {}: {}", connection, message)),
            ServerEvent::Stopped => self.log_info("Server stopped"),
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 5).min(self.log.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(5);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, stats: &ServerStats, players: &[PlayerInfo]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(7),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[2]);

    render_header(frame, chunks[0], stats);
    render_status(frame, chunks[1], stats);
    render_network(frame, middle[0], stats);
    render_players(frame, middle[1], players);
    render_log(frame, chunks[3], state);
    render_help(frame, chunks[4]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let title = format!(
        " Bomberlan Server - Uptime: {} ",
        format_duration(stats.uptime_secs)
    );

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Tick: {}  |  Connections: {}  |  Players: {}",
        stats.tick, stats.connection_count, stats.player_count
    );

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Slots ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let max = stats.max_connections.max(1);
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Green))
        .ratio((stats.connection_count as f64 / max as f64).min(1.0))
        .label(format!("{}/{} connections", stats.connection_count, max));

    frame.render_widget(gauge, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let net = &stats.network_stats;
    let resend = net.resend_percent();
    let lines = vec![
        stat_line(
            "Packets: ",
            format!("{} sent / {} recv", net.packets_sent, net.packets_received),
            Color::White,
        ),
        stat_line(
            "Bytes: ",
            format!(
                "{} sent / {} recv",
                format_bytes(net.bytes_sent),
                format_bytes(net.bytes_received)
            ),
            Color::White,
        ),
        stat_line(
            "RTT: ",
            format!("{:.1}ms (+/- {:.1}ms)", net.rtt_ms, net.rtt_variance),
            Color::White,
        ),
        stat_line(
            "Resent: ",
            format!("{} ({:.1}%)", net.packets_resent, resend),
            if resend > 5.0 { Color::Red } else { Color::White },
        ),
        stat_line("Dropped: ", net.packets_dropped.to_string(), Color::White),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn stat_line(label: &'static str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn render_players(frame: &mut Frame, area: Rect, players: &[PlayerInfo]) {
    let block = Block::default()
        .title(" Players ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let lines: Vec<Line> = if players.is_empty() {
        vec![Line::styled(
            "Nobody logged in",
            Style::default().fg(Color::DarkGray),
        )]
    } else {
        players
            .iter()
            .map(|p| {
                let status = if p.alive {
                    Span::styled("alive", Style::default().fg(Color::Green))
                } else {
                    Span::styled("out", Style::default().fg(Color::Red))
                };
                Line::from(vec![
                    Span::styled(format!("{:>3} ", p.id), Style::default().fg(Color::Gray)),
                    Span::styled(format!("{:<12} ", p.name), Style::default().fg(Color::White)),
                    status,
                    Span::styled(
                        format!("  ({:.1}, {:.1})", p.position.x, p.position.z),
                        Style::default().fg(Color::DarkGray),
                    ),
                ])
            })
            .collect()
    };

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let visible = area.height.saturating_sub(2) as usize;
    let end = state.log.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = state
        .log
        .range(start..end)
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Info => Color::White,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", format_duration(entry.secs)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new("'q'/ESC quit  |  PgUp/PgDn scroll events  |  End jump to latest")
        .block(block)
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );

    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded_and_scroll_clamped() {
        let mut state = TuiState::new();
        for i in 0..MAX_LOG_LINES + 10 {
            state.log_info(format!("line {}", i));
        }
        assert_eq!(state.log.len(), MAX_LOG_LINES);
        assert_eq!(state.log.front().unwrap().message, "line 10");

        for _ in 0..1000 {
            state.scroll_up();
        }
        assert_eq!(state.scroll, MAX_LOG_LINES - 1);
        state.scroll_to_bottom();
        assert_eq!(state.scroll, 0);
    }

    #[test]
    fn test_rejections_are_warnings() {
        let mut state = TuiState::new();
        state.record(ServerEvent::LoginRejected {
            connection: 3,
            name: "ann".into(),
            rejection: bomberlan::LoginRejection::AlreadyLoggedIn,
        });
        assert_eq!(state.log.back().unwrap().level, LogLevel::Warn);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_duration(3725), "01:02:05");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.0KB");
    }
}
