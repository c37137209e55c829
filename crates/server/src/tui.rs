use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Row, Table, TableState};

use ripple::PacketLossSimulation;

use crate::server::{ServerStats, SessionInfo};

const MAX_LOG_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

pub struct TuiState {
    logs: VecDeque<(LogLevel, String)>,
    selected: usize,
    pending_kick: Option<u32>,
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            logs: VecDeque::new(),
            selected: 0,
            pending_kick: None,
        }
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        if self.logs.len() >= MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back((level, message));
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Info, message.into());
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Warn, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Error, message.into());
    }

    pub fn select_prev(&mut self, count: usize) {
        if count > 0 {
            self.selected = self.selected.checked_sub(1).unwrap_or(count - 1);
        }
    }

    pub fn select_next(&mut self, count: usize) {
        if count > 0 {
            self.selected = (self.selected + 1) % count;
        }
    }

    pub fn request_kick(&mut self, sessions: &[SessionInfo]) {
        if let Some(info) = sessions.get(self.selected) {
            self.pending_kick = Some(info.session_id);
        }
    }

    pub fn take_pending_kick(&mut self) -> Option<u32> {
        self.pending_kick.take()
    }

    pub fn selected_session<'a>(&self, sessions: &'a [SessionInfo]) -> Option<&'a SessionInfo> {
        sessions.get(self.selected)
    }
}

/// Steps a session's impairment through off, 5% and 20% loss.
pub fn next_loss_preset(current: &PacketLossSimulation) -> PacketLossSimulation {
    let loss_percent = match current.loss_percent {
        p if !current.enabled || p <= 0.0 => 5.0,
        p if p < 20.0 => 20.0,
        _ => return PacketLossSimulation::default(),
    };
    PacketLossSimulation {
        enabled: true,
        loss_percent,
        ..current.clone()
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, stats: &ServerStats, sessions: &[SessionInfo]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(6),
            Constraint::Length(8),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_capacity(frame, chunks[1], stats);
    render_network(frame, chunks[2], stats);
    render_sessions(frame, chunks[3], state, sessions);
    render_log(frame, chunks[4], state);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let title = format!(" Ripple Server - Uptime: {} ", format_duration(stats.uptime_secs));

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Frame: {}  |  Clients: {}  |  Entities: {}  |  q quit, k kick, l loss, arrows select",
        stats.frame, stats.client_count, stats.entity_count
    );

    frame.render_widget(
        Paragraph::new(text)
            .block(block)
            .style(Style::default().fg(Color::White)),
        area,
    );
}

fn render_capacity(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let ratio = if stats.max_clients == 0 {
        1.0
    } else {
        stats.client_count as f64 / stats.max_clients as f64
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{} clients", stats.client_count, stats.max_clients));

    frame.render_widget(gauge, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let net = &stats.network;
    let loss = net.packet_loss_percent();
    let lines = vec![
        Line::from(vec![
            Span::styled("Packets: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{} sent / {} recv / {} acked",
                net.packets_sent, net.packets_received, net.packets_acked
            )),
        ]),
        Line::from(vec![
            Span::styled("Bytes: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{} sent / {} recv",
                format_bytes(net.bytes_sent),
                format_bytes(net.bytes_received)
            )),
        ]),
        Line::from(vec![
            Span::styled("RTT: ", Style::default().fg(Color::Gray)),
            Span::raw(format_ping(net.rtt_ms)),
            Span::styled("  Loss: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:.1}%", loss),
                Style::default().fg(if loss > 5.0 { Color::Red } else { Color::White }),
            ),
        ]),
        Line::from(vec![
            Span::styled("Dropped: ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{} stale / {} malformed",
                net.packets_stale, net.packets_malformed
            )),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_sessions(frame: &mut Frame, area: Rect, state: &TuiState, sessions: &[SessionInfo]) {
    let header = Row::new(["ID", "Address", "Entity", "Up", "Ping", "Loss", "Recv", "Ack", "Sim"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = sessions.iter().map(|info| {
        Row::new(vec![
            info.session_id.to_string(),
            info.addr.to_string(),
            info.entity_id.map(|e| e.to_string()).unwrap_or_default(),
            format_duration(info.connected_secs),
            format_ping(info.ping_ms),
            format!("{:.1}%", info.packet_loss * 100.0),
            info.frames.received.to_string(),
            info.frames.acknowledged.to_string(),
            if info.packet_loss_sim.is_active() {
                format!("{:.0}%", info.packet_loss_sim.loss_percent)
            } else {
                "-".to_string()
            },
        ])
    });

    let widths = [
        Constraint::Length(4),
        Constraint::Length(22),
        Constraint::Length(7),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(5),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(" Sessions ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        )
        .row_highlight_style(Style::default().bg(Color::DarkGray));

    let mut table_state = TableState::default();
    if !sessions.is_empty() {
        table_state.select(Some(state.selected.min(sessions.len() - 1)));
    }
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = state
        .logs
        .iter()
        .skip(state.logs.len().saturating_sub(visible))
        .map(|(level, message)| {
            let color = match level {
                LogLevel::Info => Color::White,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Error => Color::Red,
            };
            ListItem::new(message.as_str()).style(Style::default().fg(color))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Log ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(list, area);
}

fn format_ping(ping: Option<f32>) -> String {
    match ping {
        Some(ms) => format!("{:.1}ms", ms),
        None => "-".to_string(),
    }
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
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_wraps() {
        let mut state = TuiState::new();
        state.select_prev(3);
        assert_eq!(state.selected, 2);
        state.select_next(3);
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn log_is_bounded() {
        let mut state = TuiState::new();
        for i in 0..MAX_LOG_LINES + 10 {
            state.log_info(format!("line {}", i));
        }
        assert_eq!(state.logs.len(), MAX_LOG_LINES);
        assert_eq!(state.logs.front().unwrap().1, "line 10");
    }

    #[test]
    fn loss_presets_cycle() {
        let first = next_loss_preset(&PacketLossSimulation::default());
        assert!(first.enabled);
        assert_eq!(first.loss_percent, 5.0);
        let second = next_loss_preset(&first);
        assert_eq!(second.loss_percent, 20.0);
        assert!(!next_loss_preset(&second).is_active());
    }

    #[test]
    fn formats() {
        assert_eq!(format_duration(3725), "01:02:05");
        assert_eq!(format_bytes(2048), "2.0KB");
        assert_eq!(format_ping(None), "-");
    }
}
