//! sprig-telemetry — TUI dashboard for sprig render stats.
//!
//! Listens for the JSON snapshots a sprig application sends when built with
//! the `diagnostics` feature and shows them in a terminal dashboard: draw
//! calls and quads per frame, batching efficiency, live GPU resources and
//! captured log lines.
//!
//! ```sh
//! cargo run -p sprig-telemetry              # listens on 127.0.0.1:9200
//! cargo run -p sprig-telemetry -- 0.0.0.0:9300 127.0.0.1:9301
//! ```

use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Sparkline};
use serde::{Deserialize, Serialize};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9200";
const DEFAULT_REQUEST_ADDR: &str = "127.0.0.1:9201";

// ── Wire types (must match sprig's JSON format) ─────────────────────────

#[derive(Deserialize, Clone, Default)]
struct DiagSnapshot {
    frame: u64,
    elapsed_secs: f32,
    #[serde(default)]
    interval_ms: u64,
    stats: FrameStats,
    live_textures: usize,
    live_framebuffers: usize,
    batch_capacity: usize,
    #[serde(default)]
    logs: Vec<LogEntryInfo>,
}

#[derive(Deserialize, Clone, Copy, Default)]
struct FrameStats {
    flushes: u32,
    draw_calls: u32,
    quads: u32,
    texture_switches: u32,
    clips: u32,
}

#[derive(Deserialize, Clone, Default)]
struct LogEntryInfo {
    level: String,
    target: String,
    message: String,
    timestamp_secs: f32,
}

// ── Interval request (sent to the app) ───────────────────────────────────

#[derive(Serialize)]
struct IntervalRequest {
    interval_ms: u64,
}

// ── Tabs ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tab {
    Overview,
    Logs,
}

impl Tab {
    const ALL: [Tab; 2] = [Tab::Overview, Tab::Logs];

    fn next(self) -> Self {
        match self {
            Tab::Overview => Tab::Logs,
            Tab::Logs => Tab::Overview,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Logs => "Logs",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LogFilter {
    All,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogFilter {
    fn next(self) -> Self {
        match self {
            LogFilter::All => LogFilter::Debug,
            LogFilter::Debug => LogFilter::Info,
            LogFilter::Info => LogFilter::Warn,
            LogFilter::Warn => LogFilter::Error,
            LogFilter::Error => LogFilter::All,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogFilter::All => "ALL",
            LogFilter::Debug => "DEBUG+",
            LogFilter::Info => "INFO+",
            LogFilter::Warn => "WARN+",
            LogFilter::Error => "ERROR",
        }
    }

    fn passes(self, level: &str) -> bool {
        match self {
            LogFilter::All => true,
            LogFilter::Debug => level != "TRACE",
            LogFilter::Info => matches!(level, "INFO" | "WARN" | "ERROR"),
            LogFilter::Warn => matches!(level, "WARN" | "ERROR"),
            LogFilter::Error => level == "ERROR",
        }
    }
}

// ── App state ────────────────────────────────────────────────────────────

const HISTORY_CAP: usize = 1200;
const LOG_CAP: usize = 2000;
const INTERVAL_STEPS_MS: [u64; 6] = [16, 50, 100, 250, 500, 1000];

struct App {
    latest: DiagSnapshot,
    draw_call_history: VecDeque<u64>,
    quad_history: VecDeque<u64>,
    active_tab: Tab,
    paused: bool,
    connected: bool,
    /// Connected to the app's request port.
    request_socket: UdpSocket,
    log_entries: Vec<LogEntryInfo>,
    log_filter: LogFilter,
    log_auto_scroll: bool,
    log_scroll_offset: usize,
}

impl App {
    fn new(request_socket: UdpSocket) -> Self {
        Self {
            latest: DiagSnapshot::default(),
            draw_call_history: VecDeque::with_capacity(HISTORY_CAP),
            quad_history: VecDeque::with_capacity(HISTORY_CAP),
            active_tab: Tab::Overview,
            paused: false,
            connected: false,
            request_socket,
            log_entries: Vec::new(),
            log_filter: LogFilter::Info,
            log_auto_scroll: true,
            log_scroll_offset: 0,
        }
    }

    fn push_snapshot(&mut self, snap: DiagSnapshot) {
        if self.paused {
            return;
        }

        push_capped(&mut self.draw_call_history, snap.stats.draw_calls as u64);
        push_capped(&mut self.quad_history, snap.stats.quads as u64);

        self.log_entries.extend(snap.logs.iter().cloned());
        if self.log_entries.len() > LOG_CAP {
            let excess = self.log_entries.len() - LOG_CAP;
            self.log_entries.drain(..excess);
        }

        self.latest = snap;
        self.connected = true;
    }

    /// Asks the app to send faster (`faster`) or slower, one step at a time.
    fn step_interval(&self, faster: bool) {
        let current = self.latest.interval_ms;
        let next = if faster {
            INTERVAL_STEPS_MS.iter().rev().find(|&&ms| ms < current)
        } else {
            INTERVAL_STEPS_MS.iter().find(|&&ms| ms > current)
        };
        if let Some(&interval_ms) = next {
            if let Ok(json) = serde_json::to_vec(&IntervalRequest { interval_ms }) {
                let _ = self.request_socket.send(&json);
            }
        }
    }

    fn log_counts(&self) -> (usize, usize, usize, usize, usize) {
        let (mut t, mut d, mut i, mut w, mut e) = (0, 0, 0, 0, 0);
        for log in &self.log_entries {
            match log.level.as_str() {
                "TRACE" => t += 1,
                "DEBUG" => d += 1,
                "INFO" => i += 1,
                "WARN" => w += 1,
                "ERROR" => e += 1,
                _ => {}
            }
        }
        (t, d, i, w, e)
    }

    fn filtered_logs(&self) -> Vec<&LogEntryInfo> {
        self.log_entries
            .iter()
            .filter(|e| self.log_filter.passes(&e.level))
            .collect()
    }
}

fn push_capped(history: &mut VecDeque<u64>, value: u64) {
    if history.len() >= HISTORY_CAP {
        history.pop_front();
    }
    history.push_back(value);
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() -> io::Result<()> {
    let mut args = std::env::args().skip(1);
    let listen_addr = args.next().unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
    let request_addr = args.next().unwrap_or_else(|| DEFAULT_REQUEST_ADDR.to_string());

    let recv_socket = UdpSocket::bind(&listen_addr).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("cannot bind {listen_addr} ({e}); is another sprig-telemetry running?"),
        )
    })?;
    recv_socket.set_nonblocking(true)?;

    let send_socket = UdpSocket::bind("127.0.0.1:0")?;
    send_socket.connect(&request_addr)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(send_socket);
    let mut buf = [0u8; 65536];

    loop {
        // Drain all pending datagrams.
        while let Ok(n) = recv_socket.recv(&mut buf) {
            if let Ok(snap) = serde_json::from_slice::<DiagSnapshot>(&buf[..n]) {
                app.push_snapshot(snap);
            }
        }

        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if handle_key(&mut app, key) {
                    break;
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// ── Key handling ─────────────────────────────────────────────────────────

/// Returns `true` if the app should quit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('p') => app.paused = !app.paused,
        KeyCode::Char('+') => app.step_interval(true),
        KeyCode::Char('-') => app.step_interval(false),

        KeyCode::Char('1') => app.active_tab = Tab::Overview,
        KeyCode::Char('2') => app.active_tab = Tab::Logs,
        KeyCode::Tab | KeyCode::BackTab => app.active_tab = app.active_tab.next(),

        KeyCode::Char('l') if app.active_tab == Tab::Logs => {
            app.log_filter = app.log_filter.next();
        }
        KeyCode::Char('g') if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = !app.log_auto_scroll;
        }
        KeyCode::Up if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll_offset = app.log_scroll_offset.saturating_sub(1);
        }
        KeyCode::Down if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll_offset += 1;
        }

        _ => {}
    }
    false
}

// ── Drawing ──────────────────────────────────────────────────────────────

fn ui(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(1), // tab bar
            Constraint::Min(6),    // tab content
            Constraint::Length(3), // gpu resources
            Constraint::Length(1), // help bar
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_tab_bar(f, app, chunks[1]);
    match app.active_tab {
        Tab::Overview => draw_overview_tab(f, app, chunks[2]),
        Tab::Logs => draw_logs_tab(f, app, chunks[2]),
    }
    draw_resources_panel(f, app, chunks[3]);
    draw_help_bar(f, app, chunks[4]);
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let (status, status_color) = if app.paused {
        (" PAUSED ", Color::Yellow)
    } else if app.connected {
        (" LIVE ", Color::Green)
    } else {
        (" WAITING ", Color::DarkGray)
    };

    let text = Line::from(vec![
        Span::styled(
            format!(" {status} "),
            Style::default().bg(status_color).fg(Color::Black),
        ),
        Span::raw("  "),
        Span::styled("Frame: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.frame),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled("Up: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format_uptime(s.elapsed_secs), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled("Every: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}ms", s.interval_ms), Style::default().fg(Color::White)),
    ]);

    let block = Block::default()
        .title(" sprig-telemetry ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_tab_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for (i, tab) in Tab::ALL.iter().enumerate() {
        let num = format!(" {} ", i + 1);
        let label = format!("{} ", tab.label());
        if *tab == app.active_tab {
            spans.push(Span::styled(
                num,
                Style::default().bg(Color::Cyan).fg(Color::Black).add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                label,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::styled(num, Style::default().fg(Color::DarkGray)));
            spans.push(Span::styled(label, Style::default().fg(Color::DarkGray)));
        }
        spans.push(Span::raw("  "));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Overview Tab ─────────────────────────────────────────────────────────

fn draw_overview_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(4)])
        .split(area);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);
    draw_sparkline(f, " Draw Calls / Frame ", &app.draw_call_history, Color::Green, halves[0]);
    draw_sparkline(f, " Quads / Frame ", &app.quad_history, Color::Yellow, halves[1]);

    draw_frame_panel(f, app, chunks[1]);
}

fn draw_sparkline(f: &mut ratatui::Frame, title: &str, history: &VecDeque<u64>, color: Color, area: Rect) {
    let data: Vec<u64> = history.iter().copied().collect();
    let (min, avg, max) = stats(&data);
    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height < 2 {
        return;
    }
    let spark_area = Rect { height: inner.height - 1, ..inner };
    let stats_area = Rect {
        y: inner.y + inner.height - 1,
        height: 1,
        ..inner
    };
    // Show the newest samples that fit.
    let skip = data.len().saturating_sub(spark_area.width as usize);
    let sparkline = Sparkline::default()
        .data(&data[skip..])
        .style(Style::default().fg(color));
    f.render_widget(sparkline, spark_area);
    let stats_text = Line::from(Span::styled(
        format!("min: {min:.0}  avg: {avg:.1}  max: {max:.0}"),
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(Paragraph::new(stats_text), stats_area);
}

fn draw_frame_panel(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest.stats;
    let block = Block::default()
        .title(" Last Frame ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::DarkGray));
    let value = |v: String| Span::styled(v, Style::default().fg(Color::White));
    let fill = batch_fill_pct(s, app.latest.batch_capacity);
    let fill_color = if fill >= 50.0 {
        Color::Green
    } else if fill >= 10.0 {
        Color::Yellow
    } else {
        Color::Red
    };

    let lines = vec![
        Line::from(vec![
            label("  Draw calls: "),
            value(s.draw_calls.to_string()),
            Span::raw("  |  "),
            label("Quads: "),
            value(s.quads.to_string()),
            Span::raw("  |  "),
            label("Flushes: "),
            value(s.flushes.to_string()),
        ]),
        Line::from(vec![
            label("  Texture switches: "),
            value(s.texture_switches.to_string()),
            Span::raw("  |  "),
            label("Clips: "),
            value(s.clips.to_string()),
        ]),
        Line::from(vec![
            label("  Quads / draw: "),
            value(format!("{:.1}", quads_per_draw(s))),
            Span::raw("  |  "),
            label("Batch fill: "),
            Span::styled(format!("{fill:.0}%"), Style::default().fg(fill_color)),
            label(" of "),
            value(app.latest.batch_capacity.to_string()),
        ]),
    ];
    f.render_widget(Paragraph::new(lines).block(block), area);
}

// ── Logs Tab ─────────────────────────────────────────────────────────────

fn draw_logs_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let (t, d, i, w, e) = app.log_counts();
    let scroll_label = if app.log_auto_scroll { "auto" } else { "manual" };

    let block = Block::default()
        .title(format!(
            " Logs [{}]  T:{t} D:{d} I:{i} W:{w} E:{e}  scroll:{scroll_label} ",
            app.log_filter.label(),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let filtered = app.filtered_logs();
    if filtered.is_empty() {
        let text = Span::styled("  No log messages", Style::default().fg(Color::DarkGray));
        f.render_widget(Paragraph::new(text), inner);
        return;
    }

    let visible = inner.height as usize;
    let total = filtered.len();
    let offset = if app.log_auto_scroll {
        total.saturating_sub(visible)
    } else {
        app.log_scroll_offset.min(total.saturating_sub(visible))
    };

    let lines: Vec<Line> = filtered
        .iter()
        .skip(offset)
        .take(visible)
        .map(|entry| {
            let level_color = match entry.level.as_str() {
                "TRACE" => Color::DarkGray,
                "DEBUG" => Color::Gray,
                "INFO" => Color::Cyan,
                "WARN" => Color::Yellow,
                "ERROR" => Color::Red,
                _ => Color::White,
            };
            Line::from(vec![
                Span::styled(
                    format!("  [{:>6.1}s] ", entry.timestamp_secs),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:<5} ", entry.level),
                    Style::default().fg(level_color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("{} ", entry.target), Style::default().fg(Color::DarkGray)),
                Span::styled(entry.message.clone(), Style::default().fg(Color::White)),
            ])
        })
        .collect();

    f.render_widget(Paragraph::new(lines), inner);
}

// ── Resources + help bar ─────────────────────────────────────────────────

fn draw_resources_panel(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" GPU Resources ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = if app.connected {
        Line::from(vec![
            Span::styled("  Textures: ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.latest.live_textures.to_string(), Style::default().fg(Color::White)),
            Span::raw("  |  "),
            Span::styled("Framebuffers: ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                app.latest.live_framebuffers.to_string(),
                Style::default().fg(Color::White),
            ),
        ])
    } else {
        Line::from(Span::styled(
            "  Waiting for a sprig app with diagnostics enabled",
            Style::default().fg(Color::DarkGray),
        ))
    };
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_help_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Cyan));
    let mut spans = vec![
        key(" [1-2]"),
        Span::raw(" tab  "),
        key("[Tab]"),
        Span::raw(" next  "),
        key("[+/-]"),
        Span::raw(" rate  "),
    ];
    if app.active_tab == Tab::Logs {
        spans.extend([
            key("[l]"),
            Span::raw(" filter  "),
            key("[g]"),
            Span::raw(" auto-scroll  "),
            key("[\u{2191}\u{2193}]"),
            Span::raw(" scroll  "),
        ]);
    }
    spans.extend([key("[p]"), Span::raw(" pause  "), key("[q]"), Span::raw(" quit")]);
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn stats(data: &[u64]) -> (f64, f64, f64) {
    let (Some(&min), Some(&max)) = (data.iter().min(), data.iter().max()) else {
        return (0.0, 0.0, 0.0);
    };
    let avg = data.iter().sum::<u64>() as f64 / data.len() as f64;
    (min as f64, avg, max as f64)
}

fn quads_per_draw(s: &FrameStats) -> f64 {
    if s.draw_calls == 0 {
        0.0
    } else {
        s.quads as f64 / s.draw_calls as f64
    }
}

/// How full the average draw was, as a percentage of batch capacity.
fn batch_fill_pct(s: &FrameStats, capacity: usize) -> f64 {
    if capacity == 0 {
        0.0
    } else {
        quads_per_draw(s) / capacity as f64 * 100.0
    }
}

fn format_uptime(secs: f32) -> String {
    let total = secs as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{secs:.1}s")
    }
}
