//! Diagnostics sender — ships per-frame render stats to `sprig-telemetry`
//! over UDP.
//!
//! Enabled by the `diagnostics` feature flag. Call [`init_logger`] once at
//! startup to capture log records, create a [`DiagSender`] from the
//! [`DiagConfig`] (nothing is created unless `enabled` is set), and call [`DiagSender::end_frame`] after every frame. The
//! sender resets the frame counters every time but only sends a JSON
//! snapshot once per `interval_ms` (100 ms by default), to
//! `127.0.0.1:9200` unless configured otherwise.
//!
//! A second socket on `request_addr` (9201) receives requests from the TUI,
//! currently a new send interval.

use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::DiagConfig;
use crate::graphics::Graphics;
use crate::stats::StatsSnapshot;

/// Log lines carried by one datagram at most.
const MAX_LOGS_PER_SEND: usize = 50;
const LOG_RING_CAP: usize = 500;
const MIN_INTERVAL_MS: u64 = 16;
const MAX_INTERVAL_MS: u64 = 5000;

// ── DiagSender ───────────────────────────────────────────────────────────

/// Owns the outbound UDP socket and the throttling state.
pub struct DiagSender {
    /// Connected to `send_addr` (app → TUI).
    socket: UdpSocket,
    /// Bound to `request_addr` (TUI → app). Missing if the port was taken.
    request_socket: Option<UdpSocket>,
    interval: Duration,
    last_send: Option<Instant>,
    frame: u64,
    started: Instant,
}

impl DiagSender {
    /// `Ok(None)` when `config.enabled` is false.
    pub fn new(config: &DiagConfig) -> io::Result<Option<Self>> {
        if !config.enabled {
            log::debug!("diagnostics: disabled by config");
            return Ok(None);
        }
        let socket = UdpSocket::bind("127.0.0.1:0")?;
        socket.connect(&config.send_addr)?;
        socket.set_nonblocking(true)?;

        let request_socket = match UdpSocket::bind(&config.request_addr) {
            Ok(sock) => {
                sock.set_nonblocking(true)?;
                Some(sock)
            }
            Err(e) => {
                log::warn!("diagnostics: cannot listen on {}: {e}", config.request_addr);
                None
            }
        };

        log::info!("diagnostics: sending to {} every {} ms", config.send_addr, config.interval_ms);
        Ok(Some(Self {
            socket,
            request_socket,
            interval: Duration::from_millis(config.interval_ms.max(1)),
            last_send: None,
            frame: 0,
            started: Instant::now(),
        }))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Frames seen so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Finishes a frame: takes and zeroes the frame counters of `gfx`, then
    /// sends a snapshot if the interval has passed. Returns whether one was
    /// sent. Send failures are ignored; the next interval tries again.
    pub fn end_frame(&mut self, gfx: &Graphics, batch_capacity: usize) -> bool {
        let stats = gfx.stats().reset_frame();
        self.frame += 1;
        self.process_requests();

        let now = Instant::now();
        if self.last_send.is_some_and(|last| now.duration_since(last) < self.interval) {
            return false;
        }
        self.last_send = Some(now);

        let snapshot = DiagSnapshot {
            frame: self.frame,
            elapsed_secs: self.started.elapsed().as_secs_f32(),
            interval_ms: self.interval.as_millis() as u64,
            stats,
            live_textures: gfx.live_textures(),
            live_framebuffers: gfx.live_framebuffers(),
            batch_capacity,
            logs: drain_captured_logs(MAX_LOGS_PER_SEND),
        };
        match serde_json::to_vec(&snapshot) {
            Ok(json) => self.socket.send(&json).is_ok(),
            Err(_) => false,
        }
    }

    /// Applies pending TUI requests (non-blocking).
    fn process_requests(&mut self) {
        let Some(sock) = &self.request_socket else {
            return;
        };
        let mut buf = [0u8; 1024];
        while let Ok(n) = sock.recv(&mut buf) {
            match serde_json::from_slice::<DiagRequest>(&buf[..n]) {
                Ok(req) => {
                    let ms = req.interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
                    self.interval = Duration::from_millis(ms);
                    log::debug!("diagnostics: interval set to {ms} ms");
                }
                Err(e) => log::warn!("diagnostics: bad request: {e}"),
            }
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

/// One datagram to the TUI.
#[derive(Debug, Clone, Serialize)]
pub struct DiagSnapshot {
    pub frame: u64,
    pub elapsed_secs: f32,
    pub interval_ms: u64,
    /// Counters of the frame that just ended.
    pub stats: StatsSnapshot,
    pub live_textures: usize,
    pub live_framebuffers: usize,
    pub batch_capacity: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntrySnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntrySnapshot {
    pub level: String,
    pub target: String,
    pub message: String,
    pub timestamp_secs: f32,
}

/// A request from the TUI.
#[derive(Debug, Deserialize)]
struct DiagRequest {
    interval_ms: u64,
}

// ── Log Capture ──────────────────────────────────────────────────────────

/// Most recent log records, oldest first.
struct LogRing {
    entries: VecDeque<LogEntrySnapshot>,
    cap: usize,
}

impl LogRing {
    fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    fn push(&mut self, entry: LogEntrySnapshot) {
        if self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn drain(&mut self, max: usize) -> Vec<LogEntrySnapshot> {
        let n = self.entries.len().min(max);
        self.entries.drain(..n).collect()
    }
}

static LOG_RING: Mutex<Option<LogRing>> = Mutex::new(None);
static LOG_START: OnceLock<Instant> = OnceLock::new();

/// Captures records into the ring and passes them on to env_logger.
struct DiagLogger {
    inner: env_logger::Logger,
}

impl log::Log for DiagLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }

        let timestamp_secs = LOG_START.get().map_or(0.0, |s| s.elapsed().as_secs_f32());
        let entry = LogEntrySnapshot {
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            timestamp_secs,
        };
        if let Ok(mut guard) = LOG_RING.lock() {
            if let Some(ring) = guard.as_mut() {
                ring.push(entry);
            }
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

static DIAG_LOGGER: OnceLock<DiagLogger> = OnceLock::new();

/// Installs the capturing logger. `RUST_LOG` controls what reaches stderr;
/// info and above are always captured for the TUI.
///
/// Returns false if another logger was already installed, in which case
/// nothing is captured.
pub fn init_logger() -> bool {
    if let Ok(mut ring) = LOG_RING.lock() {
        ring.get_or_insert_with(|| LogRing::new(LOG_RING_CAP));
    }
    LOG_START.get_or_init(Instant::now);

    let inner = env_logger::Builder::new().parse_default_env().build();
    let max_level = inner.filter();
    let logger = DIAG_LOGGER.get_or_init(|| DiagLogger { inner });

    if log::set_logger(logger).is_err() {
        eprintln!("[sprig] warning: a logger is already set, log capture disabled");
        return false;
    }
    log::set_max_level(max_level.max(log::LevelFilter::Info));
    true
}

/// Takes up to `max` captured records, oldest first.
pub fn drain_captured_logs(max: usize) -> Vec<LogEntrySnapshot> {
    match LOG_RING.lock() {
        Ok(mut guard) => guard.as_mut().map_or_else(Vec::new, |ring| ring.drain(max)),
        Err(_) => Vec::new(),
    }
}
