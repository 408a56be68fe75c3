//! Newline-delimited JSON progress events for the host process.
//!
//! Every call writes one self-contained JSON object and flushes. Reporting is
//! best-effort telemetry: write failures are logged and swallowed.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Stage name carried by every progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Download,
    Convert,
    Install,
    Complete,
    Error,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Download => "download",
            ProgressStage::Convert => "convert",
            ProgressStage::Install => "install",
            ProgressStage::Complete => "complete",
            ProgressStage::Error => "error",
        }
    }
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress record on the wire.
///
/// `error` is always serialized, as `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub percent: f32,
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Parse one line of a progress stream.
    ///
    /// Returns `None` for anything that is not a progress event, since child
    /// libraries may interleave their own log lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

/// Emits progress events to a line-oriented sink (standard output by default).
pub struct ProgressReporter {
    sink: Mutex<Box<dyn Write + Send>>,
    /// Highest percent emitted per stage, used to keep stages non-decreasing.
    high_water: Mutex<HashMap<ProgressStage, f32>>,
}

impl ProgressReporter {
    /// Reporter writing to an arbitrary sink.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
            high_water: Mutex::new(HashMap::new()),
        }
    }

    /// Reporter writing to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Emit a progress event without error detail.
    pub fn emit(&self, stage: ProgressStage, percent: f32, message: impl Into<String>) {
        self.emit_event(ProgressEvent {
            stage,
            percent,
            message: message.into(),
            error: None,
        });
    }

    /// Emit an event carrying error detail.
    pub fn emit_with_error(
        &self,
        stage: ProgressStage,
        percent: f32,
        message: impl Into<String>,
        error: impl Into<String>,
    ) {
        self.emit_event(ProgressEvent {
            stage,
            percent,
            message: message.into(),
            error: Some(error.into()),
        });
    }

    /// Emit a terminal `error` stage event.
    pub fn emit_error(&self, message: impl Into<String>, error: impl Into<String>) {
        self.emit_with_error(ProgressStage::Error, 0.0, message, error);
    }

    /// Emit a fully formed event, clamping `percent` first.
    pub fn emit_event(&self, mut event: ProgressEvent) {
        event.percent = self.clamp_percent(event.stage, event.percent);
        debug!(
            "progress {} {:.0}%: {}",
            event.stage, event.percent, event.message
        );

        match serde_json::to_string(&event) {
            Ok(line) => self.write_line(&line),
            Err(e) => warn!("Failed to serialize progress event: {}", e),
        }
    }

    /// Write one arbitrary JSON payload line (inspect report, success payload).
    pub fn write_json<T: Serialize>(&self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(line) => self.write_line(&line),
            Err(e) => warn!("Failed to serialize payload: {}", e),
        }
    }

    fn clamp_percent(&self, stage: ProgressStage, percent: f32) -> f32 {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };

        let mut high_water = self
            .high_water
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let floor = high_water.get(&stage).copied().unwrap_or(0.0);
        if percent < floor {
            debug!(
                "Raising {} progress {} to previous value {}",
                stage, percent, floor
            );
            return floor;
        }
        high_water.insert(stage, percent);
        percent
    }

    fn write_line(&self, line: &str) {
        let mut sink = self
            .sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(sink, "{line}").and_then(|_| sink.flush()) {
            warn!("Failed to write progress line: {}", e);
        }
    }
}

/// In-memory line sink, for embedding hosts that relay events themselves and
/// for tests.
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All complete lines written so far.
    pub fn lines(&self) -> Vec<String> {
        let bytes = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Lines that parse as progress events, in emission order.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.lines()
            .iter()
            .filter_map(|l| ProgressEvent::parse_line(l))
            .collect()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
