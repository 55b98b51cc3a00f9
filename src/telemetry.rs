/// Telemetry — connect/send outcomes, persisted to
/// `~/.local/share/copichat/telemetry.jsonl`.
///
/// Stats are:
/// - Accumulated live in AppState during a TUI session
/// - Flushed to disk as each connect or send completes
///
/// The JSONL format keeps one record per completed operation. Values that
/// could identify a tenant are stored masked; no token or message content is
/// ever recorded.
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

// ── Storage path ──────────────────────────────────────────────────────────────

fn telemetry_path() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".local/share")
        });
    base.join("copichat").join("telemetry.jsonl")
}

// ── Per-operation record (one line in telemetry.jsonl) ───────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: i64,
    /// "connect" or "send"
    pub operation: String,
    pub success: bool,
    /// Error class for failures ("validation", "consent_required", ...)
    #[serde(default)]
    pub error_class: Option<String>,
    /// Wall-clock milliseconds for the operation (0 for local-only failures)
    pub duration_ms: u64,
    /// Environment id, masked — enough to tell agents apart, never a secret
    #[serde(default)]
    pub environment: String,
}

impl EventRecord {
    pub fn new(
        operation: &str,
        success: bool,
        error_class: Option<&str>,
        duration_ms: u64,
        environment_masked: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            operation: operation.to_string(),
            success,
            error_class: error_class.map(str::to_string),
            duration_ms,
            environment: environment_masked.to_string(),
        }
    }
}

// ── Live session stats (held in AppState) ─────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub connects_attempted: usize,
    pub connects_succeeded: usize,
    pub messages_sent: usize,
    pub replies_received: usize,
    pub auth_failures: usize,
    pub send_failures: usize,
}

impl SessionStats {
    pub fn record_connect(&mut self, success: bool, auth_failure: bool) {
        self.connects_attempted += 1;
        if success {
            self.connects_succeeded += 1;
        }
        if auth_failure {
            self.auth_failures += 1;
        }
    }

    pub fn record_send(&mut self, success: bool) {
        self.messages_sent += 1;
        if success {
            self.replies_received += 1;
        } else {
            self.send_failures += 1;
        }
    }
}

// ── Persistence ───────────────────────────────────────────────────────────────

/// Append an event record to the telemetry file.
/// Silently ignores write errors — telemetry must never take the chat down.
pub fn append_record(record: &EventRecord) {
    let _ = try_append_record(record);
}

fn try_append_record(record: &EventRecord) -> Result<()> {
    let path = telemetry_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_record_serialization_round_trips() {
        let record = EventRecord {
            timestamp: 1717171717,
            operation: "connect".to_string(),
            success: false,
            error_class: Some("consent_required".to_string()),
            duration_ms: 840,
            environment: "a1b2••••••••cdef".to_string(),
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timestamp, record.timestamp);
        assert_eq!(back.operation, record.operation);
        assert_eq!(back.success, record.success);
        assert_eq!(back.error_class, record.error_class);
        assert_eq!(back.duration_ms, record.duration_ms);
        assert_eq!(back.environment, record.environment);
    }

    #[test]
    fn session_stats_count_outcomes() {
        let mut stats = SessionStats::default();
        stats.record_connect(false, true);
        stats.record_connect(true, false);
        stats.record_send(true);
        stats.record_send(false);

        assert_eq!(stats.connects_attempted, 2);
        assert_eq!(stats.connects_succeeded, 1);
        assert_eq!(stats.auth_failures, 1);
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.replies_received, 1);
        assert_eq!(stats.send_failures, 1);
    }
}
