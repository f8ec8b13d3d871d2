//! Trace run/span data model ingested by the async tracer (§3, §4.14).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sink for trace runs/spans, implemented concretely by the ScyllaDB-backed
/// tracer and trivially by `NoopTracer` everywhere a tracer instance is
/// absent (§4.14: "All tracer operations are no-ops when the tracer
/// instance is absent — this lets pipeline code call them unconditionally").
/// Calls are fire-and-forget: failures are logged by the implementation,
/// never propagated.
pub trait Tracer: Send + Sync {
    fn record_run(&self, run: TraceRun);
    fn record_span(&self, span: TraceSpan);
}

/// Default no-op sink used when tracing is disabled in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn record_run(&self, _run: TraceRun) {}
    fn record_span(&self, _span: TraceSpan) {}
}

/// Maximum bytes kept for any I/O field on ingest (§3, §4.14).
pub const MAX_FIELD_BYTES: usize = 500;

/// Truncates a string to at most `MAX_FIELD_BYTES` bytes, respecting UTF-8
/// character boundaries so the result is always valid `str`.
pub fn truncate_field(s: &str) -> String {
    if s.len() <= MAX_FIELD_BYTES {
        return s.to_string();
    }
    let mut end = MAX_FIELD_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Filtered,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRun {
    pub id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub transcript: String,
    pub response: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpan {
    pub id: String,
    pub run_id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub input: String,
    pub output: String,
    pub status: RunStatus,
    pub error_msg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_ascii_fields() {
        let s = "a".repeat(1000);
        assert_eq!(truncate_field(&s).len(), MAX_FIELD_BYTES);
    }

    #[test]
    fn leaves_short_fields_untouched() {
        assert_eq!(truncate_field("hello"), "hello");
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let s = "é".repeat(300); // 2 bytes each, 600 bytes total
        let truncated = truncate_field(&s);
        assert!(truncated.len() <= MAX_FIELD_BYTES);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
    }
}
