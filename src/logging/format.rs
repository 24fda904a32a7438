//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::monitor::PipelineResult;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// One scored action as written by the replay tool.
#[derive(Debug, Serialize)]
pub struct FlagLogLine<'a> {
    pub ts: String,
    pub event_id: String,
    pub user_id: String,
    pub content_type: &'a str,
    pub content_id: String,
    pub score: f64,
    pub confidence: f64,
    pub severity: &'a str,
    pub flagged: bool,
    pub priority: u8,
    pub reason: &'a str,
    pub reason_codes: Vec<&'a str>,
    pub outcome: &'a crate::flagging::FlagOutcome,
}

impl<'a> FlagLogLine<'a> {
    pub fn from_result(result: &'a PipelineResult) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339(),
            event_id: result.event_id.to_string(),
            user_id: result.user_id.to_string(),
            content_type: result.decision.content_type.as_str(),
            content_id: result.decision.content_id.to_string(),
            score: result.score.overall,
            confidence: result.score.confidence,
            severity: result.score.severity.as_str(),
            flagged: result.decision.should_flag,
            priority: result.decision.priority,
            reason: &result.decision.reason,
            reason_codes: result.score.reason_codes.iter().map(|c| c.as_str()).collect(),
            outcome: &result.outcome,
        }
    }
}

/// Initialize tracing with JSON format (one JSON object per line)
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber to stderr, level from RUST_LOG or default.
    /// Stdout stays free for ndjson output.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let registry = tracing_subscriber::registry().with(filter);
        let result = if json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(FmtSpan::NONE)
                        .with_writer(std::io::stderr),
                )
                .try_init()
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
        };
        if let Err(e) = result {
            eprintln!("tracing subscriber already installed: {e}");
        }
    }

    /// Emit a single structured line without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(w, "{}", line)
    }
}
