//! Read-only snapshot of the correlation state for reporting collaborators.
//!
//! The snapshot applies the line status precedence, so a failed line never exposes its parsed
//! fields here even if they were recorded.

use jiff::Timestamp;
use serde::Serialize;

use crate::correlation::{BusinessFields, CorrelationEngine, CorrelationSession, LineRecord, LineStatus};
use crate::guid::Guid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOutcome {
    FailedAtReceipt,
    FailedAtData,
    Parsed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineReport {
    pub correlation_id: Guid,
    pub line: String,
    pub received_at: Timestamp,
    pub outcome: LineOutcome,
    /// Failure or completion time, absent while pending.
    pub outcome_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BusinessFields>,
}

impl From<&LineRecord> for LineReport {
    fn from(record: &LineRecord) -> Self {
        let (outcome, outcome_at, fields) = match record.status() {
            LineStatus::FailedAtReceipt { at } => (LineOutcome::FailedAtReceipt, Some(at), None),
            LineStatus::FailedAtData { at } => (LineOutcome::FailedAtData, Some(at), None),
            LineStatus::Parsed { at, fields } => {
                (LineOutcome::Parsed, Some(at), Some(fields.clone()))
            }
            LineStatus::Pending => (LineOutcome::Pending, None, None),
        };

        LineReport {
            correlation_id: record.correlation_id(),
            line: record.line().to_string(),
            received_at: record.received_at(),
            outcome,
            outcome_at,
            fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub file_id: String,
    pub started_at: Timestamp,
    pub failed_at: Option<Timestamp>,
    pub lines: Vec<LineReport>,
}

impl SessionReport {
    pub fn count(&self, outcome: LineOutcome) -> usize {
        self.lines.iter().filter(|l| l.outcome == outcome).count()
    }
}

impl From<&CorrelationSession> for SessionReport {
    fn from(session: &CorrelationSession) -> Self {
        SessionReport {
            file_id: session.file_id().to_string(),
            started_at: session.started_at(),
            failed_at: session.failed_at(),
            lines: session.lines().iter().map(LineReport::from).collect(),
        }
    }
}

/// Snapshot every session, in the order their files were started.
pub fn session_reports(engine: &CorrelationEngine) -> Vec<SessionReport> {
    engine.sessions().iter().map(SessionReport::from).collect()
}
