//! Reconstruction of per-file, per-line processing timelines from business stage events.
//!
//! The producer reports two independent two-level workflows: a file is started or fails, and
//! each of its lines is received, has its data parsed, or fails at either of those steps. Stage
//! events for one line share a correlation id. Events referring to a file or line that was never
//! started are ignored, since the capture may begin in the middle of an import.

use std::fmt;

use hashbrown::HashMap;
use jiff::Timestamp;
use log::{debug, trace};
use serde::Serialize;

use crate::err::FieldError;
use crate::field_value::FieldMap;
use crate::guid::Guid;

pub const FILE_NAME_FIELD: &str = "fileName";
pub const LINE_CODE_FIELD: &str = "lineCode";
pub const LINE_FIELD: &str = "line";
pub const ACCOUNT_FIELD: &str = "conta";
pub const AMOUNT_FIELD: &str = "valor";
pub const DESCRIPTION_FIELD: &str = "descricao";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageCode {
    FileStarted,
    LineReceived,
    LineDataParsed,
    FileFailed,
    LineFailed,
    LineDataFailed,
}

impl StageCode {
    pub fn event_id(self) -> u16 {
        match self {
            StageCode::FileStarted => 12,
            StageCode::LineReceived => 13,
            StageCode::LineDataParsed => 14,
            StageCode::FileFailed => 21,
            StageCode::LineFailed => 22,
            StageCode::LineDataFailed => 23,
        }
    }

    pub fn is_line_level(self) -> bool {
        !matches!(self, StageCode::FileStarted | StageCode::FileFailed)
    }
}

impl TryFrom<u16> for StageCode {
    type Error = u16;

    fn try_from(event_id: u16) -> Result<Self, Self::Error> {
        match event_id {
            12 => Ok(StageCode::FileStarted),
            13 => Ok(StageCode::LineReceived),
            14 => Ok(StageCode::LineDataParsed),
            21 => Ok(StageCode::FileFailed),
            22 => Ok(StageCode::LineFailed),
            23 => Ok(StageCode::LineDataFailed),
            other => Err(other),
        }
    }
}

impl fmt::Display for StageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.event_id())
    }
}

/// The business payload of a successfully parsed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessFields {
    pub account: i64,
    /// Decimal amount, kept in the producer's textual form.
    pub amount: String,
    pub description: String,
}

impl BusinessFields {
    pub fn from_fields(fields: &FieldMap) -> Result<Self, FieldError> {
        Ok(BusinessFields {
            account: fields.require_i64(ACCOUNT_FIELD)?,
            amount: fields.require_text(AMOUNT_FIELD)?,
            description: fields.require_text(DESCRIPTION_FIELD)?,
        })
    }
}

/// A stage event with its payload already extracted and validated.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    FileStarted {
        file: String,
    },
    FileFailed {
        file: String,
    },
    LineReceived {
        file: String,
        line_id: Guid,
        line: String,
    },
    LineDataParsed {
        file: String,
        line_id: Guid,
        fields: BusinessFields,
    },
    LineFailed {
        file: String,
        line_id: Guid,
    },
    LineDataFailed {
        file: String,
        line_id: Guid,
    },
}

impl StageEvent {
    /// Build a stage event whose file and correlation ids are already known.
    ///
    /// Line-level stages need a correlation id; the remaining payload is read from `fields`.
    pub fn new(
        stage: StageCode,
        file_id: &str,
        correlation_id: Option<Guid>,
        fields: &FieldMap,
    ) -> Result<Self, FieldError> {
        let file = file_id.to_string();
        let line_id = || correlation_id.ok_or(FieldError::Missing { name: LINE_CODE_FIELD });

        Ok(match stage {
            StageCode::FileStarted => StageEvent::FileStarted { file },
            StageCode::FileFailed => StageEvent::FileFailed { file },
            StageCode::LineReceived => StageEvent::LineReceived {
                file,
                line_id: line_id()?,
                line: fields.require_text(LINE_FIELD)?,
            },
            StageCode::LineDataParsed => StageEvent::LineDataParsed {
                file,
                line_id: line_id()?,
                fields: BusinessFields::from_fields(fields)?,
            },
            StageCode::LineFailed => StageEvent::LineFailed {
                file,
                line_id: line_id()?,
            },
            StageCode::LineDataFailed => StageEvent::LineDataFailed {
                file,
                line_id: line_id()?,
            },
        })
    }

    /// Build a stage event entirely from a decoded payload (`fileName`, `lineCode`, ...).
    pub fn from_fields(stage: StageCode, fields: &FieldMap) -> Result<Self, FieldError> {
        let file_id = fields.require_text(FILE_NAME_FIELD)?;
        let correlation_id = if stage.is_line_level() {
            Some(fields.require_guid(LINE_CODE_FIELD)?)
        } else {
            None
        };

        StageEvent::new(stage, &file_id, correlation_id, fields)
    }

    pub fn stage(&self) -> StageCode {
        match self {
            StageEvent::FileStarted { .. } => StageCode::FileStarted,
            StageEvent::FileFailed { .. } => StageCode::FileFailed,
            StageEvent::LineReceived { .. } => StageCode::LineReceived,
            StageEvent::LineDataParsed { .. } => StageCode::LineDataParsed,
            StageEvent::LineFailed { .. } => StageCode::LineFailed,
            StageEvent::LineDataFailed { .. } => StageCode::LineDataFailed,
        }
    }

    pub fn file_id(&self) -> &str {
        match self {
            StageEvent::FileStarted { file }
            | StageEvent::FileFailed { file }
            | StageEvent::LineReceived { file, .. }
            | StageEvent::LineDataParsed { file, .. }
            | StageEvent::LineFailed { file, .. }
            | StageEvent::LineDataFailed { file, .. } => file,
        }
    }
}

/// Effect of applying one stage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Applied {
    Created,
    Updated,
    /// Unknown file or line, duplicate start, or a failure already recorded.
    Ignored,
}

/// How a line should be reported. Failures outrank completion, and a failure at receipt
/// outranks a failure while parsing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus<'a> {
    FailedAtReceipt { at: Timestamp },
    FailedAtData { at: Timestamp },
    Parsed { at: Timestamp, fields: &'a BusinessFields },
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineRecord {
    correlation_id: Guid,
    line: String,
    received_at: Timestamp,
    line_failed_at: Option<Timestamp>,
    data_parsed_at: Option<Timestamp>,
    data_failed_at: Option<Timestamp>,
    fields: Option<BusinessFields>,
}

impl LineRecord {
    fn new(correlation_id: Guid, line: String, received_at: Timestamp) -> Self {
        LineRecord {
            correlation_id,
            line,
            received_at,
            line_failed_at: None,
            data_parsed_at: None,
            data_failed_at: None,
            fields: None,
        }
    }

    pub fn correlation_id(&self) -> Guid {
        self.correlation_id
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn received_at(&self) -> Timestamp {
        self.received_at
    }

    pub fn line_failed_at(&self) -> Option<Timestamp> {
        self.line_failed_at
    }

    pub fn data_parsed_at(&self) -> Option<Timestamp> {
        self.data_parsed_at
    }

    pub fn data_failed_at(&self) -> Option<Timestamp> {
        self.data_failed_at
    }

    /// The last parsed payload, regardless of any recorded failure.
    ///
    /// Reporting code should go through [`LineRecord::status`] instead.
    pub fn parsed_fields(&self) -> Option<&BusinessFields> {
        self.fields.as_ref()
    }

    pub fn status(&self) -> LineStatus<'_> {
        if let Some(at) = self.line_failed_at {
            return LineStatus::FailedAtReceipt { at };
        }
        if let Some(at) = self.data_failed_at {
            return LineStatus::FailedAtData { at };
        }
        match (self.data_parsed_at, self.fields.as_ref()) {
            (Some(at), Some(fields)) => LineStatus::Parsed { at, fields },
            _ => LineStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationSession {
    file_id: String,
    started_at: Timestamp,
    failed_at: Option<Timestamp>,
    lines: Vec<LineRecord>,
    #[serde(skip)]
    line_index: HashMap<Guid, usize>,
}

impl CorrelationSession {
    fn new(file_id: String, started_at: Timestamp) -> Self {
        CorrelationSession {
            file_id,
            started_at,
            failed_at: None,
            lines: Vec::new(),
            line_index: HashMap::new(),
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn failed_at(&self) -> Option<Timestamp> {
        self.failed_at
    }

    /// Lines in the order they were first received.
    pub fn lines(&self) -> &[LineRecord] {
        &self.lines
    }

    pub fn line(&self, correlation_id: &Guid) -> Option<&LineRecord> {
        self.line_index
            .get(correlation_id)
            .map(|&idx| &self.lines[idx])
    }

    fn line_mut(&mut self, correlation_id: &Guid) -> Option<&mut LineRecord> {
        match self.line_index.get(correlation_id) {
            Some(&idx) => self.lines.get_mut(idx),
            None => None,
        }
    }
}

/// All import sessions observed so far, in the order their files were started.
///
/// Sessions and lines are never removed.
#[derive(Debug, Clone, Default)]
pub struct CorrelationEngine {
    sessions: Vec<CorrelationSession>,
    session_index: HashMap<String, usize>,
}

impl CorrelationEngine {
    pub fn new() -> Self {
        CorrelationEngine::default()
    }

    /// Apply a stage event given as raw parts.
    ///
    /// The payload is validated before anything is touched, so an `Err` leaves the engine as it
    /// was. References to unknown files or lines are not errors; they yield [`Applied::Ignored`].
    pub fn apply(
        &mut self,
        stage: StageCode,
        file_id: &str,
        correlation_id: Option<Guid>,
        timestamp: Timestamp,
        fields: &FieldMap,
    ) -> Result<Applied, FieldError> {
        let event = StageEvent::new(stage, file_id, correlation_id, fields)?;
        Ok(self.apply_event(event, timestamp))
    }

    pub fn apply_event(&mut self, event: StageEvent, timestamp: Timestamp) -> Applied {
        let stage = event.stage();
        let applied = match event {
            StageEvent::FileStarted { file } => {
                if self.session_index.contains_key(&file) {
                    Applied::Ignored
                } else {
                    debug!("Import of `{}` started at {}", file, timestamp);
                    self.session_index.insert(file.clone(), self.sessions.len());
                    self.sessions.push(CorrelationSession::new(file, timestamp));
                    Applied::Created
                }
            }
            StageEvent::FileFailed { file } => match self.session_mut(&file) {
                Some(session) => set_once(&mut session.failed_at, timestamp),
                None => Applied::Ignored,
            },
            StageEvent::LineReceived {
                file,
                line_id,
                line,
            } => match self.session_mut(&file) {
                Some(session) if !session.line_index.contains_key(&line_id) => {
                    session.line_index.insert(line_id, session.lines.len());
                    session
                        .lines
                        .push(LineRecord::new(line_id, line, timestamp));
                    Applied::Created
                }
                _ => Applied::Ignored,
            },
            StageEvent::LineDataParsed {
                file,
                line_id,
                fields,
            } => match self.line_mut(&file, &line_id) {
                Some(record) => {
                    // Repeated arrivals overwrite the previous payload.
                    record.data_parsed_at = Some(timestamp);
                    record.fields = Some(fields);
                    Applied::Updated
                }
                None => Applied::Ignored,
            },
            StageEvent::LineFailed { file, line_id } => match self.line_mut(&file, &line_id) {
                Some(record) => set_once(&mut record.line_failed_at, timestamp),
                None => Applied::Ignored,
            },
            StageEvent::LineDataFailed { file, line_id } => {
                match self.line_mut(&file, &line_id) {
                    Some(record) => set_once(&mut record.data_failed_at, timestamp),
                    None => Applied::Ignored,
                }
            }
        };

        if applied == Applied::Ignored {
            trace!("{} at {} had no effect", stage, timestamp);
        }

        applied
    }

    pub fn sessions(&self) -> &[CorrelationSession] {
        &self.sessions
    }

    pub fn session(&self, file_id: &str) -> Option<&CorrelationSession> {
        self.session_index
            .get(file_id)
            .map(|&idx| &self.sessions[idx])
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, file_id: &str) -> Option<&mut CorrelationSession> {
        match self.session_index.get(file_id) {
            Some(&idx) => self.sessions.get_mut(idx),
            None => None,
        }
    }

    fn line_mut(&mut self, file_id: &str, line_id: &Guid) -> Option<&mut LineRecord> {
        self.session_mut(file_id)?.line_mut(line_id)
    }
}

fn set_once(slot: &mut Option<Timestamp>, timestamp: Timestamp) -> Applied {
    match slot {
        Some(_) => Applied::Ignored,
        None => {
            *slot = Some(timestamp);
            Applied::Updated
        }
    }
}
