use std::io::BufRead;

use jiff::Timestamp;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::err::{Result, TraceError};
use crate::guid::Guid;

/// One record delivered by the trace source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub provider_id: Guid,
    pub event_id: u16,
    pub timestamp: Timestamp,
    /// Hex dump of the record payload.
    pub dump: String,
}

impl TraceRecord {
    pub fn new(provider_id: Guid, event_id: u16, timestamp: Timestamp, dump: impl Into<String>) -> Self {
        TraceRecord {
            provider_id,
            event_id,
            timestamp,
            dump: dump.into(),
        }
    }
}

/// Reads a capture stored as JSON lines, one [`TraceRecord`] per line.
///
/// Blank lines are skipped. A malformed line is reported with its 1-based line number and does
/// not stop the iteration. An I/O error ends it.
pub struct TraceRecordReader<R: BufRead> {
    input: R,
    line_no: usize,
    buf: String,
    done: bool,
}

impl<R: BufRead> TraceRecordReader<R> {
    pub fn new(input: R) -> Self {
        TraceRecordReader {
            input,
            line_no: 0,
            buf: String::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for TraceRecordReader<R> {
    type Item = Result<TraceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            match self.input.read_line(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(TraceError::Io(e)));
                }
            }
            self.line_no += 1;

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            trace!("Reading capture line {}", self.line_no);
            return Some(serde_json::from_str(line).map_err(|source| {
                TraceError::InvalidCaptureLine {
                    line: self.line_no,
                    source,
                }
            }));
        }
    }
}
