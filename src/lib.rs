#![deny(unused_must_use)]
#![forbid(unsafe_code)]

//! Decoding and correlation of provider-tagged trace records.
//!
//! Records arrive one at a time from a trace source. Each carries its payload as a textual hex
//! dump, which holds either the application's instrumentation manifest or a JSON object of event
//! fields. Manifests feed a [`ManifestCatalog`] used to resolve localized messages; business stage
//! events feed a [`CorrelationEngine`] that rebuilds the per-file, per-line import timeline.

pub use correlation::{
    Applied, BusinessFields, CorrelationEngine, CorrelationSession, LineRecord, LineStatus,
    StageCode, StageEvent,
};
pub use err::{DecodeError, FieldError, Result, TraceError};
pub use field_value::{FieldMap, FieldValue};
pub use guid::{Guid, GuidParseError};
pub use manifest::{
    DataField, EventDescriptor, IngestSummary, ManifestCatalog, ManifestError, MessageTable,
    ProviderDescriptor,
};
pub use pipeline::{
    MANIFEST_EVENT_ID, PipelineSettings, PipelineStats, RecordOutcome, SharedPipeline,
    TracePipeline,
};
pub use report::{LineOutcome, LineReport, SessionReport, session_reports};
pub use trace_record::{TraceRecord, TraceRecordReader};

pub mod correlation;
pub mod err;
pub mod field_value;
pub mod guid;
pub mod hexdump;
pub mod manifest;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod trace_record;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}
