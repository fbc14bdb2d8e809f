use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::correlation::{Applied, CorrelationEngine, StageCode, StageEvent};
use crate::err::Result;
use crate::guid::Guid;
use crate::hexdump;
use crate::manifest::{IngestSummary, ManifestCatalog};
use crate::trace_record::TraceRecord;

/// Event id the application uses to emit its manifest inline in the trace.
pub const MANIFEST_EVENT_ID: u16 = 65534;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    application_provider: Option<Guid>,
    manifest_event_id: u16,
    resolve_messages: bool,
    include_control_bytes: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            application_provider: None,
            manifest_event_id: MANIFEST_EVENT_ID,
            resolve_messages: true,
            include_control_bytes: false,
        }
    }
}

impl PipelineSettings {
    pub fn new() -> Self {
        PipelineSettings::default()
    }

    /// Only process records of this provider. `None` accepts every provider.
    pub fn application_provider(mut self, provider: Option<Guid>) -> Self {
        self.application_provider = provider;
        self
    }

    pub fn manifest_event_id(mut self, event_id: u16) -> Self {
        self.manifest_event_id = event_id;
        self
    }

    /// Resolve (and log) the localized message of every decoded payload.
    pub fn resolve_messages(mut self, resolve: bool) -> Self {
        self.resolve_messages = resolve;
        self
    }

    /// Keep bytes below `0x20` when decoding field payloads.
    pub fn include_control_bytes(mut self, include: bool) -> Self {
        self.include_control_bytes = include;
        self
    }

    pub fn get_application_provider(&self) -> Option<Guid> {
        self.application_provider
    }

    pub fn should_resolve_messages(&self) -> bool {
        self.resolve_messages
    }
}

/// What processing a single record did.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    ManifestIngested(IngestSummary),
    Stage {
        stage: StageCode,
        applied: Applied,
        message: Option<String>,
    },
    /// A payload that is not a stage event; only its message (if any) is of interest.
    Message(Option<String>),
    /// Record of a provider other than the application's.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub records: usize,
    pub manifests: usize,
    pub stage_events: usize,
    pub messages_resolved: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Decodes records one at a time, in arrival order, into the catalog and the correlation state.
#[derive(Debug, Default)]
pub struct TracePipeline {
    settings: PipelineSettings,
    catalog: ManifestCatalog,
    engine: CorrelationEngine,
    stats: PipelineStats,
}

impl TracePipeline {
    pub fn new() -> Self {
        TracePipeline::default()
    }

    pub fn with_configuration(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Process one record.
    ///
    /// On `Err` nothing was committed: payloads are fully decoded and validated before the
    /// catalog or the correlation state is mutated.
    pub fn process(&mut self, record: &TraceRecord) -> Result<RecordOutcome> {
        let outcome = self.process_inner(record);

        self.stats.records += 1;
        match &outcome {
            Ok(RecordOutcome::ManifestIngested(_)) => self.stats.manifests += 1,
            Ok(RecordOutcome::Stage { message, .. }) => {
                self.stats.stage_events += 1;
                self.stats.messages_resolved += usize::from(message.is_some());
            }
            Ok(RecordOutcome::Message(message)) => {
                self.stats.messages_resolved += usize::from(message.is_some());
            }
            Ok(RecordOutcome::Skipped) => self.stats.skipped += 1,
            Err(_) => self.stats.failed += 1,
        }

        outcome
    }

    /// Process one record, logging and counting a failure instead of returning it.
    ///
    /// A corrupt record never affects state committed by earlier records, so the stream can go on.
    pub fn consume(&mut self, record: &TraceRecord) -> Option<RecordOutcome> {
        match self.process(record) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(
                    "Skipping record (provider {}, event {}) at {}: {}",
                    record.provider_id, record.event_id, record.timestamp, e
                );
                None
            }
        }
    }

    /// Drive the pipeline over a whole record stream, isolating failures per record.
    pub fn run<I>(&mut self, records: I) -> PipelineStats
    where
        I: IntoIterator<Item = Result<TraceRecord>>,
    {
        for record in records {
            match record {
                Ok(record) => {
                    self.consume(&record);
                }
                Err(e) => {
                    warn!("Skipping unreadable record: {}", e);
                    self.stats.failed += 1;
                }
            }
        }
        self.stats
    }

    fn process_inner(&mut self, record: &TraceRecord) -> Result<RecordOutcome> {
        if let Some(provider) = self.settings.application_provider {
            if record.provider_id != provider {
                trace!("Ignoring record of provider {}", record.provider_id);
                return Ok(RecordOutcome::Skipped);
            }
        }

        if record.event_id == self.settings.manifest_event_id {
            let text = hexdump::decode_text(&record.dump)?;
            let summary = self.catalog.ingest(hexdump::trim_to_xml(&text)?)?;
            debug!("Ingested manifest: {:?}", summary);
            return Ok(RecordOutcome::ManifestIngested(summary));
        }

        let fields =
            hexdump::decode_json_fields_with(&record.dump, self.settings.include_control_bytes)?;

        let stage = StageCode::try_from(record.event_id).ok();
        let event = match stage {
            Some(stage) => Some(StageEvent::from_fields(stage, &fields)?),
            None => None,
        };

        let message = if self.settings.resolve_messages {
            self.catalog
                .resolve(&record.provider_id, record.event_id, &fields)
        } else {
            None
        };
        if let Some(message) = &message {
            info!("[{}] {}", record.timestamp, message);
        }

        Ok(match event {
            Some(event) => {
                let stage = event.stage();
                let applied = self.engine.apply_event(event, record.timestamp);
                RecordOutcome::Stage {
                    stage,
                    applied,
                    message,
                }
            }
            None => RecordOutcome::Message(message),
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &ManifestCatalog {
        &self.catalog
    }

    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn into_parts(self) -> (ManifestCatalog, CorrelationEngine) {
        (self.catalog, self.engine)
    }
}

/// A pipeline shared by trace sources that deliver records from several threads.
///
/// Every record is processed under one exclusive lock, so records are still applied one at a
/// time in the order the lock is acquired.
#[derive(Debug, Clone, Default)]
pub struct SharedPipeline(Arc<Mutex<TracePipeline>>);

impl SharedPipeline {
    pub fn new(pipeline: TracePipeline) -> Self {
        SharedPipeline(Arc::new(Mutex::new(pipeline)))
    }

    pub fn consume(&self, record: &TraceRecord) -> Option<RecordOutcome> {
        self.with(|pipeline| pipeline.consume(record))
    }

    /// Run `f` with exclusive access to the pipeline.
    pub fn with<T>(&self, f: impl FnOnce(&mut TracePipeline) -> T) -> T {
        // Per-record processing commits nothing on failure, so state behind a poisoned lock is
        // still consistent.
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
