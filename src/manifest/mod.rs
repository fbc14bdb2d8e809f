//! Provider/event/message catalog assembled from manifests carried inline in the trace stream.
//!
//! A manifest is an instrumentation document enumerating providers, their events and the ordered
//! data fields of each event template, plus a localization string table. Applications re-emit it
//! periodically during a long capture, so ingestion is additive and deduplicated by provider id.
//!
//! This module is split into:
//! - `types`: the catalog and its descriptors
//! - `parse`: the XML reader producing catalog entries
//! - `error`: failures that make a manifest document unusable

mod error;
mod parse;
mod types;

pub use error::ManifestError;
pub use types::*;
