use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use log::{debug, trace};
use serde::Serialize;

use super::error::Result;
use super::parse::parse_manifest;
use crate::guid::Guid;

/// Prefix joining an event's task name to its message-table key.
pub const MESSAGE_KEY_PREFIX: &str = "event_";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDescriptor {
    pub guid: Guid,
    pub name: String,
    pub symbol: Option<String>,
    pub resource_file_name: Option<String>,
    pub message_file_name: Option<String>,
    pub events: Vec<EventDescriptor>,
}

impl ProviderDescriptor {
    pub fn event(&self, event_id: u16) -> Option<&EventDescriptor> {
        self.events.iter().find(|e| e.id == event_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDescriptor {
    pub id: u16,
    pub version: u8,
    pub level: Option<String>,
    pub symbol: Option<String>,
    pub task: Option<String>,
    pub template_id: Option<String>,
    /// Declaration order is significant: `%N` in a message refers to the N-th field.
    pub fields: Vec<DataField>,
}

impl EventDescriptor {
    /// `event_<task>`, or `None` for events declared without a task.
    pub fn message_key(&self) -> Option<String> {
        self.task
            .as_ref()
            .map(|task| format!("{}{}", MESSAGE_KEY_PREFIX, task))
    }

    /// Name of the 1-based positional field `%N`.
    pub fn field_name(&self, position: usize) -> Option<&str> {
        position
            .checked_sub(1)
            .and_then(|idx| self.fields.get(idx))
            .map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataField {
    pub name: String,
    pub in_type: Option<String>,
}

/// Localized message templates keyed by string id. Keys are write-once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MessageTable(HashMap<String, String>);

impl MessageTable {
    pub fn new() -> Self {
        MessageTable::default()
    }

    /// Returns `false` (and keeps the existing template) when `key` is already present.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, template: impl Into<String>) -> bool {
        match self.0.entry(key.into()) {
            Entry::Occupied(o) => {
                trace!("Message `{}` already registered, keeping it", o.key());
                false
            }
            Entry::Vacant(v) => {
                v.insert(template.into());
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What a single [`ManifestCatalog::ingest`] call added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub providers_added: usize,
    pub providers_skipped: usize,
    pub events_added: usize,
    pub messages_added: usize,
}

/// Every provider and message seen during a decoding session.
///
/// The catalog only grows: providers are deduplicated by id, messages by key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestCatalog {
    providers: Vec<ProviderDescriptor>,
    messages: MessageTable,
}

impl ManifestCatalog {
    pub fn new() -> Self {
        ManifestCatalog::default()
    }

    /// Merge a manifest document into the catalog.
    ///
    /// The whole document is parsed before anything is committed, so a malformed document
    /// leaves the catalog as it was. Re-ingesting a document is a no-op.
    pub fn ingest(&mut self, xml: &str) -> Result<IngestSummary> {
        let document = parse_manifest(xml)?;
        let mut summary = IngestSummary::default();

        for provider in document.providers {
            if self.provider(&provider.guid).is_some() {
                trace!("Provider {} already in catalog, skipping", provider.guid);
                summary.providers_skipped += 1;
                continue;
            }

            debug!(
                "Registering provider `{}` ({}) with {} events",
                provider.name,
                provider.guid,
                provider.events.len()
            );
            summary.providers_added += 1;
            summary.events_added += provider.events.len();
            self.providers.push(provider);
        }

        for (id, template) in document.strings {
            if self.messages.insert_if_absent(id, template) {
                summary.messages_added += 1;
            }
        }

        Ok(summary)
    }

    /// Linear scan; sessions carry a handful of providers.
    pub fn provider(&self, guid: &Guid) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.guid == *guid)
    }

    pub fn event(&self, provider: &Guid, event_id: u16) -> Option<&EventDescriptor> {
        self.provider(provider)?.event(event_id)
    }

    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    pub fn messages(&self) -> &MessageTable {
        &self.messages
    }

    pub fn message(&self, key: &str) -> Option<&str> {
        self.messages.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensure_env_logger_initialized;
    use crate::manifest::ManifestError;
    use pretty_assertions::assert_eq;

    const PROVIDER: &str = "c1a5e1a0-7d4b-4b8e-9a43-2f1c6a0d9e11";

    const MANIFEST: &str = r#"<instrumentationManifest xmlns="http://schemas.microsoft.com/win/2004/08/events">
 <instrumentation xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:win="http://manifests.microsoft.com/win/2004/08/windows/events">
  <events xmlns="http://schemas.microsoft.com/win/2004/08/events">
   <provider name="Importer" guid="{C1A5E1A0-7D4B-4B8E-9A43-2F1C6A0D9E11}" resourceFileName="Importer" messageFileName="Importer" symbol="Importer">
    <tasks>
     <task name="LineDataParsed" message="$(string.task_LineDataParsed)" value="14"/>
    </tasks>
    <events>
     <event value="12" version="0" level="win:Informational" symbol="FileStarted" task="FileStarted" template="FileStartedArgs"/>
     <event value="14" version="1" level="win:Informational" symbol="LineDataParsed" task="LineDataParsed" template="LineDataParsedArgs"/>
     <event value="30" version="0" level="win:Verbose" symbol="Heartbeat" task="Heartbeat"/>
    </events>
    <templates>
     <template tid="FileStartedArgs">
      <data name="fileName" inType="win:UnicodeString"/>
     </template>
     <template tid="LineDataParsedArgs">
      <data name="conta" inType="win:Int32"/>
      <data name="valor" inType="win:UnicodeString"/>
      <data name="descricao" inType="win:UnicodeString"/>
     </template>
    </templates>
   </provider>
  </events>
 </instrumentation>
 <localization>
  <resources culture="en-US">
   <stringTable>
    <string id="event_FileStarted" value="Arquivo %1 iniciado"/>
    <string id="event_LineDataParsed" value="Conta %1, valor %2"/>
   </stringTable>
  </resources>
 </localization>
</instrumentationManifest>"#;

    #[test]
    fn test_ingests_providers_events_and_messages() {
        ensure_env_logger_initialized();
        let mut catalog = ManifestCatalog::new();

        let summary = catalog.ingest(MANIFEST).unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                providers_added: 1,
                providers_skipped: 0,
                events_added: 3,
                messages_added: 2,
            }
        );

        let guid: Guid = PROVIDER.parse().unwrap();
        let provider = catalog.provider(&guid).unwrap();
        assert_eq!(provider.name, "Importer");
        assert_eq!(provider.symbol.as_deref(), Some("Importer"));

        let parsed = provider.event(14).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.level.as_deref(), Some("win:Informational"));
        assert_eq!(parsed.message_key().as_deref(), Some("event_LineDataParsed"));
        let names: Vec<&str> = parsed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["conta", "valor", "descricao"]);
        assert_eq!(parsed.fields[0].in_type.as_deref(), Some("win:Int32"));
        assert_eq!(parsed.field_name(2), Some("valor"));
        assert_eq!(parsed.field_name(0), None);

        assert!(provider.event(30).unwrap().fields.is_empty());
        assert_eq!(catalog.message("event_FileStarted"), Some("Arquivo %1 iniciado"));
    }

    #[test]
    fn test_reingesting_is_idempotent() {
        let mut catalog = ManifestCatalog::new();
        catalog.ingest(MANIFEST).unwrap();

        let summary = catalog.ingest(MANIFEST).unwrap();

        assert_eq!(summary.providers_added, 0);
        assert_eq!(summary.providers_skipped, 1);
        assert_eq!(summary.messages_added, 0);
        assert_eq!(catalog.providers().len(), 1);
        assert_eq!(catalog.providers()[0].events.len(), 3);
        assert_eq!(catalog.messages().len(), 2);
    }

    #[test]
    fn test_existing_messages_are_never_overwritten() {
        let mut catalog = ManifestCatalog::new();
        catalog.ingest(MANIFEST).unwrap();

        let later = r#"<instrumentationManifest><localization><resources culture="en-US"><stringTable>
            <string id="event_FileStarted" value="changed"/>
            <string id="event_FileFailed" value="Arquivo %1 falhou"/>
        </stringTable></resources></localization></instrumentationManifest>"#;
        let summary = catalog.ingest(later).unwrap();

        assert_eq!(summary.messages_added, 1);
        assert_eq!(catalog.message("event_FileStarted"), Some("Arquivo %1 iniciado"));
        assert_eq!(catalog.message("event_FileFailed"), Some("Arquivo %1 falhou"));
    }

    #[test]
    fn test_malformed_document_leaves_catalog_untouched() {
        let mut catalog = ManifestCatalog::new();
        catalog.ingest(MANIFEST).unwrap();

        let broken = r#"<instrumentationManifest><instrumentation><events>
            <provider name="Other" guid="{00000000-0000-0000-0000-000000000001}">
              <events><event value="1" task="A"/></events>
            </provider>
            <localization><resources><stringTable><string id="event_A" value="a"/>
        </events></instrumentationManifest>"#;

        assert!(catalog.ingest(broken).is_err());
        assert_eq!(catalog.providers().len(), 1);
        assert!(!catalog.messages().contains_key("event_A"));
    }

    #[test]
    fn test_truncated_document_is_rejected() {
        let mut catalog = ManifestCatalog::new();
        catalog.ingest(MANIFEST).unwrap();

        let truncated_provider = r#"<instrumentationManifest><instrumentation><events>
            <provider name="Other" guid="{00000000-0000-0000-0000-0000000000bb}">
              <events><event value="2" task="B"/>"#;
        assert!(matches!(
            catalog.ingest(truncated_provider),
            Err(ManifestError::Xml { .. })
        ));

        let truncated_strings = r#"<instrumentationManifest><localization><resources><stringTable>
            <string id="event_A" value="a"/>"#;
        match catalog.ingest(truncated_strings) {
            Err(ManifestError::Xml { message, .. }) => assert!(message.contains("<stringTable>")),
            other => panic!("expected an XML error, got {:?}", other),
        }

        assert_eq!(catalog.providers().len(), 1);
        assert_eq!(catalog.message("event_A"), None);
    }

    #[test]
    fn test_message_table_is_write_once() {
        let mut table = MessageTable::new();
        assert!(table.insert_if_absent("event_A", "first"));
        assert!(!table.insert_if_absent("event_A", "second"));
        assert_eq!(table.get("event_A"), Some("first"));
    }
}
