use std::fmt::Display;

use log::{debug, trace};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::error::{ManifestError, Result};
use super::types::{DataField, EventDescriptor, ProviderDescriptor};
use crate::guid::Guid;

/// Catalog entries of a single manifest document, not yet merged.
#[derive(Debug, Default)]
pub(super) struct ManifestDocument {
    pub providers: Vec<ProviderDescriptor>,
    /// `(id, value)` pairs from every string table, in document order.
    pub strings: Vec<(String, String)>,
}

#[derive(Debug)]
struct TemplateDraft {
    tid: String,
    fields: Vec<DataField>,
}

#[derive(Debug)]
struct ProviderDraft {
    provider: ProviderDescriptor,
    templates: Vec<TemplateDraft>,
}

impl ProviderDraft {
    /// Templates are joined to events once the whole provider element has been read.
    fn finish(mut self) -> ProviderDescriptor {
        for template in self.templates {
            match self
                .provider
                .events
                .iter_mut()
                .find(|e| e.template_id.as_deref() == Some(template.tid.as_str()))
            {
                Some(event) => event.fields.extend(template.fields),
                None => debug!(
                    "Template `{}` of provider `{}` is not referenced by any event",
                    template.tid, self.provider.name
                ),
            }
        }
        self.provider
    }
}

/// Read an instrumentation manifest into providers and localized strings.
///
/// Element names are matched on their local part, so namespace prefixes are irrelevant.
pub(super) fn parse_manifest(xml: &str) -> Result<ManifestDocument> {
    let mut reader = Reader::from_str(xml);
    let mut document = ManifestDocument::default();

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut provider: Option<ProviderDraft> = None;
    let mut template: Option<TemplateDraft> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event().map_err(|e| xml_error(position, e))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = e.local_name().as_ref().to_vec();
                let parent = path.last().map(Vec::as_slice);

                match (name.as_slice(), parent) {
                    (b"provider", Some(b"events")) if provider.is_none() => {
                        provider = Some(ProviderDraft {
                            provider: read_provider(e, position)?,
                            templates: Vec::new(),
                        });
                    }
                    (b"event", Some(b"events")) => {
                        if let Some(draft) = provider.as_mut() {
                            draft.provider.events.push(read_event(e, position)?);
                        }
                    }
                    (b"template", Some(b"templates")) if provider.is_some() => {
                        template = Some(TemplateDraft {
                            tid: required(e, "tid", "template", position)?,
                            fields: Vec::new(),
                        });
                    }
                    (b"data", Some(b"template")) => {
                        if let Some(draft) = template.as_mut() {
                            draft.fields.push(DataField {
                                name: required(e, "name", "data", position)?,
                                in_type: attribute(e, "inType", position)?,
                            });
                        }
                    }
                    (b"string", Some(b"stringTable")) => {
                        let id = required(e, "id", "string", position)?;
                        let value = attribute(e, "value", position)?.unwrap_or_default();
                        document.strings.push((id, value));
                    }
                    _ => {}
                }

                if is_empty {
                    close_element(&name, &mut provider, &mut template, &mut document);
                } else {
                    path.push(name);
                }
            }
            Event::End(ref e) => {
                let name = e.local_name().as_ref().to_vec();
                path.pop();
                close_element(&name, &mut provider, &mut template, &mut document);
            }
            Event::Eof => {
                if let Some(open) = path.last() {
                    return Err(ManifestError::Xml {
                        position,
                        message: format!(
                            "unexpected end of document inside <{}>",
                            String::from_utf8_lossy(open)
                        ),
                    });
                }
                break;
            }
            _ => {}
        }
    }

    trace!(
        "Parsed manifest with {} providers and {} strings",
        document.providers.len(),
        document.strings.len()
    );
    Ok(document)
}

fn close_element(
    name: &[u8],
    provider: &mut Option<ProviderDraft>,
    template: &mut Option<TemplateDraft>,
    document: &mut ManifestDocument,
) {
    match name {
        b"template" => {
            if let (Some(done), Some(draft)) = (template.take(), provider.as_mut()) {
                draft.templates.push(done);
            }
        }
        b"provider" => {
            if let Some(draft) = provider.take() {
                document.providers.push(draft.finish());
            }
        }
        _ => {}
    }
}

fn read_provider(e: &BytesStart<'_>, position: u64) -> Result<ProviderDescriptor> {
    let raw_guid = required(e, "guid", "provider", position)?;
    let guid: Guid = raw_guid
        .parse()
        .map_err(|_| ManifestError::InvalidAttribute {
            element: "provider",
            attribute: "guid",
            value: raw_guid.clone(),
        })?;

    Ok(ProviderDescriptor {
        guid,
        name: required(e, "name", "provider", position)?,
        symbol: attribute(e, "symbol", position)?,
        resource_file_name: attribute(e, "resourceFileName", position)?,
        message_file_name: attribute(e, "messageFileName", position)?,
        events: Vec::new(),
    })
}

fn read_event(e: &BytesStart<'_>, position: u64) -> Result<EventDescriptor> {
    let value = required(e, "value", "event", position)?;
    let id = value
        .trim()
        .parse::<u16>()
        .map_err(|_| ManifestError::InvalidAttribute {
            element: "event",
            attribute: "value",
            value: value.clone(),
        })?;

    let version = match attribute(e, "version", position)? {
        Some(v) => v
            .trim()
            .parse::<u8>()
            .map_err(|_| ManifestError::InvalidAttribute {
                element: "event",
                attribute: "version",
                value: v.clone(),
            })?,
        None => 0,
    };

    Ok(EventDescriptor {
        id,
        version,
        level: attribute(e, "level", position)?,
        symbol: attribute(e, "symbol", position)?,
        task: attribute(e, "task", position)?,
        template_id: attribute(e, "template", position)?,
        fields: Vec::new(),
    })
}

fn attribute(e: &BytesStart<'_>, key: &str, position: u64) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_error(position, err))?;
        if attr.key.local_name().as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| xml_error(position, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required(
    e: &BytesStart<'_>,
    key: &'static str,
    element: &'static str,
    position: u64,
) -> Result<String> {
    attribute(e, key, position)?.ok_or(ManifestError::MissingAttribute {
        element,
        attribute: key,
    })
}

fn xml_error(position: u64, err: impl Display) -> ManifestError {
    ManifestError::Xml {
        position,
        message: err.to_string(),
    }
}
