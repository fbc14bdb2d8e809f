//! Localized message resolution for decoded events.
//!
//! A message template refers to the event's payload positionally: `%1` is the first data field
//! declared by the event's template, `%2` the second, and so on. Tokens whose field is absent
//! from the payload are left as they are.

use log::trace;

use crate::field_value::FieldMap;
use crate::guid::Guid;
use crate::manifest::{EventDescriptor, ManifestCatalog};

impl ManifestCatalog {
    /// Resolve the localized message of an event, substituting payload values.
    ///
    /// `None` means the provider, the event or its message is unknown, which is routine: most
    /// events never declare a human-readable message.
    pub fn resolve(&self, provider: &Guid, event_id: u16, fields: &FieldMap) -> Option<String> {
        let Some(event) = self.event(provider, event_id) else {
            trace!("No descriptor for event {} of provider {}", event_id, provider);
            return None;
        };

        let key = event.message_key()?;
        let Some(template) = self.message(&key) else {
            trace!("No message registered under `{}`", key);
            return None;
        };

        Some(substitute_placeholders(template, event, fields))
    }
}

/// Replace every `%N` in `template` with the payload value of the event's N-th field.
pub fn substitute_placeholders(template: &str, event: &EventDescriptor, fields: &FieldMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();

        if digits == 0 {
            out.push('%');
            rest = after;
            continue;
        }

        let token = &rest[idx..idx + 1 + digits];
        let value = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|position| event.field_name(position))
            .and_then(|name| fields.get(name));

        match value {
            Some(value) => out.push_str(&value.to_text()),
            None => out.push_str(token),
        }
        rest = &after[digits..];
    }

    out.push_str(rest);
    out
}
