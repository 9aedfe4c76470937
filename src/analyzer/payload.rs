//! Typed view over the result payload of a succeeded operation.
//!
//! The payload itself is kept verbatim; [`ContentSegment`] only names the keys consumed downstream
//! (`markdown`, `kind`, `fields`, timing) and carries everything else through untouched.

use serde::Deserialize;
use serde_json::{Map, Value};

/// JSON attached to the `result` field of a succeeded operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPayload(Value);

impl ResultPayload {
    /// Wrap a raw `result` value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Raw payload.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the payload, returning the raw JSON.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Decode `contents[*]`; entries that are not JSON objects are skipped.
    pub fn contents(&self) -> Vec<ContentSegment> {
        self.0
            .get("contents")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match ContentSegment::deserialize(item) {
                        Ok(segment) => Some(segment),
                        Err(error) => {
                            tracing::debug!(%error, "Skipping malformed content segment");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Markdown of every segment, separated by blank lines.
    pub fn markdown(&self) -> String {
        self.contents()
            .iter()
            .filter_map(|segment| segment.markdown.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// One unit of extracted content.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSegment {
    /// Markdown rendering of the segment.
    #[serde(default)]
    pub markdown: Option<String>,
    /// Content kind, e.g. `document` or `audioVisual`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Schema fields extracted by the analyzer.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Segment start for audio/video content.
    #[serde(default)]
    pub start_time_ms: Option<u64>,
    /// Segment end for audio/video content.
    #[serde(default)]
    pub end_time_ms: Option<u64>,
    /// Everything else the service attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentSegment {
    /// Plain value of field `name`, looking through the `valueString`/`valueNumber`/... wrappers.
    pub fn field_value(&self, name: &str) -> Option<&Value> {
        let field = self.fields.get(name)?;
        let Some(object) = field.as_object() else {
            return Some(field);
        };
        object
            .iter()
            .find(|(key, _)| key.starts_with("value"))
            .map(|(_, value)| value)
            .or(Some(field))
    }
}
