//! Decode the service's JSON body into a [`Document`].
//!
//! Decoding is strict about the overall shape and lenient about each
//! element: the body must be a JSON array of objects, otherwise the whole
//! response is [`ConversionError::MalformedResponse`]. Inside an object any
//! field may be missing or oddly typed; such fields degrade to defaults so a
//! single strange element never sinks an otherwise usable document.

use crate::element::{Document, DocumentElement, ElementKind};
use crate::error::ConversionError;
use serde_json::{Map, Value};
use tracing::debug;

/// Metadata key Unstructured uses for heading/list depth.
const DEPTH_KEY: &str = "category_depth";

/// One element as it appears on the wire; every field optional.
#[derive(Debug)]
struct RawElement {
    type_name: Option<Value>,
    element_id: Option<Value>,
    text: Option<Value>,
    level: Option<Value>,
    metadata: Option<Value>,
}

impl RawElement {
    fn from_map(mut map: Map<String, Value>) -> Self {
        Self {
            type_name: map.remove("type"),
            element_id: map.remove("element_id"),
            text: map.remove("text"),
            level: map.remove("level"),
            metadata: map.remove("metadata"),
        }
    }
}

/// Decode a response body into an ordered document.
pub fn decode_elements(body: &[u8]) -> Result<Document, ConversionError> {
    let items: Vec<Value> =
        serde_json::from_slice(body).map_err(|e| ConversionError::MalformedResponse {
            detail: format!("expected a JSON array of element objects: {e}"),
        })?;

    let elements = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(into_element(RawElement::from_map(map))),
            other => Err(ConversionError::MalformedResponse {
                detail: format!("element {index} is {}, not an object", json_kind(&other)),
            }),
        })
        .collect::<Result<Vec<DocumentElement>, _>>()?;
    debug!("Decoded {} elements", elements.len());
    Ok(Document::new(elements))
}

fn into_element(raw: RawElement) -> DocumentElement {
    let type_name = match raw.type_name {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let kind = ElementKind::from_type_name(&type_name);

    let metadata = match raw.metadata {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let level = raw
        .level
        .as_ref()
        .and_then(value_as_level)
        .or_else(|| metadata.get(DEPTH_KEY).and_then(value_as_level));

    DocumentElement {
        kind,
        type_name,
        element_id: raw.element_id.as_ref().and_then(scalar_text),
        text: raw.text.as_ref().and_then(scalar_text).unwrap_or_default(),
        level,
        metadata,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Text of a scalar JSON value; `null` yields `None`, containers their JSON.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn value_as_level(value: &Value) -> Option<u8> {
    value
        .as_u64()
        .map(|n| u8::try_from(n).unwrap_or(u8::MAX))
}
