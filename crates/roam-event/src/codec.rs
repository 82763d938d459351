use serde_json::{Map, Value};

use roam_types::ContentPointer;

use crate::error::{CodecError, CodecResult};
use crate::event::{EventKind, StorageUpdateEvent};

const EVENT_ID: &str = "eventId";
const WORKING_FOLDER_ID: &str = "workingFolderId";
const STORABLE_ITEM_ID: &str = "storableItemId";
const STORABLE_ITEM_NAME: &str = "storableItemName";
const OVERWRITE: &str = "overwrite";
const NEW_CONTENT_ID: &str = "newContentId";

/// JSON wire codec for [`StorageUpdateEvent`].
///
/// Wire shape: one object per event, discriminated by `eventId`:
///
/// ```text
/// { "eventId": "create_file_in_folder", "workingFolderId": "root",
///   "storableItemId": "root/a.txt", "storableItemName": "a.txt", "overwrite": false }
/// ```
///
/// Decoding never defaults a field. A missing or blank required field, an
/// unknown kind tag, or a token that is neither an object nor an array is a
/// hard failure. `null` decodes to nothing.
pub struct EventCodec;

impl EventCodec {
    /// Encode one event as a wire object.
    pub fn encode(event: &StorageUpdateEvent) -> Value {
        let mut obj = Map::new();
        obj.insert(EVENT_ID.into(), Value::from(event.kind().tag()));
        obj.insert(STORABLE_ITEM_ID.into(), Value::from(event.item_id()));

        match event {
            StorageUpdateEvent::CreateFileInFolder {
                working_folder_id,
                item_name,
                overwrite,
                ..
            }
            | StorageUpdateEvent::CreateFolderInFolder {
                working_folder_id,
                item_name,
                overwrite,
                ..
            } => {
                obj.insert(WORKING_FOLDER_ID.into(), Value::from(working_folder_id.as_str()));
                obj.insert(STORABLE_ITEM_NAME.into(), Value::from(item_name.as_str()));
                obj.insert(OVERWRITE.into(), Value::from(*overwrite));
            }
            StorageUpdateEvent::DeleteFromFolder {
                working_folder_id,
                item_name,
                ..
            } => {
                obj.insert(WORKING_FOLDER_ID.into(), Value::from(working_folder_id.as_str()));
                obj.insert(STORABLE_ITEM_NAME.into(), Value::from(item_name.as_str()));
            }
            StorageUpdateEvent::FileUpdate { new_content, .. } => {
                obj.insert(NEW_CONTENT_ID.into(), Value::from(new_content.to_hex()));
            }
        }

        Value::Object(obj)
    }

    /// Encode a sequence of events as a wire array.
    pub fn encode_all(events: &[StorageUpdateEvent]) -> Value {
        Value::Array(events.iter().map(Self::encode).collect())
    }

    /// Decode a single event from a wire token.
    ///
    /// An object decodes to its event. An array decodes to the first element
    /// that yields an event. `null` yields `None`.
    pub fn decode(token: &Value) -> CodecResult<Option<StorageUpdateEvent>> {
        match token {
            Value::Null => Ok(None),
            Value::Object(obj) => Self::decode_object(obj).map(Some),
            Value::Array(items) => {
                for item in items {
                    if let Some(event) = Self::decode(item)? {
                        return Ok(Some(event));
                    }
                }
                Ok(None)
            }
            other => Err(CodecError::UnsupportedShape(shape_name(other))),
        }
    }

    /// Decode every event in a wire array.
    ///
    /// Each element is decoded independently; elements that decode to
    /// nothing are dropped, and any element error fails the whole array.
    pub fn decode_all(token: &Value) -> CodecResult<Vec<StorageUpdateEvent>> {
        let Value::Array(items) = token else {
            return Err(CodecError::UnsupportedShape(shape_name(token)));
        };
        let mut events = Vec::with_capacity(items.len());
        for item in items {
            if let Some(event) = Self::decode(item)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Parse JSON text holding a single event.
    pub fn from_json_str(json: &str) -> CodecResult<Option<StorageUpdateEvent>> {
        let token: Value = serde_json::from_str(json)?;
        Self::decode(&token)
    }

    /// Render a single event as compact JSON text.
    pub fn to_json_string(event: &StorageUpdateEvent) -> String {
        Self::encode(event).to_string()
    }

    fn decode_object(obj: &Map<String, Value>) -> CodecResult<StorageUpdateEvent> {
        let tag = required_str(obj, EVENT_ID)?;
        let kind = EventKind::from_tag(tag).ok_or_else(|| CodecError::UnknownKind(tag.into()))?;
        let item_id = required_str(obj, STORABLE_ITEM_ID)?.to_string();

        let event = match kind {
            EventKind::CreateFileInFolder => StorageUpdateEvent::CreateFileInFolder {
                working_folder_id: required_str(obj, WORKING_FOLDER_ID)?.to_string(),
                item_id,
                item_name: present_str(obj, STORABLE_ITEM_NAME)?.to_string(),
                overwrite: required_bool(obj, OVERWRITE)?,
            },
            EventKind::CreateFolderInFolder => StorageUpdateEvent::CreateFolderInFolder {
                working_folder_id: required_str(obj, WORKING_FOLDER_ID)?.to_string(),
                item_id,
                item_name: present_str(obj, STORABLE_ITEM_NAME)?.to_string(),
                overwrite: required_bool(obj, OVERWRITE)?,
            },
            EventKind::DeleteFromFolder => StorageUpdateEvent::DeleteFromFolder {
                working_folder_id: required_str(obj, WORKING_FOLDER_ID)?.to_string(),
                item_id,
                item_name: present_str(obj, STORABLE_ITEM_NAME)?.to_string(),
            },
            EventKind::FileUpdate => {
                let raw = required_str(obj, NEW_CONTENT_ID)?;
                let new_content =
                    ContentPointer::from_hex(raw).map_err(|e| CodecError::InvalidField {
                        field: NEW_CONTENT_ID,
                        reason: e.to_string(),
                    })?;
                StorageUpdateEvent::FileUpdate {
                    item_id,
                    new_content,
                }
            }
        };

        Ok(event)
    }
}

/// A string field that must be present and not blank.
fn required_str<'a>(obj: &'a Map<String, Value>, field: &'static str) -> CodecResult<&'a str> {
    match present_str(obj, field)? {
        s if s.trim().is_empty() => Err(CodecError::MissingField(field)),
        s => Ok(s),
    }
}

/// A string field that must be present; blank values pass.
fn present_str<'a>(obj: &'a Map<String, Value>, field: &'static str) -> CodecResult<&'a str> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(CodecError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(CodecError::InvalidField {
            field,
            reason: format!("expected string, got {}", shape_name(other)),
        }),
    }
}

fn required_bool(obj: &Map<String, Value>, field: &'static str) -> CodecResult<bool> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(CodecError::MissingField(field)),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(CodecError::InvalidField {
            field,
            reason: format!("expected bool, got {}", shape_name(other)),
        }),
    }
}

fn shape_name(token: &Value) -> &'static str {
    match token {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
