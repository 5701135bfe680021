//! Serde mirror of the action model.
//!
//! Kept private so the public types stay free of serde attributes and the
//! on-wire layout can evolve independently. `Value::Local` has no mirror.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "shape", content = "actions", rename_all = "snake_case")]
pub(super) enum WirePayload {
    Single(WireAction),
    Many(Vec<WireAction>),
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct WireAction {
    #[serde(rename = "actionType")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, WireValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<WireAddress>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub internal: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(super) struct WireAddress {
    #[serde(rename = "targetWindowId", default, skip_serializing_if = "Option::is_none")]
    pub target_window_id: Option<u64>,
    #[serde(rename = "senderWindowId", default, skip_serializing_if = "Option::is_none")]
    pub sender_window_id: Option<u64>,
    #[serde(rename = "senderTabId", default, skip_serializing_if = "Option::is_none")]
    pub sender_tab_id: Option<u64>,
    #[serde(rename = "alreadyHandledByOrigin", default, skip_serializing_if = "is_false")]
    pub already_handled_by_origin: bool,
}

/// Adjacently tagged so every container keeps its semantic type.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub(super) enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    List(Vec<WireValue>),
    Map(Vec<(WireValue, WireValue)>),
    Address(WireAddress),
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Byte buffers as standard base64 text instead of a JSON number array.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(input: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(input)?;
        STANDARD.decode(text).map_err(de::Error::custom)
    }
}
