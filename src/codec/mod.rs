//! # Wire codec for cross-process payloads.
//!
//! Converts [`Payload`]s to bytes and back without losing structure:
//!
//! ```text
//! Payload ──► WirePayload (serde mirror) ──► serde_json bytes
//!    ▲                                             │
//!    └──────────── WirePayload ◄───────────────────┘
//! ```
//!
//! Every [`Value`] variant is written with an explicit type tag, so ordered
//! lists, maps with non-string keys, byte buffers and nested address records
//! survive the trip. Two things cannot cross a process boundary and are
//! rejected at encode time, naming the field path:
//! - [`Value::Local`] → [`EncodingError::Unserializable`]
//! - NaN / ±inf floats → [`EncodingError::NonFiniteFloat`]
//!
//! Lists and maps nest at most [`MAX_NESTING`] levels deep; deeper values are
//! rejected with [`EncodingError::TooDeep`] so every encoded payload stays
//! within the decoder's recursion limit. Byte buffers travel as base64 text.
//!
//! ## Example
//! ```
//! use relaybus::{codec, Action, Value};
//!
//! let action = Action::new("set-prefs")
//!     .with_field("pairs", Value::map([(Value::Int(1), "one")]))
//!     .with_field("blob", vec![0u8, 255]);
//!
//! let bytes = codec::serialize(std::slice::from_ref(&action)).unwrap();
//! assert_eq!(codec::deserialize(&bytes).unwrap(), vec![action]);
//! ```

mod wire;

use std::collections::BTreeMap;

use crate::action::{Action, AddressMetadata, Payload, TabId, Value, WindowId};
use crate::error::EncodingError;

use wire::{WireAction, WireAddress, WirePayload, WireValue};

/// Deepest level at which a field value may sit (a top-level field value is
/// level 1, each enclosing list or map adds one).
///
/// Every level costs at most three JSON nesting levels on the wire, which
/// keeps the deepest payload below `serde_json`'s limit of 128.
pub const MAX_NESTING: usize = 32;

/// Encodes a tagged payload.
pub fn encode(payload: &Payload) -> Result<Vec<u8>, EncodingError> {
    let wire = match payload {
        Payload::Single(action) => WirePayload::Single(encode_action(action)?),
        Payload::Many(actions) => WirePayload::Many(encode_all(actions)?),
    };
    to_bytes(&wire)
}

/// Decodes bytes produced by [`encode`] or [`serialize`].
pub fn decode(bytes: &[u8]) -> Result<Payload, EncodingError> {
    let wire: WirePayload =
        serde_json::from_slice(bytes).map_err(|e| EncodingError::Malformed {
            reason: e.to_string(),
        })?;
    Ok(match wire {
        WirePayload::Single(action) => Payload::Single(decode_action(action)),
        WirePayload::Many(actions) => {
            Payload::Many(actions.into_iter().map(decode_action).collect())
        }
    })
}

/// Encodes an ordered batch as a `Many` payload.
pub fn serialize(actions: &[Action]) -> Result<Vec<u8>, EncodingError> {
    to_bytes(&WirePayload::Many(encode_all(actions)?))
}

/// Decodes a payload of either shape into its actions.
pub fn deserialize(bytes: &[u8]) -> Result<Vec<Action>, EncodingError> {
    decode(bytes).map(Payload::into_actions)
}

fn to_bytes(wire: &WirePayload) -> Result<Vec<u8>, EncodingError> {
    serde_json::to_vec(wire).map_err(|e| EncodingError::Malformed {
        reason: e.to_string(),
    })
}

fn encode_all(actions: &[Action]) -> Result<Vec<WireAction>, EncodingError> {
    actions.iter().map(encode_action).collect()
}

fn encode_action(action: &Action) -> Result<WireAction, EncodingError> {
    let mut fields = BTreeMap::new();
    for (name, value) in action.fields() {
        let wire =
            encode_value(value, 1).map_err(|fault| fault.at(name).into_error("fields"))?;
        fields.insert(name.clone(), wire);
    }
    Ok(WireAction {
        action_type: action.action_type().to_owned(),
        fields,
        address: action.address().map(encode_address),
        internal: action.is_internal_only(),
    })
}

/// Encoding failure that records its location as the recursion unwinds.
struct Fault {
    kind: FaultKind,
    /// Innermost segment first.
    segments: Vec<String>,
}

enum FaultKind {
    Local(String),
    NonFinite,
    TooDeep,
}

impl Fault {
    fn new(kind: FaultKind) -> Self {
        Self {
            kind,
            segments: Vec::new(),
        }
    }

    fn at(mut self, segment: impl std::fmt::Display) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    fn into_error(self, root: &str) -> EncodingError {
        let mut path = root.to_owned();
        for segment in self.segments.iter().rev() {
            if segment.starts_with('[') {
                path.push_str(segment);
            } else {
                path.push('.');
                path.push_str(segment);
            }
        }
        match self.kind {
            FaultKind::Local(label) => EncodingError::Unserializable { path, label },
            FaultKind::NonFinite => EncodingError::NonFiniteFloat { path },
            FaultKind::TooDeep => EncodingError::TooDeep {
                path,
                limit: MAX_NESTING,
            },
        }
    }
}

fn encode_value(value: &Value, depth: usize) -> Result<WireValue, Fault> {
    if depth > MAX_NESTING {
        return Err(Fault::new(FaultKind::TooDeep));
    }
    Ok(match value {
        Value::Null => WireValue::Null,
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Int(n) => WireValue::Int(*n),
        Value::Float(f) if f.is_finite() => WireValue::Float(*f),
        Value::Float(_) => return Err(Fault::new(FaultKind::NonFinite)),
        Value::String(s) => WireValue::Str(s.clone()),
        Value::Bytes(b) => WireValue::Bytes(b.clone()),
        Value::List(items) => WireValue::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    encode_value(item, depth + 1).map_err(|f| f.at(format!("[{i}]")))
                })
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(pairs) => WireValue::Map(
            pairs
                .iter()
                .enumerate()
                .map(|(i, (k, v))| {
                    let key =
                        encode_value(k, depth + 1).map_err(|f| f.at(format!("[{i}].key")))?;
                    let value =
                        encode_value(v, depth + 1).map_err(|f| f.at(format!("[{i}].value")))?;
                    Ok((key, value))
                })
                .collect::<Result<_, _>>()?,
        ),
        Value::Address(addr) => WireValue::Address(encode_address(addr)),
        Value::Local(local) => return Err(Fault::new(FaultKind::Local(local.label().to_owned()))),
    })
}

fn encode_address(addr: &AddressMetadata) -> WireAddress {
    WireAddress {
        target_window_id: addr.target_window_id.map(|w| w.0),
        sender_window_id: addr.sender_window_id.map(|w| w.0),
        sender_tab_id: addr.sender_tab_id.map(|t| t.0),
        already_handled_by_origin: addr.already_handled_by_origin,
    }
}

fn decode_action(wire: WireAction) -> Action {
    let fields = wire
        .fields
        .into_iter()
        .map(|(name, value)| (name, decode_value(value)))
        .collect();
    Action::from_parts(
        wire.action_type,
        fields,
        wire.address.map(decode_address),
        wire.internal,
    )
}

fn decode_value(wire: WireValue) -> Value {
    match wire {
        WireValue::Null => Value::Null,
        WireValue::Bool(b) => Value::Bool(b),
        WireValue::Int(n) => Value::Int(n),
        WireValue::Float(f) => Value::Float(f),
        WireValue::Str(s) => Value::String(s),
        WireValue::Bytes(b) => Value::Bytes(b),
        WireValue::List(items) => Value::List(items.into_iter().map(decode_value).collect()),
        WireValue::Map(pairs) => Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (decode_value(k), decode_value(v)))
                .collect(),
        ),
        WireValue::Address(addr) => Value::Address(decode_address(addr)),
    }
}

fn decode_address(wire: WireAddress) -> AddressMetadata {
    AddressMetadata {
        target_window_id: wire.target_window_id.map(WindowId),
        sender_window_id: wire.sender_window_id.map(WindowId),
        sender_tab_id: wire.sender_tab_id.map(TabId),
        already_handled_by_origin: wire.already_handled_by_origin,
    }
}
