//! # Field values carried by actions.
//!
//! [`Value`] is the caller-owned content of an action. The bus never interprets
//! it; it only has to move it between processes without losing structure:
//!
//! | Variant   | Crosses processes | Notes                                   |
//! |-----------|-------------------|-----------------------------------------|
//! | `Null`..`String` | yes        | floats must be finite                   |
//! | `Bytes`   | yes               | binary buffers                          |
//! | `List`    | yes               | ordered sequence                        |
//! | `Map`     | yes               | ordered pairs, keys are any `Value`     |
//! | `Address` | yes               | nested [`AddressMetadata`]              |
//! | `Local`   | **no**            | live in-process reference (callbacks)   |

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::address::AddressMetadata;

/// Structured, possibly nested, action field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Ordered key/value pairs; keys are not restricted to strings.
    Map(Vec<(Value, Value)>),
    Address(AddressMetadata),
    /// In-process reference. Rejected by the wire codec.
    Local(LocalRef),
}

impl Value {
    /// Builds a [`Value::Map`] from key/value pairs, preserving their order.
    pub fn map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a [`Value::List`] from items, preserving their order.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Short name of the variant (for logs and error messages).
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Address(_) => "address",
            Value::Local(_) => "local",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Looks up `key` in a [`Value::Map`] (first match wins).
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<AddressMetadata> for Value {
    fn from(v: AddressMetadata) -> Self {
        Value::Address(v)
    }
}

impl From<LocalRef> for Value {
    fn from(v: LocalRef) -> Self {
        Value::Local(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Live in-process reference stored inside an action.
///
/// Lets collaborators hand callbacks or shared handles to local subscribers.
/// Equality is identity (`Arc::ptr_eq`). Never serializable.
#[derive(Clone)]
pub struct LocalRef {
    label: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl LocalRef {
    pub fn new<T: Any + Send + Sync>(label: impl Into<Arc<str>>, value: T) -> Self {
        Self {
            label: label.into(),
            inner: Arc::new(value),
        }
    }

    /// Human-readable label used in error messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for LocalRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LocalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalRef").field(&self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_preserves_order_and_non_string_keys() {
        let v = Value::map([(Value::Int(2), "two"), (Value::Int(1), "one")]);
        let Value::Map(pairs) = &v else {
            panic!("expected map");
        };
        assert_eq!(pairs[0].0, Value::Int(2));
        assert_eq!(v.get(&Value::Int(1)).and_then(Value::as_str), Some("one"));
        assert!(v.get(&Value::from("1")).is_none());
    }

    #[test]
    fn local_ref_equality_is_identity() {
        let a = LocalRef::new("cb", 5u8);
        let b = a.clone();
        let c = LocalRef::new("cb", 5u8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<u8>(), Some(&5));
        assert_eq!(format!("{a:?}"), "LocalRef(\"cb\")");
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
    }
}
