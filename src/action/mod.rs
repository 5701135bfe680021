//! # Actions: the unit of work carried by the bus.
//!
//! An [`Action`] is a named record. The bus only reads its discriminant
//! (`action_type`), its [`AddressMetadata`] and its `internal_only` flag; every
//! other field is owned by the caller and carried opaquely.
//!
//! ```text
//! Action {
//!   action_type: "window-set-focused"     ← required, non-blank
//!   fields: { "windowId": Int(3), ... }   ← caller-owned, ordered by name
//!   address: Some(AddressMetadata)        ← optional routing record
//!   internal_only: false                  ← true = never relayed off-process
//! }
//! ```
//!
//! [`Payload`] is the tagged "one or many" wrapper that crosses process
//! boundaries; producers choose the shape, consumers never sniff it.

mod address;
mod value;

pub use address::{AddressMetadata, TabId, WindowId};
pub use value::{LocalRef, Value};

use std::collections::BTreeMap;

use crate::error::DispatchError;

/// Application-level state-change request.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    action_type: String,
    fields: BTreeMap<String, Value>,
    address: Option<AddressMetadata>,
    internal_only: bool,
}

impl Action {
    /// Creates an action with the given discriminant and no fields.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            fields: BTreeMap::new(),
            address: None,
            internal_only: false,
        }
    }

    /// Adds (or replaces) a caller-owned field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Scopes the action to one window.
    #[must_use]
    pub fn with_target(mut self, window: WindowId) -> Self {
        self.address_mut().target_window_id = Some(window);
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: AddressMetadata) -> Self {
        self.address = Some(address);
        self
    }

    /// Marks the action as process-local: it is delivered to local
    /// subscribers but never relayed to other processes.
    #[must_use]
    pub fn internal(mut self) -> Self {
        self.internal_only = true;
        self
    }

    #[inline]
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Inserts a field, returning the previous value if any.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    #[inline]
    pub fn address(&self) -> Option<&AddressMetadata> {
        self.address.as_ref()
    }

    /// Returns the address record, attaching an empty one if missing.
    pub fn address_mut(&mut self) -> &mut AddressMetadata {
        self.address.get_or_insert_with(AddressMetadata::default)
    }

    /// Target window, if the action is scoped to one.
    #[inline]
    pub fn target(&self) -> Option<WindowId> {
        self.address.and_then(|a| a.target_window_id)
    }

    #[inline]
    pub fn is_internal_only(&self) -> bool {
        self.internal_only
    }

    /// Rejects actions whose discriminant is empty or whitespace.
    pub(crate) fn validate(&self) -> Result<(), DispatchError> {
        if self.action_type.trim().is_empty() {
            return Err(DispatchError::InvalidAction {
                reason: "action_type is blank",
            });
        }
        Ok(())
    }

    pub(crate) fn from_parts(
        action_type: String,
        fields: BTreeMap<String, Value>,
        address: Option<AddressMetadata>,
        internal_only: bool,
    ) -> Self {
        Self {
            action_type,
            fields,
            address,
            internal_only,
        }
    }
}

/// One action or an ordered batch of actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Single(Action),
    Many(Vec<Action>),
}

impl Payload {
    pub fn actions(&self) -> &[Action] {
        match self {
            Payload::Single(action) => std::slice::from_ref(action),
            Payload::Many(actions) => actions,
        }
    }

    pub fn into_actions(self) -> Vec<Action> {
        match self {
            Payload::Single(action) => vec![action],
            Payload::Many(actions) => actions,
        }
    }

    pub fn len(&self) -> usize {
        self.actions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions().is_empty()
    }
}

impl From<Action> for Payload {
    fn from(action: Action) -> Self {
        Payload::Single(action)
    }
}

impl From<Vec<Action>> for Payload {
    fn from(actions: Vec<Action>) -> Self {
        Payload::Many(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_action_type_is_invalid() {
        for blank in ["", "   ", "\t\n"] {
            let err = Action::new(blank).validate().unwrap_err();
            assert_eq!(err.as_label(), "invalid_action");
        }
        assert!(Action::new("PING").validate().is_ok());
    }

    #[test]
    fn with_target_attaches_address() {
        let action = Action::new("focus").with_target(WindowId(4));
        assert_eq!(action.target(), Some(WindowId(4)));
        assert!(!action.address().unwrap().already_handled_by_origin);
    }

    #[test]
    fn payload_shapes() {
        let single = Payload::from(Action::new("a"));
        assert_eq!(single.len(), 1);

        let many = Payload::from(vec![Action::new("a"), Action::new("b")]);
        let types: Vec<_> = many
            .into_actions()
            .into_iter()
            .map(|a| a.action_type().to_owned())
            .collect();
        assert_eq!(types, ["a", "b"]);

        assert!(Payload::Many(Vec::new()).is_empty());
    }
}
