//! # Addressing metadata carried by actions.
//!
//! [`AddressMetadata`] records which window/tab an action came from and which
//! window it is scoped to. The hub fills the sender fields when it receives an
//! action from a peripheral and sets [`AddressMetadata::already_handled_by_origin`]
//! when the originating window has already applied the action locally.

use std::fmt;

/// Identifier of a top-level window owned by some process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Identifier of a UI surface (tab, web view) inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}

/// Origin and target of an action.
///
/// - `target_window_id = None` means "broadcast to every window".
/// - `sender_*` fields are stamped by the hub; callers normally leave them empty.
/// - `already_handled_by_origin` is written by the hub and read by peripherals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressMetadata {
    /// Window the action is scoped to (`None` = broadcast).
    pub target_window_id: Option<WindowId>,
    /// Window of the process that originated the action.
    pub sender_window_id: Option<WindowId>,
    /// Tab/surface that originated the action.
    pub sender_tab_id: Option<TabId>,
    /// The originating window already applied this action locally.
    pub already_handled_by_origin: bool,
}

impl AddressMetadata {
    /// Address scoped to a single window.
    #[must_use]
    pub fn targeting(window: WindowId) -> Self {
        Self {
            target_window_id: Some(window),
            ..Self::default()
        }
    }

    /// True when the action is not restricted to a single window.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.target_window_id.is_none()
    }

    /// True when a process owning `window` should apply the action.
    ///
    /// Broadcast actions apply everywhere; targeted actions apply only to the
    /// matching window (a process without a window never matches a target).
    #[inline]
    pub fn applies_to(&self, window: Option<WindowId>) -> bool {
        match self.target_window_id {
            None => true,
            Some(target) => window == Some(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_applies_everywhere() {
        let addr = AddressMetadata::default();
        assert!(addr.is_broadcast());
        assert!(addr.applies_to(None));
        assert!(addr.applies_to(Some(WindowId(3))));
    }

    #[test]
    fn targeted_applies_only_to_its_window() {
        let addr = AddressMetadata::targeting(WindowId(2));
        assert!(!addr.is_broadcast());
        assert!(addr.applies_to(Some(WindowId(2))));
        assert!(!addr.applies_to(Some(WindowId(1))));
        assert!(!addr.applies_to(None));
    }
}
