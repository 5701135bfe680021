//! Origin stamping (hub) and local admission (peripherals).
//!
//! Hub, for an action from peer P with `PeerInfo { window, tab, host_window }`:
//! 1. attach an address record if missing
//! 2. `sender_tab_id := tab`
//! 3. hosted: `sender_window_id := host_window`, untargeted → `target := host_window`;
//!    otherwise `sender_window_id := window`
//! 4. `already_handled_by_origin := !hosted && target.is_some() && target == sender_window_id`
//!
//! Peripheral with own window W (the host window for hosted contexts):
//! - local origin: hosted → skip; window → deliver iff untargeted or target == W
//! - from hub: flagged as handled by window W and this is window W's own
//!   process → skip; otherwise clear the flag and apply the target rule.
//!   A hosted context sharing W never applied the action, so it is never the
//!   stated origin.

use crate::action::{Action, WindowId};
use crate::core::{Envelope, Origin};
use crate::relay::PeripheralRole;
use crate::transport::PeerInfo;

pub(crate) fn stamp_origin(action: &mut Action, info: Option<&PeerInfo>) {
    let info = info.copied().unwrap_or_default();
    let address = action.address_mut();

    address.sender_tab_id = info.tab;
    match info.host_window {
        Some(host) => {
            address.sender_window_id = Some(host);
            if address.target_window_id.is_none() {
                address.target_window_id = Some(host);
            }
        }
        None => address.sender_window_id = info.window,
    }
    address.already_handled_by_origin = !info.is_hosted()
        && address.target_window_id.is_some()
        && address.target_window_id == address.sender_window_id;
}

pub(crate) fn admit(role: PeripheralRole, envelope: &mut Envelope) -> bool {
    let own = role.window();
    match envelope.origin {
        Origin::Local => match role {
            PeripheralRole::Hosted { .. } => false,
            PeripheralRole::Window(_) => applies_to(&envelope.action, own),
        },
        Origin::Peer(_) => {
            let handled = envelope
                .action
                .address()
                .is_some_and(|a| a.already_handled_by_origin);
            if handled {
                let sender = envelope.action.address().and_then(|a| a.sender_window_id);
                if matches!(role, PeripheralRole::Window(w) if sender == Some(w)) {
                    return false;
                }
                envelope.action.address_mut().already_handled_by_origin = false;
            }
            applies_to(&envelope.action, own)
        }
    }
}

fn applies_to(action: &Action, own: Option<WindowId>) -> bool {
    action.address().is_none_or(|a| a.applies_to(own))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{AddressMetadata, TabId};
    use crate::transport::PeerId;

    const W1: WindowId = WindowId(1);
    const W2: WindowId = WindowId(2);

    fn from_hub(action: Action) -> Envelope {
        Envelope {
            action,
            origin: Origin::Peer(PeerId::HUB),
        }
    }

    fn local(action: Action) -> Envelope {
        Envelope {
            action,
            origin: Origin::Local,
        }
    }

    #[test]
    fn window_sender_targeting_itself_is_already_handled() {
        let mut action = Action::new("a").with_target(W1);
        stamp_origin(&mut action, Some(&PeerInfo::window(W1).with_tab(TabId(5))));
        let addr = action.address().copied().unwrap();
        assert_eq!(addr.sender_window_id, Some(W1));
        assert_eq!(addr.sender_tab_id, Some(TabId(5)));
        assert!(addr.already_handled_by_origin);
    }

    #[test]
    fn broadcast_from_window_is_not_flagged() {
        let mut action = Action::new("a");
        stamp_origin(&mut action, Some(&PeerInfo::window(W1)));
        let addr = action.address().copied().unwrap();
        assert_eq!(addr.sender_window_id, Some(W1));
        assert!(!addr.already_handled_by_origin);
    }

    #[test]
    fn hosted_sender_defaults_target_to_host_and_is_never_flagged() {
        let mut action = Action::new("a");
        stamp_origin(&mut action, Some(&PeerInfo::hosted(W2)));
        let addr = action.address().copied().unwrap();
        assert_eq!(addr.sender_window_id, Some(W2));
        assert_eq!(addr.target_window_id, Some(W2));
        assert!(!addr.already_handled_by_origin);

        let mut targeted = Action::new("a").with_target(W1);
        stamp_origin(&mut targeted, Some(&PeerInfo::hosted(W2)));
        assert_eq!(targeted.target(), Some(W1));
    }

    #[test]
    fn unknown_peer_gets_empty_sender_fields() {
        let mut action = Action::new("a").with_address(AddressMetadata {
            sender_window_id: Some(W2),
            already_handled_by_origin: true,
            ..AddressMetadata::default()
        });
        stamp_origin(&mut action, None);
        let addr = action.address().copied().unwrap();
        assert_eq!(addr.sender_window_id, None);
        assert!(!addr.already_handled_by_origin);
    }

    #[test]
    fn window_admits_local_broadcast_and_own_target_only() {
        let role = PeripheralRole::Window(W1);
        assert!(admit(role, &mut local(Action::new("a"))));
        assert!(admit(role, &mut local(Action::new("a").with_target(W1))));
        assert!(!admit(role, &mut local(Action::new("a").with_target(W2))));
    }

    #[test]
    fn hosted_never_delivers_its_own_actions() {
        let role = PeripheralRole::Hosted {
            host_window: Some(W1),
        };
        assert!(!admit(role, &mut local(Action::new("a"))));
        assert!(admit(role, &mut from_hub(Action::new("a"))));
        assert!(admit(role, &mut from_hub(Action::new("a").with_target(W1))));
        assert!(!admit(role, &mut from_hub(Action::new("a").with_target(W2))));
    }

    #[test]
    fn origin_window_skips_already_handled_action() {
        let handled = AddressMetadata {
            target_window_id: Some(W1),
            sender_window_id: Some(W1),
            sender_tab_id: None,
            already_handled_by_origin: true,
        };
        let role = PeripheralRole::Window(W1);
        assert!(!admit(role, &mut from_hub(Action::new("a").with_address(handled))));
    }

    #[test]
    fn hosted_context_of_the_origin_window_still_applies_the_action() {
        let handled = AddressMetadata {
            target_window_id: Some(W1),
            sender_window_id: Some(W1),
            sender_tab_id: None,
            already_handled_by_origin: true,
        };
        let role = PeripheralRole::Hosted {
            host_window: Some(W1),
        };
        let mut env = from_hub(Action::new("a").with_address(handled));
        assert!(admit(role, &mut env));
        assert!(!env.action.address().unwrap().already_handled_by_origin);
    }

    #[test]
    fn other_window_clears_flag_and_applies_target_rule() {
        let handled = AddressMetadata {
            target_window_id: None,
            sender_window_id: Some(W1),
            sender_tab_id: None,
            already_handled_by_origin: true,
        };
        let mut env = from_hub(Action::new("a").with_address(handled));
        assert!(admit(PeripheralRole::Window(W2), &mut env));
        assert!(!env.action.address().unwrap().already_handled_by_origin);
    }
}
