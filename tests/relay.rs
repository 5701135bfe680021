use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use relaybus::transport::memory::MemoryNetwork;
use relaybus::transport::stream::{StreamHub, StreamPeer};
use relaybus::{
    Action, BusConfig, Completion, Event, EventKind, LocalRef, Node, NodeBuilder, Observe, PeerId,
    PeerInfo, Subscriber, SubscriberFn, Value, WindowId,
};
use tokio::time::Instant;

const W1: WindowId = WindowId(1);
const W2: WindowId = WindowId(2);
const W3: WindowId = WindowId(3);

type Log = Arc<Mutex<Vec<Action>>>;

fn fast() -> BusConfig {
    BusConfig {
        dispatch_interval: Duration::from_millis(10),
        registrant_interval: Duration::from_millis(5),
        grace: Duration::from_secs(2),
        ..BusConfig::default()
    }
}

fn recorder(name: &'static str) -> (Arc<dyn Subscriber>, Log) {
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let sub = SubscriberFn::arc(name, move |a: &Action, _cx| {
        sink.lock().unwrap().push(a.clone());
        Ok(Completion::Done)
    });
    (sub, log)
}

fn types(log: &Log) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .map(|a| a.action_type().to_string())
        .collect()
}

async fn eventually(what: &str, mut cond: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !cond() {
        if Instant::now() > deadline {
            bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

fn window(net: &MemoryNetwork, w: WindowId) -> Result<(Node, PeerId)> {
    let transport = net.connect(PeerInfo::window(w));
    let id = transport.id();
    let node = NodeBuilder::new(fast()).window(w, Arc::new(transport))?;
    Ok((node, id))
}

#[derive(Default)]
struct Journal(Mutex<Vec<Event>>);

impl Journal {
    fn kinds(&self, kind: EventKind) -> Vec<Event> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Observe for Journal {
    async fn on_event(&self, event: &Event) {
        self.0.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "journal"
    }
}

#[tokio::test]
async fn actions_reach_every_other_process_without_echo() -> Result<()> {
    let net = MemoryNetwork::new();
    let hub = NodeBuilder::new(fast()).hub(Arc::new(net.hub()))?;
    let (w1, id1) = window(&net, W1)?;
    let (w2, _) = window(&net, W2)?;

    let (sub, at_hub) = recorder("hub");
    hub.register(sub);
    let (sub, at_w1) = recorder("w1");
    w1.register(sub);
    let (sub, at_w2) = recorder("w2");
    w2.register(sub);
    eventually("registrations", || hub.peers().len() == 2).await?;

    for name in ["PING", "b", "c"] {
        w1.dispatch(Action::new(name))?;
    }

    eventually("w2 delivery", || types(&at_w2).len() == 3).await?;
    eventually("hub delivery", || types(&at_hub).len() == 3).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(types(&at_w1), vec!["PING", "b", "c"]);
    assert_eq!(types(&at_w2), vec!["PING", "b", "c"]);
    assert_eq!(types(&at_hub), vec!["PING", "b", "c"]);

    let relayed = at_w2.lock().unwrap()[0].clone();
    let address = relayed.address().copied().unwrap();
    assert_eq!(address.sender_window_id, Some(W1));
    assert!(!address.already_handled_by_origin);
    assert_eq!(hub.peers().first(), Some(&id1));

    w1.shutdown().await?;
    w2.shutdown().await?;
    hub.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn targeted_action_is_delivered_to_its_window_only() -> Result<()> {
    let net = MemoryNetwork::new();
    let hub = NodeBuilder::new(fast()).hub(Arc::new(net.hub()))?;
    let (w1, _) = window(&net, W1)?;
    let (w2, _) = window(&net, W2)?;
    let (w3, _) = window(&net, W3)?;
    let (sub, at_w1) = recorder("w1");
    w1.register(sub);
    let (sub, at_w2) = recorder("w2");
    w2.register(sub);
    let (sub, at_w3) = recorder("w3");
    w3.register(sub);
    eventually("registrations", || hub.peers().len() == 3).await?;

    w1.dispatch(Action::new("focus").with_target(W2))?;
    w1.dispatch(Action::new("fence"))?;

    eventually("fence at w3", || types(&at_w3).contains(&"fence".to_string())).await?;
    eventually("fence at w2", || types(&at_w2).contains(&"fence".to_string())).await?;

    assert_eq!(types(&at_w1), vec!["fence"]);
    assert_eq!(types(&at_w2), vec!["focus", "fence"]);
    assert_eq!(types(&at_w3), vec!["fence"]);
    Ok(())
}

#[tokio::test]
async fn hosted_context_follows_its_host_window() -> Result<()> {
    let net = MemoryNetwork::new();
    let hub = NodeBuilder::new(fast()).hub(Arc::new(net.hub()))?;
    let (w1, _) = window(&net, W1)?;
    let (w2, _) = window(&net, W2)?;
    let hosted = NodeBuilder::new(fast())
        .hosted(Some(W1), Arc::new(net.connect(PeerInfo::hosted(W1))))?;

    let (sub, at_w1) = recorder("w1");
    w1.register(sub);
    let (sub, at_w2) = recorder("w2");
    w2.register(sub);
    let (sub, at_hosted) = recorder("hosted");
    hosted.register(sub);
    eventually("registrations", || hub.peers().len() == 3).await?;

    // Already applied by window 1; its hosted context still sees it.
    w1.dispatch(Action::new("resize").with_target(W1))?;
    // Never delivered in the hosted context; defaults to its host window.
    hosted.dispatch(Action::new("open-tab"))?;
    hosted.dispatch(Action::new("fence").with_target(W2))?;
    w1.dispatch(Action::new("fence"))?;

    eventually("fence at hosted", || types(&at_hosted).len() == 2).await?;
    eventually("fences at w2", || {
        types(&at_w2).iter().filter(|t| *t == "fence").count() == 2
    })
    .await?;
    eventually("open-tab at w1", || types(&at_w1).len() == 3).await?;

    assert_eq!(types(&at_w1), vec!["resize", "fence", "open-tab"]);
    assert_eq!(types(&at_w2), vec!["fence", "fence"]);
    assert_eq!(types(&at_hosted), vec!["resize", "fence"]);

    let from_hosted = at_w1.lock().unwrap()[2].clone();
    assert_eq!(from_hosted.target(), Some(W1));
    Ok(())
}

#[tokio::test]
async fn window_and_its_hosted_context_share_targeted_actions() -> Result<()> {
    let net = MemoryNetwork::new();
    let hub = NodeBuilder::new(fast()).hub(Arc::new(net.hub()))?;
    let (w1, _) = window(&net, W1)?;
    let hosted = NodeBuilder::new(fast())
        .hosted(Some(W1), Arc::new(net.connect(PeerInfo::hosted(W1))))?;
    let (sub, at_w1) = recorder("w1");
    w1.register(sub);
    let (sub, at_hosted) = recorder("hosted");
    hosted.register(sub);
    eventually("registrations", || hub.peers().len() == 2).await?;

    w1.dispatch(Action::new("zoom").with_target(W1))?;
    hosted.dispatch(Action::new("pin-tab").with_target(W1))?;

    eventually("zoom at hosted", || types(&at_hosted) == vec!["zoom"]).await?;
    eventually("pin-tab at w1", || types(&at_w1).len() == 2).await?;
    assert_eq!(types(&at_w1), vec!["zoom", "pin-tab"]);

    let zoom = at_hosted.lock().unwrap()[0].clone();
    let address = zoom.address().copied().unwrap();
    assert_eq!(address.sender_window_id, Some(W1));
    assert!(!address.already_handled_by_origin);

    w1.shutdown().await?;
    hosted.shutdown().await?;
    hub.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn lost_peripherals_are_removed_without_errors_elsewhere() -> Result<()> {
    let net = MemoryNetwork::new();
    let journal = Arc::new(Journal::default());
    let hub = NodeBuilder::new(fast())
        .with_observers(vec![journal.clone() as Arc<dyn Observe>])
        .hub(Arc::new(net.hub()))?;
    let (w1, id1) = window(&net, W1)?;
    let (w2, id2) = window(&net, W2)?;
    let (w3, id3) = window(&net, W3)?;
    let (sub, at_w2) = recorder("w2");
    w2.register(sub);
    let mut w2_events = w2.events().subscribe();
    eventually("registrations", || hub.peers().len() == 3).await?;

    net.destroy(id1);
    net.crash(id3);
    eventually("removal", || hub.peers() == vec![id2]).await?;

    hub.dispatch(Action::new("broadcast"))?;
    eventually("broadcast at w2", || types(&at_w2) == vec!["broadcast"]).await?;

    hub.shutdown().await?;
    let removed = journal.kinds(EventKind::PeerRemoved);
    let reasons: Vec<_> = removed
        .iter()
        .map(|e| (e.peer, e.reason.as_deref().map(str::to_string)))
        .collect();
    assert!(reasons.contains(&(Some(id1), Some("destroyed".to_string()))));
    assert!(reasons.contains(&(Some(id3), Some("crashed".to_string()))));
    assert_eq!(journal.kinds(EventKind::PeerRegistered).len(), 3);

    let mut at_w2_kinds = Vec::new();
    while let Ok(ev) = w2_events.try_recv() {
        at_w2_kinds.push(ev.kind);
    }
    assert!(!at_w2_kinds.contains(&EventKind::RelayFailed));
    assert!(!at_w2_kinds.contains(&EventKind::SubscriberFailed));
    drop((w1, w3));
    Ok(())
}

#[tokio::test]
async fn peripheral_keeps_working_locally_after_losing_the_hub() -> Result<()> {
    let net = MemoryNetwork::new();
    let hub = NodeBuilder::new(fast()).hub(Arc::new(net.hub()))?;
    let (w1, _) = window(&net, W1)?;
    let (sub, at_w1) = recorder("w1");
    w1.register(sub);
    let mut events = w1.events().subscribe();
    eventually("registration", || hub.peers().len() == 1).await?;

    net.crash_hub();
    let lost = loop {
        let ev = events.recv().await?;
        if ev.kind == EventKind::PeerRemoved {
            break ev;
        }
    };
    assert_eq!(lost.peer, Some(PeerId::HUB));

    w1.dispatch(Action::new("still-local"))?;
    w1.settle().await;
    assert_eq!(types(&at_w1), vec!["still-local"]);
    w1.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unencodable_and_internal_actions_stay_local() -> Result<()> {
    let net = MemoryNetwork::new();
    let hub = NodeBuilder::new(fast()).hub(Arc::new(net.hub()))?;
    let (w1, _) = window(&net, W1)?;
    let (w2, _) = window(&net, W2)?;
    let (sub, at_w1) = recorder("w1");
    w1.register(sub);
    let (sub, at_w2) = recorder("w2");
    w2.register(sub);
    let mut events = w1.events().subscribe();
    eventually("registrations", || hub.peers().len() == 2).await?;

    w1.dispatch(Action::new("attach").with_field("handle", LocalRef::new("socket", 7u8)))?;
    w1.settle().await;
    w1.dispatch(Action::new("cache-warm").internal())?;
    w1.dispatch(Action::new("fence"))?;

    eventually("fence at w2", || types(&at_w2) == vec!["fence"]).await?;
    assert_eq!(types(&at_w1), vec!["attach", "cache-warm", "fence"]);

    let failed = loop {
        let ev = events.recv().await?;
        if ev.kind == EventKind::EncodingFailed {
            break ev;
        }
    };
    assert_eq!(failed.peer, Some(PeerId::HUB));
    assert_eq!(failed.count, Some(1));
    Ok(())
}

#[tokio::test]
async fn relay_over_byte_streams() -> Result<()> {
    let streams = StreamHub::new();
    let hub = NodeBuilder::new(fast()).hub(Arc::new(streams.clone()))?;

    let (hub_side, peer_side) = tokio::io::duplex(64 * 1024);
    streams.accept(hub_side, PeerInfo::window(W1));
    let w1 = NodeBuilder::new(fast()).window(W1, Arc::new(StreamPeer::connect(peer_side)))?;

    let (hub_side, peer_side) = tokio::io::duplex(64 * 1024);
    let id2 = streams.accept(hub_side, PeerInfo::window(W2));
    let w2 = NodeBuilder::new(fast()).window(W2, Arc::new(StreamPeer::connect(peer_side)))?;

    let (sub, at_w2) = recorder("w2");
    w2.register(sub);
    eventually("registrations", || hub.peers().len() == 2).await?;

    w1.dispatch(
        Action::new("save")
            .with_field("path", "/tmp/notes.txt")
            .with_field("size", 42i64)
            .with_field("ratio", 0.1f64),
    )?;
    eventually("save at w2", || types(&at_w2).len() == 1).await?;

    let saved = at_w2.lock().unwrap()[0].clone();
    assert_eq!(saved.field("path"), Some(&Value::from("/tmp/notes.txt")));
    assert_eq!(saved.field("size").and_then(Value::as_i64), Some(42));
    assert_eq!(saved.field("ratio"), Some(&Value::Float(0.1)));

    w2.shutdown().await?;
    eventually("w2 removal", || !hub.peers().contains(&id2)).await?;
    eventually("w2 link closed", || streams.peers().len() == 1).await?;

    w1.shutdown().await?;
    hub.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn batch_too_large_for_the_link_is_reported_and_the_link_survives() -> Result<()> {
    const LIMIT: usize = 16 * 1024;
    let streams = StreamHub::new().with_max_frame_length(LIMIT);
    let hub = NodeBuilder::new(fast()).hub(Arc::new(streams.clone()))?;

    let (hub_side, peer_side) = tokio::io::duplex(64 * 1024);
    streams.accept(hub_side, PeerInfo::window(W1));
    let link = StreamPeer::connect_with_max_frame_length(peer_side, LIMIT);
    let w1 = NodeBuilder::new(fast()).window(W1, Arc::new(link))?;

    let (hub_side, peer_side) = tokio::io::duplex(64 * 1024);
    streams.accept(hub_side, PeerInfo::window(W2));
    let link = StreamPeer::connect_with_max_frame_length(peer_side, LIMIT);
    let w2 = NodeBuilder::new(fast()).window(W2, Arc::new(link))?;

    let (sub, at_hub) = recorder("hub");
    hub.register(sub);
    let (sub, at_w2) = recorder("w2");
    w2.register(sub);
    let mut events = w1.events().subscribe();
    eventually("registrations", || hub.peers().len() == 2).await?;

    w1.dispatch(Action::new("upload").with_field("blob", vec![0u8; 2 * LIMIT]))?;
    let failed = loop {
        let ev = events.recv().await?;
        if ev.kind == EventKind::EncodingFailed {
            break ev;
        }
    };
    assert_eq!(failed.peer, Some(PeerId::HUB));
    assert_eq!(failed.count, Some(1));

    w1.dispatch(Action::new("after"))?;
    eventually("after at w2", || types(&at_w2) == vec!["after"]).await?;
    assert_eq!(types(&at_hub), vec!["after"]);
    assert_eq!(hub.peers().len(), 2);

    w1.shutdown().await?;
    w2.shutdown().await?;
    hub.shutdown().await?;
    Ok(())
}
