//! # Example: two windows and a hosted page around one hub
//!
//! Everything runs in one process over a `MemoryNetwork`; swap in
//! `transport::stream` to put each node in its own process.
//!
//! ```text
//! cargo run --example two_windows --features logging
//! RUST_LOG=relaybus=trace cargo run --example two_windows --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use relaybus::transport::memory::MemoryNetwork;
use relaybus::{
    Action, BusConfig, Completion, LogWriter, Node, NodeBuilder, Observe, PeerInfo, Store,
    SubscriberFn, Value, WindowId,
};
use tracing_subscriber::EnvFilter;

fn tab_counter(window: WindowId) -> Store<u32> {
    Store::named(format!("tabs:{window}"), 0, |tabs: &mut u32, a: &Action| {
        match a.action_type() {
            "tab-opened" => *tabs += 1,
            "tab-closed" if *tabs > 0 => *tabs -= 1,
            _ => return false,
        }
        true
    })
}

/// Title bar that re-renders after the tab store of the same window updated.
fn title_bar(node: &Node, window: WindowId, tabs: Store<u32>) {
    let tabs_id = tabs.attach(node.dispatcher());
    node.register(SubscriberFn::arc(
        format!("title-bar:{window}"),
        move |a: &Action, cx| {
            if !a.action_type().starts_with("tab-") {
                return Ok(Completion::Done);
            }
            let cx = cx.clone();
            let tabs = tabs.clone();
            let from = a
                .address()
                .and_then(|addr| addr.sender_window_id)
                .map_or_else(|| "local".to_string(), |w| w.to_string());
            Ok(Completion::pending(async move {
                cx.wait_for(&[tabs_id]).await?;
                println!("[{window}] {} tab(s) open (last change from {from})", tabs.state());
                Ok(())
            }))
        },
    ));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relaybus=info")),
        )
        .init();

    let cfg = BusConfig {
        dispatch_interval: Duration::from_millis(50),
        ..BusConfig::default()
    };
    let observers = || vec![Arc::new(LogWriter::new()) as Arc<dyn Observe>];
    let net = MemoryNetwork::new();

    let hub = NodeBuilder::new(cfg.clone())
        .with_observers(observers())
        .hub(Arc::new(net.hub()))?;

    let (w1, w2) = (WindowId(1), WindowId(2));
    let first = NodeBuilder::new(cfg.clone())
        .with_observers(observers())
        .window(w1, Arc::new(net.connect(PeerInfo::window(w1))))?;
    let second = NodeBuilder::new(cfg.clone())
        .with_observers(observers())
        .window(w2, Arc::new(net.connect(PeerInfo::window(w2))))?;
    let page = NodeBuilder::new(cfg)
        .with_observers(observers())
        .hosted(Some(w1), Arc::new(net.connect(PeerInfo::hosted(w1))))?;

    title_bar(&first, w1, tab_counter(w1));
    title_bar(&second, w2, tab_counter(w2));

    while hub.peers().len() < 3 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Broadcast: both windows count it.
    first.dispatch(Action::new("tab-opened").with_field("url", "https://example.org"))?;
    // Targeted: only window 2 counts it.
    first.dispatch(Action::new("tab-opened").with_target(w2))?;
    // From the hosted page: defaults to its host window.
    page.dispatch(
        Action::new("tab-opened").with_field("opener", Value::map([("kind", "settings-page")])),
    )?;

    tokio::time::sleep(Duration::from_millis(300)).await;

    for node in [page, first, second, hub] {
        node.shutdown().await?;
    }
    Ok(())
}
