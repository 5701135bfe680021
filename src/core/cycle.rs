//! # Dispatch cycles and completion handles.
//!
//! Every cycle owns a table with one completion handle per participating
//! subscriber, backed by a `watch` channel:
//!
//! ```text
//! CycleTable (core task)            CycleContext (subscribers)
//!   sub#1: Sender ── Pending ─┐       wait_for([sub#1, sub#2])
//!   sub#2: Sender ── Resolved ┼────►    ├─ Receiver(sub#1).wait_for(!Pending)
//!   sub#3: Sender ── Aborted ─┘         └─ Receiver(sub#2).wait_for(!Pending)
//! ```
//!
//! The table is dropped when the cycle ends; any receiver still waiting then
//! observes a closed channel and reports [`WaitError::Aborted`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use tokio::sync::watch;
use tokio::time;

use super::registry::SubscriberId;
use crate::error::WaitError;
use crate::transport::PeerId;

/// Where the action of a cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Dispatched in this process.
    Local,
    /// Received from a peer process.
    Peer(PeerId),
}

impl Origin {
    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleState {
    Pending,
    Resolved,
    Aborted,
}

struct CycleShared {
    seq: u64,
    origin: Origin,
    handles: HashMap<SubscriberId, watch::Receiver<HandleState>>,
    wait_limit: Option<Duration>,
}

/// Core-side view of a cycle: resolves and aborts handles.
pub(crate) struct CycleTable {
    senders: HashMap<SubscriberId, watch::Sender<HandleState>>,
    shared: Arc<CycleShared>,
}

impl CycleTable {
    pub fn new(
        seq: u64,
        origin: Origin,
        participants: impl IntoIterator<Item = SubscriberId>,
        wait_limit: Option<Duration>,
    ) -> Self {
        let mut senders = HashMap::new();
        let mut handles = HashMap::new();
        for id in participants {
            let (tx, rx) = watch::channel(HandleState::Pending);
            senders.insert(id, tx);
            handles.insert(id, rx);
        }
        Self {
            senders,
            shared: Arc::new(CycleShared {
                seq,
                origin,
                handles,
                wait_limit,
            }),
        }
    }

    pub fn context(&self, current: SubscriberId) -> CycleContext {
        CycleContext {
            shared: Arc::clone(&self.shared),
            current,
        }
    }

    pub fn resolve(&self, id: SubscriberId) {
        self.settle(id, HandleState::Resolved);
    }

    pub fn abort(&self, id: SubscriberId) {
        self.settle(id, HandleState::Aborted);
    }

    /// Aborts every handle still pending; returns their ids.
    pub fn abort_pending(&self) -> Vec<SubscriberId> {
        let mut aborted: Vec<_> = self
            .senders
            .iter()
            .filter(|(_, tx)| *tx.borrow() == HandleState::Pending)
            .map(|(id, _)| *id)
            .collect();
        aborted.sort();
        for id in &aborted {
            self.abort(*id);
        }
        aborted
    }

    fn settle(&self, id: SubscriberId, state: HandleState) {
        if let Some(tx) = self.senders.get(&id) {
            tx.send_replace(state);
        }
    }
}

/// Subscriber-side view of the current cycle.
///
/// Cheap to clone; move a clone into a [`Completion::Pending`](crate::Completion)
/// future to call [`wait_for`](CycleContext::wait_for) from it.
#[derive(Clone)]
pub struct CycleContext {
    shared: Arc<CycleShared>,
    current: SubscriberId,
}

impl CycleContext {
    /// Sequence number of the cycle (per process, starts at 1).
    pub fn seq(&self) -> u64 {
        self.shared.seq
    }

    pub fn origin(&self) -> Origin {
        self.shared.origin
    }

    /// Handle of the subscriber this context was given to.
    pub fn subscriber(&self) -> SubscriberId {
        self.current
    }

    /// True when `handle` participates in this cycle.
    pub fn contains(&self, handle: SubscriberId) -> bool {
        self.shared.handles.contains_key(&handle)
    }

    /// Waits until every named subscriber completed this cycle's action.
    ///
    /// # Errors
    /// - [`WaitError::SelfWait`] if `handles` names the caller
    /// - [`WaitError::UnknownHandle`] for a handle outside this cycle
    /// - [`WaitError::Aborted`] if a named subscriber failed or was abandoned
    /// - [`WaitError::Timeout`] after the configured wait timeout
    pub async fn wait_for(&self, handles: &[SubscriberId]) -> Result<(), WaitError> {
        let mut waits = Vec::with_capacity(handles.len());
        for &handle in handles {
            if handle == self.current {
                return Err(WaitError::SelfWait { handle });
            }
            let rx = self
                .shared
                .handles
                .get(&handle)
                .cloned()
                .ok_or(WaitError::UnknownHandle { handle })?;
            waits.push(wait_one(handle, rx));
        }

        let all = future::try_join_all(waits);
        match self.shared.wait_limit {
            None => all.await.map(drop),
            Some(limit) => match time::timeout(limit, all).await {
                Ok(res) => res.map(drop),
                Err(_) => Err(WaitError::Timeout {
                    handles: handles.to_vec(),
                    timeout: limit,
                }),
            },
        }
    }
}

async fn wait_one(
    handle: SubscriberId,
    mut rx: watch::Receiver<HandleState>,
) -> Result<(), WaitError> {
    let state = match rx.wait_for(|s| *s != HandleState::Pending).await {
        Ok(state) => *state,
        Err(_) => HandleState::Aborted,
    };
    match state {
        HandleState::Resolved => Ok(()),
        _ => Err(WaitError::Aborted { handle }),
    }
}
