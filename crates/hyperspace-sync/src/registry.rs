//! Connection registry: who is connected, as which account, subscribed to what.
//!
//! Every connection owns a bounded outbound queue. Sends never wait: a full
//! or closed queue drops the message for that connection only, so one slow
//! client cannot stall event processing for the others.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use hyperspace_core::{AccountId, SpaceId};

use crate::error::{Result, SyncError};
use crate::messages::Response;

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connection {
    account_id: AccountId,
    subscribed_spaces: HashSet<SpaceId>,
    outbound: mpsc::Sender<Response>,
}

/// Outcome of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue was full; the message was dropped.
    Dropped,
    /// The receiving side is gone.
    Closed,
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    next_id: AtomicU64,
    queue_size: usize,
}

impl ConnectionRegistry {
    /// `queue_size` bounds each connection's outbound queue.
    pub fn new(queue_size: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_size: queue_size.max(1),
        }
    }

    /// Register a connection for `account_id`.
    ///
    /// The returned receiver is drained by the connection's writer task.
    pub fn register(&self, account_id: AccountId) -> (ConnectionId, mpsc::Receiver<Response>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbound, rx) = mpsc::channel(self.queue_size);
        debug!(connection_id = %id, account_id = %account_id, "registered connection");
        self.connections.insert(
            id,
            Connection {
                account_id,
                subscribed_spaces: HashSet::new(),
                outbound,
            },
        );
        (id, rx)
    }

    /// Forget a connection. It receives nothing afterwards.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            debug!(connection_id = %id, "removed connection");
        }
        removed
    }

    pub fn account_of(&self, id: ConnectionId) -> Option<AccountId> {
        self.connections.get(&id).map(|c| c.account_id.clone())
    }

    pub fn subscribe(&self, id: ConnectionId, space_id: SpaceId) -> Result<()> {
        let mut connection = self
            .connections
            .get_mut(&id)
            .ok_or(SyncError::UnknownConnection(id))?;
        connection.subscribed_spaces.insert(space_id);
        Ok(())
    }

    pub fn unsubscribe(&self, id: ConnectionId, space_id: &SpaceId) -> bool {
        self.connections
            .get_mut(&id)
            .is_some_and(|mut c| c.subscribed_spaces.remove(space_id))
    }

    pub fn is_subscribed(&self, id: ConnectionId, space_id: &SpaceId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|c| c.subscribed_spaces.contains(space_id))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue a message for one connection.
    pub fn send(&self, id: ConnectionId, message: Response) -> Result<Delivery> {
        let sender = self
            .connections
            .get(&id)
            .map(|c| c.outbound.clone())
            .ok_or(SyncError::UnknownConnection(id))?;
        Ok(deliver(id, &sender, message))
    }

    /// Send to every connection subscribed to `space_id` for which
    /// `predicate` holds. Returns how many queues accepted the message.
    pub fn broadcast<F>(&self, space_id: &SpaceId, predicate: F, message: &Response) -> usize
    where
        F: Fn(ConnectionId, &AccountId) -> bool,
    {
        let targets: Vec<_> = self
            .connections
            .iter()
            .filter(|entry| {
                entry.subscribed_spaces.contains(space_id)
                    && predicate(*entry.key(), &entry.account_id)
            })
            .map(|entry| (*entry.key(), entry.outbound.clone()))
            .collect();

        targets
            .into_iter()
            .filter(|(id, sender)| deliver(*id, sender, message.clone()) == Delivery::Queued)
            .count()
    }

    /// Send to every connection of `account_id`, subscribed or not.
    pub fn send_to_account(&self, account_id: &AccountId, message: &Response) -> usize {
        let targets: Vec<_> = self
            .connections
            .iter()
            .filter(|entry| &entry.account_id == account_id)
            .map(|entry| (*entry.key(), entry.outbound.clone()))
            .collect();

        targets
            .into_iter()
            .filter(|(id, sender)| deliver(*id, sender, message.clone()) == Delivery::Queued)
            .count()
    }
}

fn deliver(id: ConnectionId, sender: &mpsc::Sender<Response>, message: Response) -> Delivery {
    match sender.try_send(message) {
        Ok(()) => Delivery::Queued,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(connection_id = %id, "outbound queue full, dropping message");
            Delivery::Dropped
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
    }
}
