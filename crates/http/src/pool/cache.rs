use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::connection::{Connection, ConnectionId};

/// The connections of one [`ConnectionKey`](crate::connection::ConnectionKey).
///
/// A connection is in at most one of `idle` and `acquired`; one in neither
/// has been discarded.
#[derive(Debug)]
pub(crate) struct Cache {
    /// ready, unused connections, oldest first
    idle: VecDeque<Connection>,
    acquired: HashSet<ConnectionId>,
    /// `None` when the key is unbounded
    slots: Option<Arc<Semaphore>>,
    limit: usize,
}

impl Cache {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            idle: VecDeque::new(),
            acquired: HashSet::new(),
            slots: (limit > 0).then(|| Arc::new(Semaphore::new(limit))),
            limit,
        }
    }

    pub(crate) fn slots(&self) -> Option<&Arc<Semaphore>> {
        self.slots.as_ref()
    }

    /// Hands out the least recently used idle connection and marks it acquired.
    pub(crate) fn try_take_idle(&mut self) -> Option<Connection> {
        while let Some(mut connection) = self.idle.pop_front() {
            if connection.is_closed() || self.acquired.contains(&connection.id()) {
                debug!(id = %connection.id(), "dropping stale idle connection");
                connection.close();
                continue;
            }

            self.acquired.insert(connection.id());
            return Some(connection);
        }
        None
    }

    /// Returns a drained connection to the idle set, evicting the oldest idle
    /// connection when the key would exceed its limit.
    ///
    /// A connection that can't be reused is closed instead of being stored.
    pub(crate) fn put_idle(&mut self, mut connection: Connection) {
        self.acquired.remove(&connection.id());

        if !connection.is_reusable() {
            trace!(id = %connection.id(), "not reusable, discarding");
            connection.close();
            return;
        }

        if self.limit > 0 {
            while !self.idle.is_empty() && self.idle.len() + self.acquired.len() >= self.limit {
                if let Some(mut evicted) = self.idle.pop_front() {
                    debug!(id = %evicted.id(), "evicting idle connection");
                    evicted.close();
                }
            }
        }

        self.idle.push_back(connection);
    }

    pub(crate) fn mark_acquired(&mut self, id: ConnectionId) {
        self.acquired.insert(id);
    }

    /// Returns whether `id` was acquired from this cache.
    pub(crate) fn release(&mut self, id: ConnectionId) -> bool {
        self.acquired.remove(&id)
    }

    pub(crate) fn drain_idle(&mut self) -> impl Iterator<Item = Connection> + '_ {
        self.idle.drain(..)
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn acquired_len(&self) -> usize {
        self.acquired.len()
    }
}
