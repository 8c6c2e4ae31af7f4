use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, trace};

use crate::connection::{Connection, ConnectionId, ConnectionKey, Proxy, Route, TlsContext};
use crate::pool::cache::Cache;
use crate::protocol::ConnectionError;
use crate::timeout::{Phase, Timeout};

/// Bounds of a [`Connector`]; `0` means unbounded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// connections acquired at the same time, across all destinations
    pub limit: usize,
    /// connections per destination, acquired and idle
    pub limit_per_similar_connection: usize,
}

impl ConnectorConfig {
    pub fn new(limit: usize, limit_per_similar_connection: usize) -> Self {
        Self { limit, limit_per_similar_connection }
    }
}

/// A pool of connections bounded globally and per destination.
///
/// `Connector` is a cheap handle, clones share the same pool. Connections are
/// handed out by value: give them back with [`release`](Connector::release) to
/// make them reusable, dropping them discards them. Either way their slots are
/// freed.
///
/// ```no_run
/// use std::time::Duration;
/// use micro_http_client::pool::Connector;
/// use micro_http_client::timeout::Timeout;
///
/// # async fn run() -> Result<(), micro_http_client::protocol::ConnectionError> {
/// let connector = Connector::new(100, 10);
///
/// let connection = connector.acquire("example.com", 80, None, Timeout::uniform(Duration::from_secs(5)), None).await?;
/// // ... exchange messages ...
/// connector.release(connection);
///
/// connector.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Connector {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    config: ConnectorConfig,
    /// global slots, `None` when unbounded
    slots: Option<Arc<Semaphore>>,
    state: Mutex<PoolState>,
    /// signalled whenever the acquired set becomes empty
    drained: Notify,
}

#[derive(Debug, Default)]
struct PoolState {
    caches: HashMap<ConnectionKey, Cache>,
    acquired: HashSet<ConnectionId>,
    closed: bool,
}

impl Connector {
    pub fn new(limit: usize, limit_per_similar_connection: usize) -> Self {
        Self::with_config(ConnectorConfig::new(limit, limit_per_similar_connection))
    }

    pub fn with_config(config: ConnectorConfig) -> Self {
        let slots = (config.limit > 0).then(|| Arc::new(Semaphore::new(config.limit)));
        let shared = Shared { config, slots, state: Mutex::new(PoolState::default()), drained: Notify::new() };
        Self { shared: Arc::new(shared) }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.shared.config
    }

    pub fn limit(&self) -> usize {
        self.shared.config.limit
    }

    pub fn limit_per_similar_connection(&self) -> usize {
        self.shared.config.limit_per_similar_connection
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Connections currently handed out, across all destinations.
    pub fn acquired_count(&self) -> usize {
        self.shared.lock().acquired.len()
    }

    /// Idle connections kept for `key`.
    pub fn idle_count(&self, key: &ConnectionKey) -> usize {
        self.shared.lock().caches.get(key).map_or(0, Cache::idle_len)
    }

    /// Hands out a connected connection to `host:port`, reusing an idle one
    /// when possible.
    ///
    /// Waiting for a free slot is bounded by the pool budget of `timeout`; the
    /// returned connection carries `timeout` for its own operations.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidProxy`] if `proxy` is not a supported proxy url
    /// - [`ConnectionError::PoolTimeout`] if no slot frees up within the pool budget
    /// - [`ConnectionError::Configuration`] if the connector is closed
    /// - any error of [`Connection::connect`], after the slots were given back
    pub async fn acquire(
        &self,
        host: &str,
        port: u16,
        tls: Option<TlsContext>,
        timeout: Timeout,
        proxy: Option<&str>,
    ) -> Result<Connection, ConnectionError> {
        let route = match proxy {
            Some(url) => Route::Proxy(Proxy::parse(url)?),
            None => Route::Direct,
        };
        let key = ConnectionKey::new(host, port, tls.is_some(), route.proxy().cloned());

        let key_slots = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(closed_error());
            }
            let limit = self.shared.config.limit_per_similar_connection;
            state.caches.entry(key.clone()).or_insert_with(|| Cache::new(limit)).slots().cloned()
        };

        let (key_permit, global_permit) = self.wait_for_slots(&key, key_slots, &timeout).await?;

        let reused = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(closed_error());
            }

            let reused = state.caches.get_mut(&key).and_then(Cache::try_take_idle);
            if let Some(connection) = &reused {
                state.acquired.insert(connection.id());
            }
            reused
        };

        let mut connection = match reused {
            Some(mut connection) => {
                debug!(id = %connection.id(), key = %key, "reusing idle connection");
                connection.set_timeout(timeout);
                connection
            }
            None => {
                let mut connection = Connection::with_route(host.to_owned(), port, route, tls, timeout);
                connection.connect().await?;

                let mut state = self.shared.lock();
                if state.closed {
                    connection.close();
                    return Err(closed_error());
                }
                state.acquired.insert(connection.id());
                if let Some(cache) = state.caches.get_mut(&key) {
                    cache.mark_acquired(connection.id());
                }
                debug!(id = %connection.id(), key = %key, "acquired new connection");
                connection
            }
        };

        connection.attach_lease(Lease {
            shared: Arc::downgrade(&self.shared),
            id: connection.id(),
            key,
            armed: true,
            _key_permit: key_permit,
            _global_permit: global_permit,
        });
        Ok(connection)
    }

    /// Takes a connection back.
    ///
    /// It goes to the idle set only if it is open, its last response was read
    /// to the end and the server allows keeping it alive; otherwise it is
    /// closed. Its slots are freed in both cases.
    pub fn release(&self, mut connection: Connection) {
        let Some(mut lease) = connection.take_lease() else {
            trace!(id = %connection.id(), "releasing a connection no connector handed out");
            connection.close();
            return;
        };

        if !lease.belongs_to(&self.shared) {
            // the lease gives the slots back to the connector it came from
            connection.close();
            return;
        }
        lease.disarm();

        let discarded = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            state.acquired.remove(&connection.id());

            let discarded = match state.caches.get_mut(connection.key()) {
                Some(cache) if !state.closed && connection.is_reusable() => {
                    trace!(id = %connection.id(), "connection back to idle");
                    cache.put_idle(connection);
                    None
                }
                Some(cache) => {
                    cache.release(connection.id());
                    Some(connection)
                }
                None => Some(connection),
            };

            if state.acquired.is_empty() {
                self.shared.drained.notify_waiters();
            }
            discarded
        };

        if let Some(mut connection) = discarded {
            debug!(id = %connection.id(), "discarding released connection");
            connection.close();
        }
        // the slots are freed only now, once idle is up to date
        drop(lease);
    }

    /// Stops handing out connections, waits until every acquired connection
    /// came back or was dropped, then closes all idle connections.
    ///
    /// Calling it again is harmless.
    pub async fn close(&self) {
        {
            let mut state = self.shared.lock();
            if !state.closed {
                info!(acquired = state.acquired.len(), "closing connector");
                state.closed = true;
            }
            // waiters wake up with an error instead of a slot
            for cache in state.caches.values() {
                if let Some(slots) = cache.slots() {
                    slots.close();
                }
            }
        }
        if let Some(slots) = &self.shared.slots {
            slots.close();
        }

        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.lock().acquired.is_empty() {
                break;
            }
            notified.await;
        }

        let idle: Vec<Connection> = {
            let mut state = self.shared.lock();
            state.caches.values_mut().flat_map(Cache::drain_idle).collect()
        };
        debug!(count = idle.len(), "closing idle connections");
        for mut connection in idle {
            connection.close();
        }
    }

    async fn wait_for_slots(
        &self,
        key: &ConnectionKey,
        key_slots: Option<Arc<Semaphore>>,
        timeout: &Timeout,
    ) -> Result<(Option<OwnedSemaphorePermit>, Option<OwnedSemaphorePermit>), ConnectionError> {
        let global_slots = self.shared.slots.clone();
        if key_slots.is_none() && global_slots.is_none() {
            return Ok((None, None));
        }

        // the per-key slot comes first, so a task never sits on a global slot
        // while it waits for its destination
        let wait = async move {
            let key_permit = match key_slots {
                Some(slots) => Some(slots.acquire_owned().await?),
                None => None,
            };
            let global_permit = match global_slots {
                Some(slots) => Some(slots.acquire_owned().await?),
                None => None,
            };
            Ok::<_, tokio::sync::AcquireError>((key_permit, global_permit))
        };

        match timeout.run(Phase::Pool, wait).await {
            Ok(Ok(permits)) => Ok(permits),
            Ok(Err(_closed)) => Err(closed_error()),
            Err(_elapsed) => {
                debug!(key = %key, "timed out waiting for a connection slot");
                Err(ConnectionError::PoolTimeout)
            }
        }
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::with_config(ConnectorConfig::default())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops a connection that was never released from the books.
    fn forget(&self, key: &ConnectionKey, id: ConnectionId) {
        let mut state = self.lock();
        let was_acquired = state.acquired.remove(&id);
        if let Some(cache) = state.caches.get_mut(key) {
            cache.release(id);
        }
        if was_acquired {
            debug!(%id, key = %key, "discarded connection dropped without release");
        }
        if state.acquired.is_empty() {
            self.drained.notify_waiters();
        }
    }
}

/// Ties the pool slots and the membership of a handed out connection to its lifetime.
///
/// An armed lease that is dropped (the connection was dropped, or its task
/// cancelled) discards the connection from the pool. The permits are released
/// after the pool state was updated.
#[derive(Debug)]
pub(crate) struct Lease {
    shared: Weak<Shared>,
    id: ConnectionId,
    key: ConnectionKey,
    armed: bool,
    _key_permit: Option<OwnedSemaphorePermit>,
    _global_permit: Option<OwnedSemaphorePermit>,
}

impl Lease {
    fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
        std::ptr::eq(self.shared.as_ptr(), Arc::as_ptr(shared))
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.forget(&self.key, self.id);
        }
    }
}

fn closed_error() -> ConnectionError {
    ConnectionError::configuration("connector is closed")
}
