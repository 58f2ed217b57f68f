//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cpool_core::{Connection, CpoolError, Result};
use parking_lot::RwLock;

use super::config::PoolConfig;
use super::error::PoolError;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Connection type produced by this factory
    type Connection: Connection;

    /// Create a new connection named `name`, bound to `config.address()`
    ///
    /// The returned connection's `name()` must equal `name`; the pool tracks
    /// connections by it.
    async fn create(&self, name: &str, config: &PoolConfig) -> Result<Self::Connection>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    type Connection = T::Connection;

    async fn create(&self, name: &str, config: &PoolConfig) -> Result<Self::Connection> {
        (**self).create(name, config).await
    }
}

/// Connection type handed out by a pool built on factory `F`
pub type PoolConnection<F> = <F as ConnectionFactory>::Connection;

/// Request payload accepted by [`ConnectionPool::call`]
pub type PoolRequest<F> = <PoolConnection<F> as Connection>::Request;

/// Response payload returned by [`ConnectionPool::call`]
pub type PoolResponse<F> = <PoolConnection<F> as Connection>::Response;

/// Bookkeeping guarded by the pool lock
struct PoolState<C> {
    /// Connections created over the pool's lifetime
    created: u64,
    /// Naming sequence, bumped once per creation attempt
    next_seq: u64,
    /// Bumped by `destroy` so creations in flight are not registered afterwards
    epoch: u64,
    /// Allocated slots: tracked connections plus creations in flight
    active: usize,
    /// Idle connections, oldest first
    free: VecDeque<Arc<C>>,
    /// Every live connection by name
    all: HashMap<String, Arc<C>>,
}

impl<C: Connection> PoolState<C> {
    fn new() -> Self {
        Self {
            created: 0,
            next_seq: 0,
            epoch: 0,
            active: 0,
            free: VecDeque::new(),
            all: HashMap::new(),
        }
    }

    fn is_tracked(&self, conn: &Arc<C>) -> bool {
        self.all
            .get(conn.name())
            .is_some_and(|tracked| Arc::ptr_eq(tracked, conn))
    }

    /// Drop a tracked connection from the bookkeeping and free its slot
    fn untrack(&mut self, conn: &Arc<C>) -> bool {
        let tracked = self.is_tracked(conn);
        if tracked {
            self.all.remove(conn.name());
            self.free.retain(|idle| !Arc::ptr_eq(idle, conn));
            self.active -= 1;
        }
        tracked
    }
}

/// A slot reserved by `fetch` while the factory runs
///
/// Dropping an armed reservation gives the slot back, unless `destroy` has
/// reset the pool in the meantime.
struct SlotReservation<'a, C> {
    state: &'a RwLock<PoolState<C>>,
    epoch: u64,
    armed: bool,
}

impl<C> SlotReservation<'_, C> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<C> Drop for SlotReservation<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.write();
        if state.epoch == self.epoch {
            state.active -= 1;
        }
    }
}

/// A connection checked out by `call`
///
/// If `call` is dropped before it decides the connection's fate, the
/// connection is force-closed here: its abandoned task may still be using it.
struct Checkout<'a, C: Connection> {
    state: &'a RwLock<PoolState<C>>,
    conn: Option<Arc<C>>,
}

impl<C: Connection> Checkout<'_, C> {
    fn disarm(&mut self) {
        self.conn = None;
    }
}

impl<C: Connection> Drop for Checkout<'_, C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        let tracked = self.state.write().untrack(&conn);
        tracing::warn!(conn = %conn.name(), tracked, "call abandoned by caller, closing connection");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { close_quietly(conn.as_ref()).await });
            }
            Err(_) => tracing::warn!(conn = %conn.name(), "no runtime to close abandoned connection"),
        }
    }
}

enum CreateFailure {
    Factory(CpoolError),
    Deadline,
}

/// A bounded pool of reusable connections to a single endpoint
///
/// Idle connections are reused oldest first. When every slot is allocated and
/// nothing is idle, [`fetch`](Self::fetch) fails immediately instead of
/// waiting. Any call that fails or times out evicts its connection.
///
/// The lock is only held for bookkeeping; factory invocations, closes and
/// calls all run with it released. The pool must be used from within a tokio
/// runtime.
pub struct ConnectionPool<F: ConnectionFactory> {
    /// Pool configuration
    config: PoolConfig,
    /// Connection factory
    factory: F,
    state: RwLock<PoolState<F::Connection>>,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create an empty pool with the given configuration and factory
    ///
    /// No connection is established until the first fetch.
    pub fn new(config: PoolConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            state: RwLock::new(PoolState::new()),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get the pool name
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Get a snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        let state = self.state.read();
        self.snapshot(&state)
    }

    fn snapshot(&self, state: &PoolState<F::Connection>) -> PoolStats {
        PoolStats::new(
            self.config.name(),
            state.created,
            state.active,
            state.all.len(),
            state.free.len(),
        )
    }

    fn connection_name(&self, seq: u64) -> String {
        format!(
            "{}_{}_{}",
            self.config.name(),
            seq,
            chrono::Utc::now().timestamp()
        )
    }

    /// Check out a connection
    ///
    /// Reuses the longest-idle connection if there is one. Otherwise creates a
    /// new one, unless every slot is already allocated, in which case this
    /// returns [`PoolError::Exhausted`] right away.
    #[tracing::instrument(skip(self), fields(pool = %self.config.name()))]
    pub async fn fetch(&self) -> std::result::Result<Arc<F::Connection>, PoolError> {
        let (name, epoch) = {
            let mut state = self.state.write();

            if let Some(conn) = state.free.pop_front() {
                tracing::trace!(conn = %conn.name(), "reusing idle connection");
                return Ok(conn);
            }

            if state.active >= self.config.max_conns() {
                return Err(PoolError::Exhausted {
                    pool: self.config.name().to_string(),
                    max_conns: self.config.max_conns(),
                    stats: self.snapshot(&state),
                });
            }

            // Reserve the slot before dropping the lock so concurrent fetches
            // cannot overshoot max_conns while the factory runs.
            state.active += 1;
            let seq = state.next_seq;
            state.next_seq += 1;
            (self.connection_name(seq), state.epoch)
        };
        let mut reservation = SlotReservation {
            state: &self.state,
            epoch,
            armed: true,
        };

        let conn = match self.create(&name).await {
            Ok(conn) => Arc::new(conn),
            Err(failure) => {
                drop(reservation);
                let stats = self.stats();
                let pool = self.config.name().to_string();
                return Err(match failure {
                    CreateFailure::Factory(source) => {
                        tracing::debug!(conn = %name, error = %source, "failed to create connection");
                        PoolError::Creation {
                            pool,
                            conn: name,
                            source,
                            stats,
                        }
                    }
                    CreateFailure::Deadline => {
                        tracing::debug!(conn = %name, "connect timed out");
                        PoolError::ConnectTimeout {
                            pool,
                            conn: name,
                            timeout_ms: self.config.conn_timeout_ms(),
                            stats,
                        }
                    }
                });
            }
        };

        reservation.disarm();
        let rejected = {
            let mut state = self.state.write();
            if state.epoch != epoch {
                Some(PoolError::Discarded {
                    pool: self.config.name().to_string(),
                    conn: name,
                })
            } else if state.all.contains_key(conn.name()) {
                state.active -= 1;
                Some(PoolError::Creation {
                    pool: self.config.name().to_string(),
                    conn: name,
                    source: CpoolError::Connection(format!(
                        "duplicate connection name {}",
                        conn.name()
                    )),
                    stats: self.snapshot(&state),
                })
            } else {
                state.created += 1;
                state.all.insert(conn.name().to_string(), Arc::clone(&conn));
                None
            }
        };

        match rejected {
            Some(err) => {
                close_quietly(conn.as_ref()).await;
                Err(err)
            }
            None => {
                tracing::debug!(conn = %conn.name(), "created connection");
                Ok(conn)
            }
        }
    }

    async fn create(&self, name: &str) -> std::result::Result<F::Connection, CreateFailure> {
        let created = tokio::time::timeout(
            self.config.conn_timeout(),
            self.factory.create(name, &self.config),
        )
        .await;

        match created {
            Ok(Ok(conn)) if conn.is_closed() => Err(CreateFailure::Factory(CpoolError::Closed(
                format!("{} was closed before first use", conn.name()),
            ))),
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(err)) => Err(CreateFailure::Factory(err)),
            Err(_) => Err(CreateFailure::Deadline),
        }
    }

    /// Return a checked-out connection after a successful use
    ///
    /// The connection becomes idle if fewer than `max_idle` connections are
    /// idle; otherwise it is closed and its slot freed. A connection the pool
    /// no longer tracks is only closed.
    pub async fn release(&self, conn: Arc<F::Connection>) {
        let evicted = {
            let mut state = self.state.write();
            if !state.is_tracked(&conn) {
                tracing::debug!(conn = %conn.name(), "released connection is no longer tracked");
                Some(conn)
            } else if state.free.iter().any(|idle| Arc::ptr_eq(idle, &conn)) {
                tracing::warn!(conn = %conn.name(), "connection released twice, ignoring");
                None
            } else if state.free.len() >= self.config.max_idle() {
                state.all.remove(conn.name());
                state.active -= 1;
                tracing::debug!(conn = %conn.name(), "idle capacity full, evicting connection");
                Some(conn)
            } else {
                state.free.push_back(conn);
                None
            }
        };

        if let Some(conn) = evicted {
            close_quietly(conn.as_ref()).await;
        }
    }

    /// Destroy a connection whose state can no longer be trusted
    ///
    /// Removes it from the pool, frees its slot and closes it. Returns `false`
    /// if the pool was not tracking the connection anymore, in which case no
    /// counter changes.
    pub async fn force_close(&self, conn: &Arc<F::Connection>) -> bool {
        let tracked = self.state.write().untrack(conn);

        tracing::debug!(conn = %conn.name(), tracked, "force closing connection");
        close_quietly(conn.as_ref()).await;
        tracked
    }

    /// Close every connection and reset the pool to empty
    ///
    /// Connections still checked out are closed too; releasing them later
    /// only closes them again. The pool remains usable.
    pub async fn destroy(&self) {
        let conns: Vec<Arc<F::Connection>> = {
            let mut state = self.state.write();
            state.epoch += 1;
            state.active = 0;
            let free = std::mem::take(&mut state.free);
            let all = std::mem::take(&mut state.all);
            free.into_iter().chain(all.into_values()).collect()
        };

        tracing::debug!(pool = %self.config.name(), connections = conns.len(), "destroying pool");
        for conn in conns {
            close_quietly(conn.as_ref()).await;
        }
    }

    /// Run one request on a pooled connection, bounded by the call timeout
    ///
    /// On success the connection goes back to the pool. On error or timeout it
    /// is force-closed. A timed-out call is abandoned, not awaited: its task
    /// keeps running until the transport observes the closed connection, and
    /// whatever it eventually returns is dropped.
    #[tracing::instrument(skip(self, request), fields(pool = %self.config.name()))]
    pub async fn call(
        &self,
        request: PoolRequest<F>,
    ) -> std::result::Result<PoolResponse<F>, PoolError> {
        let conn = self.fetch().await?;
        let timeout_ms = self.config.call_timeout_ms();
        let mut checkout = Checkout {
            state: &self.state,
            conn: Some(Arc::clone(&conn)),
        };

        let task = tokio::spawn({
            let conn = Arc::clone(&conn);
            async move { conn.call(request).await }
        });

        // On expiry the JoinHandle is dropped, which detaches the task.
        let joined = tokio::time::timeout(self.config.call_timeout(), task).await;
        checkout.disarm();

        let joined = match joined {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(conn = %conn.name(), timeout_ms, "call timed out, closing connection");
                self.force_close(&conn).await;
                return Err(PoolError::Timeout {
                    conn: conn.name().to_string(),
                    timeout_ms,
                });
            }
        };

        let source = match joined {
            Ok(Ok(response)) => {
                self.release(conn).await;
                return Ok(response);
            }
            Ok(Err(err)) => err,
            Err(join_err) => CpoolError::Other(format!("call task failed: {}", join_err)),
        };

        self.force_close(&conn).await;
        Err(PoolError::Call {
            pool: self.config.name().to_string(),
            conn: conn.name().to_string(),
            source,
            stats: self.stats(),
        })
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Close a connection, logging instead of failing
async fn close_quietly<C: Connection>(conn: &C) {
    if conn.is_closed() {
        return;
    }
    if let Err(err) = conn.close().await {
        tracing::warn!(conn = %conn.name(), error = %err, "failed to close connection");
    }
}
