//! Test fixtures: a scriptable in-memory transport
//!
//! `MockConnection` answers `MockRequest`s without any I/O. Every connection
//! created by a `MockFactory` reports into a shared `Counters`, so tests can see
//! what happened to connections the pool has already dropped.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cpool_tests::fixtures::{MockRequest, test_pool};
//!
//! let (pool, factory) = test_pool(2, 1);
//! let reply = pool.call(MockRequest::Echo("ping".into())).await?;
//! assert_eq!(factory.counters().created(), 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cpool::{ConnectionFactory, ConnectionPool, PoolConfig};
use cpool_core::{Connection, CpoolError, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Request understood by the mock transport
#[derive(Debug, Clone)]
pub enum MockRequest {
    /// Reply with the given payload
    Echo(String),
    /// Fail with a protocol error carrying the given message
    Fail(String),
    /// Wait, then reply with the connection name; interrupted by `close`
    Sleep(Duration),
}

/// Counters shared by every connection of one factory
#[derive(Debug, Default)]
pub struct Counters {
    created: AtomicUsize,
    closed: AtomicUsize,
    calls_started: AtomicUsize,
    calls_finished: AtomicUsize,
    calls_interrupted: AtomicUsize,
}

impl Counters {
    /// Connections created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Connections closed so far (each connection counts once)
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Connections created and not closed
    pub fn open(&self) -> usize {
        self.created() - self.closed()
    }

    /// Calls that entered the transport
    pub fn calls_started(&self) -> usize {
        self.calls_started.load(Ordering::SeqCst)
    }

    /// Calls that returned, successfully or not
    pub fn calls_finished(&self) -> usize {
        self.calls_finished.load(Ordering::SeqCst)
    }

    /// Sleeping calls cut short by the connection being closed
    pub fn calls_interrupted(&self) -> usize {
        self.calls_interrupted.load(Ordering::SeqCst)
    }
}

/// In-memory connection used by the test suite
#[derive(Debug)]
pub struct MockConnection {
    name: String,
    closed: AtomicBool,
    close_signal: Notify,
    counters: Arc<Counters>,
}

impl MockConnection {
    fn new(name: &str, counters: Arc<Counters>) -> Self {
        counters.created.fetch_add(1, Ordering::SeqCst);
        Self {
            name: name.to_string(),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
            counters,
        }
    }

    async fn sleep_unless_closed(&self, delay: Duration) -> Result<String> {
        let closed = self.close_signal.notified();
        tokio::pin!(closed);

        if self.is_closed() {
            return Err(CpoolError::Closed(self.name.clone()));
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(self.name.clone()),
            _ = &mut closed => {
                self.counters.calls_interrupted.fetch_add(1, Ordering::SeqCst);
                Err(CpoolError::Closed(self.name.clone()))
            }
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    type Request = MockRequest;
    type Response = String;

    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: MockRequest) -> Result<String> {
        self.counters.calls_started.fetch_add(1, Ordering::SeqCst);

        let result = if self.is_closed() {
            Err(CpoolError::Closed(self.name.clone()))
        } else {
            match request {
                MockRequest::Echo(payload) => Ok(payload),
                MockRequest::Fail(message) => Err(CpoolError::Protocol(message)),
                MockRequest::Sleep(delay) => self.sleep_unless_closed(delay).await,
            }
        };

        self.counters.calls_finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            self.close_signal.notify_waiters();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory producing `MockConnection`s
///
/// Can be told to refuse connections, to take a while to connect, or to
/// ignore the requested name.
#[derive(Default)]
pub struct MockFactory {
    counters: Arc<Counters>,
    refuse: AtomicBool,
    connect_delay_ms: AtomicU64,
    fixed_name: Mutex<Option<String>>,
    addresses: Mutex<Vec<String>>,
}

impl MockFactory {
    /// Create a factory with a fresh counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for every connection this factory created
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Make subsequent creations fail (or succeed again)
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Delay every subsequent creation
    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Name every subsequent connection `name`, whatever the pool asked for
    pub fn set_fixed_name(&self, name: Option<&str>) {
        *self.fixed_name.lock() = name.map(str::to_string);
    }

    /// Addresses the pool asked this factory to connect to
    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    async fn create(&self, name: &str, config: &PoolConfig) -> Result<MockConnection> {
        self.addresses.lock().push(config.address().to_string());

        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.refuse.load(Ordering::SeqCst) {
            return Err(CpoolError::Connection(format!(
                "{}: connection refused",
                config.address()
            )));
        }

        let name = self.fixed_name.lock().clone().unwrap_or_else(|| name.to_string());
        tracing::trace!(conn = %name, "mock connection established");
        Ok(MockConnection::new(&name, Arc::clone(&self.counters)))
    }
}

/// Pool type used throughout the suite
pub type TestPool = ConnectionPool<Arc<MockFactory>>;

/// Address every test pool points at
pub const TEST_ADDRESS: &str = "127.0.0.1:6060";

/// Build a pool named `test` with a fresh factory
pub fn test_pool(max_conns: usize, max_idle: usize) -> (TestPool, Arc<MockFactory>) {
    test_pool_with(PoolConfig::new("test", TEST_ADDRESS, max_conns, max_idle))
}

/// Build a pool from an explicit configuration with a fresh factory
pub fn test_pool_with(config: PoolConfig) -> (TestPool, Arc<MockFactory>) {
    init_tracing();
    let factory = Arc::new(MockFactory::new());
    (ConnectionPool::new(config, Arc::clone(&factory)), factory)
}

/// Install a test subscriber honoring `RUST_LOG`; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Assert the pool invariants that must hold whenever no operation is running
pub fn assert_invariants(pool: &TestPool) {
    let config = pool.config();
    let stats = pool.stats();
    assert!(
        stats.active() <= config.max_conns(),
        "active {} exceeds max_conns {}",
        stats.active(),
        config.max_conns()
    );
    assert!(
        stats.free() <= config.max_idle(),
        "free {} exceeds max_idle {}",
        stats.free(),
        config.max_idle()
    );
    assert!(
        stats.free() <= stats.all(),
        "free {} exceeds tracked {}",
        stats.free(),
        stats.all()
    );
    assert_eq!(
        stats.active(),
        stats.all(),
        "every allocated slot should map to one tracked connection: {}",
        stats
    );
}
