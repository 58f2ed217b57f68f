//! Call orchestration tests
//!
//! Covers the four outcomes of `ConnectionPool::call`: success, call error,
//! timeout, and failing to obtain a connection at all.

#[cfg(test)]
mod call_tests {
    use std::time::Duration;

    use anyhow::Context;
    use cpool::{CpoolError, PoolConfig, PoolError};
    use pretty_assertions::assert_eq;
    use rstest::*;
    use tokio::time::{sleep, timeout};

    use crate::fixtures::{MockRequest, TEST_ADDRESS, assert_invariants, test_pool, test_pool_with};

    fn timed_config(call_timeout_ms: u64) -> PoolConfig {
        PoolConfig::new("test", TEST_ADDRESS, 2, 1).with_call_timeout_ms(call_timeout_ms)
    }

    /// A successful call returns the response and parks the connection
    #[tokio::test]
    async fn test_call_success_returns_connection() -> anyhow::Result<()> {
        let (pool, factory) = test_pool(2, 1);

        let reply = pool
            .call(MockRequest::Echo("ping".into()))
            .await
            .context("echo call")?;
        assert_eq!(reply, "ping");

        let stats = pool.stats();
        assert_eq!((stats.active(), stats.free(), stats.all()), (1, 1, 1));

        pool.call(MockRequest::Echo("again".into())).await?;
        assert_eq!(factory.counters().created(), 1, "second call should reuse");
        assert_eq!(factory.counters().calls_finished(), 2);

        Ok(())
    }

    /// A failing call evicts its connection and reports stats
    #[tokio::test]
    async fn test_call_failure_evicts() -> anyhow::Result<()> {
        let (pool, factory) = test_pool(2, 1);
        pool.call(MockRequest::Echo("warm".into())).await?;

        let err = pool
            .call(MockRequest::Fail("unexpected frame".into()))
            .await
            .expect_err("call should fail");

        match &err {
            PoolError::Call { source, stats, .. } => {
                assert!(matches!(source, CpoolError::Protocol(msg) if msg == "unexpected frame"));
                assert_eq!(stats.active(), 0);
            }
            other => anyhow::bail!("expected call error, got {other}"),
        }
        assert!(err.to_string().contains("stats: test[Count: 1"));

        let stats = pool.stats();
        assert_eq!((stats.active(), stats.free(), stats.all()), (0, 0, 0));
        assert_eq!(factory.counters().open(), 0);

        Ok(())
    }

    /// A timed-out call frees exactly one slot and one tracked connection
    #[rstest]
    #[case::short(20)]
    #[case::medium(60)]
    #[tokio::test]
    async fn test_call_timeout_evicts(#[case] timeout_ms: u64) -> anyhow::Result<()> {
        let (pool, factory) = test_pool_with(timed_config(timeout_ms));
        pool.call(MockRequest::Echo("warm".into())).await?;
        let before = pool.stats();

        let err = pool
            .call(MockRequest::Sleep(Duration::from_secs(2)))
            .await
            .expect_err("call should time out");
        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(matches!(err, PoolError::Timeout { timeout_ms: t, .. } if t == timeout_ms));

        let after = pool.stats();
        assert_eq!(after.active(), before.active() - 1);
        assert_eq!(after.all(), before.all() - 1);
        assert_eq!(factory.counters().open(), 0);
        assert_invariants(&pool);

        Ok(())
    }

    /// The abandoned call keeps running and only stops when it sees the close
    #[tokio::test]
    async fn test_call_timeout_abandons_task() -> anyhow::Result<()> {
        let (pool, factory) = test_pool_with(timed_config(20));

        let err = pool
            .call(MockRequest::Sleep(Duration::from_secs(2)))
            .await
            .expect_err("call should time out");
        assert!(err.is_timeout());

        // The pool returned before the transport call unwound.
        let counters = factory.counters();
        assert_eq!(counters.calls_started(), 1);

        for _ in 0..50 {
            if counters.calls_finished() == 1 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counters.calls_finished(), 1);
        assert_eq!(counters.calls_interrupted(), 1, "close should interrupt the call");

        Ok(())
    }

    /// A call dropped by its caller still evicts its connection
    #[tokio::test]
    async fn test_call_cancelled_by_caller() -> anyhow::Result<()> {
        let (pool, factory) = test_pool(1, 1);

        let cancelled = timeout(
            Duration::from_millis(20),
            pool.call(MockRequest::Sleep(Duration::from_millis(200))),
        )
        .await;
        assert!(cancelled.is_err(), "call should still be running");

        let stats = pool.stats();
        assert_eq!((stats.active(), stats.all(), stats.free()), (0, 0, 0));

        for _ in 0..50 {
            if factory.counters().open() == 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(factory.counters().open(), 0);
        assert_eq!(factory.counters().calls_interrupted(), 1);

        let reply = pool
            .call(MockRequest::Echo("after".into()))
            .await
            .context("call after cancellation")?;
        assert_eq!(reply, "after");
        assert_invariants(&pool);

        Ok(())
    }

    /// Fast calls under the deadline are unaffected by it
    #[tokio::test]
    async fn test_call_within_deadline() -> anyhow::Result<()> {
        let (pool, _factory) = test_pool_with(timed_config(500));

        let reply = pool
            .call(MockRequest::Sleep(Duration::from_millis(10)))
            .await
            .context("short sleep should finish")?;
        assert!(reply.starts_with("test_0_"));
        assert_eq!(pool.stats().free(), 1);

        Ok(())
    }

    /// Exhaustion surfaces immediately through call
    #[tokio::test]
    async fn test_call_exhausted_is_immediate() -> anyhow::Result<()> {
        let (pool, factory) = test_pool(1, 1);
        let _held = pool.fetch().await?;

        let started = std::time::Instant::now();
        let err = pool
            .call(MockRequest::Echo("x".into()))
            .await
            .expect_err("no slot left");
        assert!(started.elapsed() < Duration::from_millis(500));

        assert!(err.is_exhausted());
        assert_eq!(err.stats().map(|s| s.active()), Some(1));
        assert_eq!(factory.counters().calls_started(), 0);

        Ok(())
    }

    /// Factory failures surface through call with stats attached
    #[tokio::test]
    async fn test_call_creation_failure() -> anyhow::Result<()> {
        let (pool, factory) = test_pool(1, 1);
        factory.set_refuse(true);

        let err = pool
            .call(MockRequest::Echo("x".into()))
            .await
            .expect_err("factory refuses");
        assert!(matches!(err, PoolError::Creation { .. }));
        assert!(err.to_string().contains("connection refused"));
        assert!(err.stats().is_some());
        assert_eq!(pool.stats().active(), 0);

        Ok(())
    }
}
