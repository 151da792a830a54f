/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::{AcquireMode, RetryPolicy};
use crate::context::CallContext;
use crate::errors::{LockError, LockResult};
use crate::lock::RLock;

impl RLock {
    /// First attempt, then the retry loop when the lock is blocking.
    pub(crate) async fn acquire(&self, ctx: &CallContext) -> LockResult<()> {
        let err = match self.try_lock(ctx).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        match self.config().mode() {
            AcquireMode::Immediate => Err(err),
            AcquireMode::Blocking(policy) => {
                debug!(key = %self.key(), error = %err, "first attempt failed, retrying");
                self.loop_try_lock(ctx, policy).await
            }
        }
    }

    /// A single `SET NX PX` attempt.
    pub(crate) async fn try_lock(&self, ctx: &CallContext) -> LockResult<()> {
        self.store()
            .set_if_absent(ctx, self.key(), self.token(), self.config().lease_duration())
            .await
            .map_err(LockError::from)
    }

    /// Retry every `retry_interval` until the lock is taken, the context is
    /// done, the time budget is spent or the retries run out.
    async fn loop_try_lock(&self, ctx: &CallContext, policy: RetryPolicy) -> LockResult<()> {
        let start = Instant::now();
        let deadline = start + policy.timeout;
        let mut ticker = interval_at(start + policy.retry_interval, policy.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut remaining = policy.retry_limit;

        loop {
            tokio::select! {
                biased;
                _ = ctx.done() => {}
                _ = ticker.tick() => {}
            }

            // boundaries win over a late attempt
            if let Some(cause) = ctx.err() {
                return Err(LockError::Cancelled(cause));
            }
            if Instant::now() >= deadline {
                return Err(LockError::AcquisitionTimeout);
            }

            match self.try_lock(ctx).await {
                Ok(()) => return Ok(()),
                Err(err) => debug!(key = %self.key(), remaining, error = %err, "retry failed"),
            }

            remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                return Err(LockError::RetryExhausted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use async_trait::async_trait;
    use tokio::time::sleep;

    use crate::config::LockOptions;
    use crate::context::CallContext;
    use crate::errors::{CancelCause, LockError, StoreError, StoreResult};
    use crate::lock::RLock;
    use crate::scripts::{LockScript, ScriptArg};
    use crate::store::{KeyTtl, LockStore, MemoryStore};

    /// Every `SET` times out.
    #[derive(Default)]
    struct UnreachableStore {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl LockStore for UnreachableStore {
        async fn set_if_absent(&self, _: &CallContext, _: &str, _: &str, _: Duration) -> StoreResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::ResponseTimeout(Duration::from_millis(50)))
        }

        async fn eval_script(&self, _: &CallContext, _: LockScript, _: &[&str], _: &[ScriptArg]) -> StoreResult<i64> {
            Ok(0)
        }

        async fn get_ttl(&self, _: &CallContext, _: &str) -> StoreResult<KeyTtl> {
            Ok(KeyTtl::Missing)
        }
    }

    fn blocking(timeout_ms: u64, limit: u32, interval_ms: u64) -> LockOptions {
        LockOptions::new()
            .with_lease_duration(Duration::from_secs(30))
            .with_blocking()
            .with_blocking_timeout(Duration::from_millis(timeout_ms))
            .with_retry_limit(limit)
            .with_retry_interval(Duration::from_millis(interval_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_mode_fails_without_retrying() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", None);
        let lock = RLock::new("res", store.clone(), &LockOptions::new().with_lease_duration(Duration::from_secs(1)));

        let start = tokio::time::Instant::now();
        let err = lock.acquire(&CallContext::background()).await.unwrap_err();
        assert!(matches!(err, LockError::AlreadyHeld));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_bound_with_permanent_holder() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", None);
        let lock = RLock::new("res", store.clone(), &blocking(900, 3, 300));

        let start = tokio::time::Instant::now();
        let err = lock.acquire(&CallContext::background()).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, LockError::AcquisitionTimeout | LockError::RetryExhausted), "{err:?}");
        assert!(elapsed <= Duration::from_millis(1200), "{elapsed:?}");
        assert_eq!(store.get("res").as_deref(), Some("holder"));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_run_out_before_the_time_budget() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", None);
        let lock = RLock::new("res", store, &blocking(5_000, 2, 100));

        let start = tokio::time::Instant::now();
        let err = lock.acquire(&CallContext::background()).await.unwrap_err();
        assert!(matches!(err, LockError::RetryExhausted), "{err:?}");
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn time_budget_runs_out_before_the_retries() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", None);
        let lock = RLock::new("res", store, &blocking(250, 10, 100));

        let start = tokio::time::Instant::now();
        let err = lock.acquire(&CallContext::background()).await.unwrap_err();
        assert!(matches!(err, LockError::AcquisitionTimeout), "{err:?}");
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_acquires_once_holder_expires() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", Some(Duration::from_millis(450)));
        let lock = RLock::new("res", store.clone(), &blocking(2_000, 10, 200));

        lock.acquire(&CallContext::background()).await.unwrap();
        assert_eq!(store.get("res").as_deref(), Some(lock.token()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_the_wait() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", None);
        let lock = RLock::new("res", store, &blocking(10_000, 100, 500));

        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(700)).await;
            canceller.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = lock.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::Cancelled(CancelCause::Cancelled)), "{err:?}");
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn context_deadline_is_reported_as_cancellation() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", None);
        let lock = RLock::new("res", store, &blocking(10_000, 100, 500));

        let err = lock.acquire(&CallContext::with_timeout(Duration::from_millis(1200))).await.unwrap_err();
        assert!(matches!(err, LockError::Cancelled(CancelCause::DeadlineExceeded)), "{err:?}");
    }

    #[tokio::test]
    async fn store_errors_pass_through_in_immediate_mode() {
        let store = Arc::new(MemoryStore::new());
        let lock = RLock::new("res", store, &LockOptions::new().with_lease_duration(Duration::from_secs(1)));
        let ctx = CallContext::background();
        ctx.cancel();

        let err = lock.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::StoreError(StoreError::Interrupted(CancelCause::Cancelled))), "{err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_wins_over_an_attempt_that_would_succeed() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", Some(Duration::from_millis(850)));
        let lock = RLock::new("res", store.clone(), &blocking(900, 3, 300));

        let start = tokio::time::Instant::now();
        let err = lock.acquire(&CallContext::background()).await.unwrap_err();
        assert!(matches!(err, LockError::AcquisitionTimeout), "{err:?}");
        assert_eq!(start.elapsed(), Duration::from_millis(900));
        assert_eq!(store.get("res"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_over_an_attempt_that_would_succeed() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", Some(Duration::from_millis(850)));
        let lock = RLock::new("res", store.clone(), &blocking(10_000, 100, 300));

        let ctx = CallContext::with_timeout(Duration::from_millis(900));
        let err = lock.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::Cancelled(CancelCause::DeadlineExceeded)), "{err:?}");
        assert_eq!(store.get("res"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_a_free_key() {
        let store = Arc::new(MemoryStore::new());
        store.insert("res", "holder", Some(Duration::from_millis(800)));
        let lock = RLock::new("res", store.clone(), &blocking(10_000, 100, 300));

        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(850)).await;
            canceller.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = lock.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::Cancelled(CancelCause::Cancelled)), "{err:?}");
        assert_eq!(start.elapsed(), Duration::from_millis(850));
        assert_eq!(store.get("res"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn store_errors_consume_retries() {
        let store = Arc::new(UnreachableStore::default());
        let lock = RLock::new("res", store.clone(), &blocking(5_000, 4, 100));

        let start = tokio::time::Instant::now();
        let err = lock.acquire(&CallContext::background()).await.unwrap_err();
        assert!(matches!(err, LockError::RetryExhausted), "{err:?}");
        assert_eq!(start.elapsed(), Duration::from_millis(400));
        // the first attempt plus one per retry
        assert_eq!(store.attempts.load(Ordering::SeqCst), 5);
    }
}
