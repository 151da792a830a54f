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

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::errors::{LockError, LockResult};
use crate::scripts::{LockScript, ScriptArg};
use crate::store::LockStore;
use crate::util::{num_milliseconds, scale_duration};

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;

/// Check four times per lease window.
const CHECK_RATIO: f64 = 0.25;
/// Renew once less than this share of the lease is left.
const RENEW_THRESHOLD_RATIO: f64 = 0.30;
/// Renewals restore this share of the lease.
const RENEW_AMOUNT_RATIO: f64 = 0.75;

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);
const START_YIELDS: u32 = 64;

/// The lease a renewal task keeps alive.
#[derive(Clone)]
pub(crate) struct RenewTarget {
    pub store: Arc<dyn LockStore>,
    pub key: String,
    pub token: String,
    pub lease: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RenewSchedule {
    pub check_interval: Duration,
    pub threshold: Duration,
    pub amount: Duration,
}

impl RenewSchedule {
    pub fn for_lease(lease: Duration) -> Self {
        Self {
            check_interval: scale_duration(lease, CHECK_RATIO).max(MIN_CHECK_INTERVAL),
            threshold: scale_duration(lease, RENEW_THRESHOLD_RATIO),
            amount: scale_duration(lease, RENEW_AMOUNT_RATIO),
        }
    }
}

impl RenewTarget {
    /// One round of the conditional renew script.
    pub async fn renew(&self, ctx: &CallContext, schedule: &RenewSchedule) -> LockResult<()> {
        let args = [
            ScriptArg::from(self.token.as_str()),
            ScriptArg::from(num_milliseconds(&schedule.threshold)),
            ScriptArg::from(num_milliseconds(&schedule.amount)),
        ];
        let status = self.store
            .eval_script(ctx, LockScript::Renew, &[self.key.as_str()], &args)
            .await?;
        if status != 1 {
            return Err(LockError::OwnershipViolationOnRenew);
        }
        Ok(())
    }
}

#[derive(Default)]
struct RenewStats {
    checks: AtomicU64,
    failures: AtomicU64,
}

/// Background lease renewal for one lock handle.
///
/// At most one renewal task runs per watchdog: the task is only spawned
/// after a successful `Stopped -> Running` compare-and-swap, and the task
/// itself stores `Stopped` when it exits.
pub(crate) struct LeaseWatchdog {
    status: Arc<AtomicU8>,
    cancel: Mutex<Option<CancellationToken>>,
    stats: Arc<RenewStats>,
}

impl LeaseWatchdog {
    pub fn new() -> Self {
        Self {
            status: Arc::new(AtomicU8::new(STOPPED)),
            cancel: Mutex::new(None),
            stats: Arc::new(RenewStats::default()),
        }
    }

    /// Spawn the renewal task under a child scope of `ctx`.
    pub async fn start(&self, ctx: &CallContext, target: RenewTarget) {
        let mut attempts = 0u32;
        loop {
            // a task still registered here belongs to an earlier acquisition
            if let Some(stale) = self.cancel.lock().take() {
                stale.cancel();
            }
            if self.status
                .compare_exchange(STOPPED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
            attempts += 1;
            if attempts < START_YIELDS {
                tokio::task::yield_now().await;
            } else {
                sleep(Duration::from_millis(1)).await;
            }
        }

        let scope = ctx.child();
        *self.cancel.lock() = Some(scope.token().clone());

        let schedule = RenewSchedule::for_lease(target.lease);
        debug!(
            key = %target.key,
            check_interval_ms = num_milliseconds(&schedule.check_interval),
            threshold_ms = num_milliseconds(&schedule.threshold),
            amount_ms = num_milliseconds(&schedule.amount),
            "watchdog status stopped -> running"
        );

        let on_exit = StopOnExit {
            status: self.status.clone(),
            key: target.key.clone(),
        };
        let stats = self.stats.clone();
        tokio::spawn(async move {
            let _on_exit = on_exit;
            run(scope, target, schedule, stats).await;
        });
    }

    /// Signal the renewal task to exit. Returns without waiting for it.
    pub fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.status.load(Ordering::Acquire) == RUNNING
    }

    pub fn renew_checks(&self) -> u64 {
        self.stats.checks.load(Ordering::Relaxed)
    }

    pub fn renew_failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }
}

/// Stores `Stopped` when the renewal task ends, including by unwinding.
struct StopOnExit {
    status: Arc<AtomicU8>,
    key: String,
}

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.status.store(STOPPED, Ordering::Release);
        debug!(key = %self.key, "watchdog status running -> stopped");
    }
}

impl Drop for LeaseWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(scope: CallContext, target: RenewTarget, schedule: RenewSchedule, stats: Arc<RenewStats>) {
    let Some(first_check) = Instant::now().checked_add(schedule.check_interval) else {
        scope.done().await;
        return;
    };
    let mut ticker = interval_at(first_check, schedule.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = scope.done() => return,
            _ = ticker.tick() => {}
        }

        stats.checks.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = target.renew(&scope, &schedule).await {
            if scope.err().is_some() {
                return;
            }
            // ownership loss is not fatal; the task keeps going until unlock
            stats.failures.fetch_add(1, Ordering::Relaxed);
            warn!(key = %target.key, error = %err, "lease renewal failed");
        }
    }
}
