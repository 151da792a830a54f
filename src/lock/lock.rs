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

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tracing::debug;

use crate::config::{LockConfig, LockOptions};
use crate::context::CallContext;
use crate::errors::{LockError, LockResult};
use crate::lock::watchdog::{LeaseWatchdog, RenewTarget};
use crate::lock::DistributedLock;
use crate::scripts::{LockScript, ScriptArg};
use crate::store::{KeyTtl, LockStore};
use crate::util::new_token;

/// Lock handle for one key.
///
/// The handle owns a random token, generated once, that is the only proof
/// of ownership the store recognises: `unlock` and the watchdog both refuse
/// to touch a key whose value is not this token. The handle does not track
/// whether the remote lease still exists, only whether its own watchdog is
/// running.
///
/// A lost lease is not reported to the holder. If the watchdog finds the
/// key gone or re-acquired by another token, it logs a warning, bumps
/// [`renew_failures`](Self::renew_failures) and keeps running until the
/// handle is unlocked or dropped.
pub struct RLock {
    key: String,
    token: String,
    config: LockConfig,
    store: Arc<dyn LockStore>,
    watchdog: LeaseWatchdog,
}

impl RLock {
    pub fn new(key: &str, store: Arc<dyn LockStore>, options: &LockOptions) -> Self {
        Self {
            key: key.to_string(),
            token: new_token(),
            config: options.resolve(),
            store,
            watchdog: LeaseWatchdog::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// Time left on the remote lease, whoever holds it.
    pub async fn remaining_lease(&self, ctx: &CallContext) -> LockResult<Option<Duration>> {
        let ttl = self.store.get_ttl(ctx, &self.key).await?;
        Ok(match ttl {
            KeyTtl::Expires(d) => Some(d),
            KeyTtl::Persistent | KeyTtl::Missing => None,
        })
    }

    pub fn is_watchdog_running(&self) -> bool {
        self.watchdog.is_running()
    }

    /// Renewal checks performed by the watchdog so far.
    pub fn renew_checks(&self) -> u64 {
        self.watchdog.renew_checks()
    }

    /// Renewal checks that failed, through lost ownership or store errors.
    pub fn renew_failures(&self) -> u64 {
        self.watchdog.renew_failures()
    }

    fn renew_target(&self) -> RenewTarget {
        RenewTarget {
            store: self.store.clone(),
            key: self.key.clone(),
            token: self.token.clone(),
            lease: self.config.lease_duration(),
        }
    }
}

#[async_trait]
impl DistributedLock for RLock {
    async fn lock(&self, ctx: &CallContext) -> LockResult<()> {
        self.acquire(ctx).await?;
        debug!(key = %self.key, "lock acquired");

        if self.config.watchdog_enabled() {
            self.watchdog.start(ctx, self.renew_target()).await;
        }
        Ok(())
    }

    async fn unlock(&self, ctx: &CallContext) -> LockResult<()> {
        let released = self.store
            .eval_script(ctx, LockScript::Release, &[self.key.as_str()], &[ScriptArg::from(self.token.as_str())])
            .await?;
        if released != 1 {
            // expired, taken over, or never acquired
            return Err(LockError::OwnershipViolationOnUnlock);
        }
        debug!(key = %self.key, "lock released");

        if self.config.watchdog_enabled() {
            self.watchdog.stop();
        }
        Ok(())
    }
}
