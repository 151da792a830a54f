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

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::context::CallContext;
use crate::errors::{StoreError, StoreResult};
use crate::scripts::{LockScript, ScriptArg};
use crate::store::{KeyTtl, LockStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }

    fn pttl(&self, now: Instant) -> i64 {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(now).as_millis() as i64,
            None => -1,
        }
    }
}

/// In-process [`LockStore`] with expiry driven by the tokio clock.
///
/// Each operation runs under one mutex, which gives the scripts the same
/// all-or-nothing behaviour they have on a Redis server. Only locks that
/// share this instance exclude each other.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    script_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a live key.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        live_entry(&mut entries, key, now).map(|e| e.value.clone())
    }

    /// Unconditional write, for seeding foreign holders.
    pub fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let now = Instant::now();
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Number of scripts evaluated so far.
    pub fn script_calls(&self) -> u64 {
        self.script_calls.load(Ordering::SeqCst)
    }

    fn release(&self, key: &str, token: &str) -> i64 {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let owned = matches!(live_entry(&mut entries, key, now), Some(entry) if entry.value == token);
        if owned {
            entries.remove(key);
            1
        } else {
            0
        }
    }

    fn renew(&self, key: &str, token: &str, threshold_ms: i64, increment_ms: i64) -> i64 {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = match live_entry(&mut entries, key, now) {
            Some(entry) if entry.value == token => entry,
            _ => return 0,
        };
        if entry.pttl(now) > threshold_ms {
            return 1;
        }
        if increment_ms <= 0 {
            // PEXPIRE with a non-positive TTL deletes the key
            entries.remove(key);
            return 1;
        }
        entry.expires_at = now.checked_add(Duration::from_millis(increment_ms as u64));
        1
    }
}

fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn check(ctx: &CallContext) -> StoreResult<()> {
    match ctx.err() {
        Some(cause) => Err(StoreError::Interrupted(cause)),
        None => Ok(()),
    }
}

fn arg_str<'a>(script: LockScript, args: &'a [ScriptArg], index: usize) -> StoreResult<&'a str> {
    args.get(index)
        .and_then(ScriptArg::as_str)
        .ok_or_else(|| StoreError::InvalidArgument(format!("{} script expects a string at ARGV[{}]", script.name(), index + 1)))
}

fn arg_i64(script: LockScript, args: &[ScriptArg], index: usize) -> StoreResult<i64> {
    args.get(index)
        .and_then(ScriptArg::as_i64)
        .ok_or_else(|| StoreError::InvalidArgument(format!("{} script expects a number at ARGV[{}]", script.name(), index + 1)))
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(&self, ctx: &CallContext, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        check(ctx)?;
        if key.is_empty() || value.is_empty() {
            return Err(StoreError::InvalidArgument("key and value must not be empty".to_string()));
        }
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if live_entry(&mut entries, key, now).is_some() {
            return Err(StoreError::KeyExists);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                // beyond the clock's range means never
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn eval_script(&self, ctx: &CallContext, script: LockScript, keys: &[&str], args: &[ScriptArg]) -> StoreResult<i64> {
        check(ctx)?;
        self.script_calls.fetch_add(1, Ordering::SeqCst);
        let key = keys
            .first()
            .ok_or_else(|| StoreError::InvalidArgument(format!("{} script expects KEYS[1]", script.name())))?;
        match script {
            LockScript::Release => Ok(self.release(key, arg_str(script, args, 0)?)),
            LockScript::Renew => Ok(self.renew(
                key,
                arg_str(script, args, 0)?,
                arg_i64(script, args, 1)?,
                arg_i64(script, args, 2)?,
            )),
        }
    }

    async fn get_ttl(&self, ctx: &CallContext, key: &str) -> StoreResult<KeyTtl> {
        check(ctx)?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Ok(match live_entry(&mut entries, key, now) {
            Some(entry) => KeyTtl::from_pttl(entry.pttl(now)),
            None => KeyTtl::Missing,
        })
    }
}
