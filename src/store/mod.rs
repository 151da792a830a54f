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

mod memory;
mod redis;

pub use memory::*;
pub use self::redis::*;

use std::time::Duration;
use async_trait::async_trait;

use crate::context::CallContext;
use crate::errors::StoreResult;
use crate::scripts::{LockScript, ScriptArg};

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    /// The key exists without an expiry.
    Persistent,
    Expires(Duration),
}

impl KeyTtl {
    /// Map a `PTTL` reply.
    pub fn from_pttl(millis: i64) -> Self {
        match millis {
            -2 => KeyTtl::Missing,
            m if m < 0 => KeyTtl::Persistent,
            m => KeyTtl::Expires(Duration::from_millis(m as u64)),
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, KeyTtl::Missing)
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyTtl::Expires(d) => Some(*d),
            _ => None,
        }
    }
}

/// What a lock needs from the shared key-value store.
///
/// Every mutation of a lock key goes through one of these calls; none of
/// them may be emulated with a client-side read followed by a write.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Store `value` under `key` with a TTL, only if `key` is absent.
    /// Fails with [`StoreError::KeyExists`](crate::StoreError::KeyExists) otherwise.
    async fn set_if_absent(&self, ctx: &CallContext, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Run one of the lock scripts atomically and return its integer status.
    async fn eval_script(&self, ctx: &CallContext, script: LockScript, keys: &[&str], args: &[ScriptArg]) -> StoreResult<i64>;

    async fn get_ttl(&self, ctx: &CallContext, key: &str) -> StoreResult<KeyTtl>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pttl_replies() {
        assert_eq!(KeyTtl::from_pttl(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_pttl(-1), KeyTtl::Persistent);
        assert_eq!(KeyTtl::from_pttl(1500).remaining(), Some(Duration::from_millis(1500)));
        assert!(KeyTtl::Persistent.exists());
        assert!(!KeyTtl::Missing.exists());
    }
}
