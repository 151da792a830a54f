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

use crate::connection::RedisConnectionManager;
use crate::context::CallContext;
use crate::errors::{StoreError, StoreResult};
use crate::scripts::{LockScript, ScriptArg};
use crate::store::{KeyTtl, LockStore};
use crate::util::num_milliseconds;

/// [`LockStore`] backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: Arc<RedisConnectionManager>,
}

impl RedisStore {
    pub fn new(connection_manager: Arc<RedisConnectionManager>) -> Self {
        Self { connection_manager }
    }

    pub fn connection_manager(&self) -> &Arc<RedisConnectionManager> {
        &self.connection_manager
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(&self, ctx: &CallContext, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        if key.is_empty() || value.is_empty() {
            return Err(StoreError::InvalidArgument("key and value must not be empty".to_string()));
        }
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(num_milliseconds(&ttl)).arg("NX");

        // NX answers nil when the key is taken
        let reply: Option<String> = self.connection_manager.query(ctx, &cmd).await?;
        match reply {
            Some(_) => Ok(()),
            None => Err(StoreError::KeyExists),
        }
    }

    async fn eval_script(&self, ctx: &CallContext, script: LockScript, keys: &[&str], args: &[ScriptArg]) -> StoreResult<i64> {
        let mut invocation = script.script().prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(arg);
        }
        self.connection_manager.invoke(ctx, &invocation).await
    }

    async fn get_ttl(&self, ctx: &CallContext, key: &str) -> StoreResult<KeyTtl> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        let millis: i64 = self.connection_manager.query(ctx, &cmd).await?;
        Ok(KeyTtl::from_pttl(millis))
    }
}
