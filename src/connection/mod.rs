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

use deadpool::managed::{Metrics, Object, Pool, RecycleError, RecycleResult, Timeouts};
use deadpool::Runtime;
use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd, FromRedisValue, RedisResult, ScriptInvocation};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::StoreConfig;
use crate::context::CallContext;
use crate::errors::{CancelCause, StoreError, StoreResult};

type RedisPool = Pool<SingleRedisConnectionManager>;

pub type PooledConnection = Object<SingleRedisConnectionManager>;

/// Creates and health-checks multiplexed connections for the pool.
pub struct SingleRedisConnectionManager {
    client: Client,
    database: Option<i64>,
}

#[async_trait::async_trait]
impl deadpool::managed::Manager for SingleRedisConnectionManager {
    type Type = MultiplexedConnection;
    type Error = redis::RedisError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        if let Some(db) = self.database {
            let _: () = redis::cmd("SELECT").arg(db).query_async(&mut conn).await?;
        }

        Ok(conn)
    }

    async fn recycle(&self, conn: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Self::Error> {
        let pong: RedisResult<String> = redis::cmd("PING").query_async(conn).await;
        match pong {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(_) => Err(RecycleError::Message("Invalid PONG response".into())),
            Err(e) => Err(RecycleError::Backend(e)),
        }
    }
}

/// Pooled access to a single Redis server.
///
/// Every command runs under the caller's [`CallContext`] and the configured
/// response timeout, whichever fires first.
pub struct RedisConnectionManager {
    pool: RedisPool,
    response_timeout: Duration,
}

impl RedisConnectionManager {
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let url = config.connection_url()?;
        let client = Client::open(url.as_str())
            .map_err(|e| StoreError::ConfigError(e.to_string()))?;

        let manager = SingleRedisConnectionManager {
            client,
            database: config.database,
        };

        let pool = Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .timeouts(Timeouts {
                wait: Some(config.connection_timeout),
                create: Some(config.connection_timeout),
                recycle: Some(Duration::from_secs(5)),
            })
            .runtime(Runtime::Tokio1)
            .build()?;

        Ok(Self {
            pool,
            response_timeout: config.response_timeout,
        })
    }

    pub async fn get_connection(&self, ctx: &CallContext) -> StoreResult<PooledConnection> {
        if let Some(cause) = ctx.err() {
            return Err(StoreError::Interrupted(cause));
        }
        tokio::select! {
            biased;
            _ = ctx.done() => Err(interrupted(ctx)),
            conn = self.pool.get() => Ok(conn?),
        }
    }

    pub async fn query<T: FromRedisValue>(&self, ctx: &CallContext, cmd: &Cmd) -> StoreResult<T> {
        let mut conn = self.get_connection(ctx).await?;
        self.guard(ctx, cmd.query_async(&mut *conn)).await
    }

    pub async fn invoke<T: FromRedisValue>(&self, ctx: &CallContext, invocation: &ScriptInvocation<'_>) -> StoreResult<T> {
        let mut conn = self.get_connection(ctx).await?;
        self.guard(ctx, invocation.invoke_async(&mut *conn)).await
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn guard<T, F>(&self, ctx: &CallContext, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        tokio::select! {
            biased;
            _ = ctx.done() => Err(interrupted(ctx)),
            res = timeout(self.response_timeout, fut) => match res {
                Ok(reply) => Ok(reply?),
                Err(_) => Err(StoreError::ResponseTimeout(self.response_timeout)),
            },
        }
    }
}

fn interrupted(ctx: &CallContext) -> StoreError {
    StoreError::Interrupted(ctx.err().unwrap_or(CancelCause::Cancelled))
}
