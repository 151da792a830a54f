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
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use redis::ToRedisArgs;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::connection::RedisConnectionManager;
use crate::context::CallContext;
use crate::errors::{StoreError, StoreResult};
use crate::store::KeyTtl;
use crate::util::num_milliseconds;

/// Raw reply of a `GET`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    value: Option<Vec<u8>>,
}

impl Reply {
    pub fn new(value: Option<Vec<u8>>) -> Self {
        Self { value }
    }

    /// The key did not exist.
    pub fn is_nil(&self) -> bool {
        self.value.is_none()
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn as_string(&self) -> Option<String> {
        self.value.as_ref().map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Decode a JSON payload written by [`RedisCache::set_json`].
    pub fn to_any<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        match &self.value {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }
}

/// Plain key-value operations forwarded to Redis.
#[derive(Clone)]
pub struct RedisCache {
    connection_manager: Arc<RedisConnectionManager>,
}

impl RedisCache {
    pub fn new(connection_manager: Arc<RedisConnectionManager>) -> Self {
        Self { connection_manager }
    }

    pub async fn set<V>(&self, ctx: &CallContext, key: &str, value: V) -> StoreResult<()>
    where
        V: ToRedisArgs + Send + Sync,
    {
        self.set_expire(ctx, key, value, Duration::ZERO).await
    }

    /// `SET` with a TTL; a zero `expire` stores the key without one.
    pub async fn set_expire<V>(&self, ctx: &CallContext, key: &str, value: V, expire: Duration) -> StoreResult<()>
    where
        V: ToRedisArgs + Send + Sync,
    {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if !expire.is_zero() {
            cmd.arg("PX").arg(num_milliseconds(&expire));
        }
        let _: () = self.connection_manager.query(ctx, &cmd).await?;
        Ok(())
    }

    /// Store a structured value as JSON.
    pub async fn set_json<V: Serialize>(&self, ctx: &CallContext, key: &str, value: &V, expire: Duration) -> StoreResult<()> {
        let json = serde_json::to_vec(value)?;
        self.set_expire(ctx, key, json, expire).await
    }

    pub async fn get(&self, ctx: &CallContext, key: &str) -> StoreResult<Reply> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let value: Option<Vec<u8>> = self.connection_manager.query(ctx, &cmd).await?;
        Ok(Reply::new(value))
    }

    /// Delete keys, returning how many existed.
    pub async fn del(&self, ctx: &CallContext, keys: &[&str]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.connection_manager.query(ctx, &cmd).await
    }

    pub async fn exists(&self, ctx: &CallContext, key: &str) -> StoreResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let n: i64 = self.connection_manager.query(ctx, &cmd).await?;
        Ok(n > 0)
    }

    /// `KEYS pattern`. Walks the whole keyspace on the server.
    pub async fn keys(&self, ctx: &CallContext, pattern: &str) -> StoreResult<Vec<String>> {
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(pattern);
        self.connection_manager.query(ctx, &cmd).await
    }

    /// Reset the TTL of an existing key. `false` when the key is missing.
    pub async fn expire_add(&self, ctx: &CallContext, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(num_milliseconds(&ttl));
        let n: i64 = self.connection_manager.query(ctx, &cmd).await?;
        Ok(n == 1)
    }

    /// Expire an existing key at a wall-clock instant.
    pub async fn expire_at(&self, ctx: &CallContext, key: &str, at: SystemTime) -> StoreResult<bool> {
        let since_epoch = at
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        let mut cmd = redis::cmd("PEXPIREAT");
        cmd.arg(key).arg(num_milliseconds(&since_epoch));
        let n: i64 = self.connection_manager.query(ctx, &cmd).await?;
        Ok(n == 1)
    }

    pub async fn get_expire(&self, ctx: &CallContext, key: &str) -> StoreResult<KeyTtl> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        let millis: i64 = self.connection_manager.query(ctx, &cmd).await?;
        Ok(KeyTtl::from_pttl(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Job {
        id: u64,
        owner: String,
    }

    #[test]
    fn reply_decodes_json() {
        let reply = Reply::new(Some(br#"{"id":7,"owner":"w1"}"#.to_vec()));
        assert!(!reply.is_nil());
        let job: Option<Job> = reply.to_any().unwrap();
        assert_eq!(job, Some(Job { id: 7, owner: "w1".to_string() }));
    }

    #[test]
    fn nil_reply() {
        let reply = Reply::default();
        assert!(reply.is_nil());
        assert_eq!(reply.as_string(), None);
        assert_eq!(reply.to_any::<Job>().unwrap(), None);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let reply = Reply::new(Some(b"not json".to_vec()));
        assert!(matches!(reply.to_any::<Job>(), Err(StoreError::SerializationError(_))));
        assert_eq!(reply.as_string().as_deref(), Some("not json"));
    }

    // Needs a live server: REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn passthrough_against_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let manager = RedisConnectionManager::new(&crate::config::StoreConfig::single_server(&url)).unwrap();
        let cache = RedisCache::new(Arc::new(manager));
        let ctx = CallContext::background();
        let key = format!("rlease:cache:{}", crate::util::new_token());

        cache.set_json(&ctx, &key, &Job { id: 1, owner: "w".into() }, Duration::from_secs(5)).await.unwrap();
        assert!(cache.exists(&ctx, &key).await.unwrap());
        let job: Option<Job> = cache.get(&ctx, &key).await.unwrap().to_any().unwrap();
        assert_eq!(job.map(|j| j.id), Some(1));
        assert!(cache.expire_add(&ctx, &key, Duration::from_secs(30)).await.unwrap());
        assert!(cache.get_expire(&ctx, &key).await.unwrap().remaining().is_some());
        assert_eq!(cache.keys(&ctx, &key).await.unwrap(), vec![key.clone()]);
        assert_eq!(cache.del(&ctx, &[key.as_str()]).await.unwrap(), 1);
        assert!(cache.get(&ctx, &key).await.unwrap().is_nil());
    }
}
