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
use tracing::info;

use crate::cache::RedisCache;
use crate::config::{LockOptions, StoreConfig};
use crate::connection::RedisConnectionManager;
use crate::errors::StoreResult;
use crate::lock::RLock;
use crate::store::RedisStore;

/// Entry point: one connection pool, any number of lock handles.
pub struct LockClient {
    config: StoreConfig,
    connection_manager: Arc<RedisConnectionManager>,
    store: Arc<RedisStore>,
}

impl LockClient {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let connection_manager = Arc::new(RedisConnectionManager::new(&config)?);
        let store = Arc::new(RedisStore::new(connection_manager.clone()));
        info!(pool_size = config.pool_size, "lock client created");

        Ok(Self {
            config,
            connection_manager,
            store,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<RedisStore> {
        self.store.clone()
    }

    /// Lock handle using the client's default options.
    pub fn get_lock(&self, key: &str) -> RLock {
        self.get_lock_with_options(key, self.config.lock_options.clone())
    }

    pub fn get_lock_with_options(&self, key: &str, options: LockOptions) -> RLock {
        RLock::new(key, self.store.clone(), &options)
    }

    pub fn get_cache(&self) -> RedisCache {
        RedisCache::new(self.connection_manager.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::errors::StoreError;

    // Pool creation is lazy, so no server is needed here.
    #[tokio::test]
    async fn handles_inherit_default_options() {
        let config = StoreConfig::single_server("redis://127.0.0.1:6379")
            .with_lock_options(LockOptions::new().with_blocking().with_lease_duration(Duration::from_secs(3)));
        let client = LockClient::new(config).unwrap();

        let lock = client.get_lock("orders");
        assert_eq!(lock.key(), "orders");
        assert!(lock.config().is_blocking());
        assert_eq!(lock.config().lease_duration(), Duration::from_secs(3));

        let custom = client.get_lock_with_options("orders", LockOptions::new());
        assert!(!custom.config().is_blocking());
        assert_ne!(lock.token(), custom.token());
    }

    #[tokio::test]
    async fn pool_starts_empty_with_configured_timeout() {
        let config = StoreConfig::single_server("redis://127.0.0.1:6379")
            .with_response_timeout(Duration::from_millis(750));
        let client = LockClient::new(config).unwrap();

        assert_eq!(client.connection_manager.response_timeout(), Duration::from_millis(750));
        assert_eq!(client.connection_manager.pool_size(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = LockClient::new(StoreConfig::single_server("redis://127.0.0.1").with_pool_size(0));
        assert!(matches!(err, Err(StoreError::ConfigError(_))));
    }
}
