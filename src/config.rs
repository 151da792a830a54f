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

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{StoreError, StoreResult};

/// Lease used when the caller does not pick one. Such leases are always
/// renewed by the watchdog.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(10);
/// Total wait budget of a blocking acquisition.
pub const DEFAULT_BLOCKING_TIMEOUT: Duration = Duration::from_secs(3);
/// Attempts a blocking acquisition makes after the first one failed.
pub const DEFAULT_RETRY_LIMIT: u32 = 5;

const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);
/// Upper bound for every resolved duration, so deadlines derived from them
/// stay representable as an `Instant`.
pub const MAX_DURATION: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Connection settings for the Redis store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `redis://` URL; takes precedence over `host`/`port`
    pub url: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<i64>,
    /// Connection pool size
    pub pool_size: u32,
    /// Wait/create timeout of the pool
    pub connection_timeout: Duration,
    /// Upper bound for a single command round-trip
    pub response_timeout: Duration,
    /// Options applied to locks handed out by the client
    pub lock_options: LockOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "".to_string(),
            host: Some("localhost".to_string()),
            port: Some(6379),
            username: None,
            password: None,
            database: Some(0),
            pool_size: 10,
            connection_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(3),
            lock_options: LockOptions::default(),
        }
    }
}

impl StoreConfig {
    pub fn single_server(address: &str) -> Self {
        Self {
            url: address.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_database(mut self, db: i64) -> Self {
        self.database = Some(db);
        self
    }

    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.pool_size == 0 {
            return Err(StoreError::ConfigError("Pool size cannot be zero".to_string()));
        }
        if self.url.is_empty() && (self.host.is_none() || self.port.is_none()) {
            return Err(StoreError::ConfigError(
                "Single server mode requires either URL or host/port".to_string()
            ));
        }
        Ok(())
    }

    /// Connection URL, built from the parts when no explicit URL was given.
    pub fn connection_url(&self) -> StoreResult<String> {
        self.validate()?;
        if !self.url.is_empty() {
            return Ok(self.url.clone());
        }
        let (host, port) = match (&self.host, self.port) {
            (Some(host), Some(port)) => (host, port),
            _ => return Err(StoreError::ConfigError("Missing host or port".to_string())),
        };
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (None, Some(pass)) => format!(":{}@", pass),
            (Some(user), None) => format!("{}@", user),
            (None, None) => String::new(),
        };
        Ok(format!("redis://{}{}:{}", auth, host, port))
    }
}

/// Caller-facing lock options. Unset fields fall back to defaults in
/// [`LockOptions::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockOptions {
    pub lease_duration: Option<Duration>,
    /// Retry on a fixed schedule instead of failing on the first attempt
    pub blocking: bool,
    pub blocking_timeout: Option<Duration>,
    pub retry_limit: Option<u32>,
    pub retry_interval: Option<Duration>,
    /// Renew the lease even though an explicit duration was given
    pub watchdog_enabled: bool,
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = Some(lease);
        self
    }

    pub fn with_blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = Some(timeout);
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    pub fn with_watchdog(mut self) -> Self {
        self.watchdog_enabled = true;
        self
    }

    /// Fill in defaults. Pure: the same options always resolve to the same config.
    pub fn resolve(&self) -> LockConfig {
        let mut watchdog_enabled = self.watchdog_enabled;
        let lease_duration = match self.lease_duration {
            Some(lease) if !lease.is_zero() => lease.min(MAX_DURATION),
            _ => {
                // an unspecified lease is assumed to need renewal
                watchdog_enabled = true;
                DEFAULT_LEASE_DURATION
            }
        };

        let mode = if self.blocking {
            let timeout = non_zero(self.blocking_timeout)
                .unwrap_or(DEFAULT_BLOCKING_TIMEOUT)
                .min(MAX_DURATION);
            let retry_limit = match self.retry_limit {
                Some(limit) if limit > 0 => limit,
                _ => DEFAULT_RETRY_LIMIT,
            };
            let retry_interval = non_zero(self.retry_interval)
                .map(|interval| interval.min(MAX_DURATION))
                .unwrap_or_else(|| {
                    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX) / u64::from(retry_limit);
                    Duration::from_millis(millis).max(MIN_RETRY_INTERVAL)
                });
            AcquireMode::Blocking(RetryPolicy {
                timeout,
                retry_limit,
                retry_interval,
            })
        } else {
            AcquireMode::Immediate
        };

        LockConfig {
            lease_duration,
            mode,
            watchdog_enabled,
        }
    }
}

fn non_zero(value: Option<Duration>) -> Option<Duration> {
    value.filter(|d| !d.is_zero())
}

/// Retry schedule of a blocking acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retry_limit: u32,
    pub retry_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// One attempt, fail fast.
    Immediate,
    Blocking(RetryPolicy),
}

/// Resolved lock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    lease_duration: Duration,
    mode: AcquireMode,
    watchdog_enabled: bool,
}

impl LockConfig {
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    pub fn mode(&self) -> AcquireMode {
        self.mode
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.mode, AcquireMode::Blocking(_))
    }

    pub fn watchdog_enabled(&self) -> bool {
        self.watchdog_enabled
    }
}
