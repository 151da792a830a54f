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

use std::time::Duration;
use redis::RedisError;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub type LockResult<T> = std::result::Result<T, LockError>;

/// Why a [`CallContext`](crate::CallContext) stopped accepting work.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Failures raised by a [`LockStore`](crate::LockStore) or the cache passthrough.
#[derive(Error, Debug)]
pub enum StoreError {
    /// `SET ... NX` found the key already present.
    #[error("Key already exists")]
    KeyExists,

    #[error("Redis error: {0}")]
    RedisError(#[from] RedisError),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("No response within {0:?}")]
    ResponseTimeout(Duration),

    #[error("Store call interrupted: {0}")]
    Interrupted(CancelCause),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Lock failed: key is already held")]
    AlreadyHeld,

    #[error("Lock failed: blocking timeout")]
    AcquisitionTimeout,

    #[error("Lock failed: retries used up")]
    RetryExhausted,

    #[error("Lock failed: {0}")]
    Cancelled(#[source] CancelCause),

    #[error("Unlock failed: lock is not owned by this token")]
    OwnershipViolationOnUnlock,

    #[error("Lease renewal failed: lock is not owned by this token")]
    OwnershipViolationOnRenew,

    #[error("Store error: {0}")]
    StoreError(StoreError),
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KeyExists => LockError::AlreadyHeld,
            other => LockError::StoreError(other),
        }
    }
}

impl From<deadpool::managed::PoolError<RedisError>> for StoreError {
    fn from(err: deadpool::managed::PoolError<RedisError>) -> Self {
        StoreError::PoolError(err.to_string())
    }
}

impl From<deadpool::managed::BuildError> for StoreError {
    fn from(err: deadpool::managed::BuildError) -> Self {
        StoreError::PoolError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_exists_surfaces_as_already_held() {
        assert!(matches!(LockError::from(StoreError::KeyExists), LockError::AlreadyHeld));
    }

    #[test]
    fn other_store_failures_are_wrapped_unchanged() {
        let err = LockError::from(StoreError::ResponseTimeout(Duration::from_millis(50)));
        match err {
            LockError::StoreError(StoreError::ResponseTimeout(d)) => assert_eq!(d, Duration::from_millis(50)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancelled_keeps_its_cause_as_source() {
        use std::error::Error as _;
        let err = LockError::Cancelled(CancelCause::DeadlineExceeded);
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("context deadline exceeded"));
    }
}
