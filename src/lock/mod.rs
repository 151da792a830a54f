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

mod acquire;
mod lock;
mod watchdog;

pub use lock::*;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::errors::LockResult;

/// Mutual exclusion across processes.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Acquire the lock. Immediate locks fail fast, blocking locks retry on
    /// their schedule until `ctx` is done or their budget runs out.
    async fn lock(&self, ctx: &CallContext) -> LockResult<()>;

    /// Release the lock if this handle still owns it.
    async fn unlock(&self, ctx: &CallContext) -> LockResult<()>;
}
