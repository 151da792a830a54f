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

//! Distributed mutual exclusion on top of Redis.
//!
//! A lock is a single key holding a random per-handle token with a TTL.
//! Acquisition is one `SET key token PX ttl NX`; release and renewal are Lua
//! scripts that only act when the stored value is still the caller's token.
//! Handles can either fail fast or retry on a fixed schedule, and can keep
//! their lease alive with a background watchdog.
//!
//! ```rust,ignore
//! let client = LockClient::new(StoreConfig::single_server("redis://127.0.0.1:6379"))?;
//! let lock = client.get_lock_with_options("job-1", LockOptions::new().with_blocking());
//! let ctx = CallContext::background();
//!
//! lock.lock(&ctx).await?;
//! // critical section
//! lock.unlock(&ctx).await?;
//! ```
//!
//! The watchdog runs under a child of the context passed to `lock`, so a
//! deadline or cancellation on that context also ends lease renewal.

mod config;
mod context;
mod errors;
mod util;
mod scripts;
mod store;
mod connection;
mod cache;
mod lock;
mod client;

pub use config::*;
pub use context::*;
pub use errors::*;
pub use util::*;
pub use scripts::*;
pub use store::*;
pub use connection::*;
pub use cache::*;
pub use lock::*;
pub use client::*;
