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
use rlease::{CallContext, DistributedLock, LockClient, LockError, LockOptions, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Create configuration
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let config = StoreConfig::single_server(&url)
        .with_pool_size(4)
        .with_response_timeout(Duration::from_millis(500));

    // 2. Create client
    let client = LockClient::new(config)?;
    let ctx = CallContext::with_timeout(Duration::from_secs(30));

    // 3. Immediate lock with a fixed lease
    let first = client.get_lock_with_options("job-1", LockOptions::new().with_lease_duration(Duration::from_secs(2)));
    let second = client.get_lock_with_options("job-1", LockOptions::new().with_lease_duration(Duration::from_secs(2)));

    first.lock(&ctx).await?;
    match second.lock(&ctx).await {
        Err(LockError::AlreadyHeld) => println!("job-1 is busy"),
        other => println!("unexpected: {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    second.lock(&ctx).await?;
    println!("job-1 taken over after the first lease expired");
    second.unlock(&ctx).await?;

    // 4. Blocking lock kept alive by the watchdog
    let watched = client.get_lock_with_options(
        "job-2",
        LockOptions::new().with_blocking().with_lease_duration(Duration::from_secs(4)).with_watchdog(),
    );
    watched.lock(&ctx).await?;
    tokio::time::sleep(Duration::from_secs(6)).await;
    println!("job-2 lease left after 6s: {:?}", watched.remaining_lease(&ctx).await?);
    watched.unlock(&ctx).await?;

    // 5. Cache passthrough
    let cache = client.get_cache();
    cache.set_expire(&ctx, "greeting", "hello", Duration::from_secs(10)).await?;
    println!("greeting = {:?}", cache.get(&ctx, "greeting").await?.as_string());

    Ok(())
}
