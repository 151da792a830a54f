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
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of the ownership token handed to every lock handle.
pub const TOKEN_LEN: usize = 15;

pub fn get_random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Fresh ownership token. Independent of process and thread identity.
pub fn new_token() -> String {
    get_random_string(TOKEN_LEN)
}

/// Redis counts expirations in whole milliseconds.
pub fn num_milliseconds(duration: &Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

pub fn scale_duration(duration: Duration, factor: f64) -> Duration {
    duration.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_alphanumeric_and_distinct() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn lease_ratios() {
        let lease = Duration::from_secs(4);
        assert_eq!(scale_duration(lease, 0.25), Duration::from_secs(1));
        assert_eq!(num_milliseconds(&scale_duration(lease, 0.3)), 1200);
        assert_eq!(num_milliseconds(&scale_duration(lease, 0.75)), 3000);
    }
}
