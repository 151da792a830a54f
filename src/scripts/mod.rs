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

use once_cell::sync::Lazy;
use redis::{RedisWrite, Script, ToRedisArgs};

/// Delete the lock only when it still carries our token.
///
/// `KEYS[1]` lock key, `ARGV[1]` token. Returns 1 when deleted, 0 otherwise.
pub const RELEASE_LUA: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    else
        return 0
    end
"#;

/// Extend the lease of a lock we still own, once it runs low.
///
/// `KEYS[1]` lock key, `ARGV[1]` token, `ARGV[2]` threshold in ms,
/// `ARGV[3]` new TTL in ms. Returns 0 when the key is gone or owned by
/// someone else, 1 when the lease is still above the threshold, otherwise
/// the result of `PEXPIRE`.
pub const RENEW_LUA: &str = r#"
    local key = KEYS[1]
    local token = ARGV[1]
    local value = redis.call('get', key)
    if (not value or value ~= token) then
        return 0
    end
    if redis.call('pttl', key) > tonumber(ARGV[2]) then
        return 1
    end
    return redis.call('pexpire', key, ARGV[3])
"#;

pub static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(RELEASE_LUA));

pub static RENEW_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(RENEW_LUA));

/// The atomic operations a [`LockStore`](crate::LockStore) must run indivisibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScript {
    Release,
    Renew,
}

impl LockScript {
    pub fn name(&self) -> &'static str {
        match self {
            LockScript::Release => "release",
            LockScript::Renew => "renew",
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            LockScript::Release => RELEASE_LUA,
            LockScript::Renew => RENEW_LUA,
        }
    }

    /// Cached script, sent as `EVALSHA` with an `EVAL` fallback.
    pub fn script(&self) -> &'static Script {
        match self {
            LockScript::Release => &RELEASE_SCRIPT,
            LockScript::Renew => &RENEW_SCRIPT,
        }
    }
}

/// A single `ARGV` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptArg {
    Str(String),
    Int(i64),
}

impl ScriptArg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptArg::Str(s) => Some(s),
            ScriptArg::Int(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScriptArg::Int(i) => Some(*i),
            ScriptArg::Str(s) => s.parse().ok(),
        }
    }
}

impl From<&str> for ScriptArg {
    fn from(value: &str) -> Self {
        ScriptArg::Str(value.to_string())
    }
}

impl From<String> for ScriptArg {
    fn from(value: String) -> Self {
        ScriptArg::Str(value)
    }
}

impl From<i64> for ScriptArg {
    fn from(value: i64) -> Self {
        ScriptArg::Int(value)
    }
}

impl ToRedisArgs for ScriptArg {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            ScriptArg::Str(s) => s.write_redis_args(out),
            ScriptArg::Int(i) => i.write_redis_args(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_cached_per_kind() {
        assert_eq!(LockScript::Release.script().get_hash(), Script::new(RELEASE_LUA).get_hash());
        assert_ne!(LockScript::Release.script().get_hash(), LockScript::Renew.script().get_hash());
        assert_eq!(LockScript::Renew.source(), RENEW_LUA);
    }

    #[test]
    fn numeric_args_parse_from_either_form() {
        assert_eq!(ScriptArg::from(1200i64).as_i64(), Some(1200));
        assert_eq!(ScriptArg::from("1200").as_i64(), Some(1200));
        assert_eq!(ScriptArg::from("token").as_str(), Some("token"));
        assert_eq!(ScriptArg::from(3i64).as_str(), None);
    }
}
