//! Server-side Lua scripts
//!
//! Every mutation of a lock key goes through one of these scripts so that the
//! type check and the mutation happen atomically. A key holding a string is
//! write-locked, a key holding a hash is read-locked (field = owner token,
//! value = hold count); any other type is rejected with `WRONGTYPE`.
//!
//! Reply conventions:
//!
//! | Script            | Reply                                                      |
//! |-------------------|------------------------------------------------------------|
//! | acquire_exclusive | nil when acquired, otherwise remaining TTL in ms           |
//! | acquire_shared    | nil when acquired, otherwise remaining TTL in ms           |
//! | renew             | 1 renewed, 0 not held by the token                         |
//! | release_exclusive | 1 released, 3 key already absent, 0 mismatch               |
//! | release_shared    | 1 released, 2 still held, 3 key already absent, 0 mismatch |

use redis::Script;
use redis::aio::ConnectionLike;
use tracing::debug;

use crate::error::{LockError, Result};

pub const RELEASED: i64 = 1;
pub const STILL_HELD: i64 = 2;
pub const ALREADY_FREE: i64 = 3;
pub const MISMATCH: i64 = 0;

/// Message published on a lock's channel when it may have become free.
pub const RELEASE_MESSAGE: &str = "released";

/// KEYS[1] = lock key, ARGV[1] = owner token, ARGV[2] = lease ms
pub const ACQUIRE_EXCLUSIVE: &str = r#"
local kind = redis.call('type', KEYS[1])['ok']
if kind == 'none' then
    redis.call('set', KEYS[1], ARGV[1], 'px', ARGV[2])
    return nil
end
if kind ~= 'string' and kind ~= 'hash' then
    return redis.error_reply('WRONGTYPE lock key holds a ' .. kind)
end
return redis.call('pttl', KEYS[1])
"#;

/// KEYS[1] = lock key, ARGV[1] = owner token, ARGV[2] = lease ms
pub const ACQUIRE_SHARED: &str = r#"
local kind = redis.call('type', KEYS[1])['ok']
if kind == 'string' then
    return redis.call('pttl', KEYS[1])
end
if kind ~= 'none' and kind ~= 'hash' then
    return redis.error_reply('WRONGTYPE lock key holds a ' .. kind)
end
redis.call('hincrby', KEYS[1], ARGV[1], 1)
if redis.call('pttl', KEYS[1]) < tonumber(ARGV[2]) then
    redis.call('pexpire', KEYS[1], ARGV[2])
end
return nil
"#;

/// KEYS[1] = lock key, ARGV[1] = owner token, ARGV[2] = lease ms
pub const RENEW: &str = r#"
local kind = redis.call('type', KEYS[1])['ok']
local held = false
if kind == 'string' then
    held = redis.call('get', KEYS[1]) == ARGV[1]
elseif kind == 'hash' then
    held = redis.call('hexists', KEYS[1], ARGV[1]) == 1
end
if held then
    redis.call('pexpire', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// KEYS[1] = lock key, KEYS[2] = channel, ARGV[1] = owner token
pub const RELEASE_EXCLUSIVE: &str = r#"
local kind = redis.call('type', KEYS[1])['ok']
if kind == 'none' then
    redis.call('publish', KEYS[2], 'released')
    return 3
end
if kind == 'string' and redis.call('get', KEYS[1]) == ARGV[1] then
    redis.call('del', KEYS[1])
    redis.call('publish', KEYS[2], 'released')
    return 1
end
return 0
"#;

/// KEYS[1] = lock key, KEYS[2] = channel, ARGV[1] = owner token
pub const RELEASE_SHARED: &str = r#"
local kind = redis.call('type', KEYS[1])['ok']
if kind == 'none' then
    redis.call('publish', KEYS[2], 'released')
    return 3
end
if kind == 'string' then
    if redis.call('get', KEYS[1]) == ARGV[1] then
        redis.call('del', KEYS[1])
        redis.call('publish', KEYS[2], 'released')
        return 1
    end
    return 0
end
if kind ~= 'hash' then
    return redis.error_reply('WRONGTYPE lock key holds a ' .. kind)
end
if redis.call('hexists', KEYS[1], ARGV[1]) == 0 then
    return 0
end
if redis.call('hincrby', KEYS[1], ARGV[1], -1) <= 0 then
    redis.call('hdel', KEYS[1], ARGV[1])
end
if redis.call('hlen', KEYS[1]) == 0 then
    redis.call('del', KEYS[1])
    redis.call('publish', KEYS[2], 'released')
    return 1
end
return 2
"#;

/// The five lock scripts, prepared for `EVALSHA`.
pub struct ScriptRegistry {
    pub acquire_exclusive: Script,
    pub acquire_shared: Script,
    pub renew: Script,
    pub release_exclusive: Script,
    pub release_shared: Script,
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self {
            acquire_exclusive: Script::new(ACQUIRE_EXCLUSIVE),
            acquire_shared: Script::new(ACQUIRE_SHARED),
            renew: Script::new(RENEW),
            release_exclusive: Script::new(RELEASE_EXCLUSIVE),
            release_shared: Script::new(RELEASE_SHARED),
        }
    }

    pub fn scripts(&self) -> [(&'static str, &Script); 5] {
        [
            ("acquire_exclusive", &self.acquire_exclusive),
            ("acquire_shared", &self.acquire_shared),
            ("renew", &self.renew),
            ("release_exclusive", &self.release_exclusive),
            ("release_shared", &self.release_shared),
        ]
    }

    /// Load every script into the server's script cache.
    ///
    /// A script the server rejects is a startup failure, reported as
    /// [`LockError::ScriptLoad`].
    pub async fn load<C: ConnectionLike>(&self, conn: &mut C) -> Result<()> {
        for (name, script) in self.scripts() {
            let sha: String = script
                .prepare_invoke()
                .load_async(conn)
                .await
                .map_err(|source| LockError::ScriptLoad {
                    script: name,
                    source,
                })?;
            debug!(script = name, sha = %sha, "Loaded lock script");
        }
        Ok(())
    }
}
