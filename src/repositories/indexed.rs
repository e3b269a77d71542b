use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use redis::{Script, aio::ConnectionManager};

use crate::error::Result;

/// Lua that raises the TTL of the set in `KEYS[index_key]` to
/// `ARGV[ttl_arg]` seconds. A TTL that is already longer is kept.
pub(crate) fn extend_index_lua(index_key: usize, ttl_arg: usize) -> String {
    format!(
        "local index_ttl = redis.call('TTL', KEYS[{k}])\n\
         if index_ttl < tonumber(ARGV[{a}]) then\n\
           redis.call('EXPIRE', KEYS[{k}], ARGV[{a}])\n\
         end\n",
        k = index_key,
        a = ttl_arg
    )
}

// KEYS: record, index. ARGV: value, ttl seconds, index member.
static SAVE_INDEXED: LazyLock<Script> = LazyLock::new(|| {
    Script::new(&format!(
        "redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])\n\
         redis.call('SADD', KEYS[2], ARGV[3])\n\
         {}\
         return 1",
        extend_index_lua(2, 2)
    ))
});

/// Seconds until `expires_at`, never less than one.
pub(crate) fn ttl_secs(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (expires_at - now).num_seconds().max(1) as u64
}

/// Writes `value` under `key` with a TTL and adds `member` to the index set,
/// in one script. The index outlives every record it lists.
pub(crate) async fn save_indexed(
    redis: &ConnectionManager,
    key: &str,
    value: &str,
    index_key: &str,
    member: &str,
    ttl: u64,
) -> Result<()> {
    let mut redis = redis.clone();
    let _: i64 = SAVE_INDEXED
        .key(key)
        .key(index_key)
        .arg(value)
        .arg(ttl)
        .arg(member)
        .invoke_async(&mut redis)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn index_ttl_is_only_ever_raised() {
        let lua = extend_index_lua(3, 2);
        assert!(lua.contains("redis.call('TTL', KEYS[3])"));
        assert!(lua.contains("if index_ttl < tonumber(ARGV[2]) then"));
        assert!(lua.contains("redis.call('EXPIRE', KEYS[3], ARGV[2])"));
        assert!(!lua.contains("GT"));
    }

    #[test]
    fn ttl_is_at_least_one_second() {
        let now = Utc::now();
        assert_eq!(ttl_secs(now + Duration::minutes(2), now), 120);
        assert_eq!(ttl_secs(now, now), 1);
        assert_eq!(ttl_secs(now - Duration::hours(1), now), 1);
    }
}
