//! Pluggable request-rate counters
//!
//! The public API scope admits requests through a [`RequestCounter`] before
//! any credential verification happens, which keeps brute-force traffic away
//! from the Argon2 budget. Two backends are provided:
//!
//! - [`MemoryCounter`]: governor quotas keyed per scope in a `DashMap`.
//!   Process-local; counters are NOT shared across instances, so this backend
//!   is only correct for single-instance deployments.
//! - [`RedisCounter`]: atomic sliding-window counting via a Redis Lua script
//!   (1-hour window, 1-minute buckets). Safe for horizontal scaling and fails
//!   open when Redis is unreachable.

use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use redis::{aio::ConnectionManager, Script};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

/// Scope a counter bucket is keyed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateScope {
    /// Per client IP (pre-authentication admission)
    Ip(String),
    /// Per API key (post-authentication quotas)
    Key(i64),
}

impl RateScope {
    /// Storage key prefix for this scope
    pub fn key_prefix(&self) -> String {
        match self {
            RateScope::Ip(ip) => format!("rl:ip:{}", ip),
            RateScope::Key(id) => format!("rl:key:{}", id),
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone)]
pub struct RateDecision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// The configured limit (requests per window)
    pub limit: i64,
    /// Remaining quota, when the backend can report it
    pub remaining: Option<i64>,
    /// Seconds until the caller should retry (0 when allowed)
    pub retry_after_secs: i64,
}

impl RateDecision {
    fn admitted(limit: i64, remaining: Option<i64>) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after_secs: 0,
        }
    }
}

/// A counter that admits or rejects a request for a scope
///
/// Implementations must be safe for concurrent use; one counter instance is
/// shared across all request-handling tasks.
#[async_trait]
pub trait RequestCounter: Send + Sync {
    /// Check the limit for `scope` and consume one unit if admitted
    async fn check(&self, scope: &RateScope, limit: u32) -> Result<RateDecision>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Upper bound on tracked scopes before idle buckets are dropped
const MAX_TRACKED_SCOPES: usize = 100_000;

/// In-process counter backed by governor quotas
///
/// One limiter per scope key, created lazily. State lives for the lifetime of
/// the process and is invisible to other instances.
pub struct MemoryCounter {
    limiters: DashMap<String, Arc<DirectLimiter>>,
    clock: DefaultClock,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self {
            limiters: DashMap::new(),
            clock: DefaultClock::default(),
        }
    }

    fn limiter_for(&self, key: &str, limit: u32) -> Arc<DirectLimiter> {
        self.limiters
            .entry(key.to_string())
            .or_insert_with(|| {
                let per_hour = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
                Arc::new(RateLimiter::direct(Quota::per_hour(per_hour)))
            })
            .clone()
    }

    /// Drop limiters beyond `max_entries` to bound memory on long uptimes
    fn evict_to(&self, max_entries: usize) {
        if self.limiters.len() <= max_entries {
            return;
        }
        let excess = self.limiters.len() - max_entries;
        let stale: Vec<String> = self
            .limiters
            .iter()
            .take(excess)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &stale {
            self.limiters.remove(key);
        }
        debug!(removed = stale.len(), "Evicted idle rate-limit buckets");
    }
}

impl Default for MemoryCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestCounter for MemoryCounter {
    async fn check(&self, scope: &RateScope, limit: u32) -> Result<RateDecision> {
        if self.limiters.len() >= MAX_TRACKED_SCOPES {
            self.evict_to(MAX_TRACKED_SCOPES / 2);
        }
        let limiter = self.limiter_for(&scope.key_prefix(), limit);
        match limiter.check() {
            Ok(()) => Ok(RateDecision::admitted(limit as i64, None)),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now()).as_secs() as i64;
                Ok(RateDecision {
                    allowed: false,
                    limit: limit as i64,
                    remaining: Some(0),
                    retry_after_secs: retry_after.max(1),
                })
            }
        }
    }
}

/// Sliding-window window size in seconds (1 hour, 60 one-minute buckets)
const WINDOW_SECONDS: i64 = 3600;

/// Atomic check-and-increment over minute buckets.
/// Returns {allowed, usage, limit, reset_at}.
const COUNTER_SCRIPT: &str = r#"
local prefix = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local minute = math.floor(now / 60) * 60
local total = 0
for i = 0, (window / 60) - 1 do
    local count = redis.call('GET', prefix .. ':' .. (minute - i * 60))
    if count then
        total = total + tonumber(count)
    end
end
local reset_at = minute + window
if total >= limit then
    return {0, total, limit, reset_at}
end
local bucket = prefix .. ':' .. minute
redis.call('INCRBY', bucket, 1)
redis.call('EXPIRE', bucket, window + 60)
return {1, total + 1, limit, reset_at}
"#;

/// Redis-backed sliding-window counter
#[derive(Clone)]
pub struct RedisCounter {
    redis: ConnectionManager,
    script: Script,
    /// Whether to admit requests when Redis is unavailable
    fail_open: bool,
}

impl RedisCounter {
    /// Connect to Redis and prepare the counting script
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::config(format!("Invalid Redis URL: {}", e)))?;
        let redis = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::internal(format!("Redis connection failed: {}", e)))?;

        debug!("Redis request counter connected");

        Ok(Self {
            redis,
            script: Script::new(COUNTER_SCRIPT),
            fail_open: true,
        })
    }

    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }
}

#[async_trait]
impl RequestCounter for RedisCounter {
    async fn check(&self, scope: &RateScope, limit: u32) -> Result<RateDecision> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::internal(format!("System time error: {}", e)))?
            .as_secs() as i64;

        let mut conn = self.redis.clone();
        let result = self
            .script
            .key(scope.key_prefix())
            .arg(limit as i64)
            .arg(WINDOW_SECONDS)
            .arg(now)
            .invoke_async::<Vec<i64>>(&mut conn)
            .await;

        match result {
            Ok(response) if response.len() == 4 => {
                let allowed = response[0] == 1;
                let usage = response[1];
                let reset_at = response[3];
                if !allowed {
                    warn!(
                        scope = %scope.key_prefix(),
                        usage = usage,
                        limit = limit,
                        "Rate limit exceeded"
                    );
                }
                Ok(RateDecision {
                    allowed,
                    limit: limit as i64,
                    remaining: Some((limit as i64 - usage).max(0)),
                    retry_after_secs: if allowed { 0 } else { (reset_at - now).max(1) },
                })
            }
            Ok(response) => Err(Error::internal(format!(
                "Unexpected counter script response: {:?}",
                response
            ))),
            Err(e) => {
                error!(scope = %scope.key_prefix(), error = %e, "Redis error during rate check");
                if self.fail_open {
                    warn!("Redis unavailable, failing open (admitting request)");
                    Ok(RateDecision::admitted(limit as i64, None))
                } else {
                    Err(Error::internal(format!("Rate counter unavailable: {}", e)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_key_prefix() {
        assert_eq!(
            RateScope::Ip("192.168.1.1".to_string()).key_prefix(),
            "rl:ip:192.168.1.1"
        );
        assert_eq!(RateScope::Key(42).key_prefix(), "rl:key:42");
    }

    #[tokio::test]
    async fn test_memory_counter_admits_within_limit() {
        let counter = MemoryCounter::new();
        let scope = RateScope::Ip("10.0.0.1".to_string());

        let decision = counter.check(&scope, 5).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.limit, 5);
    }

    #[tokio::test]
    async fn test_memory_counter_rejects_over_limit() {
        let counter = MemoryCounter::new();
        let scope = RateScope::Ip("10.0.0.2".to_string());

        // governor allows an initial burst equal to the quota
        for _ in 0..2 {
            assert!(counter.check(&scope, 2).await.unwrap().allowed);
        }
        let decision = counter.check(&scope, 2).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs >= 1);
    }

    #[tokio::test]
    async fn test_memory_counter_scopes_are_independent() {
        let counter = MemoryCounter::new();
        let first = RateScope::Ip("10.0.0.3".to_string());
        let second = RateScope::Ip("10.0.0.4".to_string());

        assert!(counter.check(&first, 1).await.unwrap().allowed);
        assert!(!counter.check(&first, 1).await.unwrap().allowed);
        assert!(counter.check(&second, 1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_memory_counter_key_scope() {
        let counter = MemoryCounter::new();
        let scope = RateScope::Key(7);

        assert!(counter.check(&scope, 1).await.unwrap().allowed);
        assert!(!counter.check(&scope, 1).await.unwrap().allowed);
    }

    #[test]
    fn test_evict_to_bounds_entries() {
        let counter = MemoryCounter::new();
        for i in 0..100 {
            counter.limiter_for(&format!("rl:ip:10.1.0.{}", i), 10);
        }
        counter.evict_to(50);
        assert!(counter.limiters.len() <= 50);
    }

    #[tokio::test]
    async fn test_check_evicts_when_scope_map_is_full() {
        let counter = MemoryCounter::new();
        for i in 0..MAX_TRACKED_SCOPES {
            counter.limiter_for(&format!("rl:ip:{}", i), 10);
        }

        let fresh = RateScope::Ip("198.51.100.9".to_string());
        let decision = counter.check(&fresh, 10).await.unwrap();
        assert!(decision.allowed);
        assert!(counter.limiters.len() <= MAX_TRACKED_SCOPES / 2 + 1);
    }
}
