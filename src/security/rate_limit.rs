//! Per-route token-bucket rate limiting.
//!
//! Both limiters run the same algorithm: a bucket holds up to
//! `burstCapacity` tokens, gains `replenishRate` tokens per second and each
//! request takes one. The local limiter keeps buckets in process; the Redis
//! limiter keeps them in the shared cache so every gateway instance draws
//! from the same bucket.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use tokio::time::Instant;

/// Tokens added per second when a route does not say otherwise.
pub const DEFAULT_REPLENISH_RATE: u32 = 10;

/// Bucket size when a route does not say otherwise.
pub const DEFAULT_BURST_CAPACITY: u32 = 20;

/// Result of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Whole tokens left in the bucket after this request.
    pub remaining: u64,
}

/// Admission control keyed by route and resolved request key.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn is_allowed(
        &self,
        route_id: &str,
        key: &str,
        replenish_rate: u32,
        burst_capacity: u32,
    ) -> RateLimitDecision;

    /// Drop state that carries no information any more. Returns how many
    /// buckets were removed.
    fn evict_idle(&self) -> usize {
        0
    }
}

/// One client's bucket on one route, sized by that route's limits.
struct TokenBucket {
    tokens: f64,
    replenish_rate: f64,
    burst_capacity: f64,
    refreshed_at: Instant,
}

impl TokenBucket {
    fn full(replenish_rate: u32, burst_capacity: u32, now: Instant) -> Self {
        let burst_capacity = f64::from(burst_capacity.max(1));
        Self {
            tokens: burst_capacity,
            replenish_rate: f64::from(replenish_rate),
            burst_capacity,
            refreshed_at: now,
        }
    }

    /// Tokens the bucket would hold at `now`.
    fn filled_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.refreshed_at).as_secs_f64();
        (self.tokens + elapsed * self.replenish_rate).min(self.burst_capacity)
    }

    /// A reloaded route may change its limits; the bucket follows.
    fn resize(&mut self, replenish_rate: u32, burst_capacity: u32) {
        self.replenish_rate = f64::from(replenish_rate);
        self.burst_capacity = f64::from(burst_capacity.max(1));
        self.tokens = self.tokens.min(self.burst_capacity);
    }

    fn take(&mut self, now: Instant) -> RateLimitDecision {
        let filled = self.filled_at(now);
        let allowed = filled >= 1.0;
        self.tokens = if allowed { filled - 1.0 } else { filled };
        self.refreshed_at = now;
        RateLimitDecision {
            allowed,
            remaining: self.tokens.floor() as u64,
        }
    }

    /// A full bucket is indistinguishable from a fresh one.
    fn is_full_at(&self, now: Instant) -> bool {
        self.filled_at(now) >= self.burst_capacity
    }
}

/// In-process limiter. Buckets that have refilled are removed by
/// [`RateLimiter::evict_idle`].
#[derive(Default)]
pub struct LocalRateLimiter {
    buckets: DashMap<String, TokenBucket>,
}

impl LocalRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn is_allowed(
        &self,
        route_id: &str,
        key: &str,
        replenish_rate: u32,
        burst_capacity: u32,
    ) -> RateLimitDecision {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(format!("{route_id}.{key}"))
            .or_insert_with(|| TokenBucket::full(replenish_rate, burst_capacity, now));

        bucket.resize(replenish_rate, burst_capacity);
        bucket.take(now)
    }

    fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_full_at(now));
        before.saturating_sub(self.buckets.len())
    }
}

/// Token bucket kept in Redis. Runs as one script so concurrent gateways
/// cannot interleave the read and the write. Time comes from the Redis
/// server, which keeps instances with skewed clocks consistent. Keys expire
/// once the bucket would be full again.
const TOKEN_BUCKET_SCRIPT: &str = r"
redis.replicate_commands()
local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local time = redis.call('TIME')
local now = tonumber(time[1]) + tonumber(time[2]) / 1000000

local ttl = math.ceil(capacity / rate * 2)
if ttl < 1 then ttl = 1 end

local tokens = tonumber(redis.call('GET', KEYS[1]))
if tokens == nil then tokens = capacity end
local refreshed = tonumber(redis.call('GET', KEYS[2]))
if refreshed == nil then refreshed = now end

local filled = math.min(capacity, tokens + math.max(0, now - refreshed) * rate)
local allowed = 0
if filled >= 1 then
    allowed = 1
    filled = filled - 1
end

redis.call('SETEX', KEYS[1], ttl, filled)
redis.call('SETEX', KEYS[2], ttl, now)
return { allowed, math.floor(filled) }
";

/// Limiter shared by every gateway instance through Redis.
///
/// If Redis cannot answer, the request is let through and the failure is
/// logged; an unreachable limiter must not take the gateway down with it.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    script: redis::Script,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: redis::Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }
}

/// `{route.key}` is a hash tag, so both keys land on the same cluster slot.
fn bucket_keys(route_id: &str, key: &str) -> [String; 2] {
    [
        format!("request_rate_limiter.{{{route_id}.{key}}}.tokens"),
        format!("request_rate_limiter.{{{route_id}.{key}}}.timestamp"),
    ]
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn is_allowed(
        &self,
        route_id: &str,
        key: &str,
        replenish_rate: u32,
        burst_capacity: u32,
    ) -> RateLimitDecision {
        let [tokens_key, timestamp_key] = bucket_keys(route_id, key);
        let mut conn = self.conn.clone();

        let reply: redis::RedisResult<(i64, i64)> = self
            .script
            .key(tokens_key)
            .key(timestamp_key)
            .arg(replenish_rate.max(1))
            .arg(burst_capacity.max(1))
            .invoke_async(&mut conn)
            .await;

        match reply {
            Ok((allowed, remaining)) => RateLimitDecision {
                allowed: allowed == 1,
                remaining: remaining.max(0) as u64,
            },
            Err(e) => {
                tracing::warn!(route_id = %route_id, error = %e, "Rate limiter unavailable, allowing request");
                RateLimitDecision {
                    allowed: true,
                    remaining: u64::from(burst_capacity),
                }
            }
        }
    }
}
