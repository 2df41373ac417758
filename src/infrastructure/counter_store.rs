//! 计数存储
//!
//! 限流器只需要三种能力：自增（首次自增时设置过期时间）、读取、删除。
//! [`RedisCounterStore`] 供多实例共享计数，[`MemoryCounterStore`] 是单进程内的回退实现。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;

/// 计数存储
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 用于日志和状态接口的名称
    fn name(&self) -> &'static str;

    /// 计数加一并返回新值；`ttl` 只在计数从 0 变为 1 时生效
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError>;

    /// 读取计数，不存在时为 0
    async fn get(&self, key: &str) -> Result<u64, StoreError>;

    /// 删除若干计数
    async fn delete(&self, keys: &[String]) -> Result<(), StoreError>;
}

struct Counter {
    value: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// 每隔多少次自增清理一次过期计数
const PURGE_INTERVAL: u64 = 256;

/// 进程内计数
///
/// 窗口键带有窗口编号，旧窗口的键不会再被访问，所以自增时定期清理过期条目。
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, Counter>>,
    incr_calls: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前条目数（含未清理的过期条目）
    #[cfg(test)]
    async fn len(&self) -> usize {
        self.counters.lock().await.len()
    }
}

fn purge(counters: &mut HashMap<String, Counter>, now: Instant) {
    let before = counters.len();
    counters.retain(|_, counter| !counter.is_expired(now));
    let removed = before - counters.len();
    if removed > 0 {
        debug!("🧹 清理过期计数: {} 条", removed);
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;

        let calls = self.incr_calls.fetch_add(1, Ordering::Relaxed) + 1;
        if calls % PURGE_INTERVAL == 0 {
            purge(&mut counters, now);
        }

        let counter = counters.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at: None,
        });
        if counter.is_expired(now) {
            counter.value = 0;
            counter.expires_at = None;
        }

        counter.value += 1;
        if counter.value == 1 {
            counter.expires_at = ttl.map(|ttl| now + ttl);
        }
        Ok(counter.value)
    }

    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let counters = self.counters.lock().await;
        Ok(counters
            .get(key)
            .filter(|counter| !counter.is_expired(now))
            .map(|counter| counter.value)
            .unwrap_or(0))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut counters = self.counters.lock().await;
        for key in keys {
            counters.remove(key);
        }
        Ok(())
    }
}

/// Redis 计数
pub struct RedisCounterStore {
    connection: MultiplexedConnection,
}

impl RedisCounterStore {
    /// 连接 Redis，并读取一次总计数确认连接可用
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let mut connection = client.get_multiplexed_async_connection().await?;
        let _: Option<u64> = connection.get(crate::services::rate_limiter::TOTAL_KEY).await?;
        info!("✅ Redis 连接成功: {}", redis_url);
        Ok(Self { connection })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let mut connection = self.connection.clone();
        let count: u64 = connection.incr(key, 1).await?;
        if count == 1 {
            if let Some(ttl) = ttl {
                let _: () = connection.expire(key, ttl.as_secs() as i64).await?;
            }
        }
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let mut connection = self.connection.clone();
        let count: Option<u64> = connection.get(key).await?;
        Ok(count.unwrap_or(0))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection.clone();
        let _: () = connection.del(keys.to_vec()).await?;
        Ok(())
    }
}
