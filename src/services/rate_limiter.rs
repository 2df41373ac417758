//! 请求限流
//!
//! 按客户端标识在固定的小时 / 日窗口内计数，窗口由当前时间戳整除得到：
//! `ratelimit:hour:{client}:{epoch/3600}`、`ratelimit:day:{client}:{epoch/86400}`。
//! 主存储（Redis）出错时，本次检查改在内存存储上进行。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult, RateWindow, StoreError};
use crate::infrastructure::{CounterStore, MemoryCounterStore};

/// 总请求数的键
pub const TOTAL_KEY: &str = "ratelimit:total";

const HOUR_SECS: u64 = 3600;
const DAY_SECS: u64 = 86_400;

/// 单个客户端的限流状态
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClientRateStatus {
    pub client_key: String,
    pub hour_requests: u64,
    pub hour_limit: u64,
    pub hour_remaining: u64,
    pub day_requests: u64,
    pub day_limit: u64,
    pub day_remaining: u64,
    /// 实际使用的存储
    pub backend: &'static str,
}

/// 请求限流器
pub struct RateLimiter {
    primary: Option<Arc<dyn CounterStore>>,
    memory: Arc<MemoryCounterStore>,
    requests_per_hour: u64,
    requests_per_day: u64,
}

impl RateLimiter {
    /// 创建限流器
    ///
    /// # 参数
    /// - `primary`: 外部计数存储，为 None 时只使用内存
    /// - `requests_per_hour` / `requests_per_day`: 窗口上限
    pub fn new(
        primary: Option<Arc<dyn CounterStore>>,
        requests_per_hour: u64,
        requests_per_day: u64,
    ) -> Self {
        Self {
            primary,
            memory: Arc::new(MemoryCounterStore::new()),
            requests_per_hour,
            requests_per_day,
        }
    }

    /// 只使用内存计数
    pub fn in_memory(requests_per_hour: u64, requests_per_day: u64) -> Self {
        Self::new(None, requests_per_hour, requests_per_day)
    }

    /// 当前主存储名称
    pub fn backend_name(&self) -> &'static str {
        self.primary
            .as_ref()
            .map(|store| store.name())
            .unwrap_or_else(|| self.memory.name())
    }

    /// 检查并记录一次请求
    ///
    /// 先检查小时窗口，通过后才计入日窗口；超限返回 [`AppError::RateLimited`]。
    pub async fn check(&self, client_key: &str) -> AppResult<ClientRateStatus> {
        let now = now_secs();

        if let Some(store) = &self.primary {
            match self.check_with(store.as_ref(), client_key, now).await {
                Err(AppError::Store(e)) => {
                    error!("❌ {} 计数失败，改用内存计数: {}", store.name(), e);
                }
                result => return result,
            }
        }

        self.check_with(self.memory.as_ref(), client_key, now).await
    }

    async fn check_with(
        &self,
        store: &dyn CounterStore,
        client_key: &str,
        now: u64,
    ) -> AppResult<ClientRateStatus> {
        let (hour_key, day_key) = window_keys(client_key, now);

        let hour_count = store
            .incr(&hour_key, Some(Duration::from_secs(HOUR_SECS)))
            .await?;
        if hour_count > self.requests_per_hour {
            warn!(
                "🚫 每小时请求超限: {} ({}/{})",
                client_key, hour_count, self.requests_per_hour
            );
            return Err(AppError::RateLimited {
                window: RateWindow::Hour,
                limit: self.requests_per_hour,
            });
        }

        let day_count = store
            .incr(&day_key, Some(Duration::from_secs(DAY_SECS)))
            .await?;
        if day_count > self.requests_per_day {
            warn!(
                "🚫 每日请求超限: {} ({}/{})",
                client_key, day_count, self.requests_per_day
            );
            return Err(AppError::RateLimited {
                window: RateWindow::Day,
                limit: self.requests_per_day,
            });
        }

        store.incr(TOTAL_KEY, None).await?;
        debug!(
            "✅ 限流检查通过: {} (小时: {}, 日: {})",
            client_key, hour_count, day_count
        );

        Ok(self.status(client_key, hour_count, day_count, store.name()))
    }

    /// 查询客户端当前窗口的计数（不计入请求）
    pub async fn client_status(&self, client_key: &str) -> ClientRateStatus {
        let now = now_secs();
        if let Some(store) = &self.primary {
            match self.read_counts(store.as_ref(), client_key, now).await {
                Ok((hour, day)) => return self.status(client_key, hour, day, store.name()),
                Err(e) => warn!("⚠️ 读取 {} 计数失败，改读内存计数: {}", store.name(), e),
            }
        }

        let (hour, day) = self
            .read_counts(self.memory.as_ref(), client_key, now)
            .await
            .unwrap_or((0, 0));
        self.status(client_key, hour, day, self.memory.name())
    }

    async fn read_counts(
        &self,
        store: &dyn CounterStore,
        client_key: &str,
        now: u64,
    ) -> Result<(u64, u64), StoreError> {
        let (hour_key, day_key) = window_keys(client_key, now);
        Ok((store.get(&hour_key).await?, store.get(&day_key).await?))
    }

    /// 清空客户端当前窗口的计数（主存储和内存都清）
    pub async fn reset_client(&self, client_key: &str) {
        let (hour_key, day_key) = window_keys(client_key, now_secs());
        let keys = [hour_key, day_key];

        if let Some(store) = &self.primary {
            if let Err(e) = store.delete(&keys).await {
                error!("❌ 清空 {} 计数失败: {}", store.name(), e);
            }
        }
        // 内存存储不会失败
        let _ = self.memory.delete(&keys).await;
        info!("🔄 已重置限流计数: {}", client_key);
    }

    /// 累计通过的请求数
    pub async fn total_requests(&self) -> u64 {
        if let Some(store) = &self.primary {
            match store.get(TOTAL_KEY).await {
                Ok(total) => return total,
                Err(e) => warn!("⚠️ 读取总请求数失败: {}", e),
            }
        }
        self.memory.get(TOTAL_KEY).await.unwrap_or(0)
    }

    fn status(&self, client_key: &str, hour: u64, day: u64, backend: &'static str) -> ClientRateStatus {
        ClientRateStatus {
            client_key: client_key.to_string(),
            hour_requests: hour,
            hour_limit: self.requests_per_hour,
            hour_remaining: self.requests_per_hour.saturating_sub(hour),
            day_requests: day,
            day_limit: self.requests_per_day,
            day_remaining: self.requests_per_day.saturating_sub(day),
            backend,
        }
    }
}

/// 当前窗口的小时键与日键
pub fn window_keys(client_key: &str, now_secs: u64) -> (String, String) {
    (
        format!("ratelimit:hour:{}:{}", client_key, now_secs / HOUR_SECS),
        format!("ratelimit:day:{}:{}", client_key, now_secs / DAY_SECS),
    )
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
