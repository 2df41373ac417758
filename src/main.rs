use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use subway_story_gateway::infrastructure::{CounterStore, RedisCounterStore};
use subway_story_gateway::models::station;
use subway_story_gateway::server::{self, AppState};
use subway_story_gateway::utils::logging::{self, StartupInfo};
use subway_story_gateway::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(&config.log_format)?;

    // 连接限流存储，失败时只用内存计数
    let counter_store: Option<Arc<dyn CounterStore>> = match config.redis_url.as_deref() {
        Some(url) => match RedisCounterStore::connect(url).await {
            Ok(store) => {
                info!("✅ Redis 连接成功");
                Some(Arc::new(store) as Arc<dyn CounterStore>)
            }
            Err(e) => {
                warn!("⚠️ Redis 连接失败，使用内存计数: {}", e);
                None
            }
        },
        None => None,
    };

    let state = Arc::new(AppState::new(config, counter_store));

    let available: Vec<String> = state
        .registry
        .available_providers()
        .into_iter()
        .filter(|(_, available)| *available)
        .map(|(name, _)| name)
        .collect();
    logging::log_startup(&StartupInfo {
        provider: &state.registry.active_name(),
        available_providers: &available,
        station_count: station::supported_stations().len(),
        bind_addr: &state.config.bind_addr,
        rate_limit_backend: state.rate_limiter.backend_name(),
    });

    server::serve(state).await
}
