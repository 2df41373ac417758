//! HTTP 服务
//!
//! 路由定义在 [`routes`]，密钥校验在 [`auth`]，准入与请求体提取器在 [`extract`]。

pub mod auth;
pub mod extract;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::infrastructure::CounterStore;
use crate::prompt::PromptManager;
use crate::providers::ProviderRegistry;
use crate::services::{BatchService, RateLimiter, StoryService};

/// 各 handler 共享的应用状态
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ProviderRegistry>,
    pub story_service: StoryService,
    pub batch_service: BatchService,
    pub rate_limiter: RateLimiter,
    pub started_at: Instant,
}

impl AppState {
    /// 根据配置组装所有服务
    ///
    /// # 参数
    /// - `config`: 程序配置
    /// - `counter_store`: 限流用的外部计数存储，为 None 时只用内存
    pub fn new(config: Config, counter_store: Option<Arc<dyn CounterStore>>) -> Self {
        let registry = Arc::new(ProviderRegistry::from_config(&config));
        let prompts = Arc::new(PromptManager::load(config.prompt_dir.as_deref()));

        let story_service = StoryService::new(registry.clone(), prompts.clone());
        let batch_service = BatchService::new(
            registry.clone(),
            prompts,
            Duration::from_secs(config.batch_timeout_secs),
        );
        let rate_limiter = RateLimiter::new(
            counter_store,
            config.requests_per_hour,
            config.requests_per_day,
        );

        Self {
            config,
            registry,
            story_service,
            batch_service,
            rate_limiter,
            started_at: Instant::now(),
        }
    }
}

/// 构建路由
pub fn build_router(state: Arc<AppState>) -> Router {
    routes::routes()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// 启动 HTTP 服务，直到进程退出
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.bind_addr.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 开始监听: http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
