//! 路由与 handler
//!
//! - 公开接口：`X-API-Key` 校验 + 按客户端限流
//! - 内部接口（批处理系统使用）：`X-Internal-API-Key` 校验
//!
//! 准入提取器写在请求体之前，鉴权失败时不会解析请求体。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::AppResult;
use crate::models::batch::{BatchStoryRequest, BatchStoryResponse, StructureReport, StructureValidationRequest};
use crate::models::station;
use crate::models::story::{
    StoryContinueRequest, StoryContinueResponse, StoryGenerationRequest, StoryGenerationResponse,
};
use crate::server::extract::{ApiJson, InternalAccess, PublicAccess, PublicKey};
use crate::server::AppState;
use crate::services::batch_service::validate_story_structure;
use crate::services::{ClientRateStatus, ProviderTestReport};

type AppStateArc = Arc<AppState>;

pub fn routes() -> Router<AppStateArc> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/providers", get(providers))
        .route("/config", get(config))
        .route("/stations", get(stations))
        .route("/popular-stations", get(popular_stations))
        .route("/generate-story", post(generate_story))
        .route("/continue-story", post(continue_story))
        .route("/test-provider", post(test_provider))
        .route("/generate-complete-story", post(generate_complete_story))
        .route("/validate-story-structure", post(validate_structure))
        .route("/batch/system-status", get(batch_system_status))
        .route("/rate-limit/:client", get(rate_limit_status).delete(reset_rate_limit))
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

// ============================================================================
// 状态
// ============================================================================

async fn root(State(state): State<AppStateArc>) -> Json<Value> {
    Json(json!({
        "message": "Subway Story Gateway",
        "status": "healthy",
        "provider": state.registry.active_name(),
        "timestamp": now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppStateArc>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "current_provider": state.registry.active_name(),
        "available_providers": state.registry.available_providers(),
        "supported_stations": state.story_service.supported_stations().len(),
        "total_requests": state.rate_limiter.total_requests().await,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "timestamp": now(),
    }))
}

async fn providers(State(state): State<AppStateArc>) -> Json<Value> {
    Json(json!({
        "current": state.registry.active_name(),
        "available": state.registry.available_providers(),
        "mock_mode": state.registry.is_mock_active(),
        "fallback_count": state.registry.fallback_count(),
        "settings": {
            "ai_provider": state.config.ai_provider,
            "openai_model": state.config.openai_model,
            "claude_model": state.config.claude_model,
        },
    }))
}

async fn config(State(state): State<AppStateArc>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "ai_provider": config.ai_provider,
        "openai_configured": !config.openai_api_key.trim().is_empty(),
        "claude_configured": !config.claude_api_key.trim().is_empty(),
        "request_limits": {
            "per_hour": config.requests_per_hour,
            "per_day": config.requests_per_day,
        },
        "rate_limit_backend": state.rate_limiter.backend_name(),
    }))
}

// ============================================================================
// 站点
// ============================================================================

async fn stations(State(state): State<AppStateArc>) -> Json<Value> {
    let stations = state.story_service.supported_stations();
    Json(json!({
        "total_count": stations.len(),
        "stations": stations,
        "supported_lines": station::supported_lines(),
    }))
}

async fn popular_stations(State(state): State<AppStateArc>) -> Json<Value> {
    Json(json!({
        "popular_stations": state.story_service.popular_stations().await,
        "total_requests": state.rate_limiter.total_requests().await,
    }))
}

// ============================================================================
// 单页故事
// ============================================================================

async fn generate_story(
    State(state): State<AppStateArc>,
    _access: PublicAccess,
    ApiJson(request): ApiJson<StoryGenerationRequest>,
) -> AppResult<Json<StoryGenerationResponse>> {
    let response = state.story_service.generate_story(&request).await?;
    Ok(Json(response))
}

async fn continue_story(
    State(state): State<AppStateArc>,
    _access: PublicAccess,
    ApiJson(request): ApiJson<StoryContinueRequest>,
) -> AppResult<Json<StoryContinueResponse>> {
    let response = state.story_service.continue_story(&request).await?;
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
struct TestProviderRequest {
    #[serde(default)]
    provider: Option<String>,
}

async fn test_provider(
    State(state): State<AppStateArc>,
    _key: PublicKey,
    body: Option<ApiJson<TestProviderRequest>>,
) -> AppResult<Json<ProviderTestReport>> {
    // 请求体可省略
    let request = body.map(|ApiJson(r)| r).unwrap_or_default();
    let report = state
        .story_service
        .test_provider(request.provider.as_deref())
        .await?;
    Ok(Json(report))
}

// ============================================================================
// 内部接口
// ============================================================================

async fn generate_complete_story(
    State(state): State<AppStateArc>,
    _access: InternalAccess,
    ApiJson(request): ApiJson<BatchStoryRequest>,
) -> AppResult<Json<BatchStoryResponse>> {
    let response = state.batch_service.generate_complete_story(&request).await?;
    Ok(Json(response))
}

async fn validate_structure(
    _access: InternalAccess,
    ApiJson(request): ApiJson<StructureValidationRequest>,
) -> AppResult<Json<StructureReport>> {
    info!("🔍 故事结构校验请求");

    // 未提供 story_data 按空对象处理
    let story = if request.story_data.is_null() {
        json!({})
    } else {
        request.story_data
    };
    Ok(Json(validate_story_structure(&story)))
}

async fn batch_system_status(State(state): State<AppStateArc>) -> Json<Value> {
    Json(json!({
        "ai_server_status": "healthy",
        "current_provider": state.registry.active_name(),
        "available_providers": state.registry.available_providers(),
        "batch_service_ready": true,
        "supported_stations": state.story_service.supported_stations().len(),
        "quality_stats": state.batch_service.stats(),
        "rate_limit_status": {
            "total_requests": state.rate_limiter.total_requests().await,
            "backend": state.rate_limiter.backend_name(),
        },
        "timestamp": now(),
    }))
}

async fn rate_limit_status(
    State(state): State<AppStateArc>,
    _access: InternalAccess,
    Path(client): Path<String>,
) -> AppResult<Json<ClientRateStatus>> {
    Ok(Json(state.rate_limiter.client_status(&client).await))
}

async fn reset_rate_limit(
    State(state): State<AppStateArc>,
    _access: InternalAccess,
    Path(client): Path<String>,
) -> AppResult<Json<ClientRateStatus>> {
    state.rate_limiter.reset_client(&client).await;
    Ok(Json(state.rate_limiter.client_status(&client).await))
}
