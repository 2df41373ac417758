//! 自定义提取器
//!
//! 鉴权和限流只读取请求头，在解析请求体之前执行；
//! 请求体解析失败统一转成 [`AppError`]，和其他错误使用同一种响应格式。

use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::{AppError, ValidationError};
use crate::server::auth::{verify_internal_key, verify_public_key};
use crate::server::AppState;

/// JSON 请求体
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ValidationError::InvalidBody(rejection.body_text()).into()),
        }
    }
}

/// 公开接口准入：校验 `X-API-Key` 并计入限流
pub struct PublicAccess;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for PublicAccess {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        verify_public_key(state.config.public_api_key.as_deref(), &parts.headers)?;
        let client = client_key(
            &parts.headers,
            parts.extensions.get::<ConnectInfo<SocketAddr>>(),
            state.config.trust_forwarded_for,
        );
        state.rate_limiter.check(&client).await?;
        Ok(Self)
    }
}

/// 只校验 `X-API-Key`，不计入限流
pub struct PublicKey;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for PublicKey {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        verify_public_key(state.config.public_api_key.as_deref(), &parts.headers)?;
        Ok(Self)
    }
}

/// 内部接口准入：校验 `X-Internal-API-Key`
pub struct InternalAccess;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for InternalAccess {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        verify_internal_key(state.config.internal_api_key.as_deref(), &parts.headers)?;
        Ok(Self)
    }
}

/// 限流用的客户端标识
///
/// 默认使用连接地址；`trust_forwarded_for` 开启时优先取 `X-Forwarded-For` 的第一个地址。
pub fn client_key(
    headers: &HeaderMap,
    connect: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .flatten();

    forwarded
        .or_else(|| connect.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
