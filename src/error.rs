//! 错误类型
//!
//! 按关注点分组：provider / 输入校验 / 计数存储 / 配置 / 鉴权，统一收敛到 [`AppError`]。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 内容生成后端错误
    #[error("Provider错误: {0}")]
    Provider(#[from] ProviderError),
    /// 请求参数错误
    #[error("输入错误: {0}")]
    Validation(#[from] ValidationError),
    /// 计数存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 鉴权错误
    #[error("鉴权错误: {0}")]
    Auth(#[from] AuthError),
    /// 请求频率超限
    #[error("请求频率超限: {window} 窗口最多 {limit} 次")]
    RateLimited { window: RateWindow, limit: u64 },
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
    /// 截止时间已过
    #[error("操作超时: {operation} ({secs}秒)")]
    Deadline { operation: String, secs: u64 },
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 限流窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    Hour,
    Day,
}

impl std::fmt::Display for RateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateWindow::Hour => write!(f, "每小时"),
            RateWindow::Day => write!(f, "每日"),
        }
    }
}

/// 内容生成后端错误
#[derive(Debug, Error)]
pub enum ProviderError {
    /// API 调用失败
    #[error("{provider} API调用失败: {message}")]
    ApiCallFailed { provider: String, message: String },
    /// API 返回非成功状态码
    #[error("{provider} API返回错误状态 {status}: {body}")]
    BadStatus {
        provider: String,
        status: u16,
        body: String,
    },
    /// 调用超时
    #[error("{provider} API请求超时 ({secs}秒)")]
    Timeout { provider: String, secs: u64 },
    /// 返回内容为空
    #[error("{provider} 返回内容为空")]
    EmptyContent { provider: String },
    /// 返回内容中找不到 JSON 对象
    #[error("{provider} 返回内容不是有效JSON: {snippet}")]
    InvalidJson { provider: String, snippet: String },
    /// 返回的 JSON 结构不符合要求
    #[error("{provider} 返回结构不完整: {reason}")]
    InvalidShape { provider: String, reason: String },
    /// provider 不可用（未配置 API 密钥）
    #[error("{provider} 不可用: 未配置API密钥")]
    Unavailable { provider: String },
}

/// 输入校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    /// 字段值非法
    #[error("字段 {field} 无效: {reason}")]
    InvalidField { field: String, reason: String },
    /// 检测到 prompt 注入模式
    #[error("字段 {field} 包含不允许的模式")]
    ForbiddenPattern { field: String },
    /// 未知的 provider 名称
    #[error("未知的Provider: {0}")]
    UnknownProvider(String),
    /// 请求体无法解析
    #[error("请求体无效: {0}")]
    InvalidBody(String),
}

/// 计数存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis 命令失败
    #[error("Redis错误: {0}")]
    Redis(#[from] redis::RedisError),
    /// 计数存储不可用
    #[error("计数存储不可用: {0}")]
    Unavailable(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 鉴权错误
#[derive(Debug, Error)]
pub enum AuthError {
    /// 请求未携带密钥
    #[error("缺少请求头 {header}")]
    MissingKey { header: &'static str },
    /// 密钥不匹配
    #[error("请求头 {header} 中的密钥无效")]
    InvalidKey { header: &'static str },
    /// 服务端未配置密钥
    #[error("服务端未配置 {header} 对应的密钥")]
    NotConfigured { header: &'static str },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建字段校验错误
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// 创建 provider 调用失败错误
    pub fn provider_failed(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::Provider(ProviderError::ApiCallFailed {
            provider: provider.into(),
            message: message.to_string(),
        })
    }

    /// 创建 provider 返回结构错误
    pub fn invalid_shape(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Provider(ProviderError::InvalidShape {
            provider: provider.into(),
            reason: reason.into(),
        })
    }

    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(AuthError::MissingKey { .. }) => StatusCode::UNAUTHORIZED,
            AppError::Auth(AuthError::InvalidKey { .. }) => StatusCode::FORBIDDEN,
            AppError::Auth(AuthError::NotConfigured { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Deadline { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_) | AppError::Config(_) | AppError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("❌ 请求处理失败 ({}): {}", status.as_u16(), self);
        } else {
            warn!("⚠️ 请求被拒绝 ({}): {}", status.as_u16(), self);
        }

        // 服务端错误不向客户端暴露内部细节
        let message = match &self {
            AppError::Store(_) | AppError::Config(_) | AppError::Other(_) => {
                "内部服务器错误".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "status_code": status.as_u16(),
            "timestamp": chrono::Local::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::invalid_field("station_name", "empty").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Auth(AuthError::MissingKey { header: "X-API-Key" }).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Auth(AuthError::InvalidKey { header: "X-API-Key" }).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::RateLimited {
                window: RateWindow::Hour,
                limit: 100
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::provider_failed("OpenAI gpt-4o-mini", "boom").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_display_contains_context() {
        let err = AppError::RateLimited {
            window: RateWindow::Day,
            limit: 1000,
        };
        assert!(err.to_string().contains("每日"));
        assert!(err.to_string().contains("1000"));
    }
}
