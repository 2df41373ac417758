//! API 密钥校验

use axum::http::HeaderMap;
use tracing::{debug, error, warn};

use crate::error::{AppResult, AuthError};

/// 公开接口的密钥请求头
pub const PUBLIC_KEY_HEADER: &str = "X-API-Key";
/// 内部（批处理）接口的密钥请求头
pub const INTERNAL_KEY_HEADER: &str = "X-Internal-API-Key";

/// 校验公开接口密钥
///
/// 服务端未配置密钥时视为开发模式，直接放行。
pub fn verify_public_key(expected: Option<&str>, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = expected else {
        debug!("PUBLIC_API_KEY 未配置，开发模式放行");
        return Ok(());
    };
    verify(expected, header_value(headers, PUBLIC_KEY_HEADER), PUBLIC_KEY_HEADER)
}

/// 校验内部接口密钥；服务端未配置密钥时拒绝所有请求
pub fn verify_internal_key(expected: Option<&str>, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = expected else {
        error!("❌ INTERNAL_API_KEY 未配置，内部接口不可用");
        return Err(AuthError::NotConfigured {
            header: INTERNAL_KEY_HEADER,
        }
        .into());
    };
    verify(expected, header_value(headers, INTERNAL_KEY_HEADER), INTERNAL_KEY_HEADER)
}

fn verify(expected: &str, provided: Option<&str>, header: &'static str) -> AppResult<()> {
    match provided {
        None => {
            warn!("❌ 请求未携带 {}", header);
            Err(AuthError::MissingKey { header }.into())
        }
        Some(key) if key != expected => {
            warn!("❌ {} 无效: {}", header, mask_key(key));
            Err(AuthError::InvalidKey { header }.into())
        }
        Some(_) => Ok(()),
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// 日志中只显示前 8 个字符
fn mask_key(key: &str) -> String {
    if key.chars().count() > 8 {
        format!("{}...", key.chars().take(8).collect::<String>())
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_public_key_dev_mode() {
        assert!(verify_public_key(None, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_public_key_checks() {
        assert!(matches!(
            verify_public_key(Some("secret"), &HeaderMap::new()),
            Err(AppError::Auth(AuthError::MissingKey { .. }))
        ));
        assert!(matches!(
            verify_public_key(Some("secret"), &headers("x-api-key", "wrong")),
            Err(AppError::Auth(AuthError::InvalidKey { .. }))
        ));
        assert!(verify_public_key(Some("secret"), &headers("x-api-key", "secret")).is_ok());
    }

    #[test]
    fn test_internal_key_requires_configuration() {
        assert!(matches!(
            verify_internal_key(None, &headers("x-internal-api-key", "anything")),
            Err(AppError::Auth(AuthError::NotConfigured { .. }))
        ));
        assert!(verify_internal_key(Some("batch"), &headers("x-internal-api-key", "batch")).is_ok());
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("abcdefghijkl"), "abcdefgh...");
        assert_eq!(mask_key("short"), "***");
    }
}
