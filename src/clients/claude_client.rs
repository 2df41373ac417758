//! Anthropic Claude 客户端（Messages API，直接使用 reqwest）

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ProviderError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Claude 客户端
pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model_name: String,
    max_tokens: u32,
    timeout: Duration,
}

impl ClaudeClient {
    pub fn new(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.llm_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("⚠️ 创建 HTTP 客户端失败，使用默认配置: {}", e);
                reqwest::Client::new()
            });

        Self {
            http,
            api_key: config.claude_api_key.clone(),
            api_base: config.claude_api_base.trim_end_matches('/').to_string(),
            model_name: config.claude_model.clone(),
            max_tokens: config.claude_max_tokens,
            timeout,
        }
    }

    pub fn label(&self) -> String {
        format!("Claude {}", self.model_name)
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// 发送消息请求，返回所有文本块拼接后的内容
    pub async fn chat(&self, user_message: &str, system_message: Option<&str>) -> AppResult<String> {
        let label = self.label();
        if !self.has_credentials() {
            return Err(ProviderError::Unavailable { provider: label }.into());
        }

        debug!("调用 Claude API，模型: {}", self.model_name);

        let body = MessagesRequest {
            model: &self.model_name,
            max_tokens: self.max_tokens,
            temperature: 0.8,
            system: system_message,
            messages: vec![Message {
                role: "user",
                content: user_message,
            }],
        };

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("❌ Claude API 超时 ({}秒)", self.timeout.as_secs());
                    AppError::from(ProviderError::Timeout {
                        provider: label.clone(),
                        secs: self.timeout.as_secs(),
                    })
                } else {
                    warn!("❌ Claude API 调用失败: {}", e);
                    AppError::provider_failed(&label, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("❌ Claude API 返回错误状态: {}", status);
            return Err(ProviderError::BadStatus {
                provider: label,
                status: status.as_u16(),
                body: crate::utils::logging::truncate_text(&body, 200),
            }
            .into());
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::provider_failed(&label, e))?;

        info!(
            "📥 Claude 响应完成，耗时 {:.2}秒",
            started.elapsed().as_secs_f64()
        );

        let text = join_text_blocks(&parsed);
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyContent { provider: label }.into());
        }
        Ok(text.trim().to_string())
    }
}

fn join_text_blocks(response: &MessagesResponse) -> String {
    response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_text_blocks_skips_non_text() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": " 1}"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(join_text_blocks(&response), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_chat_without_key_is_unavailable() {
        let client = ClaudeClient::new(&Config::for_tests());
        let result = client.chat("안녕", None).await;
        assert!(matches!(
            result,
            Err(AppError::Provider(ProviderError::Unavailable { .. }))
        ));
    }
}
