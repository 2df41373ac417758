//! OpenAI 聊天客户端
//!
//! 使用 `async-openai`，兼容任何 OpenAI API 风格的服务（通过 `OPENAI_API_BASE` 指定）。

use std::time::{Duration, Instant};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ProviderError};

/// OpenAI 客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
    timeout: Duration,
    has_key: bool,
}

impl OpenAiClient {
    /// 创建新的 OpenAI 客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_api_base);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.openai_model.clone(),
            max_tokens: config.openai_max_tokens,
            timeout: Duration::from_secs(config.llm_timeout_secs),
            has_key: !config.openai_api_key.trim().is_empty(),
        }
    }

    /// 日志与响应中使用的名称
    pub fn label(&self) -> String {
        format!("OpenAI {}", self.model_name)
    }

    /// 是否配置了 API 密钥
    pub fn has_credentials(&self) -> bool {
        self.has_key
    }

    /// 发送聊天请求
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（已去除首尾空白）
    pub async fn chat(&self, user_message: &str, system_message: Option<&str>) -> AppResult<String> {
        let label = self.label();
        if !self.has_key {
            return Err(ProviderError::Unavailable { provider: label }.into());
        }

        debug!("调用 OpenAI API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.chars().count());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| AppError::provider_failed(&label, e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| AppError::provider_failed(&label, e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.8)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| AppError::provider_failed(&label, e))?;

        let started = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                warn!("❌ OpenAI API 超时 ({}秒)", self.timeout.as_secs());
                ProviderError::Timeout {
                    provider: label.clone(),
                    secs: self.timeout.as_secs(),
                }
            })?
            .map_err(|e| {
                warn!("❌ OpenAI API 调用失败: {}", e);
                AppError::provider_failed(&label, e)
            })?;

        info!(
            "📥 OpenAI 响应完成，耗时 {:.2}秒",
            started.elapsed().as_secs_f64()
        );

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProviderError::EmptyContent { provider: label })?;

        Ok(content.trim().to_string())
    }
}
