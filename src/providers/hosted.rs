//! 托管 LLM 后端（OpenAI / Claude）

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{GenerationRequest, GenerationTask, ProviderKind, StoryProvider};
use crate::clients::{ClaudeClient, OpenAiClient};
use crate::error::{AppResult, ProviderError};
use crate::utils::logging::truncate_text;

enum Backend {
    OpenAi(OpenAiClient),
    Claude(ClaudeClient),
}

/// 托管 LLM 后端
pub struct HostedProvider {
    backend: Backend,
}

impl HostedProvider {
    pub fn openai(client: OpenAiClient) -> Self {
        Self {
            backend: Backend::OpenAi(client),
        }
    }

    pub fn claude(client: ClaudeClient) -> Self {
        Self {
            backend: Backend::Claude(client),
        }
    }

    async fn chat(&self, user_prompt: &str, system_prompt: Option<&str>) -> AppResult<String> {
        match &self.backend {
            Backend::OpenAi(client) => client.chat(user_prompt, system_prompt).await,
            Backend::Claude(client) => client.chat(user_prompt, system_prompt).await,
        }
    }
}

#[async_trait]
impl StoryProvider for HostedProvider {
    fn kind(&self) -> ProviderKind {
        match self.backend {
            Backend::OpenAi(_) => ProviderKind::OpenAi,
            Backend::Claude(_) => ProviderKind::Claude,
        }
    }

    fn name(&self) -> String {
        match &self.backend {
            Backend::OpenAi(client) => client.label(),
            Backend::Claude(client) => client.label(),
        }
    }

    fn is_available(&self) -> bool {
        match &self.backend {
            Backend::OpenAi(client) => client.has_credentials(),
            Backend::Claude(client) => client.has_credentials(),
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> AppResult<Value> {
        let name = self.name();
        info!(
            "🚀 {} 生成开始: {} ({}역)",
            name, request.task, request.context.station_name
        );
        debug!(
            "Prompt 预览: {}",
            truncate_text(&request.user_prompt, 200)
        );

        let system_prompt = Some(request.system_prompt.as_str()).filter(|s| !s.trim().is_empty());
        let reply = self.chat(&request.user_prompt, system_prompt).await?;

        let mut value = extract_json_object(&name, &reply)?;
        if matches!(
            request.task,
            GenerationTask::Opening | GenerationTask::Continuation
        ) {
            fill_location(&mut value, request);
        }

        info!("✅ {} 生成完成: {}", name, request.task);
        Ok(value)
    }
}

/// 从回复文本中取出第一个 `{` 到最后一个 `}` 之间的 JSON 对象
///
/// 模型经常在 JSON 前后附带说明文字或 Markdown 代码块标记。
pub fn extract_json_object(provider: &str, text: &str) -> AppResult<Value> {
    let invalid = || ProviderError::InvalidJson {
        provider: provider.to_string(),
        snippet: truncate_text(text, 100),
    };

    let start = text.find('{').ok_or_else(invalid)?;
    let end = text.rfind('}').ok_or_else(invalid)?;
    if end < start {
        return Err(invalid().into());
    }

    let value: Value = serde_json::from_str(&text[start..=end]).map_err(|e| {
        warn!("❌ {} 返回的JSON解析失败: {}", provider, e);
        invalid()
    })?;

    if !value.is_object() {
        return Err(invalid().into());
    }
    Ok(value)
}

/// 缺失时补上站名与线路号
fn fill_location(value: &mut Value, request: &GenerationRequest) {
    if let Some(object) = value.as_object_mut() {
        object
            .entry("station_name")
            .or_insert_with(|| json!(request.context.station_name));
        object
            .entry("line_number")
            .or_insert_with(|| json!(request.context.line_number));
    }
}
