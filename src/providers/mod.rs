//! 内容生成后端
//!
//! 所有后端都实现 [`StoryProvider`]：输入一个 [`GenerationRequest`]，输出一个 JSON 对象。
//! 结构校验由调用方完成，后端只负责"产出 JSON"。
//!
//! - [`MockProvider`] - 确定性的本地生成器，永不失败
//! - [`HostedProvider`] - OpenAI / Claude 托管 API
//! - [`ProviderRegistry`] - 选择当前后端，并在失败时回退到 Mock

pub mod hosted;
pub mod mock;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppResult, ValidationError};

pub use hosted::HostedProvider;
pub use mock::MockProvider;
pub use registry::{Generated, ProviderCheck, ProviderRegistry};

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "mock")]
    Mock,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "claude")]
    Claude,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Mock, ProviderKind::OpenAi, ProviderKind::Claude];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Mock => "mock",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Claude => "claude",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(ProviderKind::Mock),
            "openai" => Ok(ProviderKind::OpenAi),
            "claude" => Ok(ProviderKind::Claude),
            other => Err(ValidationError::UnknownProvider(other.to_string())),
        }
    }
}

/// 生成任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationTask {
    /// 新故事第一页
    Opening,
    /// 根据上一个选择继续
    Continuation,
    /// 批量故事的元数据
    BatchMetadata,
    /// 批量故事的单页
    BatchPage,
}

impl fmt::Display for GenerationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationTask::Opening => "opening",
            GenerationTask::Continuation => "continuation",
            GenerationTask::BatchMetadata => "batch_metadata",
            GenerationTask::BatchPage => "batch_page",
        };
        f.write_str(name)
    }
}

/// 生成时可用的游戏状态
///
/// 不同任务使用其中不同的字段，未使用的保持默认值。
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationContext {
    pub station_name: String,
    pub line_number: i32,
    pub character_health: i32,
    pub character_sanity: i32,
    pub theme_preference: Option<String>,
    pub previous_choice: Option<String>,
    pub story_context: Option<String>,
    // --- 批量生成 ---
    pub story_title: Option<String>,
    pub theme: Option<String>,
    pub page_number: u32,
    pub total_pages: u32,
    /// 上一页内容摘要
    pub previous_content: Option<String>,
}

impl GenerationContext {
    pub fn new(station_name: impl Into<String>, line_number: i32, health: i32, sanity: i32) -> Self {
        Self {
            station_name: station_name.into(),
            line_number,
            character_health: health,
            character_sanity: sanity,
            ..Self::default()
        }
    }

    pub fn is_first_page(&self) -> bool {
        self.page_number == 1
    }

    pub fn is_last_page(&self) -> bool {
        self.total_pages > 0 && self.page_number == self.total_pages
    }
}

/// 一次生成请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: GenerationTask,
    pub system_prompt: String,
    pub user_prompt: String,
    pub context: GenerationContext,
}

/// 内容生成后端
#[async_trait]
pub trait StoryProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// 显示名称，例如 `OpenAI gpt-4o-mini`
    fn name(&self) -> String;

    /// 是否具备调用条件（例如已配置 API 密钥）
    fn is_available(&self) -> bool;

    /// 生成一个 JSON 对象
    async fn generate(&self, request: &GenerationRequest) -> AppResult<Value>;
}
