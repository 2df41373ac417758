//! 批量（多页）故事结构
//!
//! 供外部批处理系统落库使用：元数据 + 按顺序排列的页面。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::story::{str_field, StoryOption};

/// 故事页数的默认值与上下限
pub const DEFAULT_STORY_LENGTH: u32 = 5;
pub const MIN_STORY_LENGTH: u32 = 3;
pub const MAX_STORY_LENGTH: u32 = 8;

fn default_stat() -> i32 {
    80
}

/// 批量故事请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStoryRequest {
    pub station_name: String,
    pub line_number: i32,
    #[serde(default = "default_stat")]
    pub character_health: i32,
    #[serde(default = "default_stat")]
    pub character_sanity: i32,
    /// 指定页数；为空时使用元数据中的预估页数
    #[serde(default)]
    pub story_length: Option<u32>,
}

impl BatchStoryRequest {
    pub fn validate(&self) -> AppResult<()> {
        crate::models::story::validate_state(
            self.line_number,
            self.character_health,
            self.character_sanity,
        )?;
        if let Some(length) = self.story_length {
            if !(MIN_STORY_LENGTH..=MAX_STORY_LENGTH).contains(&length) {
                return Err(AppError::invalid_field(
                    "story_length",
                    format!("必须在 {}-{} 之间", MIN_STORY_LENGTH, MAX_STORY_LENGTH),
                ));
            }
        }
        Ok(())
    }
}

/// 故事元数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryMetadata {
    pub story_title: String,
    pub description: String,
    pub theme: String,
    pub keywords: Vec<String>,
    pub difficulty: String,
    pub estimated_length: u32,
}

impl StoryMetadata {
    /// 解析 provider 返回的元数据
    ///
    /// `story_title` 必须存在；其余缺失字段从 `defaults` 补齐。
    pub fn from_generated(provider: &str, value: &Value, defaults: &StoryMetadata) -> AppResult<Self> {
        let story_title = str_field(value, "story_title")
            .ok_or_else(|| AppError::invalid_shape(provider, "元数据缺少 story_title"))?;

        let keywords: Vec<String> = value
            .get("keywords")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            story_title,
            description: str_field(value, "description")
                .unwrap_or_else(|| defaults.description.clone()),
            theme: str_field(value, "theme").unwrap_or_else(|| defaults.theme.clone()),
            keywords: if keywords.is_empty() {
                defaults.keywords.clone()
            } else {
                keywords
            },
            difficulty: str_field(value, "difficulty")
                .unwrap_or_else(|| defaults.difficulty.clone()),
            estimated_length: value
                .get("estimated_length")
                .and_then(Value::as_u64)
                .map(|n| n.min(u64::from(u32::MAX)) as u32)
                .unwrap_or(defaults.estimated_length),
        })
    }
}

/// 页数：请求优先，其次元数据预估，最后夹到允许范围
pub fn target_length(requested: Option<u32>, estimated: u32) -> u32 {
    requested
        .unwrap_or(estimated)
        .clamp(MIN_STORY_LENGTH, MAX_STORY_LENGTH)
}

/// 单页
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchPage {
    pub content: String,
    pub options: Vec<StoryOption>,
}

/// 批量故事响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchStoryResponse {
    pub story_title: String,
    pub description: String,
    pub theme: String,
    pub keywords: Vec<String>,
    pub pages: Vec<BatchPage>,
    pub estimated_length: u32,
    pub difficulty: String,
    pub station_name: String,
    pub line_number: i32,
}

impl BatchStoryResponse {
    pub fn assemble(metadata: StoryMetadata, pages: Vec<BatchPage>, request: &BatchStoryRequest) -> Self {
        Self {
            story_title: metadata.story_title,
            description: metadata.description,
            theme: metadata.theme,
            keywords: metadata.keywords,
            estimated_length: pages.len() as u32,
            pages,
            difficulty: metadata.difficulty,
            station_name: request.station_name.clone(),
            line_number: request.line_number,
        }
    }
}

/// 结构校验请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructureValidationRequest {
    #[serde(default)]
    pub story_data: Value,
}

/// 结构校验结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StructureReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// 目前不做自动修复，始终为 null
    pub fixed_structure: Option<Value>,
}
