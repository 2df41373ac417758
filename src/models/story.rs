//! 单页故事的请求 / 响应结构

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// 单页最少 / 最多选项数
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;
/// 选项效果数值范围
pub const MAX_EFFECT_AMOUNT: i32 = 10;

/// 选项效果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Health,
    Sanity,
    #[default]
    None,
}

impl Effect {
    /// 宽松解析，兼容 LLM 常见的写法
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "health" | "hp" | "체력" => Some(Effect::Health),
            "sanity" | "mental" | "정신력" => Some(Effect::Sanity),
            "none" | "" | "변화 없음" | "없음" => Some(Effect::None),
            _ => None,
        }
    }
}

/// 单个选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryOption {
    pub content: String,
    pub effect: Effect,
    pub amount: i32,
    pub effect_preview: String,
}

impl StoryOption {
    pub fn new(content: impl Into<String>, effect: Effect, amount: i32) -> Self {
        let amount = if effect == Effect::None {
            0
        } else {
            amount.clamp(-MAX_EFFECT_AMOUNT, MAX_EFFECT_AMOUNT)
        };
        Self {
            content: content.into(),
            effect,
            amount,
            effect_preview: effect_preview(effect, amount),
        }
    }

    /// 从 LLM 返回的 JSON 解析选项；字段不全或无法识别时返回 None
    pub fn from_value(value: &Value) -> Option<Self> {
        let content = value.get("content")?.as_str()?.trim();
        if content.is_empty() {
            return None;
        }
        let effect = Effect::parse_lenient(value.get("effect")?.as_str()?)?;
        let amount = parse_amount(value.get("amount")?)?;

        // 预览文本总是由效果和数值生成
        Some(Self::new(content, effect, amount))
    }
}

/// 数值可能是数字，也可能是 "+3" 这样的字符串
fn parse_amount(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .map(|v| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32),
        Value::String(s) => s.trim().trim_start_matches('+').parse().ok(),
        _ => None,
    }
}

/// 效果预览文本
pub fn effect_preview(effect: Effect, amount: i32) -> String {
    match effect {
        Effect::Health => format!("체력 {:+}", amount),
        Effect::Sanity => format!("정신력 {:+}", amount),
        Effect::None => "변화 없음".to_string(),
    }
}

/// 解析选项数组，丢弃不完整的项，最多保留 [`MAX_OPTIONS`] 个
pub fn parse_options(value: Option<&Value>) -> Vec<StoryOption> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(StoryOption::from_value)
                .take(MAX_OPTIONS)
                .collect()
        })
        .unwrap_or_default()
}

fn default_stat() -> i32 {
    80
}

/// 新故事请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryGenerationRequest {
    pub station_name: String,
    pub line_number: i32,
    #[serde(default = "default_stat")]
    pub character_health: i32,
    #[serde(default = "default_stat")]
    pub character_sanity: i32,
    #[serde(default)]
    pub theme_preference: Option<String>,
}

/// 故事继续请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryContinueRequest {
    pub station_name: String,
    pub line_number: i32,
    #[serde(default = "default_stat")]
    pub character_health: i32,
    #[serde(default = "default_stat")]
    pub character_sanity: i32,
    pub previous_choice: String,
    #[serde(default)]
    pub story_context: Option<String>,
}

/// 允许的线路号
pub const LINE_RANGE: std::ops::RangeInclusive<i32> = 1..=9;

/// 校验角色状态与线路号
pub fn validate_state(line_number: i32, health: i32, sanity: i32) -> AppResult<()> {
    if !LINE_RANGE.contains(&line_number) {
        return Err(AppError::invalid_field("line_number", "必须在 1-9 之间"));
    }
    if !(0..=100).contains(&health) {
        return Err(AppError::invalid_field("character_health", "必须在 0-100 之间"));
    }
    if !(0..=100).contains(&sanity) {
        return Err(AppError::invalid_field("character_sanity", "必须在 0-100 之间"));
    }
    Ok(())
}

impl StoryGenerationRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_state(self.line_number, self.character_health, self.character_sanity)
    }
}

impl StoryContinueRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_state(self.line_number, self.character_health, self.character_sanity)?;
        if self.previous_choice.trim().is_empty() {
            return Err(AppError::invalid_field("previous_choice", "不能为空"));
        }
        Ok(())
    }
}

/// 新故事响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryGenerationResponse {
    pub story_title: String,
    pub page_content: String,
    pub options: Vec<StoryOption>,
    pub estimated_length: u32,
    pub difficulty: String,
    pub theme: String,
    pub station_name: String,
    pub line_number: i32,
}

/// 故事继续响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryContinueResponse {
    pub page_content: String,
    pub options: Vec<StoryOption>,
    pub is_last_page: bool,
}

/// 读取非空字符串字段
pub fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 要求选项数量满足下限
pub fn require_options(
    provider: &str,
    options: Vec<StoryOption>,
) -> AppResult<Vec<StoryOption>> {
    if options.len() < MIN_OPTIONS {
        return Err(AppError::invalid_shape(
            provider,
            format!("有效选项只有 {} 个，至少需要 {} 个", options.len(), MIN_OPTIONS),
        ));
    }
    Ok(options)
}

impl StoryGenerationResponse {
    /// 把 provider 返回的 JSON 规整为响应结构
    ///
    /// 必需字段：`story_title`、`page_content`、至少两个有效选项；
    /// 其余字段缺失时使用请求中的值或默认值。
    pub fn from_generated(
        provider: &str,
        value: &Value,
        request: &StoryGenerationRequest,
        default_theme: &str,
    ) -> AppResult<Self> {
        let story_title = str_field(value, "story_title")
            .ok_or_else(|| AppError::invalid_shape(provider, "缺少 story_title"))?;
        let page_content = str_field(value, "page_content")
            .ok_or_else(|| AppError::invalid_shape(provider, "缺少 page_content"))?;
        let options = require_options(provider, parse_options(value.get("options")))?;

        let estimated_length = value
            .get("estimated_length")
            .and_then(Value::as_u64)
            .map(|n| n.clamp(1, 20) as u32)
            .unwrap_or(5);
        let line_number = value
            .get("line_number")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok())
            .filter(|n| LINE_RANGE.contains(n))
            .unwrap_or(request.line_number);

        Ok(Self {
            story_title,
            page_content,
            options,
            estimated_length,
            difficulty: str_field(value, "difficulty").unwrap_or_else(|| "보통".to_string()),
            theme: str_field(value, "theme").unwrap_or_else(|| default_theme.to_string()),
            station_name: str_field(value, "station_name")
                .unwrap_or_else(|| request.station_name.clone()),
            line_number,
        })
    }
}

impl StoryContinueResponse {
    pub fn from_generated(provider: &str, value: &Value) -> AppResult<Self> {
        let page_content = str_field(value, "page_content")
            .ok_or_else(|| AppError::invalid_shape(provider, "缺少 page_content"))?;
        let options = require_options(provider, parse_options(value.get("options")))?;
        Ok(Self {
            page_content,
            options,
            is_last_page: value
                .get("is_last_page")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}
