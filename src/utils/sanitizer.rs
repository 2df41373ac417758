//! 输入清洗
//!
//! 用户输入会被拼进 prompt，进入生成流程前先做长度限制、注入模式检查和字符过滤。

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use tracing::warn;

use crate::error::{AppError, AppResult, ValidationError};

/// 各字段的最大字符数
pub const MAX_STATION_NAME_CHARS: usize = 50;
pub const MAX_CHOICE_CHARS: usize = 200;
pub const MAX_CONTEXT_CHARS: usize = 500;
pub const MAX_THEME_CHARS: usize = 50;

static FORBIDDEN_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)ignore.*previous.*instructions?",
        r"(?i)disregard.*above",
        r"(?i)forget.*instructions?",
        r"(?i)system.*prompt",
        r"(?i)you.*are.*now",
        r"(?i)act.*as",
        r"(?i)pretend.*you.*are",
        r"(?i)role.*play",
        r"(?i)<script",
        r"(?i)javascript:",
        r"(?i)onerror=",
        r"(?i)onclick=",
    ])
    .expect("注入模式正则无效")
});

static DISALLOWED_TEXT_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[^가-힣a-zA-Z0-9\s.,!?'"\-()]"#).expect("文本字符正则无效")
});

static DISALLOWED_STATION_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^가-힣a-zA-Z0-9]").expect("站名字符正则无效"));

/// 清洗站名：只保留韩文、英文字母和数字
pub fn sanitize_station_name(station_name: &str) -> AppResult<String> {
    let sanitized = DISALLOWED_STATION_CHARS.replace_all(station_name, "").into_owned();

    if sanitized.is_empty() {
        return Err(AppError::invalid_field("station_name", "不是有效的站名"));
    }
    if sanitized.chars().count() > MAX_STATION_NAME_CHARS {
        return Err(AppError::invalid_field(
            "station_name",
            format!("不能超过 {} 个字符", MAX_STATION_NAME_CHARS),
        ));
    }
    Ok(sanitized)
}

/// 清洗自由文本
///
/// # 参数
/// - `field`: 字段名（用于错误信息）
/// - `text`: 原始文本
/// - `max_chars`: 最大字符数，超出部分截断
///
/// # 返回
/// 清洗后的文本；包含注入模式时返回 [`ValidationError::ForbiddenPattern`]
pub fn sanitize_text(field: &str, text: &str, max_chars: usize) -> AppResult<String> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let length = text.chars().count();
    let text: String = if length > max_chars {
        warn!("⚠️ {} 长度超限: {} > {}，已截断", field, length, max_chars);
        text.chars().take(max_chars).collect()
    } else {
        text.to_string()
    };

    if FORBIDDEN_PATTERNS.is_match(&text) {
        warn!("🚫 {} 包含不允许的模式", field);
        return Err(ValidationError::ForbiddenPattern {
            field: field.to_string(),
        }
        .into());
    }

    let filtered = DISALLOWED_TEXT_CHARS.replace_all(&text, "");
    Ok(filtered.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// 清洗可选文本，清洗后为空视为未提供
pub fn sanitize_optional(
    field: &str,
    text: Option<&str>,
    max_chars: usize,
) -> AppResult<Option<String>> {
    match text {
        Some(text) => Ok(Some(sanitize_text(field, text, max_chars)?).filter(|t| !t.is_empty())),
        None => Ok(None),
    }
}
