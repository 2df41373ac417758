//! Prompt 管理
//!
//! 系统 prompt 按后端区分，可以从 `PROMPT_DIR` 目录下的
//! `story_generation_openai.txt` / `story_generation_claude.txt` 覆盖；
//! 用户 prompt 按任务类型由游戏状态拼出。

use std::path::Path;

use tracing::{info, warn};

use crate::providers::{GenerationContext, GenerationRequest, GenerationTask, ProviderKind};

const DEFAULT_OPENAI_SYSTEM_PROMPT: &str = r#"당신은 지하철역 텍스트 어드벤처 게임의 전문 스토리 작가입니다.

반드시 요청에 명시된 JSON 형식으로만 응답하세요. JSON 외의 설명은 쓰지 마세요.

품질 기준:
- 선택지 2-4개, 효과는 health|sanity|none, 수치 -10~+10 범위
- 한국어로 자연스럽게 작성
- 역의 특성을 반영한 현실적 상황"#;

const DEFAULT_CLAUDE_SYSTEM_PROMPT: &str = r#"지하철역 텍스트 어드벤처 게임의 스토리 작가입니다.

요청에 명시된 JSON 형식으로만 응답하세요.

작성 가이드:
- 선택지 2-4개 제공
- 한국 지하철역 특성 반영
- 자연스러운 한국어 사용"#;

const OPENING_FORMAT: &str = r#"{
    "story_title": "스토리 제목 (20자 이내)",
    "page_content": "스토리 내용 (150-300자)",
    "options": [
        {"content": "선택지 설명", "effect": "health|sanity|none", "amount": -10~+10, "effect_preview": "체력 -3"}
    ],
    "estimated_length": 5,
    "difficulty": "쉬움|보통|어려움",
    "theme": "테마명",
    "station_name": "역명",
    "line_number": 노선번호
}"#;

const CONTINUATION_FORMAT: &str = r#"{
    "page_content": "이어지는 스토리 내용 (150-250자)",
    "options": [
        {"content": "선택지 내용", "effect": "health|sanity|none", "amount": -5~+5, "effect_preview": "효과 미리보기"}
    ],
    "is_last_page": false
}"#;

const METADATA_FORMAT: &str = r#"{
    "story_title": "스토리 제목 (20자 이내)",
    "description": "스토리 소개 (1-2문장)",
    "theme": "테마명",
    "keywords": ["키워드1", "키워드2", "키워드3"],
    "difficulty": "쉬움|보통|어려움",
    "estimated_length": 3~8
}"#;

const PAGE_FORMAT: &str = r#"{
    "content": "페이지 내용 (150-300자)",
    "options": [
        {"content": "선택지 내용", "effect": "health|sanity|none", "amount": -5~+5, "effect_preview": "체력 +3"}
    ]
}"#;

/// 上一页摘要的最大字符数
const SUMMARY_CHARS: usize = 100;

/// Prompt 管理器
#[derive(Debug, Clone)]
pub struct PromptManager {
    openai_system: String,
    claude_system: String,
}

impl Default for PromptManager {
    fn default() -> Self {
        Self {
            openai_system: DEFAULT_OPENAI_SYSTEM_PROMPT.to_string(),
            claude_system: DEFAULT_CLAUDE_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl PromptManager {
    /// 加载系统 prompt；目录为空或文件不存在时使用内置版本
    pub fn load(prompt_dir: Option<&str>) -> Self {
        let mut manager = Self::default();
        let Some(dir) = prompt_dir else {
            return manager;
        };

        let dir = Path::new(dir);
        if let Some(prompt) = read_prompt(&dir.join("story_generation_openai.txt")) {
            manager.openai_system = prompt;
        }
        if let Some(prompt) = read_prompt(&dir.join("story_generation_claude.txt")) {
            manager.claude_system = prompt;
        }
        manager
    }

    /// 后端对应的系统 prompt（Mock 使用 OpenAI 版本）
    pub fn system_prompt(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Claude => &self.claude_system,
            ProviderKind::OpenAi | ProviderKind::Mock => &self.openai_system,
        }
    }

    /// 组装完整的生成请求
    pub fn request(
        &self,
        task: GenerationTask,
        kind: ProviderKind,
        context: GenerationContext,
    ) -> GenerationRequest {
        GenerationRequest {
            task,
            system_prompt: self.system_prompt(kind).to_string(),
            user_prompt: user_prompt(task, &context),
            context,
        }
    }
}

fn read_prompt(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => {
            info!("📄 已加载 prompt 文件: {}", path.display());
            Some(content.trim().to_string())
        }
        Ok(_) => {
            warn!("⚠️ prompt 文件为空，使用内置版本: {}", path.display());
            None
        }
        Err(e) => {
            warn!("⚠️ 无法读取 prompt 文件 {}，使用内置版本: {}", path.display(), e);
            None
        }
    }
}

/// 按任务类型生成用户 prompt
pub fn user_prompt(task: GenerationTask, context: &GenerationContext) -> String {
    match task {
        GenerationTask::Opening => opening_prompt(context),
        GenerationTask::Continuation => continuation_prompt(context),
        GenerationTask::BatchMetadata => metadata_prompt(context),
        GenerationTask::BatchPage => page_prompt(context),
    }
}

fn opening_prompt(context: &GenerationContext) -> String {
    let theme_line = context
        .theme_preference
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| format!("\n🎭 **선호 테마**: {}\n", t))
        .unwrap_or_default();

    format!(
        "스토리 생성 요청:\n\n\
         📍 **역 정보**\n\
         - 역명: {station}역\n\
         - 노선: {line}호선\n\n\
         👤 **캐릭터 상태**\n\
         - 체력: {health}/100\n\
         - 정신력: {sanity}/100\n\
         {theme_line}\n\
         {station}역을 배경으로 한 흥미진진한 텍스트 어드벤처 게임의 시작 부분을 \
         다음 JSON 형식으로 생성해주세요:\n{format}",
        station = context.station_name,
        line = context.line_number,
        health = context.character_health,
        sanity = context.character_sanity,
        theme_line = theme_line,
        format = OPENING_FORMAT,
    )
}

fn continuation_prompt(context: &GenerationContext) -> String {
    format!(
        "이전 스토리에서 \"{choice}\" 선택의 결과로 스토리를 이어가주세요.\n\n\
         현재 상황:\n\
         - 위치: {station}역 ({line}호선)\n\
         - 캐릭터 상태: 체력 {health}/100, 정신력 {sanity}/100\n\
         - 스토리 맥락: {story_context}\n\n\
         JSON 형식으로 응답해주세요:\n{format}",
        choice = context.previous_choice.as_deref().unwrap_or_default(),
        station = context.station_name,
        line = context.line_number,
        health = context.character_health,
        sanity = context.character_sanity,
        story_context = context
            .story_context
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or("이전 상황에서 이어집니다"),
        format = CONTINUATION_FORMAT,
    )
}

fn metadata_prompt(context: &GenerationContext) -> String {
    format!(
        "{station}역({line}호선)을 배경으로 한 텍스트 어드벤처 게임의 메타데이터를 생성해주세요.\n\n\
         캐릭터 시작 상태: 체력 {health}/100, 정신력 {sanity}/100\n\n\
         JSON 형식으로만 응답하세요:\n{format}",
        station = context.station_name,
        line = context.line_number,
        health = context.character_health,
        sanity = context.character_sanity,
        format = METADATA_FORMAT,
    )
}

fn page_prompt(context: &GenerationContext) -> String {
    let position = if context.is_first_page() {
        "첫 페이지입니다. 배경과 인물을 소개하세요."
    } else if context.is_last_page() {
        "마지막 페이지입니다. 이야기를 마무리하세요."
    } else {
        "중간 페이지입니다. 긴장감을 높이세요."
    };

    let previous = context
        .previous_content
        .as_deref()
        .map(|p| format!("\n**이전 페이지 요약:** {}\n", p))
        .unwrap_or_default();

    format!(
        "다음 스토리의 {page}페이지를 생성해주세요:\n\n\
         **스토리 정보:**\n\
         - 제목: {title}\n\
         - 테마: {theme}\n\
         - 배경: {station}역 ({line}호선)\n\
         - 전체 길이: {total}페이지 중 {page}페이지 ({position})\n\
         {previous}\n\
         **페이지 요구사항:**\n\
         - 150-300자의 흥미로운 내용\n\
         - 2-4개의 의미있는 선택지\n\
         - 선택지별 적절한 효과 (-10~+10)\n\n\
         JSON 형식으로만 응답하세요:\n{format}",
        page = context.page_number,
        title = context.story_title.as_deref().unwrap_or_default(),
        theme = context.theme.as_deref().unwrap_or_default(),
        station = context.station_name,
        line = context.line_number,
        total = context.total_pages,
        position = position,
        previous = previous,
        format = PAGE_FORMAT,
    )
}

/// 上一页摘要：前 100 个字符加 `...`
pub fn summarize_previous(content: &str) -> String {
    let summary: String = content.chars().take(SUMMARY_CHARS).collect();
    format!("{}...", summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_chars_not_bytes() {
        let content = "가".repeat(150);
        let summary = summarize_previous(&content);
        assert_eq!(summary.chars().count(), 103);
        assert!(summary.ends_with("..."));

        assert_eq!(summarize_previous("짧은 내용"), "짧은 내용...");
    }

    #[test]
    fn test_page_prompt_mentions_position_and_previous() {
        let mut context = GenerationContext::new("교대", 3, 80, 80);
        context.story_title = Some("교대역의 미스터리".to_string());
        context.page_number = 3;
        context.total_pages = 3;
        context.previous_content = Some(summarize_previous("문이 열렸다"));

        let prompt = user_prompt(GenerationTask::BatchPage, &context);
        assert!(prompt.contains("3페이지 중 3페이지"));
        assert!(prompt.contains("마지막 페이지"));
        assert!(prompt.contains("문이 열렸다..."));
    }

    #[test]
    fn test_system_prompt_override_from_dir() {
        let dir = std::env::temp_dir().join(format!("prompt-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("story_generation_claude.txt"), "  커스텀 프롬프트  \n").unwrap();

        let manager = PromptManager::load(dir.to_str());
        assert_eq!(manager.system_prompt(ProviderKind::Claude), "커스텀 프롬프트");
        assert_eq!(
            manager.system_prompt(ProviderKind::OpenAi),
            DEFAULT_OPENAI_SYSTEM_PROMPT
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_continuation_prompt_defaults_context() {
        let mut context = GenerationContext::new("강남", 2, 60, 40);
        context.previous_choice = Some("문을 연다".to_string());
        let prompt = user_prompt(GenerationTask::Continuation, &context);
        assert!(prompt.contains("\"문을 연다\""));
        assert!(prompt.contains("이전 상황에서 이어집니다"));
        assert!(prompt.contains("체력 60/100"));
    }
}
