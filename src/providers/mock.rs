//! Mock 后端
//!
//! 不依赖任何外部服务。输出只由请求内容决定，同样的输入总是得到同样的结果，
//! 既用作开发环境的默认后端，也是所有托管后端的回退目标。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{GenerationContext, GenerationRequest, GenerationTask, ProviderKind, StoryProvider};
use crate::error::AppResult;
use crate::models::batch::StoryMetadata;
use crate::models::station;
use crate::models::story::{Effect, StoryOption};

const METADATA_KEYWORDS: [&str; 4] = ["신비", "모험", "우정", "성장"];

/// Mock 后端
pub struct MockProvider {
    latency: Duration,
}

impl MockProvider {
    /// 创建 Mock 后端
    ///
    /// # 参数
    /// - `latency`: 每次生成前的模拟延迟
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    /// 第一页
    pub fn opening(context: &GenerationContext) -> Value {
        let theme = theme_label(context);
        let difficulty = station::theme_for(&context.station_name).difficulty().label();

        let page_content = format!(
            "{station}역에서 {theme} 이야기가 시작됩니다.\n\n\
             당신의 현재 상태 - 체력: {health}, 정신력: {sanity}\n\n\
             어떤 선택을 하시겠습니까?",
            station = context.station_name,
            theme = theme,
            health = context.character_health,
            sanity = context.character_sanity,
        );

        json!({
            "story_title": format!("{}역의 {}", context.station_name, theme),
            "page_content": page_content,
            "options": [
                StoryOption::new("적극적으로 행동한다", Effect::Health, -5),
                StoryOption::new("신중하게 관찰한다", Effect::Sanity, 3),
                StoryOption::new("안전하게 피한다", Effect::None, 0),
            ],
            "estimated_length": 6,
            "difficulty": difficulty,
            "theme": theme,
            "station_name": context.station_name,
            "line_number": context.line_number,
        })
    }

    /// 根据上一个选择分支
    pub fn continuation(context: &GenerationContext) -> Value {
        let previous_choice = context.previous_choice.as_deref().unwrap_or_default();

        let (page_content, options) = if previous_choice.contains("적극적으로") {
            (
                "적극적인 행동의 결과... 상황이 복잡해졌습니다.\n\
                 체력이 소모되었지만 중요한 정보를 얻었습니다.",
                vec![
                    StoryOption::new("계속 추진한다", Effect::Health, -3),
                    StoryOption::new("전략을 바꾼다", Effect::Sanity, 5),
                ],
            )
        } else if previous_choice.contains("신중하게") {
            (
                "신중한 관찰의 결과... 상황을 더 잘 이해하게 되었습니다.\n\
                 정신력이 회복되고 새로운 기회를 발견했습니다.",
                vec![
                    StoryOption::new("기회를 활용한다", Effect::Health, 5),
                    StoryOption::new("더 지켜본다", Effect::Sanity, 2),
                ],
            )
        } else {
            (
                "안전한 선택의 결과... 위험을 피했지만 기회도 놓쳤습니다.\n\
                 하지만 안전한 상태를 유지했습니다.",
                vec![
                    StoryOption::new("다른 방법을 찾는다", Effect::Sanity, 3),
                    StoryOption::new("포기하고 떠난다", Effect::None, 0),
                ],
            )
        };

        json!({
            "page_content": page_content,
            "options": options,
            "is_last_page": false,
        })
    }

    /// 批量故事的元数据
    pub fn metadata(context: &GenerationContext) -> StoryMetadata {
        let theme = station::theme_for(&context.station_name);
        let seed = format!("{}:{}", context.station_name, context.line_number);

        StoryMetadata {
            story_title: format!("{}역의 {}", context.station_name, theme.label()),
            description: format!(
                "{}역에서 벌어지는 흥미진진한 이야기입니다.",
                context.station_name
            ),
            theme: theme.label().to_string(),
            keywords: vec![
                context.station_name.clone(),
                format!("{}호선", context.line_number),
                "지하철".to_string(),
                METADATA_KEYWORDS[station::stable_index(&seed, METADATA_KEYWORDS.len())]
                    .to_string(),
            ],
            difficulty: theme.difficulty().label().to_string(),
            estimated_length: 4 + station::stable_index(&seed, 3) as u32,
        }
    }

    /// 批量故事的单页
    pub fn page(context: &GenerationContext) -> Value {
        let theme = context
            .theme
            .clone()
            .unwrap_or_else(|| station::theme_for(&context.station_name).label().to_string());

        let content = if context.is_first_page() {
            format!(
                "{}역에 도착한 당신. {} 분위기가 감도는 이곳에서 무언가 특별한 일이 벌어질 것 같습니다.",
                context.station_name, theme
            )
        } else if context.is_last_page() {
            format!(
                "마침내 {}역의 비밀을 알아냈습니다. 이제 어떤 선택을 하시겠습니까?",
                context.station_name
            )
        } else {
            format!(
                "스토리가 계속됩니다... ({}/{}페이지) 상황이 점점 흥미로워지고 있습니다.",
                context.page_number, context.total_pages
            )
        };

        // 1..=3，随页码变化
        let step = (context.page_number % 3) as i32 + 1;

        json!({
            "content": content,
            "options": [
                StoryOption::new("적극적으로 행동한다", Effect::Health, -step),
                StoryOption::new("신중하게 관찰한다", Effect::Sanity, step),
                StoryOption::new("안전하게 대처한다", Effect::None, 0),
            ],
        })
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

/// 主题：请求中的偏好优先，否则按站点
fn theme_label(context: &GenerationContext) -> String {
    context
        .theme_preference
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| station::theme_for(&context.station_name).label().to_string())
}

#[async_trait]
impl StoryProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn name(&self) -> String {
        "Mock Provider".to_string()
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest) -> AppResult<Value> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let context = &request.context;
        debug!("🎭 Mock 生成: {} ({}역)", request.task, context.station_name);

        let value = match request.task {
            GenerationTask::Opening => Self::opening(context),
            GenerationTask::Continuation => Self::continuation(context),
            GenerationTask::BatchMetadata => serde_json::to_value(Self::metadata(context))?,
            GenerationTask::BatchPage => Self::page(context),
        };

        info!("✅ Mock 生成完成: {}", request.task);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::story::{StoryContinueResponse, StoryGenerationRequest, StoryGenerationResponse};

    fn request(task: GenerationTask, context: GenerationContext) -> GenerationRequest {
        GenerationRequest {
            task,
            system_prompt: String::new(),
            user_prompt: String::new(),
            context,
        }
    }

    #[tokio::test]
    async fn test_opening_is_valid_response() {
        let provider = MockProvider::default();
        let value = provider
            .generate(&request(
                GenerationTask::Opening,
                GenerationContext::new("사당", 4, 80, 70),
            ))
            .await
            .unwrap();

        let story_request = StoryGenerationRequest {
            station_name: "사당".to_string(),
            line_number: 4,
            character_health: 80,
            character_sanity: 70,
            theme_preference: None,
        };
        let response =
            StoryGenerationResponse::from_generated("Mock", &value, &story_request, "공포").unwrap();
        assert_eq!(response.story_title, "사당역의 공포");
        assert_eq!(response.options.len(), 3);
        assert_eq!(response.difficulty, "어려움");
        assert!(response.page_content.contains("체력: 80"));
    }

    #[test]
    fn test_opening_echoes_requested_line() {
        let value = MockProvider::opening(&GenerationContext::new("강남", 7, 80, 80));
        assert_eq!(value["line_number"], 7);
    }

    #[test]
    fn test_theme_preference_wins() {
        let mut context = GenerationContext::new("강남", 2, 80, 80);
        context.theme_preference = Some("스릴러".to_string());
        let value = MockProvider::opening(&context);
        assert_eq!(value["theme"], "스릴러");
    }

    #[test]
    fn test_continuation_branches_on_choice() {
        let mut context = GenerationContext::new("강남", 2, 80, 80);

        context.previous_choice = Some("적극적으로 행동한다".to_string());
        let active = StoryContinueResponse::from_generated("Mock", &MockProvider::continuation(&context)).unwrap();
        assert_eq!(active.options[0].content, "계속 추진한다");

        context.previous_choice = Some("신중하게 관찰한다".to_string());
        let careful = StoryContinueResponse::from_generated("Mock", &MockProvider::continuation(&context)).unwrap();
        assert_eq!(careful.options[0].content, "기회를 활용한다");

        context.previous_choice = Some("아무것도 안 한다".to_string());
        let safe = StoryContinueResponse::from_generated("Mock", &MockProvider::continuation(&context)).unwrap();
        assert_eq!(safe.options[1].effect, Effect::None);
        assert!(!safe.is_last_page);
    }

    #[test]
    fn test_metadata_is_deterministic() {
        let context = GenerationContext::new("혜화", 4, 80, 80);
        let first = MockProvider::metadata(&context);
        let second = MockProvider::metadata(&context);
        assert_eq!(first, second);
        assert!((4..=6).contains(&first.estimated_length));
        assert_eq!(first.keywords[1], "4호선");
    }

    #[test]
    fn test_page_content_by_position() {
        let mut context = GenerationContext::new("명동", 4, 80, 80);
        context.total_pages = 4;

        context.page_number = 1;
        assert!(MockProvider::page(&context)["content"]
            .as_str()
            .unwrap()
            .starts_with("명동역에 도착한"));

        context.page_number = 2;
        assert!(MockProvider::page(&context)["content"]
            .as_str()
            .unwrap()
            .contains("(2/4페이지)"));

        context.page_number = 4;
        assert!(MockProvider::page(&context)["content"]
            .as_str()
            .unwrap()
            .contains("비밀"));
    }
}
