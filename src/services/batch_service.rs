//! 批量故事服务
//!
//! ## 职责
//!
//! 为外部批处理系统生成完整的多页故事，以及校验已有故事的结构。
//!
//! ## 流程
//!
//! 1. **元数据**：当前后端生成，失败或不完整时使用 Mock 元数据
//! 2. **页数**：请求指定优先，否则取元数据预估，夹到 3-8 页
//! 3. **逐页生成**：按顺序生成，每页带上一页摘要；单页失败用固定的回退页替换
//! 4. **整体兜底**：超过截止时间或整体失败时返回 Mock 元数据 + 3 个回退页
//!
//! 输入合法时 [`BatchService::generate_complete_story`] 总是返回一个完整故事。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::batch::{
    target_length, BatchPage, BatchStoryRequest, BatchStoryResponse, StoryMetadata,
    StructureReport, MIN_STORY_LENGTH,
};
use crate::models::story::{parse_options, require_options, str_field, Effect, StoryOption, MAX_OPTIONS, MIN_OPTIONS};
use crate::prompt::{summarize_previous, PromptManager};
use crate::providers::{GenerationContext, GenerationTask, MockProvider, ProviderRegistry};
use crate::utils::logging::truncate_text;
use crate::utils::sanitizer::sanitize_station_name;

/// 页数校验的警告阈值
const WARN_MIN_PAGES: usize = 3;
const WARN_MAX_PAGES: usize = 10;

/// 批量生成统计
#[derive(Debug, Default)]
pub struct BatchStats {
    stories_generated: AtomicU64,
    pages_generated: AtomicU64,
    fallback_pages: AtomicU64,
    fallback_stories: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BatchStatsSnapshot {
    pub stories_generated: u64,
    pub pages_generated: u64,
    pub fallback_pages: u64,
    pub fallback_stories: u64,
}

impl BatchStats {
    pub fn snapshot(&self) -> BatchStatsSnapshot {
        BatchStatsSnapshot {
            stories_generated: self.stories_generated.load(Ordering::Relaxed),
            pages_generated: self.pages_generated.load(Ordering::Relaxed),
            fallback_pages: self.fallback_pages.load(Ordering::Relaxed),
            fallback_stories: self.fallback_stories.load(Ordering::Relaxed),
        }
    }
}

/// 批量故事服务
pub struct BatchService {
    registry: Arc<ProviderRegistry>,
    prompts: Arc<PromptManager>,
    deadline: Duration,
    stats: BatchStats,
}

impl BatchService {
    /// 创建批量故事服务
    ///
    /// # 参数
    /// - `deadline`: 整个故事的生成时限
    pub fn new(registry: Arc<ProviderRegistry>, prompts: Arc<PromptManager>, deadline: Duration) -> Self {
        Self {
            registry,
            prompts,
            deadline,
            stats: BatchStats::default(),
        }
    }

    pub fn stats(&self) -> BatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// 生成完整故事
    ///
    /// 只有请求本身不合法时返回错误。
    pub async fn generate_complete_story(
        &self,
        request: &BatchStoryRequest,
    ) -> AppResult<BatchStoryResponse> {
        request.validate()?;
        let request = BatchStoryRequest {
            station_name: sanitize_station_name(&request.station_name)?,
            ..request.clone()
        };

        info!("{}", "=".repeat(60));
        info!("🚀 批量故事生成开始");
        info!("📍 站点: {}역 ({}호선)", request.station_name, request.line_number);
        info!(
            "👤 角色状态: 体力={}, 精神力={}",
            request.character_health, request.character_sanity
        );
        info!("🤖 当前Provider: {}", self.registry.active_name());
        info!("{}", "=".repeat(60));

        let started = Instant::now();
        let response = match tokio::time::timeout(self.deadline, self.run(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("❌ 批量故事生成失败，使用回退故事: {}", e);
                self.fallback_story(&request)
            }
            Err(_) => {
                let e = AppError::Deadline {
                    operation: "批量故事生成".to_string(),
                    secs: self.deadline.as_secs(),
                };
                error!("❌ {}，使用回退故事", e);
                self.fallback_story(&request)
            }
        };

        self.stats.stories_generated.fetch_add(1, Ordering::Relaxed);
        info!("{}", "─".repeat(60));
        info!(
            "✅ 批量故事生成完成: {} ({} 页, 耗时 {:.2}秒)",
            response.story_title,
            response.pages.len(),
            started.elapsed().as_secs_f64()
        );
        info!("🏷️ 关键词: {:?}", response.keywords);
        info!("{}", "─".repeat(60));

        Ok(response)
    }

    async fn run(&self, request: &BatchStoryRequest) -> AppResult<BatchStoryResponse> {
        let metadata = self.generate_metadata(request).await?;
        info!("📋 元数据: {} / {} / {}", metadata.story_title, metadata.theme, metadata.difficulty);

        let total = target_length(request.story_length, metadata.estimated_length);
        let pages = self.generate_pages(request, &metadata, total).await;

        Ok(BatchStoryResponse::assemble(metadata, pages, request))
    }

    async fn generate_metadata(&self, request: &BatchStoryRequest) -> AppResult<StoryMetadata> {
        let context = base_context(request);
        let defaults = MockProvider::metadata(&context);

        let generation = self.prompts.request(
            GenerationTask::BatchMetadata,
            self.registry.active().kind(),
            context,
        );
        let generated = self
            .registry
            .generate_with_fallback(&generation, |provider, value| {
                StoryMetadata::from_generated(provider, value, &defaults)
            })
            .await?;

        if generated.fell_back {
            warn!("⚠️ 元数据生成失败，已使用 Mock 元数据");
        }
        Ok(generated.value)
    }

    async fn generate_pages(
        &self,
        request: &BatchStoryRequest,
        metadata: &StoryMetadata,
        total: u32,
    ) -> Vec<BatchPage> {
        let provider = self.registry.active();
        let provider_name = provider.name();
        let mut pages: Vec<BatchPage> = Vec::with_capacity(total as usize);

        for page_number in 1..=total {
            info!("📄 生成第 {}/{} 页...", page_number, total);

            let mut context = base_context(request);
            context.story_title = Some(metadata.story_title.clone());
            context.theme = Some(metadata.theme.clone());
            context.page_number = page_number;
            context.total_pages = total;
            context.previous_content = pages.last().map(|p| summarize_previous(&p.content));

            let generation = self
                .prompts
                .request(GenerationTask::BatchPage, provider.kind(), context);

            let page = match provider.generate(&generation).await {
                Ok(value) => parse_page(&provider_name, &value),
                Err(e) => Err(e),
            };

            match page {
                Ok(page) => {
                    info!(
                        "  ✓ 第 {} 页: {} 字, {} 个选项 | {}",
                        page_number,
                        page.content.chars().count(),
                        page.options.len(),
                        truncate_text(&page.content, 40)
                    );
                    self.stats.pages_generated.fetch_add(1, Ordering::Relaxed);
                    pages.push(page);
                }
                Err(e) => {
                    warn!("⚠️ 第 {} 页生成失败，使用回退页: {}", page_number, e);
                    self.stats.fallback_pages.fetch_add(1, Ordering::Relaxed);
                    pages.push(fallback_page(page_number, total));
                }
            }
        }

        pages
    }

    fn fallback_story(&self, request: &BatchStoryRequest) -> BatchStoryResponse {
        self.stats.fallback_stories.fetch_add(1, Ordering::Relaxed);
        let metadata = MockProvider::metadata(&base_context(request));
        let pages = (1..=MIN_STORY_LENGTH)
            .map(|n| fallback_page(n, MIN_STORY_LENGTH))
            .collect();
        BatchStoryResponse::assemble(metadata, pages, request)
    }
}

fn base_context(request: &BatchStoryRequest) -> GenerationContext {
    GenerationContext::new(
        &request.station_name,
        request.line_number,
        request.character_health,
        request.character_sanity,
    )
}

/// 解析单页：内容非空且至少保留两个完整选项
fn parse_page(provider: &str, value: &Value) -> AppResult<BatchPage> {
    let content = str_field(value, "content")
        .or_else(|| str_field(value, "page_content"))
        .ok_or_else(|| AppError::invalid_shape(provider, "页面缺少 content"))?;
    let options = require_options(provider, parse_options(value.get("options")))?;
    Ok(BatchPage { content, options })
}

/// 固定的回退页
pub fn fallback_page(page_number: u32, total_pages: u32) -> BatchPage {
    BatchPage {
        content: format!(
            "예상치 못한 상황이 발생했습니다. ({}/{}페이지) 신중하게 행동해야 할 때입니다.",
            page_number, total_pages
        ),
        options: vec![
            StoryOption::new("상황을 파악한다", Effect::Sanity, 2),
            StoryOption::new("빠르게 행동한다", Effect::Health, -1),
        ],
    }
}

/// 校验故事结构
///
/// 缺少必需字段、没有页面、页面缺内容、选项少于两个或选项字段不全都是错误；
/// 页数不在 3-10 之间、选项多于四个只给出警告。
pub fn validate_story_structure(story: &Value) -> StructureReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(object) = story.as_object() else {
        return StructureReport {
            is_valid: false,
            errors: vec!["story_data 必须是 JSON 对象".to_string()],
            warnings,
            fixed_structure: None,
        };
    };

    for field in ["story_title", "description", "theme", "keywords", "pages"] {
        if !object.contains_key(field) {
            errors.push(format!("缺少必需字段: {}", field));
        }
    }

    let pages = object
        .get("pages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if pages.is_empty() {
        errors.push("没有页面".to_string());
    } else if pages.len() < WARN_MIN_PAGES {
        warnings.push(format!("页数偏少: {} 页", pages.len()));
    } else if pages.len() > WARN_MAX_PAGES {
        warnings.push(format!("页数偏多: {} 页", pages.len()));
    }

    for (i, page) in pages.iter().enumerate() {
        let page_no = i + 1;
        let Some(page) = page.as_object() else {
            errors.push(format!("第 {} 页格式错误", page_no));
            continue;
        };

        if !page.contains_key("content") {
            errors.push(format!("第 {} 页缺少内容", page_no));
        }

        let options = page
            .get("options")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if options.len() < MIN_OPTIONS {
            errors.push(format!("第 {} 页选项不足: {} 个", page_no, options.len()));
        } else if options.len() > MAX_OPTIONS {
            warnings.push(format!("第 {} 页选项过多: {} 个", page_no, options.len()));
        }

        for (j, option) in options.iter().enumerate() {
            let Some(option) = option.as_object() else {
                errors.push(format!("第 {} 页选项 {} 格式错误", page_no, j + 1));
                continue;
            };
            for field in ["content", "effect", "amount", "effect_preview"] {
                if !option.contains_key(field) {
                    errors.push(format!("第 {} 页选项 {} 缺少 {}", page_no, j + 1, field));
                }
            }
        }
    }

    StructureReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        fixed_structure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::batch::MAX_STORY_LENGTH;
    use crate::providers::registry::tests::ScriptedProvider;
    use crate::providers::{ProviderKind, StoryProvider};
    use async_trait::async_trait;
    use serde_json::json;

    fn request(story_length: Option<u32>) -> BatchStoryRequest {
        BatchStoryRequest {
            station_name: "옥수".to_string(),
            line_number: 3,
            character_health: 80,
            character_sanity: 80,
            story_length,
        }
    }

    fn service_with(hosted: Vec<Arc<dyn StoryProvider>>, requested: &str) -> BatchService {
        let registry = ProviderRegistry::new(requested, Arc::new(MockProvider::default()), hosted);
        BatchService::new(
            Arc::new(registry),
            Arc::new(PromptManager::default()),
            Duration::from_secs(5),
        )
    }

    fn good_page(content: &str) -> AppResult<Value> {
        Ok(json!({
            "content": content,
            "options": [
                {"content": "A", "effect": "health", "amount": -2},
                {"content": "B", "effect": "sanity", "amount": 3}
            ]
        }))
    }

    #[tokio::test]
    async fn test_mock_story_has_requested_length() {
        let service = service_with(vec![], "mock");
        let story = service.generate_complete_story(&request(Some(4))).await.unwrap();
        assert_eq!(story.pages.len(), 4);
        assert_eq!(story.estimated_length, 4);
        assert_eq!(story.station_name, "옥수");
        assert!(story.pages.iter().all(|p| p.options.len() >= 2));
        assert!(validate_story_structure(&serde_json::to_value(&story).unwrap()).is_valid);
        assert_eq!(service.stats().fallback_pages, 0);
    }

    #[tokio::test]
    async fn test_estimated_length_used_when_not_requested() {
        let service = service_with(vec![], "mock");
        let story = service.generate_complete_story(&request(None)).await.unwrap();
        let count = story.pages.len() as u32;
        assert!((MIN_STORY_LENGTH..=MAX_STORY_LENGTH).contains(&count));
    }

    #[tokio::test]
    async fn test_failed_pages_replaced_in_place() {
        let scripted = Arc::new(ScriptedProvider::new(
            ProviderKind::OpenAi,
            vec![
                Ok(json!({"story_title": "옥수역의 안개", "theme": "미스터리", "estimated_length": 3})),
                good_page("첫 장면"),
                Err(AppError::provider_failed("Scripted openai", "500")),
                Ok(json!({"content": "선택지가 부족한 페이지", "options": [
                    {"content": "A", "effect": "health", "amount": 1}
                ]})),
            ],
        ));
        let service = service_with(vec![scripted.clone() as Arc<dyn StoryProvider>], "openai");

        let story = service.generate_complete_story(&request(None)).await.unwrap();
        assert_eq!(story.story_title, "옥수역의 안개");
        assert_eq!(story.pages.len(), 3);
        assert_eq!(story.pages[0].content, "첫 장면");
        assert_eq!(story.pages[1], fallback_page(2, 3));
        assert_eq!(story.pages[2], fallback_page(3, 3));
        assert_eq!(scripted.calls.load(Ordering::Relaxed), 4);

        let stats = service.stats();
        assert_eq!(stats.pages_generated, 1);
        assert_eq!(stats.fallback_pages, 2);
        assert_eq!(stats.fallback_stories, 0);
    }

    #[tokio::test]
    async fn test_bad_metadata_uses_mock_metadata() {
        let scripted = Arc::new(ScriptedProvider::new(
            ProviderKind::Claude,
            vec![
                Ok(json!({"theme": "제목 없음"})),
                good_page("1"),
                good_page("2"),
                good_page("3"),
            ],
        ));
        let service = service_with(vec![scripted], "claude");

        let story = service.generate_complete_story(&request(Some(3))).await.unwrap();
        let expected = MockProvider::metadata(&GenerationContext::new("옥수", 3, 80, 80));
        assert_eq!(story.story_title, expected.story_title);
        assert_eq!(story.pages[2].content, "3");
    }

    /// 永远不返回的后端
    struct StuckProvider;

    #[async_trait]
    impl StoryProvider for StuckProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn name(&self) -> String {
            "Stuck".to_string()
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn generate(&self, _request: &crate::providers::GenerationRequest) -> AppResult<Value> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_deadline_returns_fallback_story() {
        let registry = ProviderRegistry::new(
            "openai",
            Arc::new(MockProvider::default()),
            vec![Arc::new(StuckProvider)],
        );
        let service = BatchService::new(
            Arc::new(registry),
            Arc::new(PromptManager::default()),
            Duration::from_millis(50),
        );

        let story = service.generate_complete_story(&request(Some(6))).await.unwrap();
        assert_eq!(story.pages.len(), 3);
        assert_eq!(story.pages[0], fallback_page(1, 3));
        assert_eq!(service.stats().fallback_stories, 1);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let service = service_with(vec![], "mock");
        assert!(service.generate_complete_story(&request(Some(12))).await.is_err());
    }

    #[test]
    fn test_validate_structure_reports() {
        let report = validate_story_structure(&json!({
            "story_title": "t",
            "description": "d",
            "theme": "x",
            "keywords": [],
            "pages": [
                {"content": "p1", "options": [
                    {"content": "a", "effect": "none", "amount": 0, "effect_preview": "변화 없음"},
                    {"content": "b", "effect": "none", "amount": 0}
                ]},
                {"options": []}
            ]
        }));
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("缺少 effect_preview")));
        assert!(report.errors.iter().any(|e| e.contains("第 2 页缺少内容")));
        assert!(report.errors.iter().any(|e| e.contains("第 2 页选项不足")));
        assert!(report.warnings.iter().any(|w| w.contains("页数偏少")));
        assert!(report.fixed_structure.is_none());
    }

    #[test]
    fn test_validate_structure_non_object() {
        let report = validate_story_structure(&json!([1, 2]));
        assert!(!report.is_valid);
        let report = validate_story_structure(&json!({}));
        assert!(report.errors.iter().any(|e| e == "没有页面"));
    }
}
