//! 后端选择与回退链

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{GenerationRequest, HostedProvider, MockProvider, ProviderKind, StoryProvider};
use crate::clients::{ClaudeClient, OpenAiClient};
use crate::config::Config;
use crate::error::AppResult;

/// 回退链的结果
#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub value: T,
    /// 实际产出结果的后端名称
    pub provider: String,
    /// 是否经过了回退
    pub fell_back: bool,
}

/// 单个后端的可用性检查结果
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCheck {
    pub provider: String,
    pub kind: ProviderKind,
    pub available: bool,
    pub message: String,
}

/// 后端注册表
pub struct ProviderRegistry {
    mock: Arc<MockProvider>,
    providers: BTreeMap<ProviderKind, Arc<dyn StoryProvider>>,
    active: Arc<dyn StoryProvider>,
    fallback_count: AtomicU64,
}

impl ProviderRegistry {
    /// 根据配置创建所有后端并选择当前后端
    pub fn from_config(config: &Config) -> Self {
        let mock = Arc::new(MockProvider::new(Duration::from_millis(config.mock_latency_ms)));
        let hosted: Vec<Arc<dyn StoryProvider>> = vec![
            Arc::new(HostedProvider::openai(OpenAiClient::new(config))),
            Arc::new(HostedProvider::claude(ClaudeClient::new(config))),
        ];
        Self::new(&config.ai_provider, mock, hosted)
    }

    /// 使用给定的后端创建注册表
    ///
    /// # 参数
    /// - `requested`: 期望的后端名称（`AI_PROVIDER`）
    /// - `mock`: 回退目标
    /// - `hosted`: 其他后端
    pub fn new(requested: &str, mock: Arc<MockProvider>, hosted: Vec<Arc<dyn StoryProvider>>) -> Self {
        let mut providers: BTreeMap<ProviderKind, Arc<dyn StoryProvider>> = BTreeMap::new();
        providers.insert(ProviderKind::Mock, mock.clone());
        for provider in hosted {
            providers.insert(provider.kind(), provider);
        }

        let active = select_active(requested, &providers)
            .unwrap_or_else(|| mock.clone() as Arc<dyn StoryProvider>);
        info!("🤖 当前Provider: {}", active.name());

        Self {
            mock,
            providers,
            active,
            fallback_count: AtomicU64::new(0),
        }
    }

    pub fn active(&self) -> Arc<dyn StoryProvider> {
        self.active.clone()
    }

    pub fn active_name(&self) -> String {
        self.active.name()
    }

    pub fn is_mock_active(&self) -> bool {
        self.active.kind() == ProviderKind::Mock
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn StoryProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// 各后端是否可用
    pub fn available_providers(&self) -> BTreeMap<String, bool> {
        ProviderKind::ALL
            .iter()
            .map(|kind| {
                let available = self
                    .providers
                    .get(kind)
                    .map(|p| p.is_available())
                    .unwrap_or(false);
                (kind.to_string(), available)
            })
            .collect()
    }

    /// 检查指定后端的可用性（不发起生成）
    pub fn check_provider(&self, kind: ProviderKind) -> ProviderCheck {
        match self.providers.get(&kind) {
            Some(provider) if provider.is_available() => ProviderCheck {
                provider: provider.name(),
                kind,
                available: true,
                message: "可用".to_string(),
            },
            Some(provider) => ProviderCheck {
                provider: provider.name(),
                kind,
                available: false,
                message: "未配置API密钥".to_string(),
            },
            None => ProviderCheck {
                provider: kind.to_string(),
                kind,
                available: false,
                message: "未注册".to_string(),
            },
        }
    }

    /// 累计回退次数
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    /// 使用当前后端生成并解析；失败时在 Mock 上重试一次
    ///
    /// 生成失败和解析失败都会触发回退。Mock 自身失败时直接返回错误。
    ///
    /// # 参数
    /// - `request`: 生成请求
    /// - `parse`: 把 JSON 转为目标类型，第一个参数是后端名称
    pub async fn generate_with_fallback<T, F>(
        &self,
        request: &GenerationRequest,
        parse: F,
    ) -> AppResult<Generated<T>>
    where
        F: Fn(&str, &Value) -> AppResult<T> + Send + Sync,
        T: Send,
    {
        let provider = self.active();
        let name = provider.name();

        let attempt = match provider.generate(request).await {
            Ok(value) => parse(&name, &value),
            Err(e) => Err(e),
        };

        match attempt {
            Ok(value) => Ok(Generated {
                value,
                provider: name,
                fell_back: false,
            }),
            Err(e) if provider.kind() == ProviderKind::Mock => Err(e),
            Err(e) => {
                warn!("⚠️ {} 生成失败，回退到 Mock: {}", name, e);
                self.fallback_count.fetch_add(1, Ordering::Relaxed);

                let mock_name = self.mock.name();
                let value = self.mock.generate(request).await?;
                let value = parse(&mock_name, &value)?;
                Ok(Generated {
                    value,
                    provider: mock_name,
                    fell_back: true,
                })
            }
        }
    }
}

fn select_active(
    requested: &str,
    providers: &BTreeMap<ProviderKind, Arc<dyn StoryProvider>>,
) -> Option<Arc<dyn StoryProvider>> {
    let kind = match requested.parse::<ProviderKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!("⚠️ {}，使用 Mock Provider", e);
            return None;
        }
    };

    match providers.get(&kind) {
        Some(provider) if provider.is_available() => {
            info!("✅ {} Provider 已激活: {}", kind, provider.name());
            Some(provider.clone())
        }
        _ => {
            warn!("⚠️ {} Provider 不可用，切换到 Mock Provider", kind);
            None
        }
    }
}
