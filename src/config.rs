//! 程序配置
//!
//! 默认值 → TOML 配置文件（可选，`GATEWAY_CONFIG_FILE`）→ 环境变量，后者覆盖前者。

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, AppResult, ConfigError};

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 期望使用的 provider（mock / openai / claude）
    pub ai_provider: String,
    // --- OpenAI 配置 ---
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_max_tokens: u32,
    pub openai_api_base: String,
    // --- Claude 配置 ---
    pub claude_api_key: String,
    pub claude_model: String,
    pub claude_max_tokens: u32,
    pub claude_api_base: String,
    /// 单次 LLM 调用超时（秒）
    pub llm_timeout_secs: u64,
    /// 整个批量故事生成的截止时间（秒）
    pub batch_timeout_secs: u64,
    /// Mock 生成器的模拟延迟（毫秒）
    pub mock_latency_ms: u64,
    /// 外部 prompt 文件目录（为空则使用内置 prompt）
    pub prompt_dir: Option<String>,
    // --- 限流配置 ---
    pub requests_per_hour: u64,
    pub requests_per_day: u64,
    /// Redis 地址（为空则只使用内存计数）
    pub redis_url: Option<String>,
    // --- 鉴权配置 ---
    pub public_api_key: Option<String>,
    pub internal_api_key: Option<String>,
    // --- 服务配置 ---
    pub bind_addr: String,
    /// 日志格式：pretty / json
    pub log_format: String,
    /// 是否信任 `X-Forwarded-For`（仅在反向代理之后开启）
    pub trust_forwarded_for: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_provider: "mock".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            openai_max_tokens: 1000,
            openai_api_base: "https://api.openai.com/v1".to_string(),
            claude_api_key: String::new(),
            claude_model: "claude-3-haiku-20240307".to_string(),
            claude_max_tokens: 1000,
            claude_api_base: "https://api.anthropic.com/v1".to_string(),
            llm_timeout_secs: 30,
            batch_timeout_secs: 180,
            mock_latency_ms: 300,
            prompt_dir: None,
            requests_per_hour: 100,
            requests_per_day: 1000,
            redis_url: Some("redis://localhost:6379".to_string()),
            public_api_key: None,
            internal_api_key: None,
            bind_addr: "0.0.0.0:8000".to_string(),
            log_format: "pretty".to_string(),
            trust_forwarded_for: false,
        }
    }
}

/// TOML 配置文件结构，所有字段可选
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    ai_provider: Option<String>,
    openai_api_key: Option<String>,
    openai_model: Option<String>,
    openai_max_tokens: Option<u32>,
    openai_api_base: Option<String>,
    claude_api_key: Option<String>,
    claude_model: Option<String>,
    claude_max_tokens: Option<u32>,
    claude_api_base: Option<String>,
    llm_timeout_secs: Option<u64>,
    batch_timeout_secs: Option<u64>,
    mock_latency_ms: Option<u64>,
    prompt_dir: Option<String>,
    requests_per_hour: Option<u64>,
    requests_per_day: Option<u64>,
    redis_url: Option<String>,
    public_api_key: Option<String>,
    internal_api_key: Option<String>,
    bind_addr: Option<String>,
    log_format: Option<String>,
    trust_forwarded_for: Option<bool>,
}

impl Config {
    /// 加载配置：若设置了 `GATEWAY_CONFIG_FILE` 则先读取文件，再应用环境变量
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("GATEWAY_CONFIG_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 只使用环境变量（未设置的项使用默认值）
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取配置
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(ConfigError::FileReadFailed {
                path: path.display().to_string(),
                source: e,
            })
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            AppError::Config(ConfigError::TomlParseFailed { source, .. }) => {
                AppError::Config(ConfigError::TomlParseFailed {
                    path: path.display().to_string(),
                    source,
                })
            }
            other => other,
        })?;
        info!("📄 已加载配置文件: {}", path.display());
        Ok(config)
    }

    /// 解析 TOML 文本，缺失字段使用默认值
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let file: FileConfig = toml::from_str(content).map_err(|e| {
            AppError::Config(ConfigError::TomlParseFailed {
                path: String::new(),
                source: e,
            })
        })?;
        Ok(Self::default().merge_file(file))
    }

    fn merge_file(self, file: FileConfig) -> Self {
        Self {
            ai_provider: file.ai_provider.unwrap_or(self.ai_provider),
            openai_api_key: file.openai_api_key.unwrap_or(self.openai_api_key),
            openai_model: file.openai_model.unwrap_or(self.openai_model),
            openai_max_tokens: file.openai_max_tokens.unwrap_or(self.openai_max_tokens),
            openai_api_base: file.openai_api_base.unwrap_or(self.openai_api_base),
            claude_api_key: file.claude_api_key.unwrap_or(self.claude_api_key),
            claude_model: file.claude_model.unwrap_or(self.claude_model),
            claude_max_tokens: file.claude_max_tokens.unwrap_or(self.claude_max_tokens),
            claude_api_base: file.claude_api_base.unwrap_or(self.claude_api_base),
            llm_timeout_secs: file.llm_timeout_secs.unwrap_or(self.llm_timeout_secs),
            batch_timeout_secs: file.batch_timeout_secs.unwrap_or(self.batch_timeout_secs),
            mock_latency_ms: file.mock_latency_ms.unwrap_or(self.mock_latency_ms),
            prompt_dir: file.prompt_dir.or(self.prompt_dir),
            requests_per_hour: file.requests_per_hour.unwrap_or(self.requests_per_hour),
            requests_per_day: file.requests_per_day.unwrap_or(self.requests_per_day),
            // 显式设置为空字符串表示禁用 Redis
            redis_url: match file.redis_url {
                Some(url) => non_empty(Some(url)),
                None => self.redis_url,
            },
            public_api_key: non_empty(file.public_api_key).or(self.public_api_key),
            internal_api_key: non_empty(file.internal_api_key).or(self.internal_api_key),
            bind_addr: file.bind_addr.unwrap_or(self.bind_addr),
            log_format: file.log_format.unwrap_or(self.log_format),
            trust_forwarded_for: file.trust_forwarded_for.unwrap_or(self.trust_forwarded_for),
        }
    }

    fn with_env_overrides(self) -> Self {
        Self {
            ai_provider: std::env::var("AI_PROVIDER").unwrap_or(self.ai_provider),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(self.openai_api_key),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or(self.openai_model),
            openai_max_tokens: std::env::var("OPENAI_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.openai_max_tokens),
            openai_api_base: std::env::var("OPENAI_API_BASE").unwrap_or(self.openai_api_base),
            claude_api_key: std::env::var("CLAUDE_API_KEY").unwrap_or(self.claude_api_key),
            claude_model: std::env::var("CLAUDE_MODEL").unwrap_or(self.claude_model),
            claude_max_tokens: std::env::var("CLAUDE_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.claude_max_tokens),
            claude_api_base: std::env::var("CLAUDE_API_BASE").unwrap_or(self.claude_api_base),
            llm_timeout_secs: std::env::var("LLM_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.llm_timeout_secs),
            batch_timeout_secs: std::env::var("BATCH_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.batch_timeout_secs),
            mock_latency_ms: std::env::var("MOCK_LATENCY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.mock_latency_ms),
            prompt_dir: non_empty(std::env::var("PROMPT_DIR").ok()).or(self.prompt_dir),
            requests_per_hour: std::env::var("REQUEST_LIMIT_PER_HOUR").ok().and_then(|v| v.parse().ok()).unwrap_or(self.requests_per_hour),
            requests_per_day: std::env::var("REQUEST_LIMIT_PER_DAY").ok().and_then(|v| v.parse().ok()).unwrap_or(self.requests_per_day),
            // 显式设置为空字符串表示禁用 Redis
            redis_url: match std::env::var("REDIS_URL") {
                Ok(v) => non_empty(Some(v)),
                Err(_) => self.redis_url,
            },
            public_api_key: non_empty(std::env::var("PUBLIC_API_KEY").ok()).or(self.public_api_key),
            internal_api_key: non_empty(std::env::var("INTERNAL_API_KEY").ok()).or(self.internal_api_key),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(self.bind_addr),
            log_format: std::env::var("LOG_FORMAT").unwrap_or(self.log_format),
            trust_forwarded_for: std::env::var("TRUST_FORWARDED_FOR").ok().and_then(|v| v.parse().ok()).unwrap_or(self.trust_forwarded_for),
        }
    }

    /// 测试和本地开发用的配置：mock provider、无延迟、无 Redis
    pub fn for_tests() -> Self {
        Self {
            mock_latency_ms: 0,
            redis_url: None,
            ..Self::default()
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
