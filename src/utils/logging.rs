/// 日志工具模块
///
/// 提供日志初始化和启动信息输出的辅助函数
use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 未设置 `RUST_LOG` 时默认 `info` 级别。
///
/// # 参数
/// - `format`: `json` 输出结构化日志，其他值输出可读格式
pub fn init(format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("日志初始化失败: {}", e))
}

/// 启动信息
pub struct StartupInfo<'a> {
    pub provider: &'a str,
    pub available_providers: &'a [String],
    pub station_count: usize,
    pub bind_addr: &'a str,
    pub rate_limit_backend: &'a str,
}

/// 记录服务启动信息
pub fn log_startup(startup: &StartupInfo<'_>) {
    info!("{}", "=".repeat(60));
    info!("🚇 地铁故事生成服务启动 v{}", env!("CARGO_PKG_VERSION"));
    info!("🤖 当前Provider: {}", startup.provider);
    info!("📋 可用Provider: {}", startup.available_providers.join(", "));
    info!("🚉 支持站点数: {}", startup.station_count);
    info!("🚦 限流存储: {}", startup.rate_limit_backend);
    info!("🌐 监听地址: {}", startup.bind_addr);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
