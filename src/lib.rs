//! # Subway Story Gateway
//!
//! 地铁站主题互动故事生成服务：单页故事生成 / 继续、批量多页故事、请求限流
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - 限流计数存储（Redis / 内存）
//! - `clients/` - OpenAI、Claude 的 HTTP 客户端
//!
//! ### ② 生成层（Providers）
//! - `providers/` - 统一的 `StoryProvider` 接口，Mock 与托管 LLM 两类实现
//! - `ProviderRegistry` - 选择当前后端，失败时回退到 Mock
//! - `prompt` - system / user prompt 组装
//!
//! ### ③ 业务层（Services）
//! - `StoryService` - 单页故事生成与继续
//! - `BatchService` - 批量多页故事与结构校验
//! - `RateLimiter` - 按客户端的小时 / 日限流
//!
//! ### ④ 接入层（Server）
//! - `server/` - axum 路由、API 密钥校验
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod server;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use providers::{ProviderKind, ProviderRegistry, StoryProvider};
pub use server::{build_router, AppState};
pub use services::{BatchService, RateLimiter, StoryService};
