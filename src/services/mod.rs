pub mod batch_service;
pub mod rate_limiter;
pub mod story_service;

pub use batch_service::{BatchService, BatchStatsSnapshot};
pub use rate_limiter::{ClientRateStatus, RateLimiter};
pub use story_service::{PopularStation, ProviderTestReport, StoryService};
