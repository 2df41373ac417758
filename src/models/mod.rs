pub mod batch;
pub mod station;
pub mod story;

pub use batch::{
    BatchPage, BatchStoryRequest, BatchStoryResponse, StoryMetadata, StructureReport,
    StructureValidationRequest,
};
pub use station::{StationInfo, StationTheme, SupportedStation};
pub use story::{
    Effect, StoryContinueRequest, StoryContinueResponse, StoryGenerationRequest,
    StoryGenerationResponse, StoryOption,
};
