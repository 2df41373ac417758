pub mod claude_client;
pub mod openai_client;

pub use claude_client::ClaudeClient;
pub use openai_client::OpenAiClient;
