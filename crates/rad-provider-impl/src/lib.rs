mod anthropic;
mod client;
mod gemini;
mod openai;
mod retry;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAIAdapter;
