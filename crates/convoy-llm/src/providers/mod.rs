pub mod claude;
pub mod gemini;
pub mod local;

pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use local::LocalProvider;
