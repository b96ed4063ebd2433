pub mod provider;
pub mod anthropic;
pub mod openai;
pub mod scripted;
pub mod router;
pub mod types;

pub use provider::LLMProvider;
pub use router::create_provider;
pub use scripted::ScriptedProvider;
pub use types::{GenerationOptions, LLMResponse};
