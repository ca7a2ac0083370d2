//! LLM 层：客户端抽象与实现（Gemini REST / OpenAI 兼容 / Mock），以及三阶段调用与提示词

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod phases;
pub mod prompts;
pub mod traits;

pub use gemini::{GeminiClient, GEMINI_FLASH, GEMINI_PRO};
pub use mock::{MockLlmClient, MockPhaseClient};
pub use openai::{OpenAiClient, OPENAI_DEFAULT_MODEL};
pub use phases::{LlmPhaseClient, PhaseClient, TurnText};
pub use traits::{ContentBlock, LlmClient, LlmError, LlmRequest, WireRole};
