//! LLM 客户端抽象
//!
//! 所有后端（Gemini REST / OpenAI 兼容 / Mock）实现 LlmClient：一次请求 = system 指令 + 多轮文本块，返回首个文本结果。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 模型端点的多轮输入中，每个文本块的角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireRole {
    User,
    Model,
}

/// 多轮输入中的一个带角色文本块
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentBlock {
    pub role: WireRole,
    pub text: String,
}

impl ContentBlock {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: WireRole::Model,
            text: text.into(),
        }
    }
}

/// 一次补全请求
#[derive(Clone, Debug, Default)]
pub struct LlmRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<ContentBlock>,
    /// 要求 JSON 输出时附带的 JSON Schema
    pub response_schema: Option<serde_json::Value>,
    /// 思考预算（仅支持原生思考的模型使用）
    pub thinking_budget: Option<u32>,
}

impl LlmRequest {
    pub fn new(contents: Vec<ContentBlock>) -> Self {
        Self {
            contents,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_thinking_budget(mut self, budget: Option<u32>) -> Self {
        self.thinking_budget = budget;
        self
    }
}

/// 远程调用错误分类：只有 RateLimited 可重试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("API_KEY_UNSET")]
    MissingApiKey,
}

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// 服务端给出的最短等待时间
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// 根据 HTTP 状态与响应体分类：429 或资源耗尽 → RateLimited，其余 → Unavailable
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        if status == 429 || is_exhaustion_message(body) {
            LlmError::RateLimited {
                retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
            }
        } else {
            LlmError::Unavailable(format!("HTTP {status}: {body}"))
        }
    }

    /// 只有错误文本可用时按限流短语分类；不匹配数字状态码，避免误判正文中的数字
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_exhaustion_message(&message) {
            LlmError::RateLimited {
                retry_after_ms: None,
            }
        } else {
            LlmError::Unavailable(message)
        }
    }
}

fn is_exhaustion_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("resource_exhausted")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("exceeded your current quota")
        || lower.contains("too many requests")
}

/// LLM 客户端 trait：非流式补全
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;

    /// 后端名称（日志用）
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_429_is_rate_limited() {
        let err = LlmError::from_status(429, "slow down", Some(Duration::from_secs(3)));
        assert_eq!(
            err,
            LlmError::RateLimited {
                retry_after_ms: Some(3000)
            }
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_resource_exhausted_body_is_rate_limited() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(LlmError::from_status(400, body, None).is_rate_limited());
    }

    #[test]
    fn test_server_error_is_not_retryable() {
        let err = LlmError::from_status(503, "overloaded", None);
        assert!(!err.is_rate_limited());
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[test]
    fn test_from_message_classification() {
        assert!(LlmError::from_message("Rate limit reached for requests").is_rate_limited());
        assert!(LlmError::from_message("You exceeded your current quota").is_rate_limited());
        assert!(!LlmError::from_message("invalid api key").is_rate_limited());
    }

    #[test]
    fn test_numbers_in_text_are_not_rate_limits() {
        let message = "This model's maximum context length is 8192 tokens. \
                       However, your messages resulted in 14290 tokens.";
        assert!(!LlmError::from_message(message).is_rate_limited());
        assert!(!LlmError::from_message("quota project header missing").is_rate_limited());
    }
}
