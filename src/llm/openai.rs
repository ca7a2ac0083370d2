//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! model 块映射为 assistant 消息；需要 JSON 输出时把 schema 附在 system 指令末尾。
//! 错误按 API 错误对象的 type / code 分类，只有限流与配额耗尽可重试。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmRequest, WireRole};

pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    /// timeout 作用于整个 HTTP 请求
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, timeout: Duration) -> Result<Self, LlmError> {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            model: model.to_string(),
        })
    }

    fn system_text(request: &LlmRequest) -> Option<String> {
        match (&request.system_instruction, &request.response_schema) {
            (None, None) => None,
            (system, schema) => {
                let mut text = system.clone().unwrap_or_default();
                if let Some(schema) = schema {
                    if !text.is_empty() {
                        text.push_str("\n\n");
                    }
                    text.push_str("Respond with a single JSON object matching this JSON Schema:\n");
                    text.push_str(&schema.to_string());
                }
                Some(text)
            }
        }
    }

    fn to_openai_messages(request: &LlmRequest) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let build_err = |e: async_openai::error::OpenAIError| LlmError::Malformed(e.to_string());
        let mut messages = Vec::with_capacity(request.contents.len() + 1);

        if let Some(system) = Self::system_text(request) {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(build_err)?,
            ));
        }

        for block in &request.contents {
            let message = match block.role {
                WireRole::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(block.text.clone())
                        .build()
                        .map_err(build_err)?,
                ),
                WireRole::Model => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(block.text.clone())
                        .build()
                        .map_err(build_err)?,
                ),
            };
            messages.push(message);
        }
        Ok(messages)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::to_openai_messages(request)?)
            .build()
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(classify_error)?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::Malformed("OpenAI response has no content".into()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

const RATE_LIMIT_TAGS: &[&str] = &[
    "rate_limit_exceeded",
    "rate_limit_error",
    "insufficient_quota",
    "requests",
    "tokens",
];

fn classify_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::ApiError(api) => {
            let tagged = |field: &Option<String>| {
                field
                    .as_deref()
                    .is_some_and(|tag| RATE_LIMIT_TAGS.contains(&tag))
            };
            if tagged(&api.code) || tagged(&api.r#type) {
                LlmError::RateLimited {
                    retry_after_ms: None,
                }
            } else if api.code.is_some() || api.r#type.is_some() {
                LlmError::Unavailable(api.to_string())
            } else {
                // 兼容端点可能只给 message
                LlmError::from_message(api.to_string())
            }
        }
        OpenAIError::Reqwest(e) => match e.status() {
            Some(status) => LlmError::from_status(status.as_u16(), &e.to_string(), None),
            None => LlmError::Unavailable(e.to_string()),
        },
        OpenAIError::JSONDeserialize(e, _) => LlmError::Malformed(e.to_string()),
        other => LlmError::Unavailable(other.to_string()),
    }
}
