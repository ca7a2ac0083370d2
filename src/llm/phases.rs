//! 三个远程阶段：推理（Reasoning）、显现（Manifestation）、翻译同步（Translation）
//!
//! PhaseClient 是编排器看到的唯一远程接口；LlmPhaseClient 用两个 LlmClient 实现它：
//! 思考模型负责前两阶段，快速模型负责翻译。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::core::Language;
use crate::llm::prompts::{
    system_instruction, translation_prompt, PromptPhase, OUTPUT_DIRECTIVE, TRACE_DIRECTIVE,
};
use crate::llm::{ContentBlock, LlmClient, LlmError, LlmRequest};
use crate::memory::projection::{project_history, INPUT_LABEL, TRACE_LABEL};
use crate::memory::Message;

/// 一轮的三段文本（用户输入、模型回答、推理轨迹）
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnText {
    pub user: String,
    pub content: String,
    pub reasoning: String,
}

#[async_trait]
pub trait PhaseClient: Send + Sync {
    /// 阶段 1：基于历史与输入生成推理轨迹
    async fn reasoning(
        &self,
        history: &[Message],
        input: &str,
        language: Language,
    ) -> Result<String, LlmError>;

    /// 阶段 2：基于历史、输入与推理轨迹生成最终回答
    async fn manifestation(
        &self,
        history: &[Message],
        input: &str,
        reasoning: &str,
        language: Language,
    ) -> Result<String, LlmError>;

    /// 阶段 3：把整轮翻译为目标语言
    async fn translate(&self, turn: &TurnText, target: Language) -> Result<TurnText, LlmError>;
}

/// 翻译响应 {u, c, r}
#[derive(Debug, Deserialize, JsonSchema)]
struct TranslationPayload {
    /// Translated user input
    #[serde(default)]
    u: String,
    /// Translated model output
    #[serde(default)]
    c: String,
    /// Translated reasoning trace
    #[serde(default)]
    r: String,
}

fn translation_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(TranslationPayload)).unwrap_or_default()
}

/// 从文本中取出 JSON 对象（容忍 ```json 代码块或前后说明文字）
fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end >= start).then(|| &trimmed[start..=end])
}

/// 解析翻译结果；空字段回落为原文
fn parse_translation(raw: &str, source: &TurnText) -> Result<TurnText, LlmError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| LlmError::Malformed(format!("no JSON object in translation: {raw}")))?;
    let payload: TranslationPayload = serde_json::from_str(json)
        .map_err(|e| LlmError::Malformed(format!("{e}: {json}")))?;

    let pick = |translated: String, original: &str| {
        if translated.trim().is_empty() {
            original.to_string()
        } else {
            translated
        }
    };
    Ok(TurnText {
        user: pick(payload.u, &source.user),
        content: pick(payload.c, &source.content),
        reasoning: pick(payload.r, &source.reasoning),
    })
}

pub struct LlmPhaseClient {
    thinker: Arc<dyn LlmClient>,
    translator: Arc<dyn LlmClient>,
    thinking_budget: Option<u32>,
}

impl LlmPhaseClient {
    pub fn new(thinker: Arc<dyn LlmClient>, translator: Arc<dyn LlmClient>) -> Self {
        Self {
            thinker,
            translator,
            thinking_budget: None,
        }
    }

    pub fn with_thinking_budget(mut self, budget: Option<u32>) -> Self {
        self.thinking_budget = budget;
        self
    }

    pub(crate) fn reasoning_request(history: &[Message], input: &str, language: Language) -> LlmRequest {
        let mut contents = project_history(history);
        contents.push(ContentBlock::user(format!(
            "{INPUT_LABEL}\n{input}\n\n{TRACE_DIRECTIVE}"
        )));
        LlmRequest::new(contents).with_system(system_instruction(PromptPhase::Reasoning, language))
    }

    pub(crate) fn manifestation_request(
        history: &[Message],
        input: &str,
        reasoning: &str,
        language: Language,
    ) -> LlmRequest {
        let mut contents = project_history(history);
        contents.push(ContentBlock::user(format!("{INPUT_LABEL}\n{input}")));
        contents.push(ContentBlock::model(format!("{TRACE_LABEL}\n{reasoning}")));
        contents.push(ContentBlock::user(OUTPUT_DIRECTIVE));
        LlmRequest::new(contents)
            .with_system(system_instruction(PromptPhase::Manifestation, language))
    }
}

#[async_trait]
impl PhaseClient for LlmPhaseClient {
    async fn reasoning(
        &self,
        history: &[Message],
        input: &str,
        language: Language,
    ) -> Result<String, LlmError> {
        let request = Self::reasoning_request(history, input, language)
            .with_thinking_budget(self.thinking_budget);
        tracing::debug!(backend = self.thinker.name(), blocks = request.contents.len(), "Reasoning request");
        self.thinker.complete(&request).await
    }

    async fn manifestation(
        &self,
        history: &[Message],
        input: &str,
        reasoning: &str,
        language: Language,
    ) -> Result<String, LlmError> {
        let request = Self::manifestation_request(history, input, reasoning, language);
        tracing::debug!(backend = self.thinker.name(), blocks = request.contents.len(), "Manifestation request");
        self.thinker.complete(&request).await
    }

    async fn translate(&self, turn: &TurnText, target: Language) -> Result<TurnText, LlmError> {
        let request = LlmRequest::new(vec![ContentBlock::user(translation_prompt(
            &turn.user,
            &turn.content,
            &turn.reasoning,
            target,
        ))])
        .with_response_schema(translation_schema());
        let raw = self.translator.complete(&request).await?;
        parse_translation(&raw, turn)
    }
}
