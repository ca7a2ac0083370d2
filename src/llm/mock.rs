//! Mock 后端（用于测试与无 API Key 的离线运行）
//!
//! - MockLlmClient：按顺序返回预置结果，并记录收到的请求
//! - MockPhaseClient：三阶段回显，本地即可跑通完整轮次

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::Language;
use crate::llm::{LlmClient, LlmError, LlmRequest, PhaseClient, TurnText};
use crate::memory::Message;

/// 预置响应的 LLM 客户端；队列耗尽后回显最后一个文本块
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn with_responses(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.requests
            .lock()
            .expect("mock lock poisoned")
            .push(request.clone());

        let next = self.responses.lock().expect("mock lock poisoned").pop_front();
        match next {
            Some(result) => result,
            None => Ok(request
                .contents
                .last()
                .map(|b| b.text.clone())
                .unwrap_or_default()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 离线回显：推理轨迹与回答都由输入拼出，翻译原样返回并标注目标语言
#[derive(Debug, Default)]
pub struct MockPhaseClient;

#[async_trait]
impl PhaseClient for MockPhaseClient {
    async fn reasoning(
        &self,
        history: &[Message],
        input: &str,
        language: Language,
    ) -> Result<String, LlmError> {
        Ok(format!(
            "[PROCESS_1: INPUT_ANALYSIS]\n- {} chars received ({language}).\n\n[PROCESS_2: INTERNAL_RECURSION]\n- {} prior segments linked.",
            input.chars().count(),
            history.len()
        ))
    }

    async fn manifestation(
        &self,
        _history: &[Message],
        input: &str,
        _reasoning: &str,
        _language: Language,
    ) -> Result<String, LlmError> {
        Ok(format!("Echo from Mock: {input}"))
    }

    async fn translate(&self, turn: &TurnText, target: Language) -> Result<TurnText, LlmError> {
        Ok(TurnText {
            user: turn.user.clone(),
            content: format!("[{target}] {}", turn.content),
            reasoning: turn.reasoning.clone(),
        })
    }
}
