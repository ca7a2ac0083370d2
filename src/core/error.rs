//! 核心错误类型
//!
//! 远程调用错误（LlmError）在编排器中带上阶段信息，成为 ChatError::Phase；
//! 会话存储与导入校验错误也统一在此。

use thiserror::Error;

use crate::core::TurnPhase;
use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum ChatError {
    /// 已有一轮在进行中（单飞约束）
    #[error("A turn is already in flight")]
    TurnInFlight,

    #[error("{phase} failed: {source}")]
    Phase {
        phase: TurnPhase,
        #[source]
        source: LlmError,
    },

    /// 导入的会话文档不满足数据模型约束
    #[error("Invalid session document: {0}")]
    Validation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ChatError {
    pub fn phase(phase: TurnPhase, source: LlmError) -> Self {
        ChatError::Phase { phase, source }
    }
}
