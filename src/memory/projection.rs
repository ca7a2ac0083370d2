//! 历史投影：Message 序列 → 模型端点的多轮文本块
//!
//! 模型没有跨请求记忆，过往推理轨迹只能以普通文本形式回放。
//! 每条 model 记录折叠为一个块（TRACE + OUTPUT，两个标签总是出现），user 记录为 INPUT 块。
//! 全量回放，不截断、不摘要。

use crate::llm::ContentBlock;
use crate::memory::{Message, Role};

pub const INPUT_LABEL: &str = "INPUT:";
pub const TRACE_LABEL: &str = "TRACE:";
pub const OUTPUT_LABEL: &str = "OUTPUT:";

pub fn project_message(message: &Message) -> ContentBlock {
    match message.role {
        Role::Model => ContentBlock::model(format!(
            "{TRACE_LABEL}\n{}\n{OUTPUT_LABEL}\n{}",
            message.reasoning.as_deref().unwrap_or(""),
            message.content
        )),
        Role::User => ContentBlock::user(format!("{INPUT_LABEL}\n{}", message.content)),
    }
}

pub fn project_history(history: &[Message]) -> Vec<ContentBlock> {
    history.iter().map(project_message).collect()
}
