//! Tractatus - 双语递归推理对话终端
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 双语状态、状态存储、限流重试、三阶段轮次编排、运行时主循环
//! - **llm**: LLM 客户端抽象与实现（Gemini REST / OpenAI 兼容 / Mock）、提示词与三阶段调用
//! - **memory**: 消息模型、历史投影、会话文档与持久化
//! - **observability**: 日志初始化
//! - **ui**: Ratatui TUI 界面

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod ui;
