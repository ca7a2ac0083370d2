//! 核心层：双语状态、状态存储、限流重试、轮次编排与运行时主循环

pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod state;
pub mod store;
pub mod turn;

pub use error::ChatError;
pub use orchestrator::{
    create_phase_client_from_config, create_runtime, spawn_runtime, Command, RuntimeHandles,
};
pub use retry::{with_retry, PhasePolicies, RetryPolicy};
pub use state::{seed_message, ChatState, Language, LoadingPhase, TurnPhase, SEED_MESSAGE_ID};
pub use store::{StateStore, TurnStart};
pub use turn::{Checkpoint, RejectReason, TurnObserver, TurnOrchestrator, TurnOutcome};
