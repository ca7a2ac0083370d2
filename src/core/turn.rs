//! 轮次编排器：单轮三阶段状态机
//!
//! Idle → AwaitingReasoning → AwaitingManifestation → AwaitingSync → Idle，
//! 或在前两个阶段失败时 → Failed → Idle。
//!
//! - 推理与显现共用本轮开始前的活动历史快照
//! - 用户消息乐观追加，失败时不回滚
//! - 翻译失败不算失败：影子历史回落为原文，保持轮数与 id 成对
//! - 持久化只在三个检查点触发（用户消息追加后、本轮完成后、致命失败后）
//! - 最终检查点在释放单飞标志之前保存，期间不能切换会话

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::retry::{with_retry, PhasePolicies};
use crate::core::store::{StateStore, TurnStart};
use crate::core::{ChatError, ChatState, TurnPhase};
use crate::llm::{PhaseClient, TurnText};
use crate::memory::Message;

/// 显式的持久化时机
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Checkpoint {
    UserAppended,
    TurnCompleted,
    TurnFailed,
}

/// 检查点观察者（会话存储等外部协作者）
#[async_trait]
pub trait TurnObserver: Send + Sync {
    async fn on_checkpoint(&self, checkpoint: Checkpoint, state: &ChatState);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    EmptyInput,
    TurnInFlight,
}

/// 一次 send 的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// 本轮完成；translated 为 false 表示影子历史使用了原文
    Completed { translated: bool },
    /// 推理或显现阶段失败，错误已写入 ChatState.error
    Failed(String),
    /// 未开始（状态未变）
    Rejected(RejectReason),
}

const FALLBACK_ERROR: &str = "Logical disconnection.";

pub struct TurnOrchestrator {
    phases: Arc<dyn PhaseClient>,
    policies: PhasePolicies,
    store: Arc<StateStore>,
    observer: Option<Arc<dyn TurnObserver>>,
}

impl TurnOrchestrator {
    pub fn new(phases: Arc<dyn PhaseClient>, store: Arc<StateStore>, policies: PhasePolicies) -> Self {
        Self {
            phases,
            policies,
            store,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// 提交一条用户输入并跑完整轮；已有轮次在进行时直接拒绝（不排队）
    pub async fn send(&self, input: &str) -> TurnOutcome {
        match self.begin(input) {
            Ok(start) => self.run(start).await,
            Err(reason) => TurnOutcome::Rejected(reason),
        }
    }

    /// 同步地占用单飞标志并乐观追加用户消息；返回后状态已处于 loading
    pub fn begin(&self, input: &str) -> Result<TurnStart, RejectReason> {
        if input.trim().is_empty() {
            return Err(RejectReason::EmptyInput);
        }
        let Some(start) = self.store.begin_turn(Message::user(input)) else {
            tracing::warn!("Send rejected: a turn is already in flight");
            return Err(RejectReason::TurnInFlight);
        };
        tracing::info!(
            language = %start.language,
            context = start.snapshot.len(),
            user_id = %start.user.id,
            "Turn started"
        );
        Ok(start)
    }

    /// 跑完 begin 开始的一轮
    pub async fn run(&self, start: TurnStart) -> TurnOutcome {
        self.checkpoint(Checkpoint::UserAppended, &self.store.snapshot())
            .await;

        let outcome = match self.run_phases(&start).await {
            Ok((translated, settled)) => {
                self.checkpoint(Checkpoint::TurnCompleted, &settled).await;
                tracing::info!(translated, "Turn completed");
                TurnOutcome::Completed { translated }
            }
            Err(err) => self.abort(&start, err).await,
        };
        self.store.release();
        outcome
    }

    /// 返回翻译是否成功，以及本轮结束后的状态
    async fn run_phases(&self, start: &TurnStart) -> Result<(bool, ChatState), ChatError> {
        let TurnStart {
            language,
            snapshot,
            user,
        } = start;
        let language = *language;
        let shadow = language.other();

        let reasoning = with_retry(&self.policies.reasoning, "reasoning", || {
            self.phases.reasoning(snapshot, &user.content, language)
        })
        .await
        .map_err(|e| ChatError::phase(TurnPhase::AwaitingReasoning, e))?;
        self.store.set_phase(TurnPhase::AwaitingManifestation);

        let content = with_retry(&self.policies.manifestation, "manifestation", || {
            self.phases.manifestation(snapshot, &user.content, &reasoning, language)
        })
        .await
        .map_err(|e| {
            tracing::debug!(trace = %reasoning, "Discarding reasoning trace of aborted turn");
            ChatError::phase(TurnPhase::AwaitingManifestation, e)
        })?;

        let model = Message::model(content, reasoning);
        self.store.append_model(language, model.clone());

        let source = TurnText {
            user: user.content.clone(),
            content: model.content.clone(),
            reasoning: model.reasoning.clone().unwrap_or_default(),
        };
        let (shadow_text, translated) = match with_retry(&self.policies.translation, "translation", || {
            self.phases.translate(&source, shadow)
        })
        .await
        {
            Ok(text) => (text, true),
            Err(err) => {
                tracing::warn!(error = %err, shadow_language = %shadow, "Translation failed, shadow history keeps source text");
                (source.clone(), false)
            }
        };

        let settled = self.store.complete_turn(
            shadow,
            user.shadow(shadow_text.user, None),
            model.shadow(shadow_text.content, Some(shadow_text.reasoning)),
        );
        Ok((translated, settled))
    }

    async fn abort(&self, start: &TurnStart, err: ChatError) -> TurnOutcome {
        let mut message = err.to_string();
        if message.trim().is_empty() {
            message = FALLBACK_ERROR.to_string();
        }
        tracing::error!(error = %message, "Turn aborted");
        let settled = self
            .store
            .fail_turn(start.language.other(), &start.user, message.clone());
        self.checkpoint(Checkpoint::TurnFailed, &settled).await;
        TurnOutcome::Failed(message)
    }

    async fn checkpoint(&self, checkpoint: Checkpoint, state: &ChatState) {
        if let Some(observer) = &self.observer {
            observer.on_checkpoint(checkpoint, state).await;
        }
    }
}
