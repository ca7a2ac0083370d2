//! 双语状态存储
//!
//! watch::Sender 即唯一的状态持有者：所有变更都是一次原子的 send_modify / send_if_modified，
//! 订阅者（UI、测试）拿到的是快照。对外只暴露「整体替换」与只读访问；
//! 轮次内的追加由 TurnOrchestrator 通过 crate 内方法完成。

use tokio::sync::watch;

use crate::core::{ChatError, ChatState, Language, TurnPhase};
use crate::memory::Message;

/// begin_turn 成功后返回：活动语言、追加前的历史快照、已追加的用户消息
#[derive(Clone, Debug)]
pub struct TurnStart {
    pub language: Language,
    pub snapshot: Vec<Message>,
    pub user: Message,
}

#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<ChatState>,
}

impl StateStore {
    pub fn new(initial: ChatState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ChatState {
        self.tx.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().is_loading
    }

    /// 整体替换（加载 / 新建 / 导入会话）；有轮次在进行时拒绝
    pub fn replace(&self, state: ChatState) -> Result<(), ChatError> {
        let replaced = self.tx.send_if_modified(move |current| {
            if current.is_loading {
                return false;
            }
            *current = state;
            true
        });
        if replaced {
            Ok(())
        } else {
            Err(ChatError::TurnInFlight)
        }
    }

    /// 切换显示语言；进行中的轮次已记下自己的语言，不受影响
    pub fn toggle_language(&self) -> Language {
        let mut language = Language::default();
        self.tx.send_modify(|state| {
            state.language = state.language.other();
            language = state.language;
        });
        language
    }

    /// 原子地检查单飞标志并开始一轮：快照活动历史 → 乐观追加用户消息 → 置 loading
    pub(crate) fn begin_turn(&self, user: Message) -> Option<TurnStart> {
        let mut start = None;
        self.tx.send_if_modified(|state| {
            if state.is_loading {
                return false;
            }
            let language = state.language;
            let snapshot = state.history(language).to_vec();
            state.history_mut(language).push(user.clone());
            state.is_loading = true;
            state.loading_phase = TurnPhase::AwaitingReasoning.loading_phase();
            state.error = None;
            start = Some(TurnStart {
                language,
                snapshot,
                user,
            });
            true
        });
        start
    }

    pub(crate) fn set_phase(&self, phase: TurnPhase) {
        self.tx.send_modify(|state| state.loading_phase = phase.loading_phase());
    }

    /// 阶段 2 完成：模型消息追加到活动历史，进入同步阶段
    pub(crate) fn append_model(&self, language: Language, model: Message) {
        self.tx.send_modify(|state| {
            state.history_mut(language).push(model);
            state.loading_phase = TurnPhase::AwaitingSync.loading_phase();
        });
    }

    /// 阶段 3 完成（或回落）：影子对追加到影子历史；单飞标志仍由本轮持有，直到 release
    pub(crate) fn complete_turn(&self, shadow_language: Language, user: Message, model: Message) -> ChatState {
        let mut settled = None;
        self.tx.send_modify(|state| {
            if !state.contains_id(shadow_language, &user.id) {
                state.history_mut(shadow_language).push(user);
            }
            state.history_mut(shadow_language).push(model);
            settled = Some(Self::settle(state));
        });
        settled.unwrap_or_default()
    }

    /// 致命失败：记录错误；用户消息至少在两条历史中都可见。标志同样留到 release
    pub(crate) fn fail_turn(&self, shadow_language: Language, user: &Message, error: String) -> ChatState {
        let mut settled = None;
        self.tx.send_modify(|state| {
            if !state.contains_id(shadow_language, &user.id) {
                state.history_mut(shadow_language).push(user.clone());
            }
            state.error = Some(error);
            settled = Some(Self::settle(state));
        });
        settled.unwrap_or_default()
    }

    /// 释放单飞标志，结束本轮
    pub(crate) fn release(&self) {
        self.tx.send_modify(|state| {
            state.is_loading = false;
            state.loading_phase = None;
        });
    }

    /// 本轮结束后的状态（供最终检查点保存）
    fn settle(state: &ChatState) -> ChatState {
        let mut settled = state.clone();
        settled.is_loading = false;
        settled.loading_phase = None;
        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LoadingPhase;

    #[test]
    fn test_begin_turn_snapshots_before_append() {
        let store = StateStore::new(ChatState::new(Language::Ko));
        let start = store.begin_turn(Message::user("안녕")).unwrap();

        assert_eq!(start.language, Language::Ko);
        assert_eq!(start.snapshot.len(), 1);
        let state = store.snapshot();
        assert_eq!(state.history_ko.len(), 2);
        assert_eq!(state.history_en.len(), 1);
        assert!(state.is_loading);
        assert_eq!(state.loading_phase, Some(LoadingPhase::Acquiring));
    }

    #[test]
    fn test_begin_turn_rejected_while_loading() {
        let store = StateStore::new(ChatState::new(Language::Ko));
        assert!(store.begin_turn(Message::user("one")).is_some());
        let before = store.snapshot();
        assert!(store.begin_turn(Message::user("two")).is_none());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_replace_rejected_while_loading() {
        let store = StateStore::new(ChatState::new(Language::Ko));
        store.begin_turn(Message::user("one"));
        let result = store.replace(ChatState::new(Language::En));
        assert!(matches!(result, Err(ChatError::TurnInFlight)));
        assert_eq!(store.snapshot().language, Language::Ko);
    }

    #[test]
    fn test_replace_when_idle() {
        let store = StateStore::new(ChatState::new(Language::Ko));
        store.replace(ChatState::new(Language::En)).unwrap();
        assert_eq!(store.snapshot().language, Language::En);
    }

    #[test]
    fn test_fail_turn_does_not_duplicate_user() {
        let store = StateStore::new(ChatState::new(Language::En));
        let start = store.begin_turn(Message::user("hello")).unwrap();
        store.fail_turn(Language::Ko, &start.user, "down".into());
        store.release();
        store.fail_turn(Language::Ko, &start.user, "down again".into());
        store.release();

        let state = store.snapshot();
        assert_eq!(state.history_ko.len(), 2);
        assert_eq!(state.error.as_deref(), Some("down again"));
    }

    #[test]
    fn test_turn_holds_flag_until_release() {
        let store = StateStore::new(ChatState::new(Language::Ko));
        let start = store.begin_turn(Message::user("안녕")).unwrap();
        let settled = store.complete_turn(
            Language::En,
            start.user.shadow("hi".to_string(), None),
            Message::model("answer", "trace"),
        );

        assert!(!settled.is_loading);
        assert!(settled.loading_phase.is_none());
        assert_eq!(settled.history_en.len(), 3);
        assert!(store.is_loading());
        assert!(matches!(
            store.replace(ChatState::new(Language::En)),
            Err(ChatError::TurnInFlight)
        ));

        store.release();
        assert_eq!(store.snapshot(), settled);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let store = StateStore::new(ChatState::new(Language::Ko));
        let mut rx = store.subscribe();
        store.toggle_language();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().language, Language::En);
    }
}
