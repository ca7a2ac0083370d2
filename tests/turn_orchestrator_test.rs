//! 轮次编排集成测试：脚本化三阶段客户端驱动 TurnOrchestrator

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use tractatus::core::{
        ChatState, Checkpoint, Language, LoadingPhase, PhasePolicies, RejectReason, RetryPolicy,
        StateStore, TurnObserver, TurnOrchestrator, TurnOutcome,
    };
    use tractatus::llm::{LlmError, PhaseClient, TurnText};
    use tractatus::memory::{Message, Role};

    type Script<T> = Mutex<VecDeque<Result<T, LlmError>>>;

    /// 按脚本返回各阶段结果并计数；脚本耗尽后返回默认成功值
    #[derive(Default)]
    struct ScriptedPhases {
        reasoning: Script<String>,
        manifestation: Script<String>,
        translation: Script<TurnText>,
        reasoning_calls: AtomicU32,
        manifestation_calls: AtomicU32,
        translation_calls: AtomicU32,
        /// 设置后，推理阶段等待通知再返回
        gate: Option<Arc<Notify>>,
        always_fail_translation: bool,
        /// 各阶段收到的历史 id
        seen_histories: Mutex<Vec<(&'static str, Vec<String>)>>,
        /// 设置后，记录每个阶段被调用时 store 的 loading_phase
        watched: Option<Arc<StateStore>>,
        seen_phases: Mutex<Vec<Option<LoadingPhase>>>,
    }

    impl ScriptedPhases {
        fn with_reasoning(mut self, results: Vec<Result<String, LlmError>>) -> Self {
            self.reasoning = Mutex::new(results.into());
            self
        }

        fn with_manifestation(mut self, results: Vec<Result<String, LlmError>>) -> Self {
            self.manifestation = Mutex::new(results.into());
            self
        }

        fn with_translation(mut self, results: Vec<Result<TurnText, LlmError>>) -> Self {
            self.translation = Mutex::new(results.into());
            self
        }

        fn watching(mut self, store: Arc<StateStore>) -> Self {
            self.watched = Some(store);
            self
        }

        fn observe(&self, phase: &'static str, history: Option<&[Message]>) {
            if let Some(history) = history {
                let ids = history.iter().map(|m| m.id.clone()).collect();
                self.seen_histories.lock().unwrap().push((phase, ids));
            }
            if let Some(store) = &self.watched {
                self.seen_phases.lock().unwrap().push(store.snapshot().loading_phase);
            }
        }
    }

    #[async_trait]
    impl PhaseClient for ScriptedPhases {
        async fn reasoning(
            &self,
            history: &[Message],
            _input: &str,
            _language: Language,
        ) -> Result<String, LlmError> {
            self.reasoning_calls.fetch_add(1, Ordering::SeqCst);
            self.observe("reasoning", Some(history));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = self.reasoning.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok("trace".to_string()))
        }

        async fn manifestation(
            &self,
            history: &[Message],
            _input: &str,
            _reasoning: &str,
            _language: Language,
        ) -> Result<String, LlmError> {
            self.manifestation_calls.fetch_add(1, Ordering::SeqCst);
            self.observe("manifestation", Some(history));
            let next = self.manifestation.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok("output".to_string()))
        }

        async fn translate(&self, turn: &TurnText, _target: Language) -> Result<TurnText, LlmError> {
            self.translation_calls.fetch_add(1, Ordering::SeqCst);
            self.observe("translation", None);
            if self.always_fail_translation {
                return Err(LlmError::RateLimited {
                    retry_after_ms: None,
                });
            }
            let next = self.translation.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(turn.clone()))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        checkpoints: Mutex<Vec<(Checkpoint, ChatState)>>,
    }

    #[async_trait]
    impl TurnObserver for RecordingObserver {
        async fn on_checkpoint(&self, checkpoint: Checkpoint, state: &ChatState) {
            self.checkpoints
                .lock()
                .unwrap()
                .push((checkpoint, state.clone()));
        }
    }

    /// 在每个检查点尝试整体替换状态（模拟切换会话），记录是否被拒绝
    struct SwitchingObserver {
        store: Arc<StateStore>,
        attempts: Mutex<Vec<(Checkpoint, bool)>>,
    }

    #[async_trait]
    impl TurnObserver for SwitchingObserver {
        async fn on_checkpoint(&self, checkpoint: Checkpoint, _state: &ChatState) {
            let rejected = self.store.replace(ChatState::new(Language::Ko)).is_err();
            self.attempts.lock().unwrap().push((checkpoint, rejected));
        }
    }

    fn seed() -> Message {
        Message {
            id: "s".to_string(),
            role: Role::Model,
            content: "READY".to_string(),
            reasoning: None,
            timestamp: 0,
        }
    }

    fn seeded_store(language: Language) -> Arc<StateStore> {
        Arc::new(StateStore::new(ChatState::with_seeds(seed(), seed(), language)))
    }

    fn fast_policies(max_attempts: u32) -> PhasePolicies {
        PhasePolicies::uniform(RetryPolicy::new(max_attempts, Duration::from_millis(1)))
    }

    fn orchestrator(phases: Arc<ScriptedPhases>, store: Arc<StateStore>) -> TurnOrchestrator {
        TurnOrchestrator::new(phases, store, fast_policies(3))
    }

    fn assert_ids_paired(state: &ChatState) {
        assert_eq!(state.history_ko.len(), state.history_en.len());
        for (ko, en) in state.history_ko.iter().zip(&state.history_en) {
            assert_eq!(ko.id, en.id);
            assert_eq!(ko.role, en.role);
        }
    }

    #[tokio::test]
    async fn test_happy_path_fills_both_histories() {
        let phases = Arc::new(
            ScriptedPhases::default()
                .with_reasoning(vec![Ok("trace1".to_string())])
                .with_manifestation(vec![Ok("hi there".to_string())])
                .with_translation(vec![Ok(TurnText {
                    user: "안녕".to_string(),
                    content: "안녕하세요".to_string(),
                    reasoning: "추적1".to_string(),
                })]),
        );
        let store = seeded_store(Language::En);
        let orchestrator = orchestrator(phases, store.clone());

        let outcome = orchestrator.send("hello").await;
        assert_eq!(outcome, TurnOutcome::Completed { translated: true });

        let state = store.snapshot();
        assert_eq!(state.history_en.len(), 3);
        assert_eq!(state.history_en[1].content, "hello");
        assert_eq!(state.history_en[1].role, Role::User);
        assert_eq!(state.history_en[2].content, "hi there");
        assert_eq!(state.history_en[2].reasoning.as_deref(), Some("trace1"));

        assert_eq!(state.history_ko.len(), 3);
        assert_eq!(state.history_ko[1].content, "안녕");
        assert_eq!(state.history_ko[2].content, "안녕하세요");
        assert_eq!(state.history_ko[2].reasoning.as_deref(), Some("추적1"));

        assert_ids_paired(&state);
        assert!(!state.is_loading);
        assert!(state.loading_phase.is_none());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_reasoning_unavailable_is_fatal() {
        let phases = Arc::new(
            ScriptedPhases::default().with_reasoning(vec![Err(LlmError::Unavailable("503".to_string()))]),
        );
        let store = seeded_store(Language::En);
        let orchestrator = orchestrator(phases.clone(), store.clone());

        let outcome = orchestrator.send("hello").await;
        assert!(matches!(outcome, TurnOutcome::Failed(ref msg) if !msg.is_empty()));
        assert_eq!(phases.reasoning_calls.load(Ordering::SeqCst), 1);
        assert_eq!(phases.manifestation_calls.load(Ordering::SeqCst), 0);

        let state = store.snapshot();
        assert_eq!(state.history_en.len(), 2);
        assert_eq!(state.history_en[1].content, "hello");
        assert_eq!(state.history_ko.len(), 2);
        assert_eq!(state.history_ko[1].id, state.history_en[1].id);
        assert_eq!(state.history_ko[1].content, "hello");
        assert!(!state.is_loading);
        assert!(state.error.as_deref().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn test_manifestation_failure_discards_reasoning() {
        let phases = Arc::new(
            ScriptedPhases::default()
                .with_reasoning(vec![Ok("partial trace".to_string())])
                .with_manifestation(vec![Err(LlmError::Malformed("no text".to_string()))]),
        );
        let store = seeded_store(Language::Ko);
        let orchestrator = orchestrator(phases, store.clone());

        let outcome = orchestrator.send("질문").await;
        let TurnOutcome::Failed(message) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.contains("manifestation"));

        let state = store.snapshot();
        assert_eq!(state.history_ko.len(), 2);
        assert!(state.history_ko.iter().all(|m| m.reasoning.as_deref() != Some("partial trace")));
        assert_eq!(state.history_en.len(), 2);
        assert_eq!(state.error.as_deref(), Some(message.as_str()));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_within_bound() {
        let n = 3;
        let mut script: Vec<Result<String, LlmError>> = (0..n)
            .map(|_| {
                Err(LlmError::RateLimited {
                    retry_after_ms: None,
                })
            })
            .collect();
        script.push(Ok("trace".to_string()));
        let phases = Arc::new(ScriptedPhases::default().with_reasoning(script));
        let store = seeded_store(Language::En);
        let orchestrator = TurnOrchestrator::new(phases.clone(), store.clone(), fast_policies(n + 1));

        let outcome = orchestrator.send("hello").await;
        assert_eq!(outcome, TurnOutcome::Completed { translated: true });
        assert_eq!(phases.reasoning_calls.load(Ordering::SeqCst), n + 1);
        assert!(store.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_fails_the_turn() {
        let script = (0..5)
            .map(|_| {
                Err(LlmError::RateLimited {
                    retry_after_ms: None,
                })
            })
            .collect();
        let phases = Arc::new(ScriptedPhases::default().with_reasoning(script));
        let store = seeded_store(Language::En);
        let orchestrator = TurnOrchestrator::new(phases.clone(), store.clone(), fast_policies(2));

        assert!(matches!(orchestrator.send("hello").await, TurnOutcome::Failed(_)));
        assert_eq!(phases.reasoning_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_translation_failure_falls_back_to_source() {
        let phases = Arc::new(ScriptedPhases {
            always_fail_translation: true,
            ..Default::default()
        });
        let store = seeded_store(Language::En);
        let orchestrator = orchestrator(phases.clone(), store.clone());

        let outcome = orchestrator.send("hello").await;
        assert_eq!(outcome, TurnOutcome::Completed { translated: false });
        assert_eq!(phases.translation_calls.load(Ordering::SeqCst), 3);

        let state = store.snapshot();
        assert!(state.error.is_none());
        assert_ids_paired(&state);
        assert_eq!(state.history_ko[1].content, "hello");
        assert_eq!(state.history_ko[2].content, state.history_en[2].content);
        assert_eq!(state.history_ko[2].reasoning, state.history_en[2].reasoning);
    }

    #[tokio::test]
    async fn test_second_send_while_loading_is_rejected() {
        let gate = Arc::new(Notify::new());
        let phases = Arc::new(ScriptedPhases {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let store = seeded_store(Language::Ko);
        let orchestrator = Arc::new(orchestrator(phases, store.clone()));

        let first = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.send("one").await })
        };
        let mut rx = store.subscribe();
        rx.wait_for(|s| s.is_loading).await.unwrap();

        let before = store.snapshot();
        assert_eq!(
            orchestrator.send("two").await,
            TurnOutcome::Rejected(RejectReason::TurnInFlight)
        );
        assert_eq!(store.snapshot(), before);

        gate.notify_one();
        assert_eq!(first.await.unwrap(), TurnOutcome::Completed { translated: true });
        assert_eq!(store.snapshot().history_ko.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected_without_state_change() {
        let store = seeded_store(Language::Ko);
        let orchestrator = orchestrator(Arc::new(ScriptedPhases::default()), store.clone());
        let before = store.snapshot();
        assert_eq!(
            orchestrator.send("   ").await,
            TurnOutcome::Rejected(RejectReason::EmptyInput)
        );
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_histories_grow_in_lockstep() {
        let store = seeded_store(Language::Ko);
        let orchestrator = orchestrator(Arc::new(ScriptedPhases::default()), store.clone());

        for (i, input) in ["첫째", "둘째", "셋째"].into_iter().enumerate() {
            let before = store.snapshot();
            orchestrator.send(input).await;
            let after = store.snapshot();
            assert_eq!(after.history_ko.len(), 1 + 2 * (i + 1));
            assert_eq!(&after.history_ko[..before.history_ko.len()], &before.history_ko[..]);
            assert_eq!(&after.history_en[..before.history_en.len()], &before.history_en[..]);
            assert_ids_paired(&after);
        }
    }

    #[tokio::test]
    async fn test_error_is_cleared_by_next_turn() {
        let phases = Arc::new(
            ScriptedPhases::default().with_reasoning(vec![Err(LlmError::Unavailable("down".to_string()))]),
        );
        let store = seeded_store(Language::En);
        let orchestrator = orchestrator(phases, store.clone());

        orchestrator.send("first").await;
        assert!(store.snapshot().error.is_some());

        orchestrator.send("second").await;
        let state = store.snapshot();
        assert!(state.error.is_none());
        assert_eq!(state.history_en.len(), 4);
    }

    #[tokio::test]
    async fn test_checkpoints_are_explicit() {
        let observer = Arc::new(RecordingObserver::default());
        let phases = Arc::new(
            ScriptedPhases::default()
                .with_reasoning(vec![Ok("t".to_string()), Err(LlmError::Unavailable("x".to_string()))]),
        );
        let store = seeded_store(Language::En);
        let orchestrator = orchestrator(phases, store.clone()).with_observer(observer.clone());

        orchestrator.send("ok").await;
        orchestrator.send("fails").await;

        let checkpoints = observer.checkpoints.lock().unwrap();
        let kinds: Vec<Checkpoint> = checkpoints.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            kinds,
            vec![
                Checkpoint::UserAppended,
                Checkpoint::TurnCompleted,
                Checkpoint::UserAppended,
                Checkpoint::TurnFailed,
            ]
        );

        let (_, appended) = &checkpoints[0];
        assert!(appended.is_loading);
        assert_eq!(appended.history_en.len(), 2);
        let (_, completed) = &checkpoints[1];
        assert!(!completed.is_loading);
        assert_eq!(completed.history_ko.len(), 3);
        let (_, failed) = &checkpoints[3];
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn test_phases_see_history_without_new_input() {
        let phases = Arc::new(ScriptedPhases::default());
        let store = seeded_store(Language::Ko);
        let orchestrator = orchestrator(phases.clone(), store.clone());

        orchestrator.send("첫째").await;
        let after_first: Vec<String> = store.snapshot().history_ko.iter().map(|m| m.id.clone()).collect();
        orchestrator.send("둘째").await;

        let seen = phases.seen_histories.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("reasoning", vec!["s".to_string()]),
                ("manifestation", vec!["s".to_string()]),
                ("reasoning", after_first.clone()),
                ("manifestation", after_first),
            ]
        );
    }

    #[tokio::test]
    async fn test_loading_phase_advances_through_each_phase() {
        let store = seeded_store(Language::En);
        let phases = Arc::new(ScriptedPhases::default().watching(store.clone()));
        let orchestrator = orchestrator(phases.clone(), store.clone());

        orchestrator.send("hello").await;

        assert_eq!(
            *phases.seen_phases.lock().unwrap(),
            vec![
                Some(LoadingPhase::Acquiring),
                Some(LoadingPhase::Transitioning),
                Some(LoadingPhase::Synchronizing),
            ]
        );
        assert!(store.snapshot().loading_phase.is_none());
    }

    #[tokio::test]
    async fn test_session_switch_is_blocked_until_final_checkpoint_is_saved() {
        let phases = Arc::new(
            ScriptedPhases::default()
                .with_reasoning(vec![Ok("t".to_string()), Err(LlmError::Unavailable("x".to_string()))]),
        );
        let store = seeded_store(Language::En);
        let observer = Arc::new(SwitchingObserver {
            store: store.clone(),
            attempts: Mutex::new(Vec::new()),
        });
        let orchestrator = orchestrator(phases, store.clone()).with_observer(observer.clone());

        orchestrator.send("ok").await;
        orchestrator.send("fails").await;

        assert_eq!(
            *observer.attempts.lock().unwrap(),
            vec![
                (Checkpoint::UserAppended, true),
                (Checkpoint::TurnCompleted, true),
                (Checkpoint::UserAppended, true),
                (Checkpoint::TurnFailed, true),
            ]
        );
        let state = store.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.history_en.len(), 4);
        assert!(store.replace(ChatState::new(Language::Ko)).is_ok());
    }
}
