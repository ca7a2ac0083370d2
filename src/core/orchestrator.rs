//! 运行时主控循环
//!
//! 负责：按配置选择 LLM 后端、恢复最近会话、建立 cmd / state / sessions 通道，
//! 并在后台任务中消费 UI 命令。每轮对话在独立任务中运行；单飞标志在派发前同步占用，
//! 因此轮次进行中的会话切换（新建、加载、导入、删除当前会话）都会被拒绝。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::config::AppConfig;
use crate::core::{ChatError, ChatState, StateStore, TurnOrchestrator};
use crate::llm::{
    GeminiClient, LlmClient, LlmPhaseClient, MockPhaseClient, OpenAiClient, PhaseClient,
    GEMINI_FLASH, GEMINI_PRO, OPENAI_DEFAULT_MODEL,
};
use crate::memory::{restore_or_create, Session, SessionRecorder, SessionStore, SessionSummary};

/// 从 UI 发往运行时的用户命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 提交用户输入，开始一轮
    Submit(String),
    /// 切换显示语言（KO / EN）
    ToggleLanguage,
    NewSession,
    LoadSession(String),
    /// 循环切换到列表中的下一个会话
    NextSession,
    DeleteSession(String),
    RenameSession(String, String),
    /// 导出当前会话；None 时写到当前目录
    Export(Option<PathBuf>),
    Import(PathBuf),
    Quit,
}

/// create_runtime 返回给 UI 的通道集合
pub struct RuntimeHandles {
    pub cmd_tx: mpsc::UnboundedSender<Command>,
    pub state_rx: watch::Receiver<ChatState>,
    pub sessions_rx: watch::Receiver<Vec<SessionSummary>>,
    /// 当前活动会话 id
    pub active_rx: watch::Receiver<String>,
    /// 最近一条操作提示（导出路径、导入失败原因等）
    pub notice_rx: watch::Receiver<Option<String>>,
}

fn env_key(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

/// 根据配置与环境变量选择后端（Gemini / OpenAI 兼容 / Mock）；缺少 Key 时回落到 Mock
pub fn create_phase_client_from_config(cfg: &AppConfig) -> Arc<dyn PhaseClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = Duration::from_secs(cfg.llm.timeouts.request);

    let clients: Option<(Arc<dyn LlmClient>, Arc<dyn LlmClient>)> = match provider.as_str() {
        "mock" => None,
        "openai" => match env_key(&["OPENAI_API_KEY"]) {
            Some(key) => {
                let model = cfg
                    .llm
                    .reasoning_model
                    .clone()
                    .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
                let translation_model = cfg
                    .llm
                    .translation_model
                    .clone()
                    .unwrap_or_else(|| model.clone());
                let base = cfg.llm.base_url.as_deref();
                let build = |model: &str| OpenAiClient::new(base, model, &key, timeout);
                match (build(&model), build(&translation_model)) {
                    (Ok(thinker), Ok(translator)) => {
                        tracing::info!("Using OpenAI LLM ({} / {})", model, translation_model);
                        Some((Arc::new(thinker), Arc::new(translator)))
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!("OpenAI client init failed: {}", e);
                        None
                    }
                }
            }
            None => {
                tracing::warn!("OPENAI_API_KEY is not set");
                None
            }
        },
        _ => match env_key(&["GEMINI_API_KEY", "API_KEY"]) {
            Some(key) => {
                let model = cfg
                    .llm
                    .reasoning_model
                    .clone()
                    .unwrap_or_else(|| GEMINI_PRO.to_string());
                let translation_model = cfg
                    .llm
                    .translation_model
                    .clone()
                    .unwrap_or_else(|| GEMINI_FLASH.to_string());
                let build = |model: &str| {
                    GeminiClient::new(key.clone(), model, timeout).map(|client| match &cfg.llm.base_url {
                        Some(base) => client.with_base_url(base.clone()),
                        None => client,
                    })
                };
                match (build(&model), build(&translation_model)) {
                    (Ok(thinker), Ok(translator)) => {
                        tracing::info!("Using Gemini LLM ({} / {})", model, translation_model);
                        Some((Arc::new(thinker), Arc::new(translator)))
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!("Gemini client init failed: {}", e);
                        None
                    }
                }
            }
            None => {
                tracing::warn!("GEMINI_API_KEY / API_KEY is not set");
                None
            }
        },
    };

    match clients {
        Some((thinker, translator)) => Arc::new(
            LlmPhaseClient::new(thinker, translator).with_thinking_budget(cfg.llm.thinking_budget),
        ),
        None => {
            tracing::warn!("No usable LLM backend, using Mock phases");
            Arc::new(MockPhaseClient)
        }
    }
}

/// 创建运行时：按配置选择后端后调用 spawn_runtime
pub fn create_runtime(cfg: AppConfig) -> anyhow::Result<RuntimeHandles> {
    let phases = create_phase_client_from_config(&cfg);
    Ok(spawn_runtime(&cfg, phases)?)
}

/// 用给定的三阶段客户端启动运行时（测试可注入脚本化客户端）；须在 tokio 运行时内调用
pub fn spawn_runtime(cfg: &AppConfig, phases: Arc<dyn PhaseClient>) -> Result<RuntimeHandles, ChatError> {
    let data_dir = cfg.app.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let sessions = Arc::new(SessionStore::new(&data_dir, cfg.app.max_sessions));
    let session = restore_or_create(&sessions, cfg.app.default_language)?;
    tracing::info!(id = %session.id, title = %session.title, "Session restored");

    let state = Arc::new(StateStore::new(session.idle_state()));
    let (active_tx, active_rx) = watch::channel(session.id.clone());
    let recorder = Arc::new(SessionRecorder::new(sessions, session));
    let orchestrator = Arc::new(
        TurnOrchestrator::new(phases, state.clone(), cfg.retry.clone()).with_observer(recorder.clone()),
    );
    let (notice_tx, notice_rx) = watch::channel(None);
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();

    let handles = RuntimeHandles {
        cmd_tx,
        state_rx: state.subscribe(),
        sessions_rx: recorder.subscribe(),
        active_rx,
        notice_rx,
    };

    let runtime = Runtime {
        orchestrator,
        state,
        recorder,
        active_tx,
        notice_tx,
    };

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            if matches!(cmd, Command::Quit) {
                break;
            }
            if let Err(e) = runtime.handle(cmd).await {
                tracing::warn!(error = %e, "Command failed");
                runtime.notify(e.to_string());
            }
        }
        tracing::info!("Runtime loop stopped");
    });

    Ok(handles)
}

struct Runtime {
    orchestrator: Arc<TurnOrchestrator>,
    state: Arc<StateStore>,
    recorder: Arc<SessionRecorder>,
    active_tx: watch::Sender<String>,
    notice_tx: watch::Sender<Option<String>>,
}

impl Runtime {
    fn notify(&self, message: impl Into<String>) {
        self.notice_tx.send_replace(Some(message.into()));
    }

    fn sessions(&self) -> &SessionStore {
        self.recorder.store()
    }

    async fn handle(&self, cmd: Command) -> Result<(), ChatError> {
        match cmd {
            Command::Submit(input) => {
                // begin 同步占用单飞标志，之后的命令都能看到 loading
                let start = match self.orchestrator.begin(&input) {
                    Ok(start) => start,
                    Err(reason) => {
                        tracing::debug!(?reason, "Submit ignored");
                        return Ok(());
                    }
                };
                let orchestrator = self.orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator.run(start).await;
                });
            }
            Command::ToggleLanguage => {
                let language = self.state.toggle_language();
                tracing::info!(%language, "Display language switched");
                if !self.state.is_loading() {
                    self.recorder.record(&self.state.snapshot()).await?;
                }
            }
            Command::NewSession => {
                self.ensure_idle()?;
                let session = self.sessions().create(self.state.snapshot().language)?;
                self.activate(session).await?;
            }
            Command::LoadSession(id) => {
                self.ensure_idle()?;
                let session = self.sessions().get(&id)?;
                self.activate(session).await?;
            }
            Command::NextSession => {
                self.ensure_idle()?;
                let summaries = self.sessions().summaries()?;
                let active = self.recorder.active_id().await;
                let next = summaries
                    .iter()
                    .position(|s| s.id == active)
                    .map(|i| (i + 1) % summaries.len())
                    .unwrap_or(0);
                if let Some(summary) = summaries.get(next).filter(|s| s.id != active) {
                    let session = self.sessions().get(&summary.id)?;
                    self.activate(session).await?;
                }
            }
            Command::DeleteSession(id) => {
                let active = self.recorder.active_id().await;
                if id == active {
                    self.ensure_idle()?;
                }
                self.sessions().delete(&id)?;
                if id == active {
                    let language = self.state.snapshot().language;
                    let session = restore_or_create(self.sessions(), language)?;
                    self.activate(session).await?;
                } else {
                    self.recorder.publish();
                }
            }
            Command::RenameSession(id, title) => {
                if title.trim().is_empty() {
                    return Err(ChatError::Validation("title must not be empty".to_string()));
                }
                // 先改检查点目标，避免并发的检查点用旧标题覆盖
                if id == self.recorder.active_id().await {
                    self.recorder.rename_active(title.trim()).await;
                }
                self.sessions().rename(&id, &title)?;
                self.recorder.publish();
            }
            Command::Export(dest) => {
                if !self.state.is_loading() {
                    self.recorder.record(&self.state.snapshot()).await?;
                }
                let id = self.recorder.active_id().await;
                let dest = dest.unwrap_or_else(|| PathBuf::from("."));
                let path = self.sessions().export(&id, &dest)?;
                self.notify(format!("Exported to {}", path.display()));
            }
            Command::Import(path) => {
                self.ensure_idle()?;
                let session = self.sessions().import(&path)?;
                let title = session.title.clone();
                self.activate(session).await?;
                self.notify(format!("Imported '{title}'"));
            }
            Command::Quit => {}
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), ChatError> {
        if self.state.is_loading() {
            Err(ChatError::TurnInFlight)
        } else {
            Ok(())
        }
    }

    /// 切换到 session：整体替换状态（进行中时拒绝），再更新检查点目标
    async fn activate(&self, session: Session) -> Result<(), ChatError> {
        self.state.replace(session.idle_state())?;
        tracing::info!(id = %session.id, title = %session.title, "Session activated");
        self.active_tx.send_replace(session.id.clone());
        self.recorder.set_active(session).await;
        Ok(())
    }
}
