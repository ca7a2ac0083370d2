//! 会话持久化
//!
//! 所有会话存放在一个 JSON 文件（数据目录下的 sessions.json），按 updatedAt 倒序，最多保留 max_sessions 个。
//! SessionRecorder 作为 TurnObserver 在检查点保存当前会话，并广播会话列表供 UI 侧栏使用。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

use crate::core::{ChatError, ChatState, Checkpoint, Language, TurnObserver};
use crate::memory::session::{Session, SessionDocument, SessionSummary, PLACEHOLDER_TITLE};
use crate::memory::now_millis;

pub const SESSIONS_FILE: &str = "sessions.json";

/// 单文件会话存储
///
/// 每个操作都是对整个文件的读-改-写，由 `lock` 串行化；写入先落到 `.json.tmp` 再 rename 覆盖。
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    max_sessions: usize,
    lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(data_dir: impl AsRef<Path>, max_sessions: usize) -> Self {
        Self {
            path: data_dir.as_ref().join(SESSIONS_FILE),
            max_sessions: max_sessions.max(1),
            lock: Mutex::new(()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // 锁内不持有数据，持锁方 panic 后仍可继续使用
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部会话；文件不存在时为空，内容损坏时记录错误并按空处理
    fn read_all(&self) -> Result<Vec<Session>, ChatError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Vec<Session>>(&data) {
            Ok(sessions) => Ok(sessions),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Session restoration failed");
                Ok(Vec::new())
            }
        }
    }

    fn write_all(&self, sessions: &mut Vec<Session>) -> Result<(), ChatError> {
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(self.max_sessions);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(sessions)?)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Session>, ChatError> {
        let _guard = self.guard();
        self.read_all()
    }

    pub fn summaries(&self) -> Result<Vec<SessionSummary>, ChatError> {
        let _guard = self.guard();
        Ok(self.read_all()?.iter().map(SessionSummary::from).collect())
    }

    pub fn load_latest(&self) -> Result<Option<Session>, ChatError> {
        let _guard = self.guard();
        Ok(self.read_all()?.into_iter().next())
    }

    pub fn get(&self, id: &str) -> Result<Session, ChatError> {
        let _guard = self.guard();
        self.read_all()?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))
    }

    /// 新建仅含种子消息的会话并放到列表最前
    pub fn create(&self, language: Language) -> Result<Session, ChatError> {
        let mut session = Session::new(language);
        let _guard = self.guard();
        let mut sessions = self.read_all()?;
        // id 取毫秒时间戳，同一毫秒内连续创建时加序号
        let base = session.id.clone();
        let mut n = 1;
        while sessions.iter().any(|s| s.id == session.id) {
            session.id = format!("{base}-{n}");
            n += 1;
        }
        sessions.insert(0, session.clone());
        self.write_all(&mut sessions)?;
        tracing::info!(id = %session.id, "Session created");
        Ok(session)
    }

    /// 按 id 插入或覆盖；刷新 updatedAt 与占位标题，返回实际保存的会话
    pub fn save(&self, session: &Session) -> Result<Session, ChatError> {
        let mut saved = session.clone();
        saved.updated_at = now_millis();
        saved.refresh_title();

        let _guard = self.guard();
        let mut sessions = self.read_all()?;
        sessions.retain(|s| s.id != saved.id);
        sessions.insert(0, saved.clone());
        self.write_all(&mut sessions)?;
        tracing::debug!(id = %saved.id, title = %saved.title, "Session saved");
        Ok(saved)
    }

    /// 删除会话；返回是否确有删除
    pub fn delete(&self, id: &str) -> Result<bool, ChatError> {
        let _guard = self.guard();
        let mut sessions = self.read_all()?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        let removed = sessions.len() != before;
        if removed {
            self.write_all(&mut sessions)?;
            tracing::info!(%id, "Session deleted");
        }
        Ok(removed)
    }

    pub fn rename(&self, id: &str, title: &str) -> Result<(), ChatError> {
        let _guard = self.guard();
        let mut sessions = self.read_all()?;
        let session = sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?;
        session.title = title.trim().to_string();
        self.write_all(&mut sessions)
    }

    /// 导出为带缩进的 JSON 文档；dest 为目录时使用默认文件名
    pub fn export(&self, id: &str, dest: &Path) -> Result<PathBuf, ChatError> {
        let session = self.get(id)?;
        let path = if dest.is_dir() {
            dest.join(session.export_file_name())
        } else {
            dest.to_path_buf()
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&session)?)?;
        tracing::info!(%id, path = %path.display(), "Session exported");
        Ok(path)
    }

    /// 导入会话文档：校验失败时存储不变；同 id 会话被覆盖
    pub fn import(&self, path: &Path) -> Result<Session, ChatError> {
        let json = std::fs::read_to_string(path)?;
        let mut session = SessionDocument::parse(&json)?.validate()?;
        session.updated_at = now_millis();

        let _guard = self.guard();
        let mut sessions = self.read_all()?;
        sessions.retain(|s| s.id != session.id);
        sessions.insert(0, session.clone());
        self.write_all(&mut sessions)?;
        tracing::info!(id = %session.id, path = %path.display(), "Session imported");
        Ok(session)
    }
}

/// 检查点保存器：记住当前活动会话，在轮次检查点把 ChatState 写回该会话
pub struct SessionRecorder {
    store: Arc<SessionStore>,
    active: RwLock<Session>,
    sessions_tx: watch::Sender<Vec<SessionSummary>>,
}

impl SessionRecorder {
    pub fn new(store: Arc<SessionStore>, active: Session) -> Self {
        let summaries = store.summaries().unwrap_or_default();
        let (sessions_tx, _rx) = watch::channel(summaries);
        Self {
            store,
            active: RwLock::new(active),
            sessions_tx,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<SessionSummary>> {
        self.sessions_tx.subscribe()
    }

    pub async fn active_id(&self) -> String {
        self.active.read().await.id.clone()
    }

    pub async fn set_active(&self, session: Session) {
        *self.active.write().await = session;
        self.publish();
    }

    pub async fn rename_active(&self, title: &str) {
        self.active.write().await.title = title.to_string();
    }

    /// 重新读取会话列表并广播
    pub fn publish(&self) {
        match self.store.summaries() {
            Ok(summaries) => {
                self.sessions_tx.send_replace(summaries);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to list sessions"),
        }
    }

    /// 把 state 保存到当前活动会话
    pub async fn record(&self, state: &ChatState) -> Result<(), ChatError> {
        let mut active = self.active.write().await;
        active.data = state.clone();
        let saved = self.store.save(&active)?;
        active.title = saved.title;
        active.updated_at = saved.updated_at;
        drop(active);
        self.publish();
        Ok(())
    }
}

#[async_trait]
impl TurnObserver for SessionRecorder {
    async fn on_checkpoint(&self, checkpoint: Checkpoint, state: &ChatState) {
        if let Err(e) = self.record(state).await {
            tracing::error!(?checkpoint, error = %e, "Failed to persist session");
        }
    }
}

/// 启动时取最近会话；没有则新建
pub fn restore_or_create(store: &SessionStore, language: Language) -> Result<Session, ChatError> {
    match store.load_latest()? {
        Some(mut session) => {
            if session.title.trim().is_empty() {
                session.title = PLACEHOLDER_TITLE.to_string();
            }
            Ok(session)
        }
        None => store.create(language),
    }
}
