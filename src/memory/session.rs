//! 会话：带标题与时间戳的 ChatState 快照，及导入文档的结构校验
//!
//! 导入时先反序列化为全部字段可缺省的 SessionDocument，再逐项校验，
//! 得到类型化的 Session 或 ChatError::Validation，不做静默修补。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::{ChatError, ChatState, Language};
use crate::memory::{now_millis, Message, Role};

/// 新会话的占位标题；首条用户消息出现后替换
pub const PLACEHOLDER_TITLE: &str = "new_logic_stream";
const TITLE_CHARS: usize = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    pub data: ChatState,
}

impl Session {
    pub fn new(language: Language) -> Self {
        let now = now_millis();
        Self {
            id: now.to_string(),
            title: PLACEHOLDER_TITLE.to_string(),
            updated_at: now,
            data: ChatState::new(language),
        }
    }

    /// 占位标题时，用首条用户消息的前 30 个字符生成标题
    pub fn refresh_title(&mut self) {
        if self.title != PLACEHOLDER_TITLE {
            return;
        }
        if let Some(first) = self.data.first_user_message() {
            let head: String = first.content.chars().take(TITLE_CHARS).collect();
            self.title = format!("{}...", head.trim());
        }
    }

    /// 检查点可能落在轮次中途；恢复时清除进行中标志
    pub fn idle_state(&self) -> ChatState {
        let mut state = self.data.clone();
        state.is_loading = false;
        state.loading_phase = None;
        state
    }

    /// 导出文件名：tractatus_<标题中非 [a-z0-9] 字符替换为 _>.json
    pub fn export_file_name(&self) -> String {
        let slug: String = self
            .title
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("tractatus_{slug}.json")
    }
}

/// 会话列表中的一行（UI 侧栏用）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub updated_at: i64,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionDocument {
    id: Option<serde_json::Value>,
    title: Option<String>,
    #[serde(rename = "updatedAt")]
    updated_at: Option<i64>,
    data: Option<StateDocument>,
}

#[derive(Debug, Deserialize)]
struct StateDocument {
    #[serde(rename = "historyKO")]
    history_ko: Option<Vec<MessageDocument>>,
    #[serde(rename = "historyEN")]
    history_en: Option<Vec<MessageDocument>>,
    error: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDocument {
    id: Option<serde_json::Value>,
    role: Option<String>,
    content: Option<serde_json::Value>,
    reasoning: Option<String>,
    timestamp: Option<serde_json::Value>,
}

fn invalid(msg: impl Into<String>) -> ChatError {
    ChatError::Validation(msg.into())
}

/// id 允许字符串或数字（旧导出用 Date.now() 的数字形式）
fn id_string(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl MessageDocument {
    fn validate(self, history: &str, index: usize) -> Result<Message, ChatError> {
        let at = || format!("{history}[{index}]");
        let id = id_string(self.id).ok_or_else(|| invalid(format!("{}: missing id", at())))?;
        let role = match self.role.as_deref() {
            Some("user") => Role::User,
            Some("model") => Role::Model,
            Some(other) => return Err(invalid(format!("{}: unknown role '{other}'", at()))),
            None => return Err(invalid(format!("{}: missing role", at()))),
        };
        let content = match self.content {
            Some(serde_json::Value::String(s)) => s,
            Some(_) => return Err(invalid(format!("{}: content is not a string", at()))),
            None => return Err(invalid(format!("{}: missing content", at()))),
        };
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)))
            .ok_or_else(|| invalid(format!("{}: missing or non-numeric timestamp", at())))?;
        Ok(Message {
            id,
            role,
            content,
            reasoning: self.reasoning,
            timestamp,
        })
    }
}

fn validate_history(name: &str, docs: Option<Vec<MessageDocument>>) -> Result<Vec<Message>, ChatError> {
    let docs = docs.ok_or_else(|| invalid(format!("{name} is missing")))?;
    let mut seen = HashSet::new();
    let mut history = Vec::with_capacity(docs.len());
    for (index, doc) in docs.into_iter().enumerate() {
        let message = doc.validate(name, index)?;
        if !seen.insert(message.id.clone()) {
            return Err(invalid(format!("{name}: duplicate message id '{}'", message.id)));
        }
        history.push(message);
    }
    Ok(history)
}

impl SessionDocument {
    pub fn parse(json: &str) -> Result<Self, ChatError> {
        serde_json::from_str(json).map_err(|e| invalid(format!("not a session document: {e}")))
    }

    /// 校验并转换为 Session；进行中标志一律清除
    pub fn validate(self) -> Result<Session, ChatError> {
        let id = id_string(self.id).ok_or_else(|| invalid("session id is missing"))?;
        let data = self.data.ok_or_else(|| invalid("session data is missing"))?;

        let history_ko = validate_history("historyKO", data.history_ko)?;
        let history_en = validate_history("historyEN", data.history_en)?;
        let language = match data.language.as_deref() {
            None => Language::default(),
            Some(code) => {
                Language::parse(code).ok_or_else(|| invalid(format!("unknown language '{code}'")))?
            }
        };

        Ok(Session {
            id,
            title: self.title.unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            updated_at: self.updated_at.unwrap_or_else(now_millis),
            data: ChatState {
                history_ko,
                history_en,
                is_loading: false,
                loading_phase: None,
                error: data.error,
                language,
            },
        })
    }
}
