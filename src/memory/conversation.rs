//! 对话记录：单条消息（Turn Record）
//!
//! 同一逻辑轮次在韩文/英文两条历史中复用同一个 id，UI 借此把原文与影子译文对应起来。

use serde::{Deserialize, Serialize};

/// 消息角色（与模型端点一致，只有 user / model 两种）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// 单条消息：model 消息默认只展示 content，reasoning 为按需展开的内部轨迹
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp: i64,
}

impl Message {
    /// 新用户消息：随机 id + 当前时间戳
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::User,
            content: content.into(),
            reasoning: None,
            timestamp: now_millis(),
        }
    }

    /// 新模型消息：随机 id，携带推理轨迹
    pub fn model(content: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::Model,
            content: content.into(),
            reasoning: Some(reasoning.into()),
            timestamp: now_millis(),
        }
    }

    /// 影子副本：保留 id / role / timestamp，仅替换文本
    pub fn shadow(&self, content: impl Into<String>, reasoning: Option<String>) -> Self {
        Self {
            id: self.id.clone(),
            role: self.role,
            content: content.into(),
            reasoning,
            timestamp: self.timestamp,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 当前时间（epoch 毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_keeps_id_and_timestamp() {
        let original = Message::model("hi there", "trace1");
        let shadow = original.shadow("안녕하세요", Some("추적1".to_string()));
        assert_eq!(shadow.id, original.id);
        assert_eq!(shadow.timestamp, original.timestamp);
        assert_eq!(shadow.role, Role::Model);
        assert_eq!(shadow.content, "안녕하세요");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("reasoning").is_none());
    }

    #[test]
    fn test_new_ids_are_unique() {
        let a = Message::user("a");
        let b = Message::user("a");
        assert_ne!(a.id, b.id);
    }
}
