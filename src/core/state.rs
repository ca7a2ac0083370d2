//! 状态定义：双语对话状态 ChatState 与轮次阶段
//!
//! ChatState 同时持有韩文与英文两条历史，language 决定哪一条是「活动」历史（显示 + 追加用户输入），
//! 另一条为影子历史，由翻译同步阶段追加。序列化字段名与导出的会话 JSON 保持一致。

use serde::{Deserialize, Serialize};

use crate::memory::{Message, Role};

/// 双语之一
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ko,
    En,
}

impl Language {
    /// 另一种语言（影子语言）
    pub fn other(self) -> Self {
        match self {
            Language::Ko => Language::En,
            Language::En => Language::Ko,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::En => "en",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "ko" => Some(Language::Ko),
            "en" => Some(Language::En),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code().to_uppercase())
    }
}

/// 加载阶段标签（UI 投影用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingPhase {
    Acquiring,
    Transitioning,
    Synchronizing,
}

impl LoadingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadingPhase::Acquiring => "acquiring",
            LoadingPhase::Transitioning => "transitioning",
            LoadingPhase::Synchronizing => "synchronizing",
        }
    }

    /// 按显示语言给出状态栏文案
    pub fn label(&self, language: Language) -> &'static str {
        match (self, language) {
            (LoadingPhase::Acquiring, Language::Ko) => "추론 궤적 생성 중",
            (LoadingPhase::Acquiring, Language::En) => "ACQUIRING_TRACE",
            (LoadingPhase::Transitioning, Language::Ko) => "명제 구성 중",
            (LoadingPhase::Transitioning, Language::En) => "MANIFESTING_OUTPUT",
            (LoadingPhase::Synchronizing, Language::Ko) => "언어 동기화 중",
            (LoadingPhase::Synchronizing, Language::En) => "SYNCHRONIZING_LANGUAGES",
        }
    }
}

/// 单轮状态机（编排器内部用，日志与错误上下文）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingReasoning,
    AwaitingManifestation,
    AwaitingSync,
    Failed,
}

impl TurnPhase {
    /// 该阶段对应的 loadingPhase；Idle / Failed 时无
    pub fn loading_phase(&self) -> Option<LoadingPhase> {
        match self {
            TurnPhase::AwaitingReasoning => Some(LoadingPhase::Acquiring),
            TurnPhase::AwaitingManifestation => Some(LoadingPhase::Transitioning),
            TurnPhase::AwaitingSync => Some(LoadingPhase::Synchronizing),
            TurnPhase::Idle | TurnPhase::Failed => None,
        }
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::AwaitingReasoning => "reasoning",
            TurnPhase::AwaitingManifestation => "manifestation",
            TurnPhase::AwaitingSync => "translation sync",
            TurnPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 双语对话状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    #[serde(rename = "historyKO")]
    pub history_ko: Vec<Message>,
    #[serde(rename = "historyEN")]
    pub history_en: Vec<Message>,
    #[serde(rename = "isLoading")]
    pub is_loading: bool,
    #[serde(rename = "loadingPhase")]
    pub loading_phase: Option<LoadingPhase>,
    pub error: Option<String>,
    pub language: Language,
}

impl ChatState {
    /// 仅含种子消息的新状态
    pub fn new(language: Language) -> Self {
        Self::with_seeds(seed_message(Language::Ko), seed_message(Language::En), language)
    }

    /// 以自定义种子消息创建（两条历史各一条）
    pub fn with_seeds(seed_ko: Message, seed_en: Message, language: Language) -> Self {
        Self {
            history_ko: vec![seed_ko],
            history_en: vec![seed_en],
            is_loading: false,
            loading_phase: None,
            error: None,
            language,
        }
    }

    pub fn history(&self, language: Language) -> &[Message] {
        match language {
            Language::Ko => &self.history_ko,
            Language::En => &self.history_en,
        }
    }

    pub fn history_mut(&mut self, language: Language) -> &mut Vec<Message> {
        match language {
            Language::Ko => &mut self.history_ko,
            Language::En => &mut self.history_en,
        }
    }

    /// 当前显示的历史
    pub fn displayed(&self) -> &[Message] {
        self.history(self.language)
    }

    pub fn contains_id(&self, language: Language, id: &str) -> bool {
        self.history(language).iter().any(|m| m.id == id)
    }

    /// 两条历史轮数相同且 id 逐对一致
    pub fn is_parity_synced(&self) -> bool {
        self.history_ko.len() == self.history_en.len()
            && self
                .history_ko
                .iter()
                .zip(&self.history_en)
                .all(|(ko, en)| ko.id == en.id)
    }

    /// 第一条用户消息（韩文历史优先），用于会话标题
    pub fn first_user_message(&self) -> Option<&Message> {
        self.history_ko
            .iter()
            .find(|m| m.is_user())
            .or_else(|| self.history_en.iter().find(|m| m.is_user()))
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

pub const SEED_MESSAGE_ID: &str = "init-1";

/// 种子「就绪」消息
pub fn seed_message(language: Language) -> Message {
    let (content, reasoning) = match language {
        Language::Ko => (
            "시스템 초기화 완료.\n입력 스트림 대기 중.",
            "[PROCESS_1: SYSTEM_BOOT]\n- 초기화 프로토콜 실행.\n- 메모리 버퍼 할당 완료.\n\n[PROCESS_2: STATE_CHECK]\n- 이전 컨텍스트 없음 (NULL).\n- 재귀적 루프의 시작점(t=0) 설정.",
        ),
        Language::En => (
            "System Initialized.\nAwaiting input stream.",
            "[PROCESS_1: SYSTEM_BOOT]\n- Initialization protocol executed.\n- Memory buffer allocated.\n\n[PROCESS_2: STATE_CHECK]\n- No previous context (NULL).\n- Setting recursive loop origin (t=0).",
        ),
    };
    Message {
        id: SEED_MESSAGE_ID.to_string(),
        role: Role::Model,
        content: content.to_string(),
        reasoning: Some(reasoning.to_string()),
        timestamp: crate::memory::now_millis(),
    }
}
