//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TRACTATUS__*` 覆盖（双下划线表示嵌套，如 `TRACTATUS__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::{Language, PhasePolicies};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    /// [retry.reasoning] / [retry.manifestation] / [retry.translation]
    pub retry: PhasePolicies,
}

/// [app] 段：应用名、数据目录、会话数上限、默认语言
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 会话与日志所在目录，未设置时用 ./data
    pub data_dir: Option<PathBuf>,
    pub max_sessions: usize,
    pub default_language: Language,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Recursive Token Observer".to_string(),
            data_dir: None,
            max_sessions: 10,
            default_language: Language::Ko,
        }
    }
}

impl AppSection {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("data"))
    }
}

/// [llm] 段：后端选择、模型、思考预算与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：gemini / openai / mock；缺少对应 API Key 时回落为 mock
    pub provider: String,
    /// 推理与显现阶段使用的模型
    pub reasoning_model: Option<String>,
    /// 翻译阶段使用的模型（高吞吐）
    pub translation_model: Option<String>,
    pub base_url: Option<String>,
    pub thinking_budget: Option<u32>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            reasoning_model: None,
            translation_model: None,
            base_url: None,
            thinking_budget: Some(32768),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次 HTTP 请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 300 }
    }
}

/// 从 config 目录加载配置，环境变量 TRACTATUS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TRACTATUS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    if let Some(name) = default_names
        .into_iter()
        .find(|name| std::path::Path::new(&format!("{name}.toml")).exists())
    {
        builder = builder.add_source(config::File::with_name(name).required(false));
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TRACTATUS")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 加载失败时记录警告并使用默认配置
pub fn load_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
