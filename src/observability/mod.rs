//! 可观测性：tracing 日志写入 `<data_dir>/tractatus.log`
//!
//! 默认级别 info，可通过 RUST_LOG 覆盖（如 `RUST_LOG=tractatus=debug`）。

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE: &str = "tractatus.log";

pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_FILE)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化全局订阅者（追加写入日志文件，不输出 ANSI 颜色）
pub fn init(data_dir: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path(data_dir))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()?;
    Ok(())
}
