//! Tractatus 入口：加载配置、初始化日志、创建运行时与 TUI，并运行主循环。
//!
//! 用法：`tractatus [config.toml]`

use std::path::PathBuf;

use anyhow::Context;
use tractatus::{config::load_or_default, core::create_runtime, observability, ui::run_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_or_default(config_path);

    // TUI 占用终端，日志写入数据目录下的文件
    let data_dir = cfg.app.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
    observability::init(&data_dir).context("Failed to init logging")?;

    let title = cfg.app.name.clone();
    let handles = create_runtime(cfg).context("Failed to create runtime")?;

    run_app(handles, title).await.context("App run failed")?;

    Ok(())
}
