//! 日志初始化
//!
//! - **RUST_LOG**: 日志过滤级别，例如 `info`、`labelscout=debug`。未设置时为 `info`（`--verbose` 时为 `debug`）。
//! - **LOG_FILE**: 设置后日志追加写入该文件（纯文本，无ANSI颜色）；否则写入stderr，stdout只输出报告。

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// 根据环境变量构建日志过滤器
pub fn build_filter(verbose: bool) -> EnvFilter {
    let default_directive = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper_util=off", default_directive)))
}

/// 初始化全局tracing订阅者，进程内只调用一次
pub fn init(verbose: bool) -> Result<()> {
    let filter = build_filter(verbose);

    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open log file: {}", path))?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_target(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        tracing::info!(path = %path, "📝 日志写入文件");
    } else {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(())
}
