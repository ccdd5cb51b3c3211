//! # 日志初始化
//!
//! 控制台与按天滚动的文件日志共用同一个过滤器：`RUST_LOG` 优先，否则取 `log.level`。

use kaipan_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// # Summary
/// 安装全局 tracing subscriber。
///
/// # Returns
/// 文件写入线程的守卫，必须持有到进程退出，否则缓冲中的日志会丢失。
pub fn init(config: &LogConfig) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(&config.dir, "kaipan.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    guard
}
