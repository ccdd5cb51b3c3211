//! # 配置加载
//!
//! 分层顺序 (后者覆盖前者)：内置默认值 → `config/default.toml` → `config/local.toml`
//! → `KAIPAN__` 前缀的环境变量 (层级以 `__` 分隔，如 `KAIPAN__SERVER__PORT=9000`)。

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use kaipan_core::config::AppConfig;

/// # Summary
/// 以 `root` 为工作目录加载分层配置。
///
/// # Arguments
/// * `root` - 包含 `config/` 子目录的根路径，两个 TOML 文件都可以缺省。
pub fn load(root: &Path) -> Result<AppConfig, ConfigError> {
    let dir = root.join("config");
    Config::builder()
        .add_source(File::from(dir.join("default.toml")).required(false))
        .add_source(File::from(dir.join("local.toml")).required(false))
        .add_source(
            Environment::with_prefix("KAIPAN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load(tmp.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.trading.limit_timeout_seconds, 180);
        assert_eq!(config.log.dir, "logs");
    }

    #[test]
    fn test_local_overrides_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("config");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("default.toml"),
            "[server]\nport = 9000\n\n[trading]\ninitial_cash = 100000\npoll_seconds = 0.5\n",
        )
        .unwrap();
        fs::write(dir.join("local.toml"), "[server]\nport = 9100\n").unwrap();

        let config = load(tmp.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.trading.initial_cash.to_string(), "100000");
        assert!((config.trading.poll_seconds - 0.5).abs() < f64::EPSILON);
        // 未覆盖的字段保持默认
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.risk.daily_trades_reject, 15);
    }
}
