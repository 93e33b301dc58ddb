//! 日志初始化

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 根据配置的级别构建过滤器
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("无效的日志级别 {:?}: {}，使用 info", level, e);
        EnvFilter::new("info")
    })
}

/// 安装全局 tracing 订阅者
///
/// 设置了 `RUST_LOG` 时以环境变量为准；`verbose` 强制使用 debug 级别。
pub fn init(config: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        build_filter("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| build_filter(&config.level))
    };
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("[Logger] 订阅者已存在，跳过初始化");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert_eq!(build_filter("debug").to_string(), "debug");
        assert!(build_filter("drivepad_lib=trace,info")
            .to_string()
            .contains("drivepad_lib=trace"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = LoggingConfig::default();
        init(&config, false);
        init(&config, true);
    }
}
