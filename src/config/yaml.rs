//! YAML 配置读写

use std::path::{Path, PathBuf};

use super::path_utils::collapse_tilde;
use super::types::Config;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_yaml::Error),
    #[error("home directory is not available")]
    NoHomeDir,
}

/// 默认配置文件路径：`~/.drivepad/config.yaml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".drivepad").join("config.yaml"))
        .ok_or(ConfigError::NoHomeDir)
}

/// 读取配置，文件不存在时返回默认配置
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!("[Config] {} 不存在，使用默认配置", collapse_tilde(path));
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(Config::default());
    }
    let config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("[Config] 已加载 {}", collapse_tilde(path));
    Ok(config)
}

/// 保存配置，必要时创建父目录
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let text = serde_yaml::to_string(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, text).map_err(io_err)?;
    tracing::info!("[Config] 已保存 {}", collapse_tilde(path));
    Ok(())
}
