//! 配置管理模块
//!
//! 提供 YAML 配置文件的读取和保存，所有字段都有默认值，
//! 配置文件不存在时使用默认配置。

mod path_utils;
mod types;
mod yaml;

pub use path_utils::{collapse_tilde, expand_tilde};
pub use types::{
    Config, EditorConfig, ListingConfig, LoggingConfig, ServiceConfig, ServiceKind,
    DEFAULT_BASE_URL,
};
pub use yaml::{default_config_path, load_config, save_config, ConfigError};

#[cfg(test)]
mod tests;
