//! 配置类型定义

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::TEXT_MIME_TYPE;

/// HTTP 服务默认地址
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";

/// 存储服务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// 进程内存储（带演示数据）
    #[default]
    Memory,
    /// 通过 HTTP 访问远端服务
    Http,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// 存储服务配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub kind: ServiceKind,
    pub base_url: String,
    /// 单个请求的超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            kind: ServiceKind::Memory,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 编辑器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// 读取的最大行数，超出部分被丢弃
    pub read_cap_lines: usize,
    pub mime_type: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            read_cap_lines: 1000,
            mime_type: TEXT_MIME_TYPE.to_string(),
        }
    }
}

/// 列表配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// 内存存储的分页大小
    pub page_size: usize,
    /// 距离末尾多少条以内时请求下一页
    pub prefetch_threshold: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            prefetch_threshold: 15,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或 EnvFilter 表达式，可被 RUST_LOG 覆盖
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 主配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub editor: EditorConfig,
    pub listing: ListingConfig,
    pub logging: LoggingConfig,
    /// 请求使用的账号，未设置时按保存的状态或设备账号解析
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}
