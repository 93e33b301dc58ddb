//! 错误类型定义
//!
//! 远端操作的失败以 [`Status`](crate::models::Status) 作为数据返回；
//! 这里只包含连接错误和本地故障。

use serde::{Deserialize, Serialize};

use crate::models::{ContentId, ContentState, OpenMode, ResourceId};

/// 交互式授权所需的信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDetails {
    /// 服务端返回的错误码
    pub code: i32,
    pub message: String,
    /// 用户需要访问的授权地址（如果有）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_url: Option<String>,
}

impl std::fmt::Display for ResolutionDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// 连接错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// 需要用户交互授权后重试
    #[error("connection needs user resolution: {0}")]
    NeedsResolution(ResolutionDetails),
    /// 不可恢复的连接失败
    #[error("connection failed with unrecoverable code {0}")]
    Unrecoverable(i32),
    /// 已有连接尝试正在进行
    #[error("a connection attempt is already in progress")]
    AttemptInProgress,
    /// 连接尝试完成前会话已断开
    #[error("connection attempt was superseded by a disconnect")]
    Superseded,
}

/// 本地错误
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("local I/O fault: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("content is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("content handle {content_id} is already closed ({state:?})")]
    ContentClosed {
        content_id: ContentId,
        state: ContentState,
    },

    #[error("content handle opened as {actual}, operation requires {expected}")]
    WrongMode { expected: OpenMode, actual: OpenMode },

    #[error("a handler is already registered for this operation")]
    HandlerAlreadyRegistered,

    /// 预留：当前写入模型为后写覆盖，不会产生冲突
    #[error("resource conflict on {0}")]
    ResourceConflict(ResourceId),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for DriveError {
    fn from(e: tokio::task::JoinError) -> Self {
        DriveError::Worker(e.to_string())
    }
}
