//! 远端操作状态
//!
//! 远端服务的每个动词都以 `Status` 作为失败结果返回，而不是抛出错误。

use serde::{Deserialize, Serialize};

/// 状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);
    /// 服务内部错误
    pub const INTERNAL_ERROR: StatusCode = StatusCode(8);
    /// 会话未连接
    pub const NOT_CONNECTED: StatusCode = StatusCode(4);
    /// 资源不存在
    pub const RESOURCE_NOT_FOUND: StatusCode = StatusCode(1502);
    /// 同一资源已有打开的内容句柄
    pub const CONTENT_BUSY: StatusCode = StatusCode(1505);
    /// 元数据尚未加载
    pub const METADATA_NOT_LOADED: StatusCode = StatusCode(1506);
    /// 本地缓冲失败（读写内容时的 I/O 或编码错误）
    pub const LOCAL_FAULT: StatusCode = StatusCode(1507);
    /// 网络错误
    pub const NETWORK_ERROR: StatusCode = StatusCode(7);
    /// 请求过于频繁
    pub const RATE_LIMITED: StatusCode = StatusCode(1500);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    fn name(self) -> Option<&'static str> {
        match self {
            Self::SUCCESS => Some("SUCCESS"),
            Self::INTERNAL_ERROR => Some("INTERNAL_ERROR"),
            Self::NOT_CONNECTED => Some("NOT_CONNECTED"),
            Self::RESOURCE_NOT_FOUND => Some("RESOURCE_NOT_FOUND"),
            Self::CONTENT_BUSY => Some("CONTENT_BUSY"),
            Self::METADATA_NOT_LOADED => Some("METADATA_NOT_LOADED"),
            Self::LOCAL_FAULT => Some("LOCAL_FAULT"),
            Self::NETWORK_ERROR => Some("NETWORK_ERROR"),
            Self::RATE_LIMITED => Some("RATE_LIMITED"),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "STATUS_{}", self.0),
        }
    }
}

/// 操作状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: StatusCode::SUCCESS,
            message: None,
        }
    }

    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    pub fn from_code(code: StatusCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn not_connected() -> Self {
        Self::new(StatusCode::NOT_CONNECTED, "session is not connected")
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "Status{{code={}, message={}}}", self.code, message),
            None => write!(f, "Status{{code={}}}", self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(Status::success().to_string(), "Status{code=SUCCESS}");
        assert_eq!(
            Status::new(StatusCode(42), "boom").to_string(),
            "Status{code=STATUS_42, message=boom}"
        );
    }

    #[test]
    fn test_status_serde_uses_plain_code() {
        let json = serde_json::to_string(&Status::from_code(StatusCode::CONTENT_BUSY)).unwrap();
        assert_eq!(json, r#"{"code":1505}"#);
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, StatusCode::CONTENT_BUSY);
        assert!(!back.is_success());
    }
}
