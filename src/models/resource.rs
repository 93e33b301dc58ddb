//! 远端资源引用

use serde::{Deserialize, Serialize};

/// 文件夹的 MIME 类型
pub const FOLDER_MIME_TYPE: &str = "application/vnd.drivepad.folder";

/// 纯文本 MIME 类型
pub const TEXT_MIME_TYPE: &str = "text/plain";

/// 资源 ID（不透明字符串）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 生成新的随机 ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    File,
    Folder,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// 资源句柄
///
/// 只是对远端文件或文件夹的引用，不持有任何内容，可以自由克隆和跨操作传递。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub id: ResourceId,
    pub kind: ResourceKind,
}

impl ResourceHandle {
    pub fn file(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            kind: ResourceKind::File,
        }
    }

    pub fn folder(id: impl Into<ResourceId>) -> Self {
        Self {
            id: id.into(),
            kind: ResourceKind::Folder,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ResourceKind::Folder
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
