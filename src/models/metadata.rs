//! 资源元数据与元数据变更集

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resource::ResourceHandle;

/// 资源元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub resource: ResourceHandle,
    pub title: String,
    pub mime_type: String,
    #[serde(default)]
    pub starred: bool,
    /// 最后修改时间
    pub modified_at: DateTime<Utc>,
}

impl Metadata {
    /// 将变更集应用到当前元数据，返回是否有字段发生变化
    pub fn apply(&mut self, changes: &MetadataChangeSet) -> bool {
        let mut changed = false;
        if let Some(title) = &changes.title {
            if *title != self.title {
                self.title = title.clone();
                changed = true;
            }
        }
        if let Some(mime_type) = &changes.mime_type {
            if *mime_type != self.mime_type {
                self.mime_type = mime_type.clone();
                changed = true;
            }
        }
        if let Some(starred) = changes.starred {
            if starred != self.starred {
                self.starred = starred;
                changed = true;
            }
        }
        changed
    }
}

/// 元数据变更集
///
/// 只包含需要修改的字段，未设置的字段保持不变。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataChangeSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
}

impl MetadataChangeSet {
    pub fn builder() -> MetadataChangeSetBuilder {
        MetadataChangeSetBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.mime_type.is_none() && self.starred.is_none()
    }
}

#[derive(Debug, Default)]
pub struct MetadataChangeSetBuilder {
    inner: MetadataChangeSet,
}

impl MetadataChangeSetBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.inner.title = Some(title.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.inner.mime_type = Some(mime_type.into());
        self
    }

    pub fn starred(mut self, starred: bool) -> Self {
        self.inner.starred = Some(starred);
        self
    }

    pub fn build(self) -> MetadataChangeSet {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            resource: ResourceHandle::file("f1"),
            title: "notes".to_string(),
            mime_type: "text/plain".to_string(),
            starred: false,
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_reports_changes() {
        let mut meta = sample();
        let same = MetadataChangeSet::builder().title("notes").build();
        assert!(!meta.apply(&same));

        let changes = MetadataChangeSet::builder()
            .title("renamed")
            .starred(true)
            .build();
        assert!(meta.apply(&changes));
        assert_eq!(meta.title, "renamed");
        assert!(meta.starred);
        assert_eq!(meta.mime_type, "text/plain");
    }

    #[test]
    fn test_empty_change_set_serializes_to_empty_object() {
        let changes = MetadataChangeSet::builder().build();
        assert!(changes.is_empty());
        assert_eq!(serde_json::to_string(&changes).unwrap(), "{}");
    }
}
