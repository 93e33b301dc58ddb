//! 元数据获取与更新
//!
//! [`MetadataEditor`] 持有服务端确认过的缓存和一份可编辑副本（标题、星标）。
//! 更新时只提交与缓存不同的字段，没有差异时不发请求。

use std::sync::Arc;

use super::post_notice;
use crate::models::{Metadata, MetadataChangeSet, ResourceHandle, Status, StatusCode};
use crate::presenter::{Notice, Presenter};
use crate::session::DriveClient;

/// 更新结果
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// 没有差异，未发请求
    Unchanged,
    /// 服务端确认后的元数据
    Updated(Metadata),
}

/// 元数据编辑器
pub struct MetadataEditor {
    client: DriveClient,
    presenter: Arc<dyn Presenter>,
    resource: ResourceHandle,
    cached: Option<Metadata>,
    edited_title: Option<String>,
    edited_starred: Option<bool>,
}

impl MetadataEditor {
    pub fn new(client: DriveClient, presenter: Arc<dyn Presenter>, resource: ResourceHandle) -> Self {
        Self {
            client,
            presenter,
            resource,
            cached: None,
            edited_title: None,
            edited_starred: None,
        }
    }

    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }

    /// 最近一次服务端确认的元数据
    pub fn cached(&self) -> Option<&Metadata> {
        self.cached.as_ref()
    }

    /// 当前可编辑的标题
    pub fn title(&self) -> Option<&str> {
        self.edited_title
            .as_deref()
            .or_else(|| self.cached.as_ref().map(|m| m.title.as_str()))
    }

    pub fn starred(&self) -> Option<bool> {
        self.edited_starred
            .or_else(|| self.cached.as_ref().map(|m| m.starred))
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.edited_title = Some(title.into());
    }

    pub fn set_starred(&mut self, starred: bool) {
        self.edited_starred = Some(starred);
    }

    /// 可编辑副本与缓存之间的差异，缓存为空时返回 None
    pub fn pending_changes(&self) -> Option<MetadataChangeSet> {
        let cached = self.cached.as_ref()?;
        let mut builder = MetadataChangeSet::builder();
        if let Some(title) = self.edited_title.as_ref().filter(|t| **t != cached.title) {
            builder = builder.title(title.clone());
        }
        if let Some(starred) = self.edited_starred.filter(|s| *s != cached.starred) {
            builder = builder.starred(starred);
        }
        Some(builder.build())
    }

    fn replace_cache(&mut self, metadata: Metadata) {
        self.cached = Some(metadata);
        self.edited_title = None;
        self.edited_starred = None;
    }

    fn report(&self, status: &Status) {
        post_notice(
            self.client.session().foreground(),
            &self.presenter,
            Notice::toast(status.to_string()),
        );
    }

    /// 获取元数据
    ///
    /// 成功时替换缓存并重置可编辑副本；失败时保留旧缓存。
    pub async fn fetch(&mut self) -> Result<Metadata, Status> {
        match self.client.get_metadata(&self.resource).wait().await {
            Ok(metadata) => {
                tracing::debug!("[MetadataFlow] 获取 {} 的元数据", self.resource);
                self.replace_cache(metadata.clone());
                Ok(metadata)
            }
            Err(status) => {
                tracing::warn!(
                    "[MetadataFlow] 获取 {} 的元数据失败: {}",
                    self.resource,
                    status
                );
                self.report(&status);
                Err(status)
            }
        }
    }

    /// 提交可编辑副本中的修改
    pub async fn update(&mut self) -> Result<UpdateOutcome, Status> {
        let Some(changes) = self.pending_changes() else {
            let status = Status::new(
                StatusCode::METADATA_NOT_LOADED,
                format!("metadata of {} has not been fetched", self.resource),
            );
            self.report(&status);
            return Err(status);
        };
        if changes.is_empty() {
            tracing::debug!("[MetadataFlow] {} 的元数据没有变化", self.resource);
            return Ok(UpdateOutcome::Unchanged);
        }

        match self
            .client
            .update_metadata(&self.resource, changes)
            .wait()
            .await
        {
            Ok(metadata) => {
                tracing::info!("[MetadataFlow] 更新 {} 的元数据完成", self.resource);
                self.replace_cache(metadata.clone());
                Ok(UpdateOutcome::Updated(metadata))
            }
            Err(status) => {
                tracing::warn!(
                    "[MetadataFlow] 更新 {} 的元数据失败: {}",
                    self.resource,
                    status
                );
                self.report(&status);
                Err(status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{foreground, ForegroundLoop};
    use crate::models::TEXT_MIME_TYPE;
    use crate::presenter::TracingPresenter;
    use crate::providers::{MemoryDriveService, Verb};
    use crate::session::{AccountIdentity, Session};

    async fn editor() -> (Arc<MemoryDriveService>, MetadataEditor, ForegroundLoop) {
        let service = Arc::new(MemoryDriveService::new());
        let (ctx, fg) = foreground();
        let session = Session::new(service.clone(), ctx, AccountIdentity::Default);
        session.connect().await.unwrap();
        let root = service.root().clone();
        let file = service.seed_file(&root, "draft", TEXT_MIME_TYPE, "");
        let editor = MetadataEditor::new(
            session.client(),
            Arc::new(TracingPresenter::default()),
            file,
        );
        (service, editor, fg)
    }

    #[tokio::test]
    async fn test_unchanged_title_issues_no_write() {
        let (service, mut editor, _fg) = editor().await;
        editor.fetch().await.unwrap();
        editor.set_title("draft");
        editor.set_starred(false);

        assert_eq!(editor.update().await.unwrap(), UpdateOutcome::Unchanged);
        assert_eq!(service.call_count(Verb::UpdateMetadata), 0);
    }

    #[tokio::test]
    async fn test_changed_title_issues_one_write() {
        let (service, mut editor, _fg) = editor().await;
        editor.fetch().await.unwrap();
        editor.set_title("final");

        let changes = editor.pending_changes().unwrap();
        assert_eq!(changes.title.as_deref(), Some("final"));
        assert_eq!(changes.starred, None);

        let UpdateOutcome::Updated(metadata) = editor.update().await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(metadata.title, "final");
        assert_eq!(service.call_count(Verb::UpdateMetadata), 1);
        assert_eq!(editor.cached().unwrap().title, "final");

        // 缓存已更新，再次提交没有差异
        assert_eq!(editor.update().await.unwrap(), UpdateOutcome::Unchanged);
        assert_eq!(service.call_count(Verb::UpdateMetadata), 1);
    }

    #[tokio::test]
    async fn test_update_before_fetch_fails_without_request() {
        let (service, mut editor, _fg) = editor().await;
        editor.set_title("anything");
        let status = editor.update().await.unwrap_err();
        assert_eq!(status.code, StatusCode::METADATA_NOT_LOADED);
        assert_eq!(service.call_count(Verb::UpdateMetadata), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_cache() {
        let (service, mut editor, _fg) = editor().await;
        editor.fetch().await.unwrap();
        editor.set_starred(true);
        service.fail_next(Verb::GetMetadata, Status::from_code(StatusCode::NETWORK_ERROR));

        assert!(editor.fetch().await.is_err());
        assert_eq!(editor.cached().unwrap().title, "draft");
        assert_eq!(editor.starred(), Some(true));
    }
}
