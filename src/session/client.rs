//! 会话客户端
//!
//! 把 [`DriveService`](crate::providers::DriveService) 的动词包装成
//! [`PendingResult`]。会话未连接时所有动词立即以 `NOT_CONNECTED` 状态完成；
//! 同一资源同一时间只允许一个打开的内容句柄。断开连接后，之前打开的句柄作废，
//! 不再影响新连接上的占用标记。

use std::sync::Arc;

use bytes::Bytes;

use super::drive_session::{Session, SessionInner};
use crate::dispatch::PendingResult;
use crate::error::DriveError;
use crate::models::{
    CloseAction, ContentHandle, Metadata, MetadataChangeSet, OpenMode, PagedResultSet, Query,
    ResourceHandle, ResourceId, Status, StatusCode,
};

/// 绑定到会话的客户端
#[derive(Clone)]
pub struct DriveClient {
    session: Session,
}

impl DriveClient {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn inner(&self) -> &Arc<SessionInner> {
        &self.session.inner
    }

    /// 根据 ID 构造文件句柄（本地操作）
    pub fn get_file(&self, id: impl Into<ResourceId>) -> ResourceHandle {
        ResourceHandle::file(id)
    }

    /// 根据 ID 构造文件夹句柄（本地操作）
    pub fn get_folder(&self, id: impl Into<ResourceId>) -> ResourceHandle {
        ResourceHandle::folder(id)
    }

    /// 未连接时返回立即完成的失败结果
    fn not_connected<T: Send + 'static>(&self, label: &'static str) -> Option<PendingResult<T>> {
        if self.session.is_connected() {
            return None;
        }
        tracing::debug!("[DriveClient] {} 被拒绝：会话未连接", label);
        Some(PendingResult::ready(
            &self.inner().ctx,
            label,
            Err(Status::not_connected()),
        ))
    }

    pub fn root_folder(&self) -> PendingResult<ResourceHandle> {
        if let Some(rejected) = self.not_connected("root_folder") {
            return rejected;
        }
        let service = self.inner().service.clone();
        PendingResult::spawn(&self.inner().ctx, "root_folder", move |_| async move {
            service.root_folder().await
        })
    }

    /// 打开内容
    ///
    /// 只读模式下下载进度通过 `on_progress` 上报。
    pub fn open_contents(
        &self,
        resource: &ResourceHandle,
        mode: OpenMode,
    ) -> PendingResult<ContentHandle> {
        if let Some(rejected) = self.not_connected("open_contents") {
            return rejected;
        }
        let ctx = &self.inner().ctx;
        if !self
            .inner()
            .open_resources
            .lock()
            .insert(resource.id.clone())
        {
            tracing::warn!("[DriveClient] {} 已有打开的内容句柄", resource);
            return PendingResult::ready(
                ctx,
                "open_contents",
                Err(Status::new(
                    StatusCode::CONTENT_BUSY,
                    format!("{} already has open contents", resource),
                )),
            );
        }

        tracing::debug!("[DriveClient] 打开 {} ({})", resource, mode);
        let session = self.session.clone();
        let epoch = session.epoch();
        let resource = resource.clone();
        PendingResult::spawn(ctx, "open_contents", move |progress| async move {
            let inner = &session.inner;
            let result = inner.service.open_contents(&resource, mode, progress).await;
            if session.epoch() != epoch {
                // 断开时占用标记已清空，可能已被新连接上的打开占用
                if let Ok(opened) = result {
                    tracing::debug!("[DriveClient] {} 打开完成前连接已断开，丢弃句柄", resource);
                    if let Err(status) = inner
                        .service
                        .discard_contents(&resource, &opened.content_id)
                        .await
                    {
                        tracing::debug!("[DriveClient] 丢弃过期句柄失败: {}", status);
                    }
                }
                return Err(stale_connection(&resource));
            }
            match result {
                Ok(opened) => Ok(ContentHandle::opened(
                    opened.content_id,
                    resource,
                    mode,
                    opened.bytes,
                )
                .with_connection(epoch)),
                Err(status) => {
                    inner.open_resources.lock().remove(&resource.id);
                    Err(status)
                }
            }
        })
    }

    /// 提交并关闭内容句柄
    ///
    /// 句柄在本地立即关闭，重复提交返回 `ContentClosed`；
    /// 远端提交失败以状态形式返回。
    pub fn commit_and_close(
        &self,
        contents: &mut ContentHandle,
    ) -> Result<PendingResult<()>, DriveError> {
        self.close(contents, CloseAction::Commit)
    }

    /// 丢弃内容句柄中未提交的修改并关闭
    pub fn discard(&self, contents: &mut ContentHandle) -> Result<PendingResult<()>, DriveError> {
        self.close(contents, CloseAction::Discard)
    }

    fn close(
        &self,
        contents: &mut ContentHandle,
        action: CloseAction,
    ) -> Result<PendingResult<()>, DriveError> {
        let payload = contents.close(action)?;
        let label = match action {
            CloseAction::Commit => "commit_and_close",
            CloseAction::Discard => "discard",
        };
        if let Some(rejected) = self.not_connected(label) {
            return Ok(rejected);
        }
        if contents.connection() != self.session.epoch() {
            tracing::warn!(
                "[DriveClient] {} 的内容句柄属于已断开的连接，只丢弃不提交",
                contents.resource()
            );
            let service = self.inner().service.clone();
            let resource = contents.resource().clone();
            let content_id = contents.id().clone();
            return Ok(PendingResult::spawn(&self.inner().ctx, label, move |_| async move {
                if let Err(status) = service.discard_contents(&resource, &content_id).await {
                    tracing::debug!("[DriveClient] 丢弃过期句柄失败: {}", status);
                }
                Err(stale_connection(&resource))
            }));
        }

        tracing::debug!(
            "[DriveClient] {} {} (content={}, bytes={:?})",
            label,
            contents.resource(),
            contents.id(),
            payload.as_ref().map(|p| p.len())
        );
        let inner = self.inner().clone();
        let resource = contents.resource().clone();
        let content_id = contents.id().clone();
        Ok(PendingResult::spawn(
            &self.inner().ctx,
            label,
            move |_| async move {
                let result = match action {
                    CloseAction::Commit => {
                        inner
                            .service
                            .commit_contents(&resource, &content_id, payload)
                            .await
                    }
                    CloseAction::Discard => {
                        inner.service.discard_contents(&resource, &content_id).await
                    }
                };
                inner.open_resources.lock().remove(&resource.id);
                result
            },
        ))
    }

    pub fn get_metadata(&self, resource: &ResourceHandle) -> PendingResult<Metadata> {
        if let Some(rejected) = self.not_connected("get_metadata") {
            return rejected;
        }
        let service = self.inner().service.clone();
        let resource = resource.clone();
        PendingResult::spawn(&self.inner().ctx, "get_metadata", move |_| async move {
            service.get_metadata(&resource).await
        })
    }

    pub fn update_metadata(
        &self,
        resource: &ResourceHandle,
        changes: MetadataChangeSet,
    ) -> PendingResult<Metadata> {
        if let Some(rejected) = self.not_connected("update_metadata") {
            return rejected;
        }
        let service = self.inner().service.clone();
        let resource = resource.clone();
        PendingResult::spawn(&self.inner().ctx, "update_metadata", move |_| async move {
            service.update_metadata(&resource, &changes).await
        })
    }

    pub fn create_file(
        &self,
        parent: &ResourceHandle,
        changes: MetadataChangeSet,
        contents: Bytes,
    ) -> PendingResult<ResourceHandle> {
        if let Some(rejected) = self.not_connected("create_file") {
            return rejected;
        }
        let service = self.inner().service.clone();
        let parent = parent.clone();
        PendingResult::spawn(&self.inner().ctx, "create_file", move |_| async move {
            service.create_file(&parent, &changes, contents).await
        })
    }

    pub fn create_folder(
        &self,
        parent: &ResourceHandle,
        changes: MetadataChangeSet,
    ) -> PendingResult<ResourceHandle> {
        if let Some(rejected) = self.not_connected("create_folder") {
            return rejected;
        }
        let service = self.inner().service.clone();
        let parent = parent.clone();
        PendingResult::spawn(&self.inner().ctx, "create_folder", move |_| async move {
            service.create_folder(&parent, &changes).await
        })
    }

    pub fn query_children(
        &self,
        parent: &ResourceHandle,
        query: Query,
    ) -> PendingResult<PagedResultSet<Metadata>> {
        if let Some(rejected) = self.not_connected("query_children") {
            return rejected;
        }
        let service = self.inner().service.clone();
        let parent = parent.clone();
        PendingResult::spawn(&self.inner().ctx, "query_children", move |_| async move {
            service.query_children(&parent, &query).await
        })
    }

    pub fn request_sync(&self) -> PendingResult<()> {
        if let Some(rejected) = self.not_connected("request_sync") {
            return rejected;
        }
        let service = self.inner().service.clone();
        PendingResult::spawn(&self.inner().ctx, "request_sync", move |_| async move {
            service.request_sync().await
        })
    }
}

fn stale_connection(resource: &ResourceHandle) -> Status {
    Status::new(
        StatusCode::NOT_CONNECTED,
        format!("contents of {} belong to a previous connection", resource),
    )
}
