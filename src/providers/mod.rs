//! 远端存储服务
//!
//! [`DriveService`] 是远端对象存储的契约，每个动词都返回 `Result<_, Status>`，
//! 失败状态作为数据返回而不是 panic。

pub mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::dispatch::ProgressReporter;
use crate::error::ConnectionError;
use crate::models::{
    ContentId, Metadata, MetadataChangeSet, OpenMode, PagedResultSet, Query, ResourceHandle,
    Status,
};
use crate::session::AccountIdentity;

pub use http::HttpDriveService;
pub use memory::{MemoryDriveService, Verb};

/// 打开内容的结果
#[derive(Debug, Clone)]
pub struct OpenedContents {
    pub content_id: ContentId,
    /// 只读模式下的完整内容，只写模式下为空
    pub bytes: Bytes,
}

/// 远端存储服务契约
#[async_trait]
pub trait DriveService: Send + Sync {
    /// 服务名称（用于日志）
    fn name(&self) -> &str;

    async fn connect(&self, identity: &AccountIdentity) -> Result<(), ConnectionError>;

    async fn disconnect(&self);

    async fn root_folder(&self) -> Result<ResourceHandle, Status>;

    /// 打开内容；只读模式下内容尚未缓存时通过 `progress` 上报下载进度
    async fn open_contents(
        &self,
        resource: &ResourceHandle,
        mode: OpenMode,
        progress: ProgressReporter,
    ) -> Result<OpenedContents, Status>;

    /// 提交并关闭内容；`payload` 为 None 时只释放句柄
    async fn commit_contents(
        &self,
        resource: &ResourceHandle,
        content_id: &ContentId,
        payload: Option<Bytes>,
    ) -> Result<(), Status>;

    async fn discard_contents(
        &self,
        resource: &ResourceHandle,
        content_id: &ContentId,
    ) -> Result<(), Status>;

    async fn get_metadata(&self, resource: &ResourceHandle) -> Result<Metadata, Status>;

    async fn update_metadata(
        &self,
        resource: &ResourceHandle,
        changes: &MetadataChangeSet,
    ) -> Result<Metadata, Status>;

    async fn create_file(
        &self,
        parent: &ResourceHandle,
        changes: &MetadataChangeSet,
        contents: Bytes,
    ) -> Result<ResourceHandle, Status>;

    async fn create_folder(
        &self,
        parent: &ResourceHandle,
        changes: &MetadataChangeSet,
    ) -> Result<ResourceHandle, Status>;

    async fn query_children(
        &self,
        parent: &ResourceHandle,
        query: &Query,
    ) -> Result<PagedResultSet<Metadata>, Status>;

    async fn request_sync(&self) -> Result<(), Status>;
}
