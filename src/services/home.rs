//! 首页工作流
//!
//! 根目录下文本文件的列表，以及查找、创建和同步操作。

use std::sync::Arc;

use bytes::Bytes;

use super::listing::ChildListing;
use super::post_notice;
use crate::error::DriveError;
use crate::models::{
    MetadataChangeSet, Query, ResourceHandle, Status, FOLDER_MIME_TYPE, TEXT_MIME_TYPE,
};
use crate::presenter::{Notice, PickerKind, PickerOutcome, PickerRequest, Presenter};
use crate::session::DriveClient;

/// 根目录的显示名称
pub const ROOT_FOLDER_TITLE: &str = "My Drive";
pub const SYNC_COMPLETE_NOTICE: &str = "Sync complete.";

/// 首页
pub struct HomeWorkflow {
    client: DriveClient,
    presenter: Arc<dyn Presenter>,
    root: ResourceHandle,
    mime_type: String,
    listing: ChildListing,
}

impl HomeWorkflow {
    /// 连接完成后调用：获取根目录并刷新列表
    pub async fn open(
        client: DriveClient,
        presenter: Arc<dyn Presenter>,
    ) -> Result<Self, Status> {
        let root = client.root_folder().wait().await?;
        let home = Self::with_root(client, presenter, root, TEXT_MIME_TYPE);
        if let Err(err) = home.refresh() {
            tracing::warn!("[Home] 刷新列表失败: {}", err);
        }
        Ok(home)
    }

    pub fn with_root(
        client: DriveClient,
        presenter: Arc<dyn Presenter>,
        root: ResourceHandle,
        mime_type: impl Into<String>,
    ) -> Self {
        let mime_type = mime_type.into();
        let listing = ChildListing::new(
            client.clone(),
            presenter.clone(),
            root.clone(),
            Query::builder().mime_type(mime_type.clone()).build(),
        );
        Self {
            client,
            presenter,
            root,
            mime_type,
            listing,
        }
    }

    pub fn with_prefetch_threshold(mut self, threshold: usize) -> Self {
        self.listing = self.listing.with_prefetch_threshold(threshold);
        self
    }

    pub fn root(&self) -> &ResourceHandle {
        &self.root
    }

    pub fn listing(&self) -> &ChildListing {
        &self.listing
    }

    fn notify(&self, message: impl Into<String>) {
        post_notice(
            self.client.session().foreground(),
            &self.presenter,
            Notice::toast(message),
        );
    }

    /// 重新加载根目录下的文本文件
    pub fn refresh(&self) -> Result<(), DriveError> {
        self.listing.refresh()
    }

    fn refresh_logged(&self) {
        if let Err(err) = self.refresh() {
            tracing::warn!("[Home] 刷新列表失败: {}", err);
        }
    }

    /// 通过选择器查找文本文件
    pub async fn find_file(&self) -> Option<ResourceHandle> {
        let request = PickerRequest::new(PickerKind::OpenFile, "Select a text file")
            .mime_type(self.mime_type.clone())
            .start_folder(self.root.clone());
        match self.presenter.pick(request).await {
            PickerOutcome::Picked(handle) => Some(handle),
            PickerOutcome::Cancelled => {
                tracing::info!("[Home] 文件选择已取消");
                None
            }
        }
    }

    /// 通过选择器查找文件夹，并展示它的标题和 ID
    ///
    /// 返回展示的标题；根目录总是显示为 "My Drive"。
    pub async fn find_folder(&self) -> Result<Option<String>, Status> {
        let request = PickerRequest::new(PickerKind::OpenFolder, "Select a folder")
            .mime_type(FOLDER_MIME_TYPE)
            .start_folder(self.root.clone());
        let folder = match self.presenter.pick(request).await {
            PickerOutcome::Picked(handle) => handle,
            PickerOutcome::Cancelled => {
                tracing::info!("[Home] 文件夹选择已取消");
                return Ok(None);
            }
        };

        let metadata = match self.client.get_metadata(&folder).wait().await {
            Ok(metadata) => metadata,
            Err(status) => {
                self.notify(status.to_string());
                return Err(status);
            }
        };
        let title = if folder.id == self.root.id {
            ROOT_FOLDER_TITLE.to_string()
        } else {
            metadata.title
        };
        self.notify(format!("Selected folder '{}' with id {}", title, folder.id));
        Ok(Some(title))
    }

    /// 通过选择器创建文件，由用户决定标题和位置
    pub async fn create_file_with_ui(&self) -> Option<ResourceHandle> {
        let initial = MetadataChangeSet::builder()
            .mime_type(self.mime_type.clone())
            .title("File created through UI")
            .build();
        let request = PickerRequest::new(PickerKind::CreateFile, "Create a text file")
            .start_folder(self.root.clone())
            .initial(initial, Bytes::new());
        match self.presenter.pick(request).await {
            PickerOutcome::Picked(handle) => {
                self.refresh_logged();
                Some(handle)
            }
            PickerOutcome::Cancelled => {
                tracing::info!("[Home] 创建文件已取消");
                None
            }
        }
    }

    /// 在根目录直接创建空文本文件
    pub async fn create_file_programmatically(&self) -> Result<ResourceHandle, Status> {
        let changes = MetadataChangeSet::builder()
            .mime_type(self.mime_type.clone())
            .title("Programmatically created file")
            .build();
        let result = self
            .client
            .create_file(&self.root, changes, Bytes::new())
            .wait()
            .await;
        match &result {
            Ok(handle) => {
                tracing::info!("[Home] 已创建文件 {}", handle);
                self.notify(Status::success().to_string());
            }
            Err(status) => self.notify(status.to_string()),
        }
        self.refresh_logged();
        result
    }

    /// 在根目录创建带星标的测试文件夹
    pub async fn create_folder(&self) -> Result<ResourceHandle, Status> {
        let changes = MetadataChangeSet::builder()
            .title("test folder")
            .starred(true)
            .mime_type(FOLDER_MIME_TYPE)
            .build();
        let result = self
            .client
            .create_folder(&self.root, changes)
            .wait()
            .await;
        match &result {
            Ok(handle) => tracing::info!("[Home] 已创建文件夹 {}", handle),
            Err(status) => self.notify(status.to_string()),
        }
        self.refresh_logged();
        result
    }

    /// 请求同步，完成后刷新列表
    pub async fn sync(&self) -> Result<(), Status> {
        let result = self.client.request_sync().wait().await;
        match &result {
            Ok(()) => self.notify(SYNC_COMPLETE_NOTICE),
            Err(status) => self.notify(status.to_string()),
        }
        self.refresh_logged();
        result
    }
}
