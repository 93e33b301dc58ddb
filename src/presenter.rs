//! 界面协作方
//!
//! 授权对话框、文件选择器、提示和进度都交给宿主界面实现，
//! 核心逻辑只通过 [`Presenter`] 与之交互。

use async_trait::async_trait;
use bytes::Bytes;

use crate::dispatch::Progress;
use crate::error::ResolutionDetails;
use crate::models::{MetadataChangeSet, ResourceHandle};

/// 交互式授权的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Completed,
    Cancelled,
}

/// 选择器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerKind {
    /// 选择已有文件
    OpenFile,
    /// 由用户选择位置并创建文件
    CreateFile,
    /// 选择文件夹
    OpenFolder,
}

/// 选择器请求
#[derive(Debug, Clone)]
pub struct PickerRequest {
    pub kind: PickerKind,
    pub title: String,
    /// 允许选择的 MIME 类型
    pub mime_types: Vec<String>,
    pub start_folder: Option<ResourceHandle>,
    /// 创建文件时的初始元数据
    pub initial_metadata: Option<MetadataChangeSet>,
    /// 创建文件时的初始内容
    pub initial_contents: Option<Bytes>,
}

impl PickerRequest {
    pub fn new(kind: PickerKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            mime_types: Vec::new(),
            start_folder: None,
            initial_metadata: None,
            initial_contents: None,
        }
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_types.push(mime.into());
        self
    }

    pub fn start_folder(mut self, folder: ResourceHandle) -> Self {
        self.start_folder = Some(folder);
        self
    }

    pub fn initial(mut self, metadata: MetadataChangeSet, contents: Bytes) -> Self {
        self.initial_metadata = Some(metadata);
        self.initial_contents = Some(contents);
        self
    }
}

/// 选择器结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome {
    Picked(ResourceHandle),
    Cancelled,
}

/// 提示类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// 短暂提示
    Toast,
    /// 需要用户确认的阻塞提示
    Blocking,
}

/// 用户可见的提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn toast(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Toast,
            message: message.into(),
        }
    }

    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Blocking,
            message: message.into(),
        }
    }
}

/// 界面协作方
#[async_trait]
pub trait Presenter: Send + Sync {
    /// 展示授权界面，等待用户完成或取消
    async fn resolve_connection(&self, details: &ResolutionDetails) -> ResolutionOutcome;

    /// 展示选择器
    async fn pick(&self, request: PickerRequest) -> PickerOutcome;

    /// 展示提示
    fn notify(&self, notice: Notice);

    /// 更新进度显示
    fn progress(&self, _progress: Progress) {}
}

/// 只输出日志的界面实现（命令行宿主使用）
#[derive(Debug, Clone)]
pub struct TracingPresenter {
    auto_resolve: bool,
}

impl TracingPresenter {
    pub fn new(auto_resolve: bool) -> Self {
        Self { auto_resolve }
    }
}

impl Default for TracingPresenter {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Presenter for TracingPresenter {
    async fn resolve_connection(&self, details: &ResolutionDetails) -> ResolutionOutcome {
        match &details.resolution_url {
            Some(url) => tracing::warn!("[Presenter] 需要授权: {}，请访问 {}", details, url),
            None => tracing::warn!("[Presenter] 需要授权: {}", details),
        }
        if self.auto_resolve {
            ResolutionOutcome::Completed
        } else {
            ResolutionOutcome::Cancelled
        }
    }

    async fn pick(&self, request: PickerRequest) -> PickerOutcome {
        tracing::info!(
            "[Presenter] 没有可交互的选择器，取消 {:?} ({})",
            request.kind,
            request.title
        );
        PickerOutcome::Cancelled
    }

    fn notify(&self, notice: Notice) {
        match notice.kind {
            NoticeKind::Toast => tracing::info!("[Presenter] {}", notice.message),
            NoticeKind::Blocking => tracing::error!("[Presenter] {}", notice.message),
        }
    }

    fn progress(&self, progress: Progress) {
        if let Some(pct) = progress.percent() {
            tracing::debug!("[Presenter] 进度 {}%", pct);
        }
    }
}
