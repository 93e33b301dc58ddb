//! 工作流服务
//!
//! 包含以下工作流：
//! - 内容读写（打开-读取-关闭、打开-写入-提交）
//! - 元数据获取与更新
//! - 子项分页列表
//! - 编辑器与首页的组合流程

pub mod content_flow;
pub mod editor;
pub mod home;
pub mod listing;
pub mod metadata_flow;

use std::sync::Arc;

pub use content_flow::{
    OpenReadClose, ReadContents, ReadOutcome, ReadState, WriteCommit, WriteOutcome, WriteState,
};
pub use editor::{EditorWorkflow, LoadedDocument, SaveOutcome};
pub use home::HomeWorkflow;
pub use listing::{ChildListing, PageAccumulator};
pub use metadata_flow::{MetadataEditor, UpdateOutcome};

use crate::dispatch::ForegroundContext;
use crate::error::DriveError;
use crate::models::{Status, StatusCode};
use crate::presenter::{Notice, Presenter};

/// 在前台上下文展示提示
pub(crate) fn post_notice(ctx: &ForegroundContext, presenter: &Arc<dyn Presenter>, notice: Notice) {
    let presenter = presenter.clone();
    if !ctx.post(move || presenter.notify(notice)) {
        tracing::debug!("[Workflow] 上下文已销毁，丢弃提示");
    }
}

/// 本地故障转换为面向用户的状态
pub(crate) fn local_fault(err: DriveError) -> Status {
    Status::new(StatusCode::LOCAL_FAULT, err.to_string())
}
