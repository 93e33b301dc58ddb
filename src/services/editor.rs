//! 编辑器工作流
//!
//! 加载：先获取元数据，再打开-读取-关闭。
//! 保存：打开-写入-提交编辑后的文本，然后提交标题的修改。

use std::io::Cursor;
use std::sync::Arc;

use super::content_flow::{OpenReadClose, ReadContents, WriteCommit, DEFAULT_READ_CAP_LINES};
use super::metadata_flow::{MetadataEditor, UpdateOutcome};
use super::post_notice;
use crate::models::{Metadata, ResourceHandle, Status};
use crate::presenter::{Notice, Presenter};
use crate::session::DriveClient;

/// 保存失败时的提示
pub const SAVE_FAILED_NOTICE: &str = "Save failed.";
/// 元数据保存成功时的提示
pub const METADATA_SAVED_NOTICE: &str = "Metadata saved";

/// 加载完成的文档
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub metadata: Metadata,
    pub contents: ReadContents,
}

/// 保存结果，内容和元数据分别提交
#[derive(Debug)]
pub struct SaveOutcome {
    pub contents: Result<usize, Status>,
    pub metadata: Result<UpdateOutcome, Status>,
}

/// 单个文件的编辑器
pub struct EditorWorkflow {
    client: DriveClient,
    presenter: Arc<dyn Presenter>,
    resource: ResourceHandle,
    metadata: MetadataEditor,
    text: String,
    read_cap_lines: usize,
}

impl EditorWorkflow {
    pub fn new(client: DriveClient, presenter: Arc<dyn Presenter>, resource: ResourceHandle) -> Self {
        let metadata = MetadataEditor::new(client.clone(), presenter.clone(), resource.clone());
        Self {
            client,
            presenter,
            resource,
            metadata,
            text: String::new(),
            read_cap_lines: DEFAULT_READ_CAP_LINES,
        }
    }

    pub fn with_read_cap_lines(mut self, cap: usize) -> Self {
        self.read_cap_lines = cap;
        self
    }

    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.title()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.metadata.set_title(title);
    }

    pub async fn load(&mut self) -> Result<LoadedDocument, Status> {
        let metadata = self.metadata.fetch().await?;
        let outcome = OpenReadClose::new(self.client.clone(), self.presenter.clone())
            .with_cap_lines(self.read_cap_lines)
            .run(&self.resource)
            .await;
        let contents = outcome.result?;
        self.text = contents.text.clone();
        Ok(LoadedDocument { metadata, contents })
    }

    /// 保存文本和标题
    ///
    /// 两者互不影响：内容提交失败时仍然尝试提交标题。
    pub async fn save(&mut self) -> SaveOutcome {
        let source = Cursor::new(self.text.clone().into_bytes());
        let written = WriteCommit::new(self.client.clone(), self.presenter.clone())
            .with_failure_message(SAVE_FAILED_NOTICE)
            .run(&self.resource, source)
            .await;
        let metadata = self.save_metadata().await;
        SaveOutcome {
            contents: written.result,
            metadata,
        }
    }

    /// 只提交标题的修改
    pub async fn save_metadata(&mut self) -> Result<UpdateOutcome, Status> {
        let outcome = self.metadata.update().await;
        if let Ok(UpdateOutcome::Updated(_)) = &outcome {
            post_notice(
                self.client.session().foreground(),
                &self.presenter,
                Notice::toast(METADATA_SAVED_NOTICE),
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{foreground, ForegroundLoop, Progress};
    use crate::error::ResolutionDetails;
    use crate::models::{StatusCode, TEXT_MIME_TYPE};
    use crate::presenter::{PickerOutcome, PickerRequest, ResolutionOutcome};
    use crate::providers::{MemoryDriveService, Verb};
    use crate::session::{AccountIdentity, Session};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct NoticeLog(Mutex<Vec<String>>);

    #[async_trait]
    impl Presenter for NoticeLog {
        async fn resolve_connection(&self, _details: &ResolutionDetails) -> ResolutionOutcome {
            ResolutionOutcome::Completed
        }

        async fn pick(&self, _request: PickerRequest) -> PickerOutcome {
            PickerOutcome::Cancelled
        }

        fn notify(&self, notice: Notice) {
            self.0.lock().push(notice.message);
        }

        fn progress(&self, _progress: Progress) {}
    }

    async fn setup() -> (
        Arc<MemoryDriveService>,
        EditorWorkflow,
        ForegroundLoop,
        Arc<NoticeLog>,
    ) {
        let service = Arc::new(MemoryDriveService::new());
        let root = service.root().clone();
        let file = service.seed_file(&root, "todo.txt", TEXT_MIME_TYPE, "milk\neggs\n");
        let (ctx, fg) = foreground();
        let session = Session::new(service.clone(), ctx, AccountIdentity::Default);
        session.connect().await.unwrap();
        let log = Arc::new(NoticeLog::default());
        let editor = EditorWorkflow::new(session.client(), log.clone(), file);
        (service, editor, fg, log)
    }

    #[tokio::test]
    async fn test_load_then_save_round_trip() {
        let (service, mut editor, mut fg, log) = setup().await;
        let doc = editor.load().await.unwrap();
        assert_eq!(doc.metadata.title, "todo.txt");
        assert_eq!(editor.text(), "milk\neggs\n");

        editor.set_text("milk\neggs\nbread\n");
        editor.set_title("groceries.txt");
        let outcome = editor.save().await;
        fg.drain();

        assert_eq!(outcome.contents.unwrap(), 16);
        assert!(matches!(outcome.metadata, Ok(UpdateOutcome::Updated(_))));
        let resource = editor.resource().clone();
        assert_eq!(
            service.content_of(&resource).unwrap(),
            Bytes::from("milk\neggs\nbread\n")
        );
        assert_eq!(service.metadata_of(&resource).unwrap().title, "groceries.txt");
        assert_eq!(*log.0.lock(), vec![METADATA_SAVED_NOTICE.to_string()]);
    }

    #[tokio::test]
    async fn test_save_without_title_change_skips_metadata() {
        let (service, mut editor, mut fg, log) = setup().await;
        editor.load().await.unwrap();
        editor.set_text("only text\n");
        let outcome = editor.save().await;
        fg.drain();

        assert!(outcome.contents.is_ok());
        assert_eq!(outcome.metadata.unwrap(), UpdateOutcome::Unchanged);
        assert_eq!(service.call_count(Verb::UpdateMetadata), 0);
        assert!(log.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_shows_save_failed() {
        let (service, mut editor, mut fg, log) = setup().await;
        editor.load().await.unwrap();
        service.fail_next(
            Verb::CommitContents,
            Status::from_code(StatusCode::NETWORK_ERROR),
        );
        editor.set_text("lost\n");
        let outcome = editor.save().await;
        fg.drain();

        assert_eq!(
            outcome.contents.unwrap_err().code,
            StatusCode::NETWORK_ERROR
        );
        assert_eq!(*log.0.lock(), vec![SAVE_FAILED_NOTICE.to_string()]);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails_on_metadata() {
        let (service, _editor, _fg, log) = setup().await;
        let (ctx, mut fg) = foreground();
        let session = Session::new(service.clone(), ctx, AccountIdentity::Default);
        session.connect().await.unwrap();
        let mut editor = EditorWorkflow::new(
            session.client(),
            log.clone(),
            ResourceHandle::file("gone"),
        );
        let status = editor.load().await.unwrap_err();
        fg.drain();
        assert_eq!(status.code, StatusCode::RESOURCE_NOT_FOUND);
        assert_eq!(service.call_count(Verb::OpenContents), 0);
        assert_eq!(log.0.lock().len(), 1);
    }
}
