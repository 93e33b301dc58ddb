//! 存储命令

use super::AppState;
use crate::models::{Metadata, ResourceHandle, ResourceId};
use crate::services::{EditorWorkflow, HomeWorkflow, ReadContents, UpdateOutcome};

/// 编辑命令的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSummary {
    pub resource: ResourceHandle,
    /// 写入的字节数，未修改内容时为 None
    pub bytes_written: Option<usize>,
    pub title_updated: bool,
}

async fn home(state: &AppState) -> Result<HomeWorkflow, String> {
    let client = state.session.client();
    let root = client
        .root_folder()
        .wait()
        .await
        .map_err(|s| format!("获取根目录失败: {}", s))?;
    Ok(HomeWorkflow::with_root(
        client,
        state.presenter.clone(),
        root,
        state.config.editor.mime_type.clone(),
    )
    .with_prefetch_threshold(state.config.listing.prefetch_threshold))
}

async fn list_all(home: &HomeWorkflow) -> Result<Vec<Metadata>, String> {
    home.listing()
        .load_all()
        .await
        .map_err(|s| format!("列出文件失败: {}", s))?;
    Ok(home.listing().items())
}

/// 列出根目录下的文本文件
pub async fn list_files(state: &AppState) -> Result<Vec<Metadata>, String> {
    let home = home(state).await?;
    list_all(&home).await
}

/// 请求同步后列出文件
pub async fn sync(state: &AppState) -> Result<Vec<Metadata>, String> {
    let home = home(state).await?;
    home.sync().await.map_err(|s| format!("同步失败: {}", s))?;
    list_all(&home).await
}

pub async fn create_file(state: &AppState) -> Result<ResourceHandle, String> {
    let home = home(state).await?;
    home.create_file_programmatically()
        .await
        .map_err(|s| format!("创建文件失败: {}", s))
}

pub async fn create_folder(state: &AppState) -> Result<ResourceHandle, String> {
    let home = home(state).await?;
    home.create_folder()
        .await
        .map_err(|s| format!("创建文件夹失败: {}", s))
}

fn editor(state: &AppState, id: &str) -> EditorWorkflow {
    let client = state.session.client();
    let file = client.get_file(ResourceId::new(id));
    EditorWorkflow::new(client, state.presenter.clone(), file)
        .with_read_cap_lines(state.config.editor.read_cap_lines)
}

/// 读取文件内容
pub async fn cat(state: &AppState, id: &str) -> Result<ReadContents, String> {
    let mut editor = editor(state, id);
    let doc = editor
        .load()
        .await
        .map_err(|s| format!("读取 {} 失败: {}", id, s))?;
    if doc.contents.truncated {
        tracing::warn!(
            "[Command] {} 超过 {} 行，只显示前面部分",
            doc.metadata.title,
            state.config.editor.read_cap_lines
        );
    }
    Ok(doc.contents)
}

/// 修改文件的标题和内容
pub async fn edit(
    state: &AppState,
    id: &str,
    title: Option<String>,
    text: Option<String>,
) -> Result<EditSummary, String> {
    let mut editor = editor(state, id);
    editor
        .load()
        .await
        .map_err(|s| format!("读取 {} 失败: {}", id, s))?;
    if let Some(title) = title {
        editor.set_title(title);
    }

    let (bytes_written, metadata) = match text {
        Some(text) => {
            editor.set_text(text);
            let outcome = editor.save().await;
            let written = outcome
                .contents
                .map_err(|s| format!("保存 {} 失败: {}", id, s))?;
            (Some(written), outcome.metadata)
        }
        None => (None, editor.save_metadata().await),
    };
    let title_updated = match metadata.map_err(|s| format!("保存 {} 的元数据失败: {}", id, s))? {
        UpdateOutcome::Updated(_) => true,
        UpdateOutcome::Unchanged => false,
    };
    Ok(EditSummary {
        resource: editor.resource().clone(),
        bytes_written,
        title_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::session_cmd::{bootstrap, connect, shutdown};
    use crate::commands::{demo_drive, HOME_STATE_KEY};
    use crate::config::Config;
    use crate::dispatch::foreground;
    use crate::presenter::TracingPresenter;
    use crate::providers::MemoryDriveService;
    use crate::session::{AccountIdentity, SavedStateStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn app(dir: &TempDir) -> (Arc<MemoryDriveService>, AppState) {
        let config = Config::default();
        let drive = demo_drive(&config);
        let (ctx, fg) = foreground();
        tokio::spawn(fg.run());
        let store = SavedStateStore::with_base_dir(dir.path().to_path_buf()).unwrap();
        let state = bootstrap(
            config,
            Some("frank@example.com".to_string()),
            Some(store),
            drive.clone(),
            ctx,
            Arc::new(TracingPresenter::default()),
        );
        connect(&state).await.unwrap();
        (drive, state)
    }

    #[tokio::test]
    async fn test_connect_persists_identity() {
        let dir = TempDir::new().unwrap();
        let (_drive, state) = app(&dir).await;
        let restored = SavedStateStore::with_base_dir(dir.path().to_path_buf())
            .unwrap()
            .restore_identity(HOME_STATE_KEY);
        assert_eq!(restored, Some(AccountIdentity::named("frank@example.com")));
        shutdown(&state).await;
    }

    #[tokio::test]
    async fn test_list_create_and_edit() {
        let dir = TempDir::new().unwrap();
        let (drive, state) = app(&dir).await;

        let files = list_files(&state).await.unwrap();
        assert_eq!(files.len(), 2);

        let created = create_file(&state).await.unwrap();
        let files = list_files(&state).await.unwrap();
        assert_eq!(files.len(), 3);

        let id = created.id.to_string();
        let summary = edit(
            &state,
            &id,
            Some("renamed.txt".to_string()),
            Some("hello\n".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(summary.bytes_written, Some(6));
        assert!(summary.title_updated);
        assert_eq!(drive.metadata_of(&created).unwrap().title, "renamed.txt");

        let contents = cat(&state, &id).await.unwrap();
        assert_eq!(contents.text, "hello\n");
        shutdown(&state).await;
    }

    #[tokio::test]
    async fn test_cat_unknown_id_reports_error() {
        let dir = TempDir::new().unwrap();
        let (_drive, state) = app(&dir).await;
        let err = cat(&state, "does-not-exist").await.unwrap_err();
        assert!(err.contains("RESOURCE_NOT_FOUND"));
        shutdown(&state).await;
    }
}
