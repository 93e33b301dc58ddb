//! 内存存储服务
//!
//! 进程内的 [`DriveService`] 实现，支持分页、授权门控、故障注入和调用计数。
//! 用于开发模拟服务和测试。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::{DriveService, OpenedContents};
use crate::dispatch::ProgressReporter;
use crate::error::{ConnectionError, ResolutionDetails};
use crate::models::{
    ContentId, Metadata, MetadataChangeSet, OpenMode, PagedResultSet, Query, ResourceHandle,
    ResourceId, ResourceKind, Status, StatusCode, FOLDER_MIME_TYPE,
};
use crate::session::AccountIdentity;

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// 默认进度上报块大小（字节）
const DEFAULT_CHUNK_SIZE: usize = 4096;

/// 需要用户授权时返回的错误码
const SIGN_IN_REQUIRED: i32 = 4;

/// 服务动词（用于计数和故障注入）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Connect,
    RootFolder,
    OpenContents,
    CommitContents,
    DiscardContents,
    GetMetadata,
    UpdateMetadata,
    CreateFile,
    CreateFolder,
    QueryChildren,
    RequestSync,
}

#[derive(Debug, Clone)]
struct Entry {
    metadata: Metadata,
    parent: Option<ResourceId>,
    content: Bytes,
    seq: u64,
}

#[derive(Debug, Clone)]
struct OpenContent {
    resource: ResourceId,
    mode: OpenMode,
}

/// 内存存储服务
pub struct MemoryDriveService {
    entries: DashMap<ResourceId, Entry>,
    root: ResourceHandle,
    open: DashMap<ContentId, OpenContent>,
    /// 需要交互授权的账号
    consent_required: DashSet<String>,
    /// 下一次连接返回的不可恢复错误码
    connect_failure: Mutex<Option<i32>>,
    /// 设置后每次连接都要先取得一个许可
    connect_gate: Mutex<Option<Arc<Semaphore>>>,
    connected: Mutex<Option<AccountIdentity>>,
    failures: Mutex<HashMap<Verb, VecDeque<Status>>>,
    calls: DashMap<Verb, usize>,
    seq: AtomicU64,
    page_size: usize,
    chunk_size: usize,
}

impl Default for MemoryDriveService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriveService {
    pub fn new() -> Self {
        let root = ResourceHandle::folder("root");
        let entries = DashMap::new();
        entries.insert(
            root.id.clone(),
            Entry {
                metadata: Metadata {
                    resource: root.clone(),
                    title: "root".to_string(),
                    mime_type: FOLDER_MIME_TYPE.to_string(),
                    starred: false,
                    modified_at: Utc::now(),
                },
                parent: None,
                content: Bytes::new(),
                seq: 0,
            },
        );
        Self {
            entries,
            root,
            open: DashMap::new(),
            consent_required: DashSet::new(),
            connect_failure: Mutex::new(None),
            connect_gate: Mutex::new(None),
            connected: Mutex::new(None),
            failures: Mutex::new(HashMap::new()),
            calls: DashMap::new(),
            seq: AtomicU64::new(1),
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &ResourceHandle {
        &self.root
    }

    // ========================================================================
    // 测试与模拟辅助
    // ========================================================================

    /// 要求指定账号在连接前完成交互授权
    pub fn require_consent(&self, identity: &AccountIdentity) {
        self.consent_required.insert(identity.key().to_string());
    }

    /// 标记账号已完成授权
    pub fn grant_consent(&self, identity: &AccountIdentity) {
        self.consent_required.remove(identity.key());
        tracing::debug!("[MemoryDrive] 账号 {} 已授权", identity);
    }

    /// 下一次连接以不可恢复错误失败
    pub fn fail_next_connect(&self, code: i32) {
        *self.connect_failure.lock() = Some(code);
    }

    /// 让之后的连接挂起，直到向返回的信号量添加许可
    pub fn gate_connects(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.connect_gate.lock() = Some(gate.clone());
        gate
    }

    /// 为指定动词注入一次失败
    ///
    /// `Verb::Connect` 的注入状态以 `Unrecoverable(code)` 返回。
    pub fn fail_next(&self, verb: Verb, status: Status) {
        self.failures.lock().entry(verb).or_default().push_back(status);
    }

    /// 指定动词被调用的次数
    pub fn call_count(&self, verb: Verb) -> usize {
        self.calls.get(&verb).map(|c| *c).unwrap_or(0)
    }

    pub fn connected_identity(&self) -> Option<AccountIdentity> {
        self.connected.lock().clone()
    }

    /// 当前未关闭的内容句柄数量
    pub fn open_content_count(&self) -> usize {
        self.open.len()
    }

    /// 直接写入一个文件（不计入调用次数）
    pub fn seed_file(
        &self,
        parent: &ResourceHandle,
        title: &str,
        mime_type: &str,
        content: impl Into<Bytes>,
    ) -> ResourceHandle {
        let handle = ResourceHandle::file(ResourceId::generate());
        self.insert_entry(&handle, parent, title, mime_type, false, content.into());
        handle
    }

    pub fn content_of(&self, resource: &ResourceHandle) -> Option<Bytes> {
        self.entries.get(&resource.id).map(|e| e.content.clone())
    }

    pub fn metadata_of(&self, resource: &ResourceHandle) -> Option<Metadata> {
        self.entries.get(&resource.id).map(|e| e.metadata.clone())
    }

    // ========================================================================
    // 内部实现
    // ========================================================================

    fn record(&self, verb: Verb) -> Result<(), Status> {
        *self.calls.entry(verb).or_insert(0) += 1;
        let injected = self
            .failures
            .lock()
            .get_mut(&verb)
            .and_then(|queue| queue.pop_front());
        match injected {
            Some(status) => {
                tracing::debug!("[MemoryDrive] {:?} 注入失败: {}", verb, status);
                Err(status)
            }
            None => Ok(()),
        }
    }

    fn insert_entry(
        &self,
        handle: &ResourceHandle,
        parent: &ResourceHandle,
        title: &str,
        mime_type: &str,
        starred: bool,
        content: Bytes,
    ) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(
            handle.id.clone(),
            Entry {
                metadata: Metadata {
                    resource: handle.clone(),
                    title: title.to_string(),
                    mime_type: mime_type.to_string(),
                    starred,
                    modified_at: Utc::now(),
                },
                parent: Some(parent.id.clone()),
                content,
                seq,
            },
        );
    }

    fn not_found(resource: &ResourceHandle) -> Status {
        Status::new(
            StatusCode::RESOURCE_NOT_FOUND,
            format!("resource {} not found", resource),
        )
    }

    fn require_folder(&self, parent: &ResourceHandle) -> Result<(), Status> {
        match self.entries.get(&parent.id) {
            Some(entry) if entry.metadata.resource.kind == ResourceKind::Folder => Ok(()),
            Some(_) => Err(Status::new(
                StatusCode::INTERNAL_ERROR,
                format!("{} is not a folder", parent),
            )),
            None => Err(Self::not_found(parent)),
        }
    }

    fn create(
        &self,
        parent: &ResourceHandle,
        kind: ResourceKind,
        changes: &MetadataChangeSet,
        contents: Bytes,
    ) -> Result<ResourceHandle, Status> {
        self.require_folder(parent)?;
        let handle = ResourceHandle {
            id: ResourceId::generate(),
            kind,
        };
        let default_mime = match kind {
            ResourceKind::File => "application/octet-stream",
            ResourceKind::Folder => FOLDER_MIME_TYPE,
        };
        self.insert_entry(
            &handle,
            parent,
            changes.title.as_deref().unwrap_or("Untitled"),
            changes.mime_type.as_deref().unwrap_or(default_mime),
            changes.starred.unwrap_or(false),
            contents,
        );
        tracing::debug!("[MemoryDrive] 创建 {} 于 {}", handle, parent);
        Ok(handle)
    }
}

fn page_offset(token: Option<&str>) -> Result<usize, Status> {
    match token {
        None => Ok(0),
        Some(token) => token
            .strip_prefix("page-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| {
                Status::new(
                    StatusCode::INTERNAL_ERROR,
                    format!("invalid page token: {}", token),
                )
            }),
    }
}

#[async_trait]
impl DriveService for MemoryDriveService {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, identity: &AccountIdentity) -> Result<(), ConnectionError> {
        self.record(Verb::Connect)
            .map_err(|status| ConnectionError::Unrecoverable(status.code.0))?;
        let gate = self.connect_gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(code) = self.connect_failure.lock().take() {
            return Err(ConnectionError::Unrecoverable(code));
        }
        if self.consent_required.contains(identity.key()) {
            return Err(ConnectionError::NeedsResolution(ResolutionDetails {
                code: SIGN_IN_REQUIRED,
                message: format!("account {} must grant access", identity),
                resolution_url: None,
            }));
        }
        *self.connected.lock() = Some(identity.clone());
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.lock().take();
    }

    async fn root_folder(&self) -> Result<ResourceHandle, Status> {
        self.record(Verb::RootFolder)?;
        Ok(self.root.clone())
    }

    async fn open_contents(
        &self,
        resource: &ResourceHandle,
        mode: OpenMode,
        progress: ProgressReporter,
    ) -> Result<OpenedContents, Status> {
        self.record(Verb::OpenContents)?;
        let content = self
            .entries
            .get(&resource.id)
            .map(|e| e.content.clone())
            .ok_or_else(|| Self::not_found(resource))?;

        let bytes = match mode {
            OpenMode::ReadOnly => {
                let total = content.len();
                let mut sent = 0;
                while sent < total {
                    sent = (sent + self.chunk_size).min(total);
                    progress.report(sent as u64, Some(total as u64));
                    tokio::task::yield_now().await;
                }
                content
            }
            OpenMode::WriteOnly => Bytes::new(),
        };

        let content_id = ContentId(uuid::Uuid::new_v4().to_string());
        self.open.insert(
            content_id.clone(),
            OpenContent {
                resource: resource.id.clone(),
                mode,
            },
        );
        Ok(OpenedContents { content_id, bytes })
    }

    async fn commit_contents(
        &self,
        resource: &ResourceHandle,
        content_id: &ContentId,
        payload: Option<Bytes>,
    ) -> Result<(), Status> {
        self.record(Verb::CommitContents)?;
        let open = self
            .open
            .remove(content_id)
            .map(|(_, open)| open)
            .ok_or_else(|| {
                Status::new(
                    StatusCode::INTERNAL_ERROR,
                    format!("content {} is not open", content_id),
                )
            })?;
        if open.resource != resource.id {
            return Err(Status::new(
                StatusCode::INTERNAL_ERROR,
                format!("content {} does not belong to {}", content_id, resource),
            ));
        }
        if let (OpenMode::WriteOnly, Some(payload)) = (open.mode, payload) {
            let mut entry = self
                .entries
                .get_mut(&resource.id)
                .ok_or_else(|| Self::not_found(resource))?;
            entry.content = payload;
            entry.metadata.modified_at = Utc::now();
        }
        Ok(())
    }

    async fn discard_contents(
        &self,
        resource: &ResourceHandle,
        content_id: &ContentId,
    ) -> Result<(), Status> {
        self.record(Verb::DiscardContents)?;
        match self.open.remove(content_id) {
            Some(_) => Ok(()),
            None => Err(Status::new(
                StatusCode::INTERNAL_ERROR,
                format!("content {} of {} is not open", content_id, resource),
            )),
        }
    }

    async fn get_metadata(&self, resource: &ResourceHandle) -> Result<Metadata, Status> {
        self.record(Verb::GetMetadata)?;
        self.entries
            .get(&resource.id)
            .map(|e| e.metadata.clone())
            .ok_or_else(|| Self::not_found(resource))
    }

    async fn update_metadata(
        &self,
        resource: &ResourceHandle,
        changes: &MetadataChangeSet,
    ) -> Result<Metadata, Status> {
        self.record(Verb::UpdateMetadata)?;
        let mut entry = self
            .entries
            .get_mut(&resource.id)
            .ok_or_else(|| Self::not_found(resource))?;
        if entry.metadata.apply(changes) {
            entry.metadata.modified_at = Utc::now();
        }
        Ok(entry.metadata.clone())
    }

    async fn create_file(
        &self,
        parent: &ResourceHandle,
        changes: &MetadataChangeSet,
        contents: Bytes,
    ) -> Result<ResourceHandle, Status> {
        self.record(Verb::CreateFile)?;
        self.create(parent, ResourceKind::File, changes, contents)
    }

    async fn create_folder(
        &self,
        parent: &ResourceHandle,
        changes: &MetadataChangeSet,
    ) -> Result<ResourceHandle, Status> {
        self.record(Verb::CreateFolder)?;
        self.create(parent, ResourceKind::Folder, changes, Bytes::new())
    }

    async fn query_children(
        &self,
        parent: &ResourceHandle,
        query: &Query,
    ) -> Result<PagedResultSet<Metadata>, Status> {
        self.record(Verb::QueryChildren)?;
        self.require_folder(parent)?;
        let offset = page_offset(query.page_token.as_deref())?;

        let mut children: Vec<(u64, Metadata)> = self
            .entries
            .iter()
            .filter(|e| e.parent.as_ref() == Some(&parent.id) && query.matches(&e.metadata))
            .map(|e| (e.seq, e.metadata.clone()))
            .collect();
        children.sort_by_key(|(seq, _)| *seq);

        let total = children.len();
        if offset > total {
            return Err(Status::new(
                StatusCode::INTERNAL_ERROR,
                format!("page token out of range: {}", offset),
            ));
        }
        let end = offset.saturating_add(self.page_size).min(total);
        let items: Vec<Metadata> = children
            .into_iter()
            .skip(offset)
            .take(end.saturating_sub(offset))
            .map(|(_, m)| m)
            .collect();
        let next_page_token = if end < total {
            Some(format!("page-{}", end))
        } else {
            None
        };
        Ok(PagedResultSet {
            items,
            next_page_token,
        })
    }

    async fn request_sync(&self) -> Result<(), Status> {
        self.record(Verb::RequestSync)?;
        tracing::debug!("[MemoryDrive] 同步完成");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TEXT_MIME_TYPE;

    #[tokio::test]
    async fn test_query_children_pages_in_insertion_order() {
        let service = MemoryDriveService::new().with_page_size(2);
        let root = service.root().clone();
        for i in 0..5 {
            service.seed_file(&root, &format!("f{}", i), TEXT_MIME_TYPE, "x");
        }
        service.seed_file(&root, "image", "image/png", "x");

        let query = Query::builder().mime_type(TEXT_MIME_TYPE).build();
        let mut titles = Vec::new();
        let mut token = None;
        let mut pages = 0;
        loop {
            let page = service
                .query_children(&root, &query.with_page_token(token))
                .await
                .unwrap();
            pages += 1;
            titles.extend(page.items.iter().map(|m| m.title.clone()));
            token = page.next_page_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(pages, 3);
        assert_eq!(titles, vec!["f0", "f1", "f2", "f3", "f4"]);
    }

    #[tokio::test]
    async fn test_connect_requires_consent_until_granted() {
        let service = MemoryDriveService::new();
        let identity = AccountIdentity::named("alice@example.com");
        service.require_consent(&identity);
        assert!(matches!(
            service.connect(&identity).await,
            Err(ConnectionError::NeedsResolution(_))
        ));
        service.grant_consent(&identity);
        service.connect(&identity).await.unwrap();
        assert_eq!(service.connected_identity(), Some(identity));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let service = MemoryDriveService::new();
        service.fail_next(Verb::RequestSync, Status::from_code(StatusCode::RATE_LIMITED));
        assert_eq!(
            service.request_sync().await.unwrap_err().code,
            StatusCode::RATE_LIMITED
        );
        service.request_sync().await.unwrap();
        assert_eq!(service.call_count(Verb::RequestSync), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_page_token_is_rejected() {
        let service = MemoryDriveService::new();
        let root = service.root().clone();
        service.seed_file(&root, "a", TEXT_MIME_TYPE, "x");

        let huge = Query::default().with_page_token(Some(format!("page-{}", usize::MAX)));
        let status = service.query_children(&root, &huge).await.unwrap_err();
        assert_eq!(status.code, StatusCode::INTERNAL_ERROR);

        let past_end = Query::default().with_page_token(Some("page-5".to_string()));
        assert!(service.query_children(&root, &past_end).await.is_err());

        // 恰好在末尾的令牌返回空页
        let at_end = Query::default().with_page_token(Some("page-1".to_string()));
        let page = service.query_children(&root, &at_end).await.unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more());
    }

    #[tokio::test]
    async fn test_injected_connect_failure_is_unrecoverable() {
        let service = MemoryDriveService::new();
        service.fail_next(Verb::Connect, Status::from_code(StatusCode::NETWORK_ERROR));
        assert_eq!(
            service.connect(&AccountIdentity::Default).await,
            Err(ConnectionError::Unrecoverable(StatusCode::NETWORK_ERROR.0))
        );
        service.connect(&AccountIdentity::Default).await.unwrap();
        assert_eq!(service.call_count(Verb::Connect), 2);
    }

    #[tokio::test]
    async fn test_write_commit_replaces_content() {
        let service = MemoryDriveService::new();
        let root = service.root().clone();
        let file = service.seed_file(&root, "a", TEXT_MIME_TYPE, "old");
        let opened = service
            .open_contents(&file, OpenMode::WriteOnly, ProgressReporter::disabled())
            .await
            .unwrap();
        assert!(opened.bytes.is_empty());
        assert_eq!(service.open_content_count(), 1);
        service
            .commit_contents(&file, &opened.content_id, Some(Bytes::from_static(b"new")))
            .await
            .unwrap();
        assert_eq!(service.content_of(&file).unwrap(), Bytes::from_static(b"new"));
        assert_eq!(service.open_content_count(), 0);
    }
}
