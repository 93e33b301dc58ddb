//! 子项分页列表
//!
//! 由使用方驱动的分页：只有当使用方滚动到已加载数据末尾附近时才请求下一页，
//! 不会预先拉取全部页面。同一时间最多一个请求在途；刷新会使在途请求的结果作废。

use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispatch::OperationResult;
use crate::error::DriveError;
use crate::models::{Metadata, PagedResultSet, Query, ResourceHandle, Status};
use crate::presenter::{Notice, Presenter};
use crate::session::DriveClient;

/// 默认预取阈值（条）
pub const DEFAULT_PREFETCH_THRESHOLD: usize = 15;

/// 按页累积的结果
#[derive(Debug, Clone, Default)]
pub struct PageAccumulator {
    items: Vec<Metadata>,
    next_page_token: Option<String>,
    pages: usize,
}

impl PageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next_page_token = None;
        self.pages = 0;
    }

    /// 追加一页，并记录下一页的令牌
    pub fn append(&mut self, page: PagedResultSet<Metadata>) {
        self.items.extend(page.items);
        self.next_page_token = page.next_page_token;
        self.pages += 1;
    }

    pub fn items(&self) -> &[Metadata] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }

    /// 已接收的页数
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

#[derive(Debug, Default)]
struct ListingState {
    pages: PageAccumulator,
    in_flight: bool,
    /// 每次刷新递增，旧请求的结果据此丢弃
    generation: u64,
}

/// 文件夹子项列表
#[derive(Clone)]
pub struct ChildListing {
    client: DriveClient,
    presenter: Arc<dyn Presenter>,
    parent: ResourceHandle,
    query: Query,
    prefetch_threshold: usize,
    state: Arc<Mutex<ListingState>>,
}

impl ChildListing {
    pub fn new(
        client: DriveClient,
        presenter: Arc<dyn Presenter>,
        parent: ResourceHandle,
        query: Query,
    ) -> Self {
        Self {
            client,
            presenter,
            parent,
            query,
            prefetch_threshold: DEFAULT_PREFETCH_THRESHOLD,
            state: Arc::new(Mutex::new(ListingState::default())),
        }
    }

    pub fn with_prefetch_threshold(mut self, threshold: usize) -> Self {
        self.prefetch_threshold = threshold;
        self
    }

    pub fn parent(&self) -> &ResourceHandle {
        &self.parent
    }

    /// 当前已加载的条目
    pub fn items(&self) -> Vec<Metadata> {
        self.state.lock().pages.items().to_vec()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pages.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().pages.has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().in_flight
    }

    /// 清空并请求第一页
    pub fn refresh(&self) -> Result<(), DriveError> {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.pages.clear();
            state.in_flight = true;
            state.generation
        };
        tracing::debug!("[Listing] 刷新 {} (generation={})", self.parent, generation);
        self.fetch(generation, None)
    }

    /// 是否应该请求下一页
    ///
    /// 存在下一页令牌、没有在途请求，且第一个可见条目距离末尾不足阈值时成立。
    pub fn should_fetch_more(
        &self,
        first_visible: usize,
        _visible_count: usize,
        total: usize,
    ) -> bool {
        let state = self.state.lock();
        state.pages.has_more()
            && !state.in_flight
            && first_visible + self.prefetch_threshold > total
    }

    /// 使用方滚动时调用，返回是否发出了请求
    pub fn on_scroll(
        &self,
        first_visible: usize,
        visible_count: usize,
        total: usize,
    ) -> Result<bool, DriveError> {
        if !self.should_fetch_more(first_visible, visible_count, total) {
            return Ok(false);
        }
        self.request_next_page()
    }

    /// 请求下一页，没有令牌或已有在途请求时不做任何事
    pub fn request_next_page(&self) -> Result<bool, DriveError> {
        let (generation, token) = {
            let mut state = self.state.lock();
            let Some(token) = state.pages.next_page_token().map(str::to_string) else {
                return Ok(false);
            };
            if state.in_flight {
                return Ok(false);
            }
            state.in_flight = true;
            (state.generation, token)
        };
        tracing::debug!("[Listing] 请求 {} 的下一页: {}", self.parent, token);
        self.fetch(generation, Some(token))?;
        Ok(true)
    }

    fn fetch(&self, generation: u64, token: Option<String>) -> Result<(), DriveError> {
        let query = self.query.with_page_token(token);
        let mut pending = self.client.query_children(&self.parent, query);
        let state = self.state.clone();
        let presenter = self.presenter.clone();
        let registered = pending.on_complete(move |result| {
            accept_page(&state, generation, result, presenter.as_ref());
        });
        if registered.is_err() {
            self.state.lock().in_flight = false;
        }
        registered
    }

    /// 顺序加载全部页面（命令行使用），返回条目总数
    pub async fn load_all(&self) -> OperationResult<usize> {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.pages.clear();
            state.in_flight = true;
            state.generation
        };
        let mut token = None;
        loop {
            let result = self
                .client
                .query_children(&self.parent, self.query.with_page_token(token))
                .wait()
                .await;
            let mut state = self.state.lock();
            if state.generation != generation {
                return Ok(state.pages.len());
            }
            match result {
                Ok(page) => {
                    state.pages.append(page);
                    match state.pages.next_page_token() {
                        Some(next) => token = Some(next.to_string()),
                        None => {
                            state.in_flight = false;
                            return Ok(state.pages.len());
                        }
                    }
                }
                Err(status) => {
                    state.in_flight = false;
                    return Err(status);
                }
            }
        }
    }
}

fn accept_page(
    state: &Mutex<ListingState>,
    generation: u64,
    result: Result<PagedResultSet<Metadata>, Status>,
    presenter: &dyn Presenter,
) {
    let mut state = state.lock();
    if state.generation != generation {
        tracing::debug!(
            "[Listing] 丢弃过期的分页结果 (generation={}, current={})",
            generation,
            state.generation
        );
        return;
    }
    state.in_flight = false;
    match result {
        Ok(page) => {
            tracing::debug!(
                "[Listing] 收到 {} 条, has_more={}",
                page.items.len(),
                page.has_more()
            );
            state.pages.append(page);
        }
        Err(status) => {
            drop(state);
            tracing::warn!("[Listing] 查询失败: {}", status);
            presenter.notify(Notice::toast(status.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{foreground, ForegroundLoop};
    use crate::models::{StatusCode, TEXT_MIME_TYPE};
    use crate::presenter::TracingPresenter;
    use crate::providers::{MemoryDriveService, Verb};
    use crate::session::{AccountIdentity, Session};
    use proptest::prelude::*;
    use std::collections::HashSet;

    async fn listing(
        files: usize,
        page_size: usize,
    ) -> (Arc<MemoryDriveService>, ChildListing, ForegroundLoop, Vec<String>) {
        let service = Arc::new(MemoryDriveService::new().with_page_size(page_size));
        let root = service.root().clone();
        let ids = (0..files)
            .map(|i| {
                service
                    .seed_file(&root, &format!("file {}", i), TEXT_MIME_TYPE, "")
                    .id
                    .to_string()
            })
            .collect();
        let (ctx, fg) = foreground();
        let session = Session::new(service.clone(), ctx, AccountIdentity::Default);
        session.connect().await.unwrap();
        let listing = ChildListing::new(
            session.client(),
            Arc::new(TracingPresenter::default()),
            root,
            Query::builder().mime_type(TEXT_MIME_TYPE).build(),
        );
        (service, listing, fg, ids)
    }

    #[tokio::test]
    async fn test_no_fetch_while_in_flight() {
        let (service, listing, mut fg, _) = listing(50, 10).await;
        listing.refresh().unwrap();
        assert!(listing.is_loading());
        assert!(!listing.on_scroll(0, 5, 0).unwrap());

        assert!(fg.next().await);
        assert_eq!(listing.len(), 10);
        assert!(!listing.is_loading());
        assert_eq!(service.call_count(Verb::QueryChildren), 1);
    }

    #[tokio::test]
    async fn test_scroll_far_from_end_does_not_fetch() {
        let (service, listing, mut fg, _) = listing(60, 20).await;
        listing.refresh().unwrap();
        fg.next().await;

        assert!(!listing.should_fetch_more(0, 5, 20));
        assert!(listing.should_fetch_more(6, 5, 20));
        assert!(!listing.on_scroll(5, 5, 20).unwrap());
        assert_eq!(service.call_count(Verb::QueryChildren), 1);
    }

    #[tokio::test]
    async fn test_refresh_discards_stale_page() {
        let (_service, listing, mut fg, _) = listing(30, 10).await;
        listing.refresh().unwrap();
        listing.refresh().unwrap();
        fg.next().await;
        fg.next().await;
        assert_eq!(listing.len(), 10);
        assert!(listing.has_more());
    }

    #[tokio::test]
    async fn test_failed_page_clears_in_flight() {
        let (service, listing, mut fg, _) = listing(5, 10).await;
        service.fail_next(Verb::QueryChildren, Status::from_code(StatusCode::NETWORK_ERROR));
        listing.refresh().unwrap();
        fg.next().await;
        assert!(!listing.is_loading());
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn test_load_all_collects_every_page() {
        let (service, listing, _fg, ids) = listing(23, 5).await;
        assert_eq!(listing.load_all().await.unwrap(), 23);
        let loaded: Vec<String> = listing
            .items()
            .iter()
            .map(|m| m.resource.id.to_string())
            .collect();
        assert_eq!(loaded, ids);
        assert_eq!(service.call_count(Verb::QueryChildren), 5);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_scrolling_collects_all_pages_in_order(files in 0usize..70, page_size in 1usize..12) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let (service, listing, mut fg, ids) = listing(files, page_size).await;
                listing.refresh().unwrap();
                fg.next().await;
                loop {
                    let total = listing.len();
                    if !listing.on_scroll(total.saturating_sub(1), 5, total).unwrap() {
                        break;
                    }
                    fg.next().await;
                }

                let loaded: Vec<String> = listing
                    .items()
                    .iter()
                    .map(|m| m.resource.id.to_string())
                    .collect();
                let unique: HashSet<&String> = loaded.iter().collect();
                let expected_pages = files.div_ceil(page_size).max(1);
                assert_eq!(loaded, ids);
                assert_eq!(unique.len(), files);
                assert!(!listing.has_more());
                assert_eq!(service.call_count(Verb::QueryChildren), expected_pages);
            });
        }
    }
}
