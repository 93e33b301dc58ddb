//! 会话
//!
//! 持有到远端服务的唯一连接，连接与断开跟随宿主的前后台切换：
//! 进入前台时连接，进入后台时断开，上下文结束时销毁。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::account::AccountIdentity;
use super::client::DriveClient;
use crate::dispatch::ForegroundContext;
use crate::error::ConnectionError;
use crate::models::ResourceId;
use crate::presenter::{Notice, Presenter, ResolutionOutcome};
use crate::providers::DriveService;

/// 连接状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

type ConnectedCallback = Arc<dyn Fn() + Send + Sync + 'static>;

pub(crate) struct SessionInner {
    pub(crate) service: Arc<dyn DriveService>,
    pub(crate) ctx: ForegroundContext,
    identity: Mutex<AccountIdentity>,
    state: Mutex<ConnectionState>,
    on_connected: Mutex<Option<ConnectedCallback>>,
    /// 每次断开递增，用于识别过期的连接尝试和内容句柄
    epoch: AtomicU64,
    /// 远端连接调用尚未返回（包括已被断开作废的尝试）
    attempt_live: AtomicBool,
    /// 当前有打开内容句柄的资源
    pub(crate) open_resources: Mutex<HashSet<ResourceId>>,
}

/// 已认证会话
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &*self.inner.identity.lock())
            .field("state", &*self.inner.state.lock())
            .field("service", &self.inner.service.name())
            .finish()
    }
}

impl Session {
    pub fn new(
        service: Arc<dyn DriveService>,
        ctx: ForegroundContext,
        identity: AccountIdentity,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                service,
                ctx,
                identity: Mutex::new(identity),
                state: Mutex::new(ConnectionState::Disconnected),
                on_connected: Mutex::new(None),
                epoch: AtomicU64::new(0),
                attempt_live: AtomicBool::new(false),
                open_resources: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn identity(&self) -> AccountIdentity {
        self.inner.identity.lock().clone()
    }

    /// 切换账号，下一次连接时生效
    pub fn set_identity(&self, identity: AccountIdentity) {
        *self.inner.identity.lock() = identity;
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state.lock() == ConnectionState::Connected
    }

    /// 当前连接代次，每次断开后递增
    pub(crate) fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    pub fn foreground(&self) -> &ForegroundContext {
        &self.inner.ctx
    }

    /// 注册连接成功回调
    ///
    /// 每次从未连接进入已连接状态时，回调在前台上下文执行一次。
    pub fn on_connected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.on_connected.lock() = Some(Arc::new(callback));
    }

    /// 获取绑定到本会话的客户端
    pub fn client(&self) -> DriveClient {
        DriveClient::new(self.clone())
    }

    /// 连接远端服务
    ///
    /// 已连接时直接返回成功；同一时间只允许一个连接尝试。
    /// 连接中途断开的尝试在远端返回之前仍然占用名额。
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        {
            let mut state = self.inner.state.lock();
            if *state == ConnectionState::Connected {
                return Ok(());
            }
            if self.inner.attempt_live.load(Ordering::SeqCst) {
                tracing::debug!("[Session] 已有连接尝试在进行，状态 {}", *state);
                return Err(ConnectionError::AttemptInProgress);
            }
            self.inner.attempt_live.store(true, Ordering::SeqCst);
            *state = ConnectionState::Connecting;
        }
        let attempt = AttemptGuard(&self.inner.attempt_live);

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let identity = self.identity();
        tracing::info!(
            "[Session] 连接 {} (service={})",
            identity,
            self.inner.service.name()
        );
        let result = self.inner.service.connect(&identity).await;

        let mut state = self.inner.state.lock();
        drop(attempt);
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("[Session] 连接完成前已断开，丢弃本次连接结果");
            if result.is_ok() {
                self.spawn_service_disconnect();
            }
            return Err(ConnectionError::Superseded);
        }

        match result {
            Ok(()) => {
                *state = ConnectionState::Connected;
                drop(state);
                tracing::info!("[Session] 已连接: {}", identity);
                self.notify_connected();
                Ok(())
            }
            Err(ConnectionError::NeedsResolution(details)) => {
                *state = ConnectionState::Disconnected;
                tracing::info!("[Session] 连接需要授权: {}", details);
                Err(ConnectionError::NeedsResolution(details))
            }
            Err(err) => {
                *state = ConnectionState::Failed(err.to_string());
                tracing::warn!("[Session] 连接失败: {}", err);
                Err(err)
            }
        }
    }

    /// 连接，必要时通过界面完成授权后重试一次
    ///
    /// 用户取消授权时会话保持 Disconnected；不可恢复的错误会展示阻塞提示。
    pub async fn connect_with_resolution(
        &self,
        presenter: Arc<dyn Presenter>,
    ) -> Result<(), ConnectionError> {
        let result = match self.connect().await {
            Err(ConnectionError::NeedsResolution(details)) => {
                match presenter.resolve_connection(&details).await {
                    ResolutionOutcome::Completed => {
                        tracing::info!("[Session] 授权完成，重新连接");
                        self.connect().await
                    }
                    ResolutionOutcome::Cancelled => {
                        tracing::info!("[Session] 用户取消授权");
                        Err(ConnectionError::NeedsResolution(details))
                    }
                }
            }
            other => other,
        };

        if let Err(ConnectionError::Unrecoverable(code)) = &result {
            let message = format!("Unable to connect to the drive service (error {}).", code);
            let presenter = presenter.clone();
            self.inner
                .ctx
                .post(move || presenter.notify(Notice::blocking(message)));
        }
        result
    }

    /// 断开连接
    ///
    /// 本地立即生效，远端断开在后台完成。断开后所有资源操作都返回未连接状态。
    pub fn disconnect(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = std::mem::replace(
            &mut *self.inner.state.lock(),
            ConnectionState::Disconnected,
        );
        self.inner.open_resources.lock().clear();
        if previous == ConnectionState::Connected {
            tracing::info!("[Session] 已断开: {}", self.identity());
            self.spawn_service_disconnect();
        }
    }

    /// 宿主进入前台
    pub async fn on_foreground(&self, presenter: Arc<dyn Presenter>) -> Result<(), ConnectionError> {
        self.connect_with_resolution(presenter).await
    }

    /// 宿主进入后台
    pub fn on_background(&self) {
        self.disconnect();
    }

    /// 上下文结束：断开连接并销毁前台上下文，迟到的回调会被忽略
    pub fn teardown(&self) {
        self.disconnect();
        self.inner.ctx.teardown();
    }

    fn notify_connected(&self) {
        let callback = self.inner.on_connected.lock().clone();
        if let Some(callback) = callback {
            self.inner.ctx.post(move || callback());
        }
    }

    fn spawn_service_disconnect(&self) {
        let service = self.inner.service.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { service.disconnect().await });
            }
            Err(_) => tracing::debug!("[Session] 没有运行时，跳过远端断开"),
        }
    }
}

/// 连接尝试结束（或被丢弃）时释放名额
struct AttemptGuard<'a>(&'a AtomicBool);

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
