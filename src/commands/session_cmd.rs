//! 会话命令：账号解析、连接与关闭

use std::sync::Arc;

use tokio::sync::oneshot;

use super::{AppState, HOME_STATE_KEY};
use crate::config::Config;
use crate::dispatch::ForegroundContext;
use crate::presenter::Presenter;
use crate::providers::DriveService;
use crate::session::{resolve_identity, SavedStateStore, Session, StaticAccountDirectory};

/// 创建命令状态
///
/// 账号优先级：显式指定的 `requested`（命令行或环境变量）> 保存的状态 >
/// 配置文件中的账号 > 默认账号。显式指定账号相当于开启新的上下文，不恢复保存的状态。
pub fn bootstrap(
    config: Config,
    requested: Option<String>,
    store: Option<SavedStateStore>,
    service: Arc<dyn DriveService>,
    ctx: ForegroundContext,
    presenter: Arc<dyn Presenter>,
) -> AppState {
    let identity = match requested {
        Some(requested) => {
            tracing::debug!("[Command] 使用显式指定的账号，忽略保存的状态");
            resolve_identity(
                None,
                Some(requested.as_str()),
                &StaticAccountDirectory(Vec::new()),
            )
        }
        None => {
            let saved = store
                .as_ref()
                .and_then(|s| s.restore_identity(HOME_STATE_KEY))
                .map(|identity| identity.key().to_string());
            resolve_identity(
                saved.as_deref(),
                config.account.as_deref(),
                &StaticAccountDirectory(Vec::new()),
            )
        }
    };
    tracing::info!(
        "[Command] 使用账号 {} 连接 {} 服务",
        identity,
        service.name()
    );
    let session = Session::new(service, ctx, identity);
    AppState {
        config,
        session,
        presenter,
        store,
    }
}

/// 连接并保存账号
pub async fn connect(state: &AppState) -> Result<(), String> {
    state
        .session
        .on_foreground(state.presenter.clone())
        .await
        .map_err(|e| format!("连接失败: {}", e))?;
    if let Some(store) = &state.store {
        if let Err(e) = store.save_identity(HOME_STATE_KEY, &state.session.identity()) {
            tracing::warn!("[Command] 保存账号失败: {}", e);
        }
    }
    Ok(())
}

/// 等待前台上下文中已排队的任务全部执行
pub async fn flush(ctx: &ForegroundContext) {
    let (tx, rx) = oneshot::channel();
    if ctx.post(move || {
        let _ = tx.send(());
    }) {
        let _ = rx.await;
    }
}

/// 执行完排队的任务后断开并销毁上下文
pub async fn shutdown(state: &AppState) {
    flush(state.session.foreground()).await;
    state.session.teardown();
}
