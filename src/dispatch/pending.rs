//! 异步操作信封
//!
//! [`PendingResult`] 包装一次远端调用，结果恰好交付一次：
//! 要么通过 [`PendingResult::on_complete`] 在前台上下文回调，
//! 要么通过 [`PendingResult::wait`] 顺序等待。没有取消操作，
//! 上下文销毁后到达的结果会被忽略。

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::foreground::ForegroundContext;
use super::progress::{Progress, ProgressReporter};
use crate::error::DriveError;
use crate::models::{Status, StatusCode};

type ProgressHandler = Arc<Mutex<Box<dyn FnMut(Progress) + Send + 'static>>>;

/// 操作结果：成功负载或失败状态
pub type OperationResult<T> = Result<T, Status>;

/// 等待中的操作结果
pub struct PendingResult<T> {
    label: &'static str,
    ctx: ForegroundContext,
    done: Option<oneshot::Receiver<OperationResult<T>>>,
    progress: Option<mpsc::UnboundedReceiver<Progress>>,
    progress_handler: Option<ProgressHandler>,
}

impl<T> std::fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResult")
            .field("label", &self.label)
            .field("dispatched", &self.done.is_none())
            .finish()
    }
}

impl<T: Send + 'static> PendingResult<T> {
    /// 在工作线程上启动操作
    ///
    /// `op` 会拿到一个进度上报端，用于长时间传输时上报进度。
    pub fn spawn<F, Fut>(ctx: &ForegroundContext, label: &'static str, op: F) -> Self
    where
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = OperationResult<T>> + Send + 'static,
    {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let fut = op(ProgressReporter::new(progress_tx));
        tokio::spawn(async move {
            let result = fut.await;
            if done_tx.send(result).is_err() {
                tracing::debug!("[Pending] {} 的结果无人接收", label);
            }
        });
        Self {
            label,
            ctx: ctx.clone(),
            done: Some(done_rx),
            progress: Some(progress_rx),
            progress_handler: None,
        }
    }

    /// 已经有结果的操作（例如会话未连接时直接返回失败状态）
    pub fn ready(ctx: &ForegroundContext, label: &'static str, result: OperationResult<T>) -> Self {
        let (done_tx, done_rx) = oneshot::channel();
        let _ = done_tx.send(result);
        Self {
            label,
            ctx: ctx.clone(),
            done: Some(done_rx),
            progress: None,
            progress_handler: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// 注册进度回调，必须在 `on_complete` 之前注册，且只能注册一次
    pub fn on_progress<H>(&mut self, handler: H) -> Result<(), DriveError>
    where
        H: FnMut(Progress) + Send + 'static,
    {
        if self.done.is_none() || self.progress_handler.is_some() {
            return Err(DriveError::HandlerAlreadyRegistered);
        }
        self.progress_handler = Some(Arc::new(Mutex::new(Box::new(handler))));
        Ok(())
    }

    /// 注册完成回调，只能注册一次
    ///
    /// 回调在前台上下文执行；所有进度回调都在它之前执行。
    pub fn on_complete<H>(&mut self, handler: H) -> Result<(), DriveError>
    where
        H: FnOnce(OperationResult<T>) + Send + 'static,
    {
        let done = self.done.take().ok_or(DriveError::HandlerAlreadyRegistered)?;
        let progress = self.progress.take();
        let progress_handler = self.progress_handler.take();
        let ctx = self.ctx.clone();
        let label = self.label;
        tokio::spawn(async move {
            let result = pump(label, &ctx, done, progress, progress_handler).await;
            if !ctx.post(move || handler(result)) {
                tracing::debug!("[Pending] {} 完成时上下文已销毁，忽略结果", label);
            }
        });
        Ok(())
    }

    /// 顺序等待结果
    ///
    /// 已注册的进度回调仍然在前台上下文执行。若已注册完成回调，
    /// 结果已交给回调，这里返回内部错误状态。
    pub async fn wait(mut self) -> OperationResult<T> {
        let Some(done) = self.done.take() else {
            return Err(Status::new(
                StatusCode::INTERNAL_ERROR,
                format!("{} already dispatched to a completion handler", self.label),
            ));
        };
        pump(
            self.label,
            &self.ctx,
            done,
            self.progress.take(),
            self.progress_handler.take(),
        )
        .await
    }
}

async fn next_progress(rx: &mut Option<mpsc::UnboundedReceiver<Progress>>) -> Option<Progress> {
    match rx {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

fn forward_progress(ctx: &ForegroundContext, handler: &Option<ProgressHandler>, progress: Progress) {
    if let Some(handler) = handler {
        let handler = handler.clone();
        ctx.post(move || {
            let mut guard = handler.lock();
            (*guard)(progress)
        });
    }
}

/// 转发进度直到结果到达，然后补发残留的进度
async fn pump<T>(
    label: &'static str,
    ctx: &ForegroundContext,
    mut done: oneshot::Receiver<OperationResult<T>>,
    mut progress: Option<mpsc::UnboundedReceiver<Progress>>,
    handler: Option<ProgressHandler>,
) -> OperationResult<T> {
    let mut progress_open = progress.is_some();
    let received = loop {
        tokio::select! {
            biased;
            p = next_progress(&mut progress), if progress_open => match p {
                Some(p) => forward_progress(ctx, &handler, p),
                None => progress_open = false,
            },
            result = &mut done => break result,
        }
    };
    if let Some(rx) = progress.as_mut() {
        while let Ok(p) = rx.try_recv() {
            forward_progress(ctx, &handler, p);
        }
    }
    received.unwrap_or_else(|_| {
        tracing::warn!("[Pending] {} 的工作任务在完成前退出", label);
        Err(Status::new(
            StatusCode::INTERNAL_ERROR,
            format!("{} worker exited before completing", label),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::foreground::foreground;

    #[tokio::test]
    async fn test_on_complete_fires_once_on_foreground() {
        let (ctx, mut fg) = foreground();
        let mut pending = PendingResult::spawn(&ctx, "answer", |_| async { Ok(42u32) });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        pending.on_complete(move |r| s.lock().push(r)).unwrap();

        assert!(matches!(
            pending.on_complete(|_| {}),
            Err(DriveError::HandlerAlreadyRegistered)
        ));
        assert!(matches!(
            pending.on_progress(|_| {}),
            Err(DriveError::HandlerAlreadyRegistered)
        ));

        assert!(fg.next().await);
        assert_eq!(*seen.lock(), vec![Ok(42)]);
    }

    #[tokio::test]
    async fn test_progress_precedes_completion_and_is_monotonic() {
        let (ctx, mut fg) = foreground();
        let mut pending = PendingResult::spawn(&ctx, "download", |reporter| async move {
            reporter.report(10, Some(30));
            reporter.report(5, Some(30));
            reporter.report(20, Some(30));
            reporter.report(30, Some(30));
            Ok::<_, Status>("done")
        });
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        pending
            .on_progress(move |p| e.lock().push(format!("p{}", p.bytes_transferred)))
            .unwrap();
        let e = events.clone();
        pending
            .on_complete(move |r| e.lock().push(format!("done:{}", r.unwrap())))
            .unwrap();

        while events.lock().last().map(|s| !s.starts_with("done")).unwrap_or(true) {
            assert!(fg.next().await);
        }
        assert_eq!(*events.lock(), vec!["p10", "p20", "p30", "done:done"]);
    }

    #[tokio::test]
    async fn test_failure_status_is_delivered_as_data() {
        let (ctx, _fg) = foreground();
        let pending: PendingResult<()> = PendingResult::spawn(&ctx, "fail", |_| async {
            Err(Status::new(StatusCode::RESOURCE_NOT_FOUND, "missing"))
        });
        let status = pending.wait().await.unwrap_err();
        assert_eq!(status.code, StatusCode::RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_late_completion_after_teardown_is_ignored() {
        let (ctx, mut fg) = foreground();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let mut pending = PendingResult::spawn(&ctx, "slow", |_| async move {
            let _ = release_rx.await;
            Ok(1u8)
        });
        let hit = Arc::new(Mutex::new(false));
        let h = hit.clone();
        pending.on_complete(move |_| *h.lock() = true).unwrap();

        ctx.teardown();
        release_tx.send(()).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(!fg.next().await);
        assert_eq!(fg.drain(), 0);
        assert!(!*hit.lock());
    }

    #[tokio::test]
    async fn test_wait_after_on_complete_reports_internal_error() {
        let (ctx, _fg) = foreground();
        let mut pending = PendingResult::ready(&ctx, "ready", Ok(()));
        pending.on_complete(|_| {}).unwrap();
        let status = pending.wait().await.unwrap_err();
        assert_eq!(status.code, StatusCode::INTERNAL_ERROR);
    }
}
