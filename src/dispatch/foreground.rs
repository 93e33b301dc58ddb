//! 前台回调上下文
//!
//! 所有操作的完成回调都投递到同一个 FIFO 队列，由唯一的 [`ForegroundLoop`]
//! 顺序执行，因此任意两个回调都不会并发运行。上下文被销毁后，
//! 迟到的回调会被静默丢弃。

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// 创建一对前台上下文和事件循环
pub fn foreground() -> (ForegroundContext, ForegroundLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    let alive = CancellationToken::new();
    (
        ForegroundContext {
            tx,
            alive: alive.clone(),
        },
        ForegroundLoop { rx, alive },
    )
}

/// 前台上下文（可克隆的投递端）
#[derive(Clone)]
pub struct ForegroundContext {
    tx: mpsc::UnboundedSender<Job>,
    alive: CancellationToken,
}

impl std::fmt::Debug for ForegroundContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForegroundContext")
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

impl ForegroundContext {
    /// 投递一个任务到前台执行
    ///
    /// 上下文已销毁或事件循环已退出时返回 `false`，任务被丢弃。
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.alive.is_cancelled() {
            tracing::debug!("[Foreground] 上下文已销毁，丢弃迟到的回调");
            return false;
        }
        if self.tx.send(Box::new(job)).is_err() {
            tracing::debug!("[Foreground] 事件循环已退出，丢弃回调");
            return false;
        }
        true
    }

    /// 销毁上下文，之后的回调都会被忽略
    pub fn teardown(&self) {
        if !self.alive.is_cancelled() {
            tracing::debug!("[Foreground] 销毁前台上下文");
            self.alive.cancel();
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.alive.is_cancelled()
    }

    /// 等待上下文被销毁
    pub async fn torn_down(&self) {
        self.alive.cancelled().await
    }
}

/// 前台事件循环
pub struct ForegroundLoop {
    rx: mpsc::UnboundedReceiver<Job>,
    alive: CancellationToken,
}

impl ForegroundLoop {
    fn execute(&self, job: Job) -> bool {
        if self.alive.is_cancelled() {
            return false;
        }
        // 回调中的 panic 不能拖垮宿主进程
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("[Foreground] 回调执行时发生 panic，已忽略");
        }
        true
    }

    /// 等待并执行下一个任务
    ///
    /// 返回 `false` 表示上下文已销毁或所有投递端都已释放。
    pub async fn next(&mut self) -> bool {
        let job = tokio::select! {
            biased;
            _ = self.alive.cancelled() => return false,
            job = self.rx.recv() => job,
        };
        match job {
            Some(job) => self.execute(job),
            None => false,
        }
    }

    /// 执行所有已就绪的任务，返回执行的数量
    pub fn drain(&mut self) -> usize {
        let mut executed = 0;
        while let Ok(job) = self.rx.try_recv() {
            if self.execute(job) {
                executed += 1;
            }
        }
        executed
    }

    /// 持续运行直到上下文销毁或所有投递端释放
    pub async fn run(mut self) -> usize {
        let mut executed = 0;
        while self.next().await {
            executed += 1;
        }
        tracing::debug!("[Foreground] 事件循环退出，共执行 {} 个回调", executed);
        executed
    }
}
