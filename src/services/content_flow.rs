//! 内容读写工作流
//!
//! 两个显式状态机：
//! - 打开-读取-关闭：`Idle -> Opening -> Reading -> Closing -> Done | Failed`
//! - 打开-写入-提交：`Idle -> Opening -> Writing -> Committing -> Done | Failed`
//!
//! 每次迁移都记录在轨迹中，失败时通过 [`Presenter`] 展示提示，不自动重试。

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;

use super::{local_fault, post_notice};
use crate::error::DriveError;
use crate::models::{OpenMode, ResourceHandle, Status};
use crate::presenter::{Notice, Presenter};
use crate::session::DriveClient;

/// 默认读取上限（行）
pub const DEFAULT_READ_CAP_LINES: usize = 1000;

/// 读取流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Idle,
    Opening,
    Reading,
    Closing,
    Done,
    Failed,
}

/// 读取到的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadContents {
    pub text: String,
    /// 保留的行数
    pub lines: usize,
    /// 是否因超过上限被截断
    pub truncated: bool,
}

/// 读取流程结果
#[derive(Debug)]
pub struct ReadOutcome {
    pub trace: Vec<ReadState>,
    pub result: Result<ReadContents, Status>,
    /// 读取成功但关闭失败时的状态
    pub close_status: Option<Status>,
}

impl ReadOutcome {
    pub fn final_state(&self) -> ReadState {
        self.trace.last().copied().unwrap_or(ReadState::Idle)
    }
}

/// 按行解码，超过上限的内容被丢弃
///
/// 保留原始换行符。
pub fn decode_capped(bytes: &[u8], cap_lines: usize) -> Result<ReadContents, DriveError> {
    let text = String::from_utf8(bytes.to_vec())?;
    let mut kept = String::new();
    let mut lines = 0;
    let mut truncated = false;
    for line in text.split_inclusive('\n') {
        if lines == cap_lines {
            truncated = true;
            break;
        }
        kept.push_str(line);
        lines += 1;
    }
    Ok(ReadContents {
        text: kept,
        lines,
        truncated,
    })
}

/// 打开-读取-关闭
pub struct OpenReadClose {
    client: DriveClient,
    presenter: Arc<dyn Presenter>,
    cap_lines: usize,
    failure_message: Option<String>,
    trace: Vec<ReadState>,
}

impl OpenReadClose {
    pub fn new(client: DriveClient, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            client,
            presenter,
            cap_lines: DEFAULT_READ_CAP_LINES,
            failure_message: None,
            trace: vec![ReadState::Idle],
        }
    }

    pub fn with_cap_lines(mut self, cap_lines: usize) -> Self {
        self.cap_lines = cap_lines;
        self
    }

    /// 失败时展示的提示，默认展示状态本身
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    fn enter(&mut self, state: ReadState) {
        tracing::debug!("[ReadFlow] {:?} -> {:?}", self.trace.last(), state);
        self.trace.push(state);
    }

    fn fail(mut self, status: Status, close_status: Option<Status>) -> ReadOutcome {
        self.enter(ReadState::Failed);
        tracing::warn!("[ReadFlow] 读取失败: {}", status);
        let message = self
            .failure_message
            .clone()
            .unwrap_or_else(|| status.to_string());
        post_notice(
            self.client.session().foreground(),
            &self.presenter,
            Notice::toast(message),
        );
        ReadOutcome {
            trace: self.trace,
            result: Err(status),
            close_status,
        }
    }

    pub async fn run(mut self, resource: &ResourceHandle) -> ReadOutcome {
        self.enter(ReadState::Opening);
        let mut pending = self.client.open_contents(resource, OpenMode::ReadOnly);
        let presenter = self.presenter.clone();
        if let Err(err) = pending.on_progress(move |progress| presenter.progress(progress)) {
            tracing::debug!("[ReadFlow] 无法注册进度回调: {}", err);
        }
        let mut handle = match pending.wait().await {
            Ok(handle) => handle,
            Err(status) => return self.fail(status, None),
        };

        self.enter(ReadState::Reading);
        let cap = self.cap_lines;
        let read = match handle.read() {
            Ok(bytes) => decode_on_worker(bytes, cap).await,
            Err(err) => Err(err),
        };

        // 无论读取是否成功都要关闭句柄
        self.enter(ReadState::Closing);
        let close_status = match self.client.commit_and_close(&mut handle) {
            Ok(pending) => pending.wait().await.err(),
            Err(err) => Some(local_fault(err)),
        };

        match read {
            Ok(contents) => {
                if let Some(status) = &close_status {
                    tracing::warn!("[ReadFlow] 关闭 {} 失败: {}", resource, status);
                }
                self.enter(ReadState::Done);
                tracing::info!(
                    "[ReadFlow] 读取 {} 完成: {} 行, truncated={}",
                    resource,
                    contents.lines,
                    contents.truncated
                );
                ReadOutcome {
                    trace: self.trace,
                    result: Ok(contents),
                    close_status,
                }
            }
            Err(err) => self.fail(local_fault(err), close_status),
        }
    }
}

async fn decode_on_worker(bytes: Bytes, cap: usize) -> Result<ReadContents, DriveError> {
    tokio::task::spawn_blocking(move || decode_capped(&bytes, cap)).await?
}

/// 写入流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Idle,
    Opening,
    Writing,
    Committing,
    Done,
    Failed,
}

/// 写入流程结果
#[derive(Debug)]
pub struct WriteOutcome {
    pub trace: Vec<WriteState>,
    /// 成功时为提交的字节数
    pub result: Result<usize, Status>,
}

impl WriteOutcome {
    pub fn final_state(&self) -> WriteState {
        self.trace.last().copied().unwrap_or(WriteState::Idle)
    }
}

/// 打开-写入-提交
pub struct WriteCommit {
    client: DriveClient,
    presenter: Arc<dyn Presenter>,
    failure_message: Option<String>,
    trace: Vec<WriteState>,
}

impl WriteCommit {
    pub fn new(client: DriveClient, presenter: Arc<dyn Presenter>) -> Self {
        Self {
            client,
            presenter,
            failure_message: None,
            trace: vec![WriteState::Idle],
        }
    }

    /// 失败时展示的提示，默认展示状态本身
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    fn enter(&mut self, state: WriteState) {
        tracing::debug!("[WriteFlow] {:?} -> {:?}", self.trace.last(), state);
        self.trace.push(state);
    }

    fn fail(mut self, status: Status) -> WriteOutcome {
        self.enter(WriteState::Failed);
        tracing::warn!("[WriteFlow] 写入失败: {}", status);
        let message = self
            .failure_message
            .clone()
            .unwrap_or_else(|| status.to_string());
        post_notice(
            self.client.session().foreground(),
            &self.presenter,
            Notice::toast(message),
        );
        WriteOutcome {
            trace: self.trace,
            result: Err(status),
        }
    }

    /// 把 `source` 的全部内容写入资源并提交
    ///
    /// `source` 在阻塞工作线程上读取；读取出错时句柄被丢弃，不会提交。
    pub async fn run<R>(mut self, resource: &ResourceHandle, source: R) -> WriteOutcome
    where
        R: Read + Send + 'static,
    {
        self.enter(WriteState::Opening);
        let mut handle = match self
            .client
            .open_contents(resource, OpenMode::WriteOnly)
            .wait()
            .await
        {
            Ok(handle) => handle,
            Err(status) => return self.fail(status),
        };

        self.enter(WriteState::Writing);
        let written = match buffer_on_worker(source).await {
            Ok(buf) => handle.write(&buf).map(|_| buf.len()),
            Err(err) => Err(err),
        };
        let written = match written {
            Ok(len) => len,
            Err(err) => {
                match self.client.discard(&mut handle) {
                    Ok(pending) => {
                        if let Err(status) = pending.wait().await {
                            tracing::warn!("[WriteFlow] 丢弃 {} 失败: {}", resource, status);
                        }
                    }
                    Err(discard_err) => {
                        tracing::warn!("[WriteFlow] 丢弃 {} 失败: {}", resource, discard_err)
                    }
                }
                return self.fail(local_fault(err));
            }
        };

        self.enter(WriteState::Committing);
        let committed = match self.client.commit_and_close(&mut handle) {
            Ok(pending) => pending.wait().await,
            Err(err) => Err(local_fault(err)),
        };
        match committed {
            Ok(()) => {
                self.enter(WriteState::Done);
                tracing::info!("[WriteFlow] 提交 {} 完成: {} 字节", resource, written);
                WriteOutcome {
                    trace: self.trace,
                    result: Ok(written),
                }
            }
            Err(status) => self.fail(status),
        }
    }
}

async fn buffer_on_worker<R>(mut source: R) -> Result<Vec<u8>, DriveError>
where
    R: Read + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        Ok::<_, DriveError>(buf)
    })
    .await?
}
