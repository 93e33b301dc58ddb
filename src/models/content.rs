//! 内容句柄
//!
//! 内容句柄代表绑定到单个资源、单一打开模式的读写流。生命周期：
//! `Opened -> (Reading | Writing)* -> Committed | Discarded`，
//! 提交或丢弃只能发生一次，关闭后的任何读写都会返回错误。

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::resource::ResourceHandle;
use crate::error::DriveError;

/// 打开模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    ReadOnly,
    WriteOnly,
}

impl std::fmt::Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read_only"),
            Self::WriteOnly => write!(f, "write_only"),
        }
    }
}

/// 内容句柄 ID，由服务端在打开时分配
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 内容句柄状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentState {
    Opened,
    Reading,
    Writing,
    Committed,
    Discarded,
}

impl ContentState {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Committed | Self::Discarded)
    }
}

/// 关闭方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Commit,
    Discard,
}

/// 打开的内容句柄
#[derive(Debug)]
pub struct ContentHandle {
    id: ContentId,
    resource: ResourceHandle,
    mode: OpenMode,
    state: ContentState,
    /// 只读模式下为下载的内容，只写模式下为待提交的内容
    buffer: BytesMut,
    /// 状态迁移记录（包含初始的 Opened）
    history: Vec<ContentState>,
    /// 打开时会话的连接代次
    connection: u64,
}

impl ContentHandle {
    pub(crate) fn opened(
        id: ContentId,
        resource: ResourceHandle,
        mode: OpenMode,
        initial: Bytes,
    ) -> Self {
        let buffer = match mode {
            OpenMode::ReadOnly => BytesMut::from(&initial[..]),
            OpenMode::WriteOnly => BytesMut::new(),
        };
        Self {
            id,
            resource,
            mode,
            state: ContentState::Opened,
            buffer,
            history: vec![ContentState::Opened],
            connection: 0,
        }
    }

    pub(crate) fn with_connection(mut self, connection: u64) -> Self {
        self.connection = connection;
        self
    }

    pub(crate) fn connection(&self) -> u64 {
        self.connection
    }

    pub fn id(&self) -> &ContentId {
        &self.id
    }

    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn state(&self) -> ContentState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// 状态迁移记录，连续重复的状态只记录一次
    pub fn history(&self) -> &[ContentState] {
        &self.history
    }

    fn transition(&mut self, next: ContentState) {
        if self.state != next {
            self.state = next;
            self.history.push(next);
        }
    }

    fn ensure_open(&self) -> Result<(), DriveError> {
        if self.state.is_closed() {
            return Err(DriveError::ContentClosed {
                content_id: self.id.clone(),
                state: self.state,
            });
        }
        Ok(())
    }

    /// 开始读取，返回已下载的全部内容
    pub fn read(&mut self) -> Result<Bytes, DriveError> {
        self.ensure_open()?;
        if self.mode != OpenMode::ReadOnly {
            return Err(DriveError::WrongMode {
                expected: OpenMode::ReadOnly,
                actual: self.mode,
            });
        }
        self.transition(ContentState::Reading);
        Ok(self.buffer.clone().freeze())
    }

    /// 追加写入内容到本地缓冲
    pub fn write(&mut self, data: &[u8]) -> Result<(), DriveError> {
        self.ensure_open()?;
        if self.mode != OpenMode::WriteOnly {
            return Err(DriveError::WrongMode {
                expected: OpenMode::WriteOnly,
                actual: self.mode,
            });
        }
        self.transition(ContentState::Writing);
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// 已写入的字节数
    pub fn written_len(&self) -> usize {
        match self.mode {
            OpenMode::WriteOnly => self.buffer.len(),
            OpenMode::ReadOnly => 0,
        }
    }

    /// 关闭句柄，返回需要提交给服务端的内容（仅只写模式提交时有值）
    pub(crate) fn close(&mut self, action: CloseAction) -> Result<Option<Bytes>, DriveError> {
        self.ensure_open()?;
        let payload = match (action, self.mode) {
            (CloseAction::Commit, OpenMode::WriteOnly) => {
                Some(std::mem::take(&mut self.buffer).freeze())
            }
            _ => {
                self.buffer.clear();
                None
            }
        };
        self.transition(match action {
            CloseAction::Commit => ContentState::Committed,
            CloseAction::Discard => ContentState::Discarded,
        });
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_handle(body: &'static str) -> ContentHandle {
        ContentHandle::opened(
            ContentId("c1".to_string()),
            ResourceHandle::file("f1"),
            OpenMode::ReadOnly,
            Bytes::from_static(body.as_bytes()),
        )
    }

    #[test]
    fn test_read_path_transitions() {
        let mut handle = read_handle("hello");
        assert_eq!(handle.read().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(handle.read().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(handle.close(CloseAction::Commit).unwrap(), None);
        assert_eq!(
            handle.history(),
            &[
                ContentState::Opened,
                ContentState::Reading,
                ContentState::Committed
            ]
        );
    }

    #[test]
    fn test_double_commit_is_an_error() {
        let mut handle = read_handle("x");
        handle.close(CloseAction::Commit).unwrap();
        let err = handle.close(CloseAction::Commit).unwrap_err();
        assert!(matches!(err, DriveError::ContentClosed { .. }));
        assert!(matches!(
            handle.close(CloseAction::Discard),
            Err(DriveError::ContentClosed { .. })
        ));
    }

    #[test]
    fn test_use_after_close_is_an_error() {
        let mut handle = read_handle("x");
        handle.close(CloseAction::Discard).unwrap();
        assert!(matches!(
            handle.read(),
            Err(DriveError::ContentClosed { .. })
        ));
    }

    #[test]
    fn test_write_mode_checks() {
        let mut handle = ContentHandle::opened(
            ContentId("c2".to_string()),
            ResourceHandle::file("f1"),
            OpenMode::WriteOnly,
            Bytes::from_static(b"ignored"),
        );
        assert!(matches!(handle.read(), Err(DriveError::WrongMode { .. })));
        handle.write(b"abc").unwrap();
        handle.write(b"def").unwrap();
        assert_eq!(handle.written_len(), 6);
        let payload = handle.close(CloseAction::Commit).unwrap();
        assert_eq!(payload, Some(Bytes::from_static(b"abcdef")));
        assert!(matches!(
            handle.write(b"late"),
            Err(DriveError::ContentClosed { .. })
        ));
    }
}
