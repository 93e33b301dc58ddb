//! 传输进度

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// 传输进度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub bytes_transferred: u64,
    /// 总字节数，未知时为 None
    pub bytes_total: Option<u64>,
}

impl Progress {
    /// 百分比（0-100），总量未知时返回 None
    pub fn percent(&self) -> Option<u8> {
        match self.bytes_total {
            Some(0) => Some(100),
            Some(total) => {
                let pct = (self.bytes_transferred.min(total) as f64 / total as f64) * 100.0;
                Some(pct as u8)
            }
            None => None,
        }
    }
}

/// 进度上报端
///
/// 只转发单调不减的进度，倒退的上报会被丢弃。
#[derive(Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<Progress>>,
    last: Arc<Mutex<Option<u64>>>,
}

impl ProgressReporter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Progress>) -> Self {
        Self {
            tx: Some(tx),
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// 不转发任何进度的上报端
    pub fn disabled() -> Self {
        Self::default()
    }

    /// 上报进度，返回是否被接受
    pub fn report(&self, bytes_transferred: u64, bytes_total: Option<u64>) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let mut last = self.last.lock();
        if matches!(*last, Some(prev) if bytes_transferred < prev) {
            tracing::debug!(
                "[Progress] 忽略倒退的进度: {} < {:?}",
                bytes_transferred,
                *last
            );
            return false;
        }
        *last = Some(bytes_transferred);
        tx.send(Progress {
            bytes_transferred,
            bytes_total,
        })
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let p = Progress {
            bytes_transferred: 50,
            bytes_total: Some(200),
        };
        assert_eq!(p.percent(), Some(25));
        let unknown = Progress {
            bytes_transferred: 50,
            bytes_total: None,
        };
        assert_eq!(unknown.percent(), None);
        let empty = Progress {
            bytes_transferred: 0,
            bytes_total: Some(0),
        };
        assert_eq!(empty.percent(), Some(100));
    }

    #[test]
    fn test_reporter_drops_regressions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        assert!(reporter.report(10, Some(100)));
        assert!(reporter.report(10, Some(100)));
        assert!(!reporter.report(5, Some(100)));
        assert!(reporter.report(100, Some(100)));

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push(p.bytes_transferred);
        }
        assert_eq!(seen, vec![10, 10, 100]);
    }

    #[test]
    fn test_disabled_reporter() {
        assert!(!ProgressReporter::disabled().report(1, None));
    }
}
