//! 回调调度模块
//!
//! 提供以下功能：
//! - 单线程前台上下文（所有完成回调串行执行）
//! - 异步操作信封（恰好一次的结果交付、可选进度回调）
//! - 单调不减的进度上报

mod foreground;
mod pending;
mod progress;

pub use foreground::{foreground, ForegroundContext, ForegroundLoop};
pub use pending::{OperationResult, PendingResult};
pub use progress::{Progress, ProgressReporter};
