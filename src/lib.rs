//! drivepad 核心库
//!
//! 远端存储上的会话管理与异步工作流：
//! - [`session`]：账号解析、连接生命周期和绑定会话的客户端
//! - [`dispatch`]：异步操作信封和前台回调上下文
//! - [`services`]：内容读写、元数据、分页列表等工作流
//! - [`providers`]：存储服务契约及内存、HTTP 实现
//! - [`server`]：基于内存存储的 HTTP 模拟服务

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod models;
pub mod presenter;
pub mod providers;
pub mod server;
pub mod services;
pub mod session;

pub use dispatch::{foreground, ForegroundContext, ForegroundLoop, PendingResult, Progress};
pub use error::{ConnectionError, DriveError, ResolutionDetails};
pub use models::{Status, StatusCode};
pub use presenter::{Presenter, TracingPresenter};
pub use providers::{DriveService, HttpDriveService, MemoryDriveService};
pub use session::{AccountIdentity, DriveClient, Session};
