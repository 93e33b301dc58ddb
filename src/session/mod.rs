//! 会话管理模块
//!
//! 提供以下功能：
//! - 账号标识解析（保存的状态、显式请求、设备账号、默认账号）
//! - 实例状态保存与恢复
//! - 连接生命周期（前台连接、后台断开、交互授权后重试）
//! - 绑定会话的客户端，把远端动词包装成异步操作信封

mod account;
mod client;
mod drive_session;
mod saved_state;

pub use account::{
    resolve_identity, AccountDirectory, AccountIdentity, StaticAccountDirectory, DEFAULT_ACCOUNT,
};
pub use client::DriveClient;
pub use drive_session::{ConnectionState, Session};
pub use saved_state::{SavedInstanceState, SavedStateStore};
