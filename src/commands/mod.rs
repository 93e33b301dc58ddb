//! 命令行命令
//!
//! 每个命令对应一个工作流入口，返回 `Result<T, String>`，由 `main` 负责输出。

pub mod drive_cmd;
pub mod session_cmd;

use std::sync::Arc;

use crate::config::{Config, ServiceKind};
use crate::models::{ResourceHandle, TEXT_MIME_TYPE};
use crate::presenter::Presenter;
use crate::providers::{DriveService, HttpDriveService, MemoryDriveService};
use crate::session::{SavedStateStore, Session};

/// 保存首页账号的状态键
pub const HOME_STATE_KEY: &str = "home";

/// 命令共享的状态
pub struct AppState {
    pub config: Config,
    pub session: Session,
    pub presenter: Arc<dyn Presenter>,
    pub store: Option<SavedStateStore>,
}

/// 根据配置创建存储服务
pub fn build_service(config: &Config) -> Arc<dyn DriveService> {
    match config.service.kind {
        ServiceKind::Memory => demo_drive(config),
        ServiceKind::Http => {
            tracing::info!("[Command] 使用 HTTP 存储服务: {}", config.service.base_url);
            Arc::new(HttpDriveService::new(
                config.service.base_url.clone(),
                config.service.timeout(),
            ))
        }
    }
}

/// 带演示数据的内存存储
pub fn demo_drive(config: &Config) -> Arc<MemoryDriveService> {
    let drive = MemoryDriveService::new().with_page_size(config.listing.page_size);
    let root: ResourceHandle = drive.root().clone();
    drive.seed_file(
        &root,
        "Welcome.txt",
        TEXT_MIME_TYPE,
        "Welcome to drivepad.\nEdit me with `drivepad edit <id> --text ...`.\n",
    );
    drive.seed_file(&root, "Shopping list.txt", TEXT_MIME_TYPE, "milk\neggs\nbread\n");
    drive.seed_file(&root, "photo.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]);
    tracing::debug!("[Command] 已创建演示数据");
    Arc::new(drive)
}
