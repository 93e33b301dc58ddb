//! 实例状态保存
//!
//! 在上下文销毁重建之间保存当前选择的账号。
//!
//! ## 目录结构
//! ```text
//! ~/.drivepad/state/
//! ├── home.json
//! └── editor.json
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::account::AccountIdentity;
use crate::error::DriveError;

/// 保存的实例状态
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedInstanceState {
    pub account_name: AccountIdentity,
    /// 保存时间（Unix 时间戳，毫秒）
    pub saved_at: i64,
}

/// 实例状态存储
pub struct SavedStateStore {
    base_dir: PathBuf,
}

impl SavedStateStore {
    /// 默认使用 ~/.drivepad/state 目录
    pub fn new() -> Result<Self, DriveError> {
        let home = dirs::home_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "无法获取用户主目录")
        })?;
        Self::with_base_dir(home.join(".drivepad").join("state"))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Result<Self, DriveError> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn state_path(&self, context_key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", context_key))
    }

    /// 保存当前账号
    pub fn save_identity(
        &self,
        context_key: &str,
        identity: &AccountIdentity,
    ) -> Result<(), DriveError> {
        let state = SavedInstanceState {
            account_name: identity.clone(),
            saved_at: chrono::Utc::now().timestamp_millis(),
        };
        let content = serde_json::to_string_pretty(&state).map_err(std::io::Error::from)?;
        fs::write(self.state_path(context_key), content)?;
        tracing::debug!("[SavedState] 保存 {} 的账号: {}", context_key, identity);
        Ok(())
    }

    /// 恢复保存的账号，不存在或无法解析时返回 None
    pub fn restore_identity(&self, context_key: &str) -> Option<AccountIdentity> {
        let path = self.state_path(context_key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<SavedInstanceState>(&content) {
            Ok(state) => Some(state.account_name),
            Err(e) => {
                tracing::warn!("[SavedState] 无法解析 {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn clear(&self, context_key: &str) -> Result<(), DriveError> {
        let path = self.state_path(context_key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
