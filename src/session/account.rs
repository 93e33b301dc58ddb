//! 账号标识与账号选择

use serde::{Deserialize, Serialize};

/// 表示“使用平台默认账号”的哨兵值
pub const DEFAULT_ACCOUNT: &str = "DEFAULT ACCOUNT";

/// 账号标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccountIdentity {
    /// 平台默认账号
    Default,
    /// 指定账号
    Named(String),
}

impl AccountIdentity {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::parse(&name)
    }

    /// 解析账号名，空字符串或哨兵值视为默认账号
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed == DEFAULT_ACCOUNT {
            Self::Default
        } else {
            Self::Named(trimmed.to_string())
        }
    }

    /// 持久化和比较用的键
    pub fn key(&self) -> &str {
        match self {
            Self::Default => DEFAULT_ACCOUNT,
            Self::Named(name) => name,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl Default for AccountIdentity {
    fn default() -> Self {
        Self::Default
    }
}

impl std::fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl From<String> for AccountIdentity {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<AccountIdentity> for String {
    fn from(value: AccountIdentity) -> Self {
        value.key().to_string()
    }
}

/// 设备上可用账号的来源
pub trait AccountDirectory: Send + Sync {
    fn accounts(&self) -> Vec<String>;
}

/// 固定账号列表
#[derive(Debug, Clone, Default)]
pub struct StaticAccountDirectory(pub Vec<String>);

impl AccountDirectory for StaticAccountDirectory {
    fn accounts(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// 确定当前使用的账号
///
/// 优先级：保存的状态 > 显式请求 > 设备上的第一个账号 > 默认账号。
pub fn resolve_identity(
    saved: Option<&str>,
    requested: Option<&str>,
    directory: &dyn AccountDirectory,
) -> AccountIdentity {
    if let Some(saved) = saved {
        return AccountIdentity::parse(saved);
    }
    if let Some(requested) = requested {
        return AccountIdentity::parse(requested);
    }
    match directory.accounts().into_iter().next() {
        Some(first) => {
            tracing::debug!("[Account] 未指定账号，选择 {}", first);
            AccountIdentity::parse(&first)
        }
        None => {
            tracing::debug!("[Account] 没有可用账号，使用默认账号");
            AccountIdentity::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_round_trip() {
        assert_eq!(AccountIdentity::parse(DEFAULT_ACCOUNT), AccountIdentity::Default);
        assert_eq!(AccountIdentity::parse("  "), AccountIdentity::Default);
        let json = serde_json::to_string(&AccountIdentity::Default).unwrap();
        assert_eq!(json, format!("\"{}\"", DEFAULT_ACCOUNT));
        let named: AccountIdentity = serde_json::from_str("\"bob@example.com\"").unwrap();
        assert_eq!(named, AccountIdentity::Named("bob@example.com".to_string()));
    }

    #[test]
    fn test_resolve_identity_priority() {
        let dir = StaticAccountDirectory(vec!["first@example.com".to_string()]);
        assert_eq!(
            resolve_identity(Some("saved@example.com"), Some("asked@example.com"), &dir).key(),
            "saved@example.com"
        );
        assert_eq!(
            resolve_identity(None, Some("asked@example.com"), &dir).key(),
            "asked@example.com"
        );
        assert_eq!(resolve_identity(None, None, &dir).key(), "first@example.com");
        assert!(resolve_identity(None, None, &StaticAccountDirectory::default()).is_default());
    }
}
