//! 查询条件与分页结果

use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

/// 查询过滤条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum Filter {
    /// MIME 类型精确匹配
    MimeTypeEq(String),
    /// 标题包含（大小写不敏感）
    TitleContains(String),
    /// 星标状态
    Starred(bool),
}

impl Filter {
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::MimeTypeEq(mime) => metadata.mime_type == *mime,
            Self::TitleContains(needle) => metadata
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Self::Starred(starred) => metadata.starred == *starred,
        }
    }
}

/// 查询
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// 所有过滤条件都满足时才匹配
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.filters.iter().all(|f| f.matches(metadata))
    }

    /// 复制当前查询并替换分页令牌
    pub fn with_page_token(&self, token: Option<String>) -> Self {
        Self {
            filters: self.filters.clone(),
            page_token: token,
        }
    }
}

#[derive(Debug, Default)]
pub struct QueryBuilder {
    inner: Query,
}

impl QueryBuilder {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.inner.filters.push(filter);
        self
    }

    pub fn mime_type(self, mime: impl Into<String>) -> Self {
        self.filter(Filter::MimeTypeEq(mime.into()))
    }

    pub fn page_token(mut self, token: impl Into<String>) -> Self {
        self.inner.page_token = Some(token.into());
        self
    }

    pub fn build(self) -> Query {
        self.inner
    }
}

/// 分页结果
///
/// `next_page_token` 为 `None` 表示没有更多页。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResultSet<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl<T> PagedResultSet<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }

    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}
