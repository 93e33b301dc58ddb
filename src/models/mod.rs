pub mod content;
pub mod metadata;
pub mod query;
pub mod resource;
pub mod status;

pub use content::{CloseAction, ContentHandle, ContentId, ContentState, OpenMode};
pub use metadata::{Metadata, MetadataChangeSet, MetadataChangeSetBuilder};
pub use query::{Filter, PagedResultSet, Query, QueryBuilder};
pub use resource::{ResourceHandle, ResourceId, ResourceKind, FOLDER_MIME_TYPE, TEXT_MIME_TYPE};
pub use status::{Status, StatusCode};
