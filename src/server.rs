//! 存储模拟服务
//!
//! 通过 REST 接口暴露 [`MemoryDriveService`]，供 [`HttpDriveService`]
//! 在开发和测试中使用。接口说明见 [`crate::providers::http`]。
//!
//! [`HttpDriveService`]: crate::providers::HttpDriveService

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query as QueryParams, State},
    http::StatusCode as HttpStatus,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine;
use tokio::net::TcpListener;

use crate::dispatch::ProgressReporter;
use crate::error::ConnectionError;
use crate::models::{
    ContentId, MetadataChangeSet, Query, ResourceHandle, ResourceKind, Status, StatusCode,
};
use crate::providers::http::{
    CommitParams, ConnectRejection, ConnectRequest, CreateFileRequest, OpenParams,
    CONTENT_ID_HEADER,
};
use crate::providers::{DriveService, MemoryDriveService};
use crate::session::AccountIdentity;

#[derive(Clone)]
struct AppState {
    drive: Arc<MemoryDriveService>,
}

/// 以 JSON 状态返回的错误
struct ApiError(Status);

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let http = match self.0.code {
            StatusCode::RESOURCE_NOT_FOUND => HttpStatus::NOT_FOUND,
            StatusCode::CONTENT_BUSY => HttpStatus::CONFLICT,
            StatusCode::RATE_LIMITED => HttpStatus::TOO_MANY_REQUESTS,
            StatusCode::NOT_CONNECTED => HttpStatus::FORBIDDEN,
            StatusCode::NETWORK_ERROR => HttpStatus::BAD_GATEWAY,
            _ => HttpStatus::INTERNAL_SERVER_ERROR,
        };
        (http, Json(self.0)).into_response()
    }
}

fn parse_handle(kind: &str, id: String) -> Result<ResourceHandle, ApiError> {
    let kind = match kind {
        "file" => ResourceKind::File,
        "folder" => ResourceKind::Folder,
        other => {
            return Err(ApiError(Status::new(
                StatusCode::INTERNAL_ERROR,
                format!("unknown resource kind: {}", other),
            )))
        }
    };
    Ok(ResourceHandle {
        id: id.into(),
        kind,
    })
}

/// 构建路由
pub fn router(drive: Arc<MemoryDriveService>) -> Router {
    Router::new()
        .route("/v1/connect", post(connect))
        .route("/v1/disconnect", post(disconnect))
        .route("/v1/root", get(root_folder))
        .route(
            "/v1/resources/:kind/:id/metadata",
            get(get_metadata).patch(update_metadata),
        )
        .route("/v1/resources/:kind/:id/contents", post(open_contents))
        .route(
            "/v1/resources/:kind/:id/contents/:content_id",
            put(commit_contents).delete(discard_contents),
        )
        .route("/v1/folders/:id/files", post(create_file))
        .route("/v1/folders/:id/folders", post(create_folder))
        .route("/v1/folders/:id/children/query", post(query_children))
        .route("/v1/sync", post(request_sync))
        .with_state(AppState { drive })
}

/// 在指定地址启动模拟服务
pub async fn serve(bind: SocketAddr, drive: Arc<MemoryDriveService>) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    serve_on(listener, drive).await
}

/// 在已绑定的监听器上启动模拟服务
pub async fn serve_on(listener: TcpListener, drive: Arc<MemoryDriveService>) -> std::io::Result<()> {
    tracing::info!("[Server] 模拟服务监听 {}", listener.local_addr()?);
    axum::serve(listener, router(drive)).await
}

async fn connect(State(state): State<AppState>, Json(req): Json<ConnectRequest>) -> Response {
    let identity = AccountIdentity::parse(&req.account);
    match state.drive.connect(&identity).await {
        Ok(()) => {
            tracing::info!("[Server] 账号 {} 已连接", identity);
            HttpStatus::OK.into_response()
        }
        Err(ConnectionError::NeedsResolution(details)) => {
            (HttpStatus::UNAUTHORIZED, Json(details)).into_response()
        }
        Err(ConnectionError::Unrecoverable(code)) => {
            (HttpStatus::FORBIDDEN, Json(ConnectRejection { code })).into_response()
        }
        Err(other) => {
            tracing::warn!("[Server] 连接失败: {}", other);
            (
                HttpStatus::CONFLICT,
                Json(ConnectRejection {
                    code: StatusCode::INTERNAL_ERROR.0,
                }),
            )
                .into_response()
        }
    }
}

async fn disconnect(State(state): State<AppState>) -> HttpStatus {
    state.drive.disconnect().await;
    HttpStatus::NO_CONTENT
}

async fn root_folder(State(state): State<AppState>) -> Result<Json<ResourceHandle>, ApiError> {
    Ok(Json(state.drive.root_folder().await?))
}

async fn get_metadata(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let resource = parse_handle(&kind, id)?;
    Ok(Json(state.drive.get_metadata(&resource).await?))
}

async fn update_metadata(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    Json(changes): Json<MetadataChangeSet>,
) -> Result<impl IntoResponse, ApiError> {
    let resource = parse_handle(&kind, id)?;
    Ok(Json(state.drive.update_metadata(&resource, &changes).await?))
}

async fn open_contents(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    QueryParams(params): QueryParams<OpenParams>,
) -> Result<impl IntoResponse, ApiError> {
    let resource = parse_handle(&kind, id)?;
    let opened = state
        .drive
        .open_contents(&resource, params.mode, ProgressReporter::disabled())
        .await?;
    Ok((
        [(CONTENT_ID_HEADER, opened.content_id.0)],
        opened.bytes,
    ))
}

async fn commit_contents(
    State(state): State<AppState>,
    Path((kind, id, content_id)): Path<(String, String, String)>,
    QueryParams(params): QueryParams<CommitParams>,
    body: Bytes,
) -> Result<HttpStatus, ApiError> {
    let resource = parse_handle(&kind, id)?;
    let payload = if params.release { None } else { Some(body) };
    state
        .drive
        .commit_contents(&resource, &ContentId(content_id), payload)
        .await?;
    Ok(HttpStatus::NO_CONTENT)
}

async fn discard_contents(
    State(state): State<AppState>,
    Path((kind, id, content_id)): Path<(String, String, String)>,
) -> Result<HttpStatus, ApiError> {
    let resource = parse_handle(&kind, id)?;
    state
        .drive
        .discard_contents(&resource, &ContentId(content_id))
        .await?;
    Ok(HttpStatus::NO_CONTENT)
}

async fn create_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateFileRequest>,
) -> Result<Json<ResourceHandle>, ApiError> {
    let contents = base64::engine::general_purpose::STANDARD
        .decode(req.contents.as_bytes())
        .map_err(|e| {
            ApiError(Status::new(
                StatusCode::INTERNAL_ERROR,
                format!("invalid base64 contents: {}", e),
            ))
        })?;
    let parent = ResourceHandle::folder(id);
    let handle = state
        .drive
        .create_file(&parent, &req.metadata, contents.into())
        .await?;
    Ok(Json(handle))
}

async fn create_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(changes): Json<MetadataChangeSet>,
) -> Result<Json<ResourceHandle>, ApiError> {
    let parent = ResourceHandle::folder(id);
    Ok(Json(state.drive.create_folder(&parent, &changes).await?))
}

async fn query_children(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(query): Json<Query>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = ResourceHandle::folder(id);
    Ok(Json(state.drive.query_children(&parent, &query).await?))
}

async fn request_sync(State(state): State<AppState>) -> Result<HttpStatus, ApiError> {
    state.drive.request_sync().await?;
    Ok(HttpStatus::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::foreground;
    use crate::models::{OpenMode, TEXT_MIME_TYPE};
    use crate::providers::{HttpDriveService, Verb};
    use parking_lot::Mutex;
    use std::time::Duration;

    async fn spawn_emulator(drive: Arc<MemoryDriveService>) -> HttpDriveService {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_on(listener, drive));
        HttpDriveService::new(format!("http://{}", addr), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_connect_maps_resolution_and_rejection() {
        let drive = Arc::new(MemoryDriveService::new());
        let http = spawn_emulator(drive.clone()).await;
        let carol = AccountIdentity::named("carol@example.com");

        drive.require_consent(&carol);
        assert!(matches!(
            http.connect(&carol).await,
            Err(ConnectionError::NeedsResolution(_))
        ));

        drive.grant_consent(&carol);
        drive.fail_next_connect(16);
        assert_eq!(
            http.connect(&carol).await,
            Err(ConnectionError::Unrecoverable(16))
        );

        http.connect(&carol).await.unwrap();
        assert_eq!(drive.connected_identity(), Some(carol));
    }

    #[tokio::test]
    async fn test_read_write_round_trip_over_http() {
        let drive = Arc::new(MemoryDriveService::new());
        let http = spawn_emulator(drive.clone()).await;
        let root = http.root_folder().await.unwrap();
        let file = drive.seed_file(&root, "a.txt", TEXT_MIME_TYPE, "hello over http");

        let (ctx, _fg) = foreground();
        let downloaded = Arc::new(Mutex::new(Vec::new()));
        let sink = downloaded.clone();
        let pending = crate::dispatch::PendingResult::spawn(&ctx, "open", move |progress| {
            let http = http;
            let file = file.clone();
            async move {
                let opened = http
                    .open_contents(&file, OpenMode::ReadOnly, progress)
                    .await?;
                sink.lock().push(opened.bytes.clone());
                http.commit_contents(&file, &opened.content_id, None).await?;

                let writer = http
                    .open_contents(&file, OpenMode::WriteOnly, ProgressReporter::disabled())
                    .await?;
                assert!(writer.bytes.is_empty());
                http.commit_contents(&file, &writer.content_id, Some(Bytes::from("rewritten")))
                    .await?;
                Ok::<_, Status>(file)
            }
        });
        let file = pending.wait().await.unwrap();

        assert_eq!(downloaded.lock()[0], Bytes::from("hello over http"));
        assert_eq!(drive.content_of(&file).unwrap(), Bytes::from("rewritten"));
        assert_eq!(drive.open_content_count(), 0);
    }

    #[tokio::test]
    async fn test_status_errors_round_trip() {
        let drive = Arc::new(MemoryDriveService::new());
        let http = spawn_emulator(drive.clone()).await;

        let missing = ResourceHandle::file("missing");
        let status = http.get_metadata(&missing).await.unwrap_err();
        assert_eq!(status.code, StatusCode::RESOURCE_NOT_FOUND);

        drive.fail_next(Verb::RequestSync, Status::from_code(StatusCode::RATE_LIMITED));
        assert_eq!(
            http.request_sync().await.unwrap_err().code,
            StatusCode::RATE_LIMITED
        );
        http.request_sync().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_update_and_query_over_http() {
        let drive = Arc::new(MemoryDriveService::new().with_page_size(1));
        let http = spawn_emulator(drive.clone()).await;
        let root = http.root_folder().await.unwrap();

        let changes = MetadataChangeSet::builder()
            .title("from http")
            .mime_type(TEXT_MIME_TYPE)
            .build();
        let file = http
            .create_file(&root, &changes, Bytes::from("seed"))
            .await
            .unwrap();
        assert_eq!(drive.content_of(&file).unwrap(), Bytes::from("seed"));

        let folder = http
            .create_folder(&root, &MetadataChangeSet::builder().title("dir").build())
            .await
            .unwrap();
        assert!(folder.is_folder());

        let updated = http
            .update_metadata(&file, &MetadataChangeSet::builder().starred(true).build())
            .await
            .unwrap();
        assert!(updated.starred);

        let first = http.query_children(&root, &Query::default()).await.unwrap();
        assert_eq!(first.items.len(), 1);
        let second = http
            .query_children(&root, &Query::default().with_page_token(first.next_page_token))
            .await
            .unwrap();
        assert_eq!(second.items[0].title, "dir");
        assert!(!second.has_more());
    }
}
