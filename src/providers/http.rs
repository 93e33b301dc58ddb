//! HTTP 存储服务
//!
//! 通过 REST 接口访问远端存储（接口由 [`crate::server`] 提供的模拟服务实现）：
//!
//! | 动词 | 请求 |
//! |------|------|
//! | connect | `POST /v1/connect` |
//! | disconnect | `POST /v1/disconnect` |
//! | root_folder | `GET /v1/root` |
//! | get/update_metadata | `GET`/`PATCH /v1/resources/{kind}/{id}/metadata` |
//! | open_contents | `POST /v1/resources/{kind}/{id}/contents?mode=` |
//! | commit/discard_contents | `PUT`/`DELETE /v1/resources/{kind}/{id}/contents/{content_id}` |
//! | create_file/folder | `POST /v1/folders/{id}/files`、`/v1/folders/{id}/folders` |
//! | query_children | `POST /v1/folders/{id}/children/query` |
//! | request_sync | `POST /v1/sync` |
//!
//! 非 2xx 响应体为 JSON 格式的 [`Status`]。

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode as HttpStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{DriveService, OpenedContents};
use crate::dispatch::ProgressReporter;
use crate::error::{ConnectionError, ResolutionDetails};
use crate::models::{
    ContentId, Metadata, MetadataChangeSet, OpenMode, PagedResultSet, Query, ResourceHandle,
    Status, StatusCode,
};
use crate::session::AccountIdentity;

/// 打开内容时服务端返回内容句柄 ID 的响应头
pub const CONTENT_ID_HEADER: &str = "x-content-id";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub account: String,
}

/// 不可恢复的连接拒绝
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectRejection {
    pub code: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenParams {
    pub mode: OpenMode,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CommitParams {
    /// 只释放句柄，不写入内容
    #[serde(default)]
    pub release: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub metadata: MetadataChangeSet,
    /// base64 编码的初始内容
    #[serde(default)]
    pub contents: String,
}

/// HTTP 存储服务
pub struct HttpDriveService {
    client: Client,
    base_url: String,
}

impl HttpDriveService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn resource_path(resource: &ResourceHandle) -> String {
        format!("/v1/resources/{}/{}", resource.kind, resource.id)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, Status> {
        let resp = request.send().await.map_err(network_error)?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(status_from_response(resp).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, Status> {
        let resp = self.send(request).await?;
        resp.json::<T>().await.map_err(|e| {
            Status::new(
                StatusCode::INTERNAL_ERROR,
                format!("invalid response body: {}", e),
            )
        })
    }
}

fn network_error(e: reqwest::Error) -> Status {
    Status::new(StatusCode::NETWORK_ERROR, e.to_string())
}

async fn status_from_response(resp: Response) -> Status {
    let http_status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<Status>(&body) {
        Ok(status) => status,
        Err(_) => Status::new(
            StatusCode::INTERNAL_ERROR,
            format!("HTTP {}: {}", http_status, body),
        ),
    }
}

#[async_trait]
impl DriveService for HttpDriveService {
    fn name(&self) -> &str {
        "http"
    }

    async fn connect(&self, identity: &AccountIdentity) -> Result<(), ConnectionError> {
        let resp = self
            .client
            .post(self.url("/v1/connect"))
            .json(&ConnectRequest {
                account: identity.key().to_string(),
            })
            .send()
            .await
            .map_err(|e| {
                tracing::error!("[HttpDrive] 连接 {} 失败: {}", self.base_url, e);
                ConnectionError::Unrecoverable(StatusCode::NETWORK_ERROR.0)
            })?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            HttpStatus::UNAUTHORIZED => {
                let details = resp.json::<ResolutionDetails>().await.map_err(|e| {
                    tracing::error!("[HttpDrive] 无法解析授权信息: {}", e);
                    ConnectionError::Unrecoverable(StatusCode::INTERNAL_ERROR.0)
                })?;
                Err(ConnectionError::NeedsResolution(details))
            }
            other => {
                let code = resp
                    .json::<ConnectRejection>()
                    .await
                    .map(|r| r.code)
                    .unwrap_or(other.as_u16() as i32);
                Err(ConnectionError::Unrecoverable(code))
            }
        }
    }

    async fn disconnect(&self) {
        if let Err(status) = self.send(self.client.post(self.url("/v1/disconnect"))).await {
            tracing::debug!("[HttpDrive] 断开连接失败: {}", status);
        }
    }

    async fn root_folder(&self) -> Result<ResourceHandle, Status> {
        self.send_json(self.client.get(self.url("/v1/root"))).await
    }

    async fn open_contents(
        &self,
        resource: &ResourceHandle,
        mode: OpenMode,
        progress: ProgressReporter,
    ) -> Result<OpenedContents, Status> {
        let url = self.url(&format!("{}/contents", Self::resource_path(resource)));
        let resp = self
            .send(self.client.post(url).query(&OpenParams { mode }))
            .await?;

        let content_id = resp
            .headers()
            .get(CONTENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| ContentId(v.to_string()))
            .ok_or_else(|| {
                Status::new(
                    StatusCode::INTERNAL_ERROR,
                    format!("response is missing the {} header", CONTENT_ID_HEADER),
                )
            })?;

        let total = resp.content_length();
        let mut buffer = BytesMut::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(network_error)?;
            buffer.extend_from_slice(&chunk);
            if mode == OpenMode::ReadOnly {
                progress.report(buffer.len() as u64, total);
            }
        }
        tracing::debug!(
            "[HttpDrive] 打开 {} ({}) content={} bytes={}",
            resource,
            mode,
            content_id,
            buffer.len()
        );
        Ok(OpenedContents {
            content_id,
            bytes: buffer.freeze(),
        })
    }

    async fn commit_contents(
        &self,
        resource: &ResourceHandle,
        content_id: &ContentId,
        payload: Option<Bytes>,
    ) -> Result<(), Status> {
        let url = self.url(&format!(
            "{}/contents/{}",
            Self::resource_path(resource),
            content_id
        ));
        let request = match payload {
            Some(body) => self.client.put(url).body(body),
            None => self.client.put(url).query(&CommitParams { release: true }),
        };
        self.send(request).await.map(|_| ())
    }

    async fn discard_contents(
        &self,
        resource: &ResourceHandle,
        content_id: &ContentId,
    ) -> Result<(), Status> {
        let url = self.url(&format!(
            "{}/contents/{}",
            Self::resource_path(resource),
            content_id
        ));
        self.send(self.client.delete(url)).await.map(|_| ())
    }

    async fn get_metadata(&self, resource: &ResourceHandle) -> Result<Metadata, Status> {
        let url = self.url(&format!("{}/metadata", Self::resource_path(resource)));
        self.send_json(self.client.get(url)).await
    }

    async fn update_metadata(
        &self,
        resource: &ResourceHandle,
        changes: &MetadataChangeSet,
    ) -> Result<Metadata, Status> {
        let url = self.url(&format!("{}/metadata", Self::resource_path(resource)));
        self.send_json(self.client.patch(url).json(changes)).await
    }

    async fn create_file(
        &self,
        parent: &ResourceHandle,
        changes: &MetadataChangeSet,
        contents: Bytes,
    ) -> Result<ResourceHandle, Status> {
        let url = self.url(&format!("/v1/folders/{}/files", parent.id));
        let body = CreateFileRequest {
            metadata: changes.clone(),
            contents: base64::engine::general_purpose::STANDARD.encode(&contents),
        };
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn create_folder(
        &self,
        parent: &ResourceHandle,
        changes: &MetadataChangeSet,
    ) -> Result<ResourceHandle, Status> {
        let url = self.url(&format!("/v1/folders/{}/folders", parent.id));
        self.send_json(self.client.post(url).json(changes)).await
    }

    async fn query_children(
        &self,
        parent: &ResourceHandle,
        query: &Query,
    ) -> Result<PagedResultSet<Metadata>, Status> {
        let url = self.url(&format!("/v1/folders/{}/children/query", parent.id));
        self.send_json(self.client.post(url).json(query)).await
    }

    async fn request_sync(&self) -> Result<(), Status> {
        self.send(self.client.post(self.url("/v1/sync")))
            .await
            .map(|_| ())
    }
}
