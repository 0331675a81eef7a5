//! Google Drive v3 client implementing [`RemoteStore`].
//!
//! Uploads use the resumable protocol so transfer progress can be reported
//! per 8 MiB part; exports are streamed straight to disk rather than
//! buffered. The API base URLs are injectable so the integration tests can
//! point the client at a local mock server.

use crate::auth::Authenticator;
use crate::error::DriveOcrError;
use crate::remote::{ProgressFn, RemoteId, RemoteStore, FOLDER_MIME};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Resumable uploads go up in parts of this many bytes (Drive requires a
/// multiple of 256 KiB).
const UPLOAD_PART_SIZE: usize = 8 * 1024 * 1024;

enum TokenSource {
    Static(String),
    OAuth(Authenticator),
}

/// A thin Drive v3 REST client scoped to what the pipeline needs.
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
    token: TokenSource,
}

#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
}

impl DriveClient {
    /// Client backed by interactive/stored OAuth credentials.
    pub fn new(auth: Authenticator) -> Result<Self, DriveOcrError> {
        Ok(Self {
            http: build_http()?,
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
            token: TokenSource::OAuth(auth),
        })
    }

    /// Client with a fixed bearer token and custom endpoints. Used by the
    /// integration tests against a mock server.
    pub fn with_static_token(
        token: impl Into<String>,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Result<Self, DriveOcrError> {
        Ok(Self {
            http: build_http()?,
            api_base: api_base.into(),
            upload_base: upload_base.into(),
            token: TokenSource::Static(token.into()),
        })
    }

    async fn bearer(&self) -> Result<String, DriveOcrError> {
        match &self.token {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::OAuth(auth) => auth.access_token().await,
        }
    }

    /// Begin a resumable upload session and return its session URI.
    async fn open_upload_session(
        &self,
        name: &str,
        parent: &RemoteId,
        total_len: u64,
    ) -> Result<String, DriveOcrError> {
        let token = self.bearer().await?;
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent.0],
        });
        let response = self
            .http
            .post(format!("{}/files?uploadType=resumable", self.upload_base))
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "application/pdf")
            .header("X-Upload-Content-Length", total_len)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| remote_err("files.create", e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_err("files.create", response).await);
        }
        response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                remote_err("files.create", "upload session response missing Location header")
            })
    }

    /// PUT the file to the session URI in parts, reporting percent done
    /// after each part lands.
    async fn put_parts(
        &self,
        session_uri: &str,
        data: &[u8],
        progress: ProgressFn<'_>,
    ) -> Result<RemoteId, DriveOcrError> {
        let total = data.len();
        let mut offset = 0usize;
        loop {
            let end = (offset + UPLOAD_PART_SIZE).min(total);
            let part = data[offset..end].to_vec();
            let range = format!("bytes {}-{}/{}", offset, end - 1, total);
            debug!(range = %range, "uploading part");

            let response = self
                .http
                .put(session_uri)
                .header("Content-Range", range)
                .header("Content-Length", part.len())
                .body(part)
                .send()
                .await
                .map_err(|e| remote_err("files.create", e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 308 {
                // Resume Incomplete: more parts to go.
                offset = end;
                progress((offset * 100 / total) as u8);
                continue;
            }
            if !status.is_success() {
                return Err(status_err("files.create", response).await);
            }

            progress(100);
            let file: FileResource = response
                .json()
                .await
                .map_err(|e| remote_err("files.create", format!("parsing response: {}", e)))?;
            return Ok(RemoteId(file.id));
        }
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn create_folder(&self, name: &str) -> Result<RemoteId, DriveOcrError> {
        let token = self.bearer().await?;
        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
        });
        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| remote_err("files.create", e.to_string()))?;
        if !response.status().is_success() {
            return Err(status_err("files.create", response).await);
        }
        let folder: FileResource = response
            .json()
            .await
            .map_err(|e| remote_err("files.create", format!("parsing response: {}", e)))?;
        info!(folder_id = %folder.id, "created scratch folder '{}'", name);
        Ok(RemoteId(folder.id))
    }

    async fn delete_folder(&self, id: &RemoteId) -> Result<(), DriveOcrError> {
        self.delete_file(id).await
    }

    async fn upload_file(
        &self,
        path: &Path,
        parent: &RemoteId,
        progress: ProgressFn<'_>,
    ) -> Result<RemoteId, DriveOcrError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| remote_err("files.create", format!("reading {}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());

        let session = self
            .open_upload_session(&name, parent, data.len() as u64)
            .await?;
        progress(0);
        let id = self.put_parts(&session, &data, progress).await?;
        debug!(file_id = %id, "uploaded {}", path.display());
        Ok(id)
    }

    async fn copy_with_transform(
        &self,
        id: &RemoteId,
        target_mime: &str,
        parent: &RemoteId,
        ocr_language: Option<&str>,
    ) -> Result<RemoteId, DriveOcrError> {
        let token = self.bearer().await?;
        let body = serde_json::json!({
            "mimeType": target_mime,
            "parents": [parent.0],
        });
        let mut request = self
            .http
            .post(format!("{}/files/{}/copy", self.api_base, id))
            .bearer_auth(token)
            .json(&body);
        if let Some(lang) = ocr_language {
            request = request.query(&[("ocrLanguage", lang)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| remote_err("files.copy", e.to_string()))?;
        if !response.status().is_success() {
            return Err(status_err("files.copy", response).await);
        }
        let copy: FileResource = response
            .json()
            .await
            .map_err(|e| remote_err("files.copy", format!("parsing response: {}", e)))?;
        Ok(RemoteId(copy.id))
    }

    async fn export_to_file(
        &self,
        id: &RemoteId,
        export_mime: &str,
        dest: &Path,
    ) -> Result<(), DriveOcrError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(format!("{}/files/{}/export", self.api_base, id))
            .bearer_auth(token)
            .query(&[("mimeType", export_mime)])
            .send()
            .await
            .map_err(|e| remote_err("files.export", e.to_string()))?;
        if !response.status().is_success() {
            return Err(status_err("files.export", response).await);
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| remote_err("files.export", format!("creating {}: {}", dest.display(), e)))?;
        let mut stream = response.bytes_stream();
        while let Some(part) = stream.next().await {
            let bytes = part.map_err(|e| remote_err("files.export", e.to_string()))?;
            file.write_all(&bytes).await.map_err(|e| {
                remote_err("files.export", format!("writing {}: {}", dest.display(), e))
            })?;
        }
        file.flush()
            .await
            .map_err(|e| remote_err("files.export", format!("flushing {}: {}", dest.display(), e)))?;
        debug!(file_id = %id, "exported to {}", dest.display());
        Ok(())
    }

    async fn delete_file(&self, id: &RemoteId) -> Result<(), DriveOcrError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .delete(format!("{}/files/{}", self.api_base, id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| remote_err("files.delete", e.to_string()))?;
        // Already gone is fine during teardown.
        if response.status().as_u16() == 404 || response.status().is_success() {
            return Ok(());
        }
        Err(status_err("files.delete", response).await)
    }
}

fn build_http() -> Result<reqwest::Client, DriveOcrError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| remote_err("client", format!("building HTTP client: {}", e)))
}

fn remote_err(op: &'static str, detail: impl Into<String>) -> DriveOcrError {
    DriveOcrError::RemoteApi {
        op,
        detail: detail.into(),
    }
}

async fn status_err(op: &'static str, response: reqwest::Response) -> DriveOcrError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(300).collect();
    remote_err(op, format!("HTTP {}: {}", status, snippet))
}
