//! Google Drive backend
//!
//! The container is a Drive folder found by name; entries are JSON files
//! inside it, uploaded with a `multipart/related` request. Entry ids are
//! Drive file ids.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{error_from_response, http_client, StorageBackend};
use crate::auth::Session;
use crate::engine::naming;
use crate::error::{BackupError, BackupResult};
use crate::models::{ContainerId, EntryMeta, EntryMetadata, EntryRef, SnapshotId};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const BOUNDARY: &str = "-------314159265358979323846";
const FILE_FIELDS: &str = "id,name,size,createdTime,description";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    /// Drive reports sizes as decimal strings
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    description: Option<String>,
}

impl DriveFile {
    fn into_entry(self) -> EntryMeta {
        let created_at = self
            .created_time
            .or_else(|| naming::entry_timestamp(&self.name))
            .unwrap_or_else(Utc::now);
        EntryMeta {
            id: SnapshotId::new(self.id),
            size_bytes: self.size.and_then(|s| s.parse().ok()).unwrap_or(0),
            created_at,
            description: self.description,
            name: self.name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct About {
    user: DriveUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveUser {
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

/// Storage backend on top of the Google Drive v3 REST API
#[derive(Debug, Clone)]
pub struct DriveBackend {
    client: reqwest::Client,
    api_url: String,
}

impl DriveBackend {
    pub fn new(api_url: &str) -> BackupResult<Self> {
        Ok(Self {
            client: http_client()?,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str, session: &Session) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(session.token())
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> BackupResult<T> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }
}

/// URL path of a file, `None` for ids Drive could never have issued
fn file_path(entry: &SnapshotId) -> Option<String> {
    let id = entry.as_str();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| format!("/drive/v3/files/{}", id))
}

/// Quote a value for use inside a Drive search query
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Assemble a `multipart/related` upload body: JSON metadata, then the
/// base64-encoded content
fn multipart_body(metadata: &serde_json::Value, content_type: &str, content: &[u8]) -> String {
    let delimiter = format!("\r\n--{}\r\n", BOUNDARY);
    let close = format!("\r\n--{}--", BOUNDARY);

    let mut body = String::new();
    body.push_str(&delimiter);
    body.push_str("Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.push_str(&metadata.to_string());
    body.push_str(&delimiter);
    body.push_str(&format!("Content-Type: {}\r\n", content_type));
    body.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    body.push_str(&STANDARD.encode(content));
    body.push_str(&close);
    body
}

#[async_trait]
impl StorageBackend for DriveBackend {
    fn name(&self) -> &'static str {
        "drive"
    }

    async fn find_container(
        &self,
        session: &Session,
        name: &str,
    ) -> BackupResult<Option<ContainerId>> {
        let query = format!(
            "name={} and mimeType={} and trashed=false",
            quote(name),
            quote(FOLDER_MIME)
        );
        let request = self
            .request(Method::GET, "/drive/v3/files", session)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)"), ("spaces", "drive")]);
        let list: FileList = Self::send_json(request).await?;

        Ok(list
            .files
            .into_iter()
            .next()
            .map(|folder| ContainerId::new(folder.id)))
    }

    async fn create_container(&self, session: &Session, name: &str) -> BackupResult<ContainerId> {
        let request = self
            .request(Method::POST, "/drive/v3/files", session)
            .query(&[("fields", "id")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME }));
        let folder: DriveFile = Self::send_json(request).await?;
        debug!(folder = %folder.id, "created drive folder");
        Ok(ContainerId::new(folder.id))
    }

    async fn upload_entry(
        &self,
        session: &Session,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
        metadata: &EntryMetadata,
    ) -> BackupResult<EntryRef> {
        let mut file_metadata = json!({
            "name": name,
            "mimeType": metadata.content_type,
            "parents": [container.as_str()],
        });
        if let Some(description) = &metadata.description {
            file_metadata["description"] = json!(description);
        }

        let body = multipart_body(&file_metadata, metadata.content_type, &content);
        let request = self
            .request(Method::POST, "/upload/drive/v3/files", session)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary=\"{}\"", BOUNDARY),
            )
            .body(body);
        let file: DriveFile = Self::send_json(request).await?;

        let mut entry = file.into_entry();
        if entry.size_bytes == 0 {
            entry.size_bytes = content.len() as u64;
        }
        Ok(entry)
    }

    async fn list_entries(
        &self,
        session: &Session,
        container: &ContainerId,
        prefix: &str,
    ) -> BackupResult<Vec<EntryMeta>> {
        let query = format!(
            "{} in parents and name contains {} and trashed=false",
            quote(container.as_str()),
            quote(prefix)
        );
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .request(Method::GET, "/drive/v3/files", session)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", fields.as_str()),
                    ("orderBy", "createdTime desc"),
                    ("pageSize", PAGE_SIZE),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let list: FileList = Self::send_json(request).await?;
            entries.extend(
                list.files
                    .into_iter()
                    .filter(|f| naming::is_backup_entry(prefix, &f.name))
                    .map(DriveFile::into_entry),
            );

            match list.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(entries)
    }

    async fn fetch_entry_content(
        &self,
        session: &Session,
        entry: &SnapshotId,
    ) -> BackupResult<Vec<u8>> {
        let path = file_path(entry).ok_or_else(|| BackupError::snapshot_not_found(entry.as_str()))?;
        let response = self
            .request(Method::GET, &path, session)
            .query(&[("alt", "media")])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BackupError::snapshot_not_found(entry.as_str())),
            s if s.is_success() => Ok(response.bytes().await?.to_vec()),
            _ => Err(error_from_response(response).await),
        }
    }

    async fn delete_entry(&self, session: &Session, entry: &SnapshotId) -> BackupResult<()> {
        let Some(path) = file_path(entry) else {
            return Ok(());
        };
        let response = self
            .request(Method::DELETE, &path, session)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            _ => Err(error_from_response(response).await),
        }
    }

    async fn account_name(&self, session: &Session) -> BackupResult<Option<String>> {
        let request = self
            .request(Method::GET, "/drive/v3/about", session)
            .query(&[("fields", "user")]);
        let about: About = Self::send_json(request).await?;
        Ok(about.user.email_address.or(about.user.display_name))
    }
}
