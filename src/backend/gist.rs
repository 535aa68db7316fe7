//! GitHub Gist backend
//!
//! One private gist per install acts as the container; its description is
//! the container name. Each backup is a file inside that gist. Entry ids
//! have the form `<gist id>/<file name>`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{error_from_response, http_client, StorageBackend};
use crate::auth::Session;
use crate::engine::naming;
use crate::error::{BackupError, BackupResult};
use crate::models::{BackupDocument, ContainerId, EntryMeta, EntryMetadata, EntryRef, SnapshotId};

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const PAGE_SIZE: usize = 100;
const README_NAME: &str = "README.md";

#[derive(Debug, Deserialize)]
struct Gist {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    files: BTreeMap<String, Option<GistFile>>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

/// Storage backend on top of the GitHub Gist REST API
#[derive(Debug, Clone)]
pub struct GistBackend {
    client: reqwest::Client,
    api_url: String,
}

impl GistBackend {
    pub fn new(api_url: &str) -> BackupResult<Self> {
        Ok(Self {
            client: http_client()?,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str, session: &Session) -> RequestBuilder {
        self.request_as(method, path, Some(session))
    }

    /// Request that only carries a token when one is given
    fn request_as(&self, method: Method, path: &str, session: Option<&Session>) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{}", self.api_url, path))
            .header(ACCEPT, GITHUB_ACCEPT);
        match session.filter(|s| !s.is_anonymous()) {
            Some(session) => request.header(AUTHORIZATION, format!("token {}", session.token())),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> BackupResult<T> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// Fetch a gist, `None` when it does not exist
    async fn get_gist(&self, session: &Session, gist_id: &str) -> BackupResult<Option<Gist>> {
        let response = self
            .request(Method::GET, &format!("/gists/{}", gist_id), session)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn require_gist(&self, session: &Session, container: &ContainerId) -> BackupResult<Gist> {
        self.get_gist(session, container.as_str())
            .await?
            .ok_or_else(|| BackupError::container_not_found(container.as_str()))
    }

    async fn fetch_raw(&self, session: Option<&Session>, raw_url: &str) -> BackupResult<Vec<u8>> {
        let mut request = self.client.get(raw_url);
        if let Some(session) = session.filter(|s| !s.is_anonymous()) {
            request = request.header(AUTHORIZATION, format!("token {}", session.token()));
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Full content of a gist file, following `raw_url` when the API
    /// response was truncated
    async fn file_content(
        &self,
        session: Option<&Session>,
        file_name: &str,
        file: GistFile,
    ) -> BackupResult<Vec<u8>> {
        match (file.content, file.truncated, file.raw_url) {
            (Some(content), false, _) => Ok(content.into_bytes()),
            (_, _, Some(raw_url)) => self.fetch_raw(session, &raw_url).await,
            _ => Err(BackupError::backend(format!(
                "gist file {} has no content",
                file_name
            ))),
        }
    }

    /// Read a backup from a gist someone shared by link or id
    ///
    /// The gist does not have to belong to the signed-in account, and no
    /// session is needed for public or secret gists. When the gist holds
    /// several JSON files, the one with the newest name stamp is used.
    pub async fn fetch_shared(
        &self,
        session: Option<&Session>,
        reference: &str,
    ) -> BackupResult<SharedBackup> {
        let gist_id = parse_gist_reference(reference)?;
        let response = self
            .request_as(Method::GET, &format!("/gists/{}", gist_id), session)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackupError::NotFound {
                entity_type: "Gist",
                identifier: gist_id,
            });
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let gist: Gist = response.json().await?;

        let (file_name, file) = gist
            .files
            .into_iter()
            .filter_map(|(name, file)| Some((name, file?)))
            .filter(|(name, _)| name.ends_with(naming::ENTRY_EXTENSION))
            .max_by_key(|(name, _)| naming::entry_timestamp(name))
            .ok_or_else(|| {
                BackupError::InvalidBackupFormat(format!("gist {} has no JSON file", gist_id))
            })?;

        let content = self.file_content(session, &file_name, file).await?;
        debug!(gist = %gist_id, file = %file_name, bytes = content.len(), "fetched shared gist");
        Ok(SharedBackup {
            gist_id,
            file_name,
            content,
        })
    }
}

/// A backup file read from a shared gist
#[derive(Debug, Clone)]
pub struct SharedBackup {
    pub gist_id: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

fn is_gist_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Gist id from a gist URL or a bare id
///
/// Understands `gist.github.com/<user>/<id>`, `gist.github.com/<id>`,
/// raw links on `gist.githubusercontent.com` and `api.github.com/gists/<id>`.
pub fn parse_gist_reference(reference: &str) -> BackupResult<String> {
    let reference = reference.trim();
    let invalid = || BackupError::Config(format!("not a gist URL or id: {}", reference));

    let without_scheme = reference
        .split_once("://")
        .map_or(reference, |(_, rest)| rest);
    let without_query = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let candidate = match without_query.split_once('/') {
        None => without_query,
        Some((host, path)) => {
            if !is_github_host(host) {
                return Err(invalid());
            }
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            match segments.as_slice() {
                [id] | [_, id, ..] => *id,
                [] => return Err(invalid()),
            }
        }
    };

    if is_gist_id(candidate) {
        Ok(candidate.to_string())
    } else {
        Err(invalid())
    }
}

fn is_github_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    ["github.com", "githubusercontent.com"]
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
}

fn split_entry_id(entry: &SnapshotId) -> BackupResult<(&str, &str)> {
    entry
        .as_str()
        .split_once('/')
        .filter(|(gist, file)| is_gist_id(gist) && !file.is_empty())
        .ok_or_else(|| BackupError::snapshot_not_found(entry.as_str()))
}

/// Creation time of a gist file
///
/// Gist files carry no timestamps of their own. The name gives the second
/// and the `created` stamp inside the payload, when readable, the rest.
fn file_created_at(name: &str, content: Option<&str>) -> Option<DateTime<Utc>> {
    let stamp = naming::entry_timestamp(name)?;
    Some(
        content
            .and_then(|c| BackupDocument::embedded_created(c.as_bytes()))
            .map_or(stamp, |precise| naming::refine_stamp(stamp, precise)),
    )
}

/// Pick a file name not used in the gist yet
fn unused_name(files: &BTreeMap<String, Option<GistFile>>, name: &str) -> String {
    if !files.contains_key(name) {
        return name.to_string();
    }
    let stem = naming::display_name(name);
    (2..)
        .map(|n| format!("{}_{}{}", stem, n, naming::ENTRY_EXTENSION))
        .find(|candidate| !files.contains_key(candidate))
        .unwrap_or_else(|| name.to_string())
}

#[async_trait]
impl StorageBackend for GistBackend {
    fn name(&self) -> &'static str {
        "gist"
    }

    async fn find_container(
        &self,
        session: &Session,
        name: &str,
    ) -> BackupResult<Option<ContainerId>> {
        let mut page = 1;
        loop {
            let request = self.request(Method::GET, "/gists", session).query(&[
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ]);
            let gists: Vec<Gist> = Self::send_json(request).await?;

            if let Some(gist) = gists
                .iter()
                .find(|g| g.description.as_deref() == Some(name))
            {
                return Ok(Some(ContainerId::new(gist.id.clone())));
            }
            if gists.len() < PAGE_SIZE {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn create_container(&self, session: &Session, name: &str) -> BackupResult<ContainerId> {
        // A gist cannot be empty, so it starts with a short readme
        let body = json!({
            "description": name,
            "public": false,
            "files": {
                README_NAME: {
                    "content": format!("# {}\n\nBackups created by cloudstash.\n", name)
                }
            }
        });
        let gist: Gist = Self::send_json(self.request(Method::POST, "/gists", session).json(&body)).await?;
        debug!(gist = %gist.id, "created gist");
        Ok(ContainerId::new(gist.id))
    }

    async fn upload_entry(
        &self,
        session: &Session,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
        _metadata: &EntryMetadata,
    ) -> BackupResult<EntryRef> {
        let size = content.len() as u64;
        let content = String::from_utf8(content)
            .map_err(|_| BackupError::InvalidBackupFormat("entry content is not UTF-8".into()))?;

        let existing = self.require_gist(session, container).await?;
        let file_name = unused_name(&existing.files, name);

        let mut files = serde_json::Map::new();
        files.insert(file_name.clone(), json!({ "content": &content }));
        let request = self
            .request(Method::PATCH, &format!("/gists/{}", container), session)
            .json(&json!({ "files": files }));
        let updated: Gist = Self::send_json(request).await?;

        let size_bytes = updated
            .files
            .get(&file_name)
            .and_then(Option::as_ref)
            .map_or(size, |f| f.size);
        let created_at = file_created_at(&file_name, Some(content.as_str())).unwrap_or_else(Utc::now);

        Ok(EntryMeta {
            id: SnapshotId::new(format!("{}/{}", container, file_name)),
            name: file_name,
            created_at,
            size_bytes,
            description: None,
        })
    }

    async fn list_entries(
        &self,
        session: &Session,
        container: &ContainerId,
        prefix: &str,
    ) -> BackupResult<Vec<EntryMeta>> {
        let gist = self.require_gist(session, container).await?;
        let fallback = gist.created_at.unwrap_or_else(Utc::now);

        Ok(gist
            .files
            .into_iter()
            .filter(|(name, _)| naming::is_backup_entry(prefix, name))
            .filter_map(|(name, file)| {
                let file = file?;
                let content = file.content.as_deref().filter(|_| !file.truncated);
                Some(EntryMeta {
                    id: SnapshotId::new(format!("{}/{}", gist.id, name)),
                    created_at: file_created_at(&name, content).unwrap_or(fallback),
                    size_bytes: file.size,
                    description: None,
                    name,
                })
            })
            .collect())
    }

    async fn fetch_entry_content(
        &self,
        session: &Session,
        entry: &SnapshotId,
    ) -> BackupResult<Vec<u8>> {
        let (gist_id, file_name) = split_entry_id(entry)?;
        let mut gist = self
            .get_gist(session, gist_id)
            .await?
            .ok_or_else(|| BackupError::snapshot_not_found(entry.as_str()))?;

        let file = gist
            .files
            .remove(file_name)
            .flatten()
            .ok_or_else(|| BackupError::snapshot_not_found(entry.as_str()))?;

        self.file_content(Some(session), file_name, file).await
    }

    async fn delete_entry(&self, session: &Session, entry: &SnapshotId) -> BackupResult<()> {
        let Ok((gist_id, file_name)) = split_entry_id(entry) else {
            return Ok(());
        };
        let Some(gist) = self.get_gist(session, gist_id).await? else {
            return Ok(());
        };
        if !gist.files.contains_key(file_name) {
            return Ok(());
        }

        let mut files = serde_json::Map::new();
        files.insert(file_name.to_string(), serde_json::Value::Null);
        let response = self
            .request(Method::PATCH, &format!("/gists/{}", gist_id), session)
            .json(&json!({ "files": files }))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            _ => Err(error_from_response(response).await),
        }
    }

    async fn account_name(&self, session: &Session) -> BackupResult<Option<String>> {
        let user: GitHubUser = Self::send_json(self.request(Method::GET, "/user", session)).await?;
        Ok(Some(user.login))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentials;
    use crate::engine::clock::ManualClock;
    use crate::engine::{BackupSyncEngine, EngineOptions};
    use crate::models::{Dataset, RetentionPolicy};
    use chrono::{Duration, TimeZone};
    use mockito::{Matcher, Server};
    use std::sync::Arc;

    fn session() -> Session {
        Session::new("ghp_test")
    }

    #[tokio::test]
    async fn test_find_container_by_description() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/gists")
            .match_query(Matcher::Any)
            .match_header("authorization", "token ghp_test")
            .match_header("accept", GITHUB_ACCEPT)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"id": "aaa", "description": "Something else", "files": {}},
                    {"id": "bbb", "description": "Shop Backups", "files": {}}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let found = backend.find_container(&session(), "Shop Backups").await.unwrap();
        assert_eq!(found, Some(ContainerId::new("bbb")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_container_is_private() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/gists")
            .match_body(Matcher::PartialJson(json!({
                "description": "Shop Backups",
                "public": false
            })))
            .with_status(201)
            .with_body(json!({"id": "new-gist", "files": {}}).to_string())
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let id = backend.create_container(&session(), "Shop Backups").await.unwrap();
        assert_eq!(id.as_str(), "new-gist");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_and_list() {
        let mut server = Server::new_async().await;
        let name = "shop_backup_2025-02-01T10-00-00Z.json";
        server
            .mock("GET", "/gists/g1")
            .with_status(200)
            .with_body(json!({"id": "g1", "files": {"README.md": {"size": 10}}}).to_string())
            .expect(1)
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/gists/g1")
            .match_body(Matcher::PartialJson(json!({
                "files": {name: {"content": "{\"products\":[]}"}}
            })))
            .with_status(200)
            .with_body(
                json!({"id": "g1", "files": {
                    "README.md": {"size": 10},
                    name: {"size": 15}
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let entry = backend
            .upload_entry(
                &session(),
                &ContainerId::new("g1"),
                name,
                br#"{"products":[]}"#.to_vec(),
                &EntryMetadata::json(None),
            )
            .await
            .unwrap();

        assert_eq!(entry.id.as_str(), format!("g1/{}", name));
        assert_eq!(entry.size_bytes, 15);
        assert_eq!(entry.created_at.to_rfc3339(), "2025-02-01T10:00:00+00:00");
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_skips_foreign_files() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/gists/g1")
            .with_status(200)
            .with_body(
                json!({"id": "g1", "created_at": "2025-01-01T00:00:00Z", "files": {
                    "README.md": {"size": 10},
                    "shop_backup_2025-02-01T10-00-00Z.json": {"size": 120},
                    "shop_backup_2025-02-02T10-00-00Z_auto.json": {"size": 130}
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let entries = backend
            .list_entries(&session(), &ContainerId::new("g1"), "shop_backup")
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.id.as_str().starts_with("g1/shop_backup_")));
        assert_eq!(entries[1].size_bytes, 130);
    }

    #[tokio::test]
    async fn test_fetch_uses_raw_url_when_truncated() {
        let mut server = Server::new_async().await;
        let raw_url = format!("{}/raw/g1/big.json", server.url());
        server
            .mock("GET", "/gists/g1")
            .with_status(200)
            .with_body(
                json!({"id": "g1", "files": {
                    "big.json": {"size": 2000000, "content": "{\"prod", "truncated": true, "raw_url": raw_url}
                }})
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/raw/g1/big.json")
            .with_status(200)
            .with_body(r#"{"products":[1,2,3]}"#)
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let bytes = backend
            .fetch_entry_content(&session(), &SnapshotId::new("g1/big.json"))
            .await
            .unwrap();
        assert_eq!(bytes, br#"{"products":[1,2,3]}"#);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/gists/gone")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let err = backend
            .fetch_entry_content(&session(), &SnapshotId::new("gone/x.json"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_file_skips_patch() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/gists/g1")
            .with_status(200)
            .with_body(json!({"id": "g1", "files": {"README.md": {"size": 1}}}).to_string())
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/gists/g1")
            .expect(0)
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        backend
            .delete_entry(&session(), &SnapshotId::new("g1/shop_backup_x.json"))
            .await
            .unwrap();
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_sends_null_file() {
        let mut server = Server::new_async().await;
        let name = "shop_backup_2025-02-01T10-00-00Z.json";
        server
            .mock("GET", "/gists/g1")
            .with_status(200)
            .with_body(json!({"id": "g1", "files": {name: {"size": 1}}}).to_string())
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/gists/g1")
            .match_body(Matcher::Json(json!({"files": {name: null}})))
            .with_status(200)
            .with_body(json!({"id": "g1", "files": {}}).to_string())
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        backend
            .delete_entry(&session(), &SnapshotId::new(format!("g1/{}", name)))
            .await
            .unwrap();
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_required() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let err = backend.account_name(&session()).await.unwrap_err();
        assert!(err.is_auth_required());
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/gists/g1")
            .with_status(502)
            .with_body("upstream down")
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let err = backend
            .list_entries(&session(), &ContainerId::new("g1"), "shop_backup")
            .await
            .unwrap_err();
        match err {
            BackupError::BackendUnavailable { status, message } => {
                assert_eq!(status, Some(502));
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn document(created: DateTime<Utc>, tag: &str) -> String {
        let dataset = Dataset {
            products: vec![json!({ "v": tag })],
            ..Dataset::default()
        };
        String::from_utf8(BackupDocument::from_dataset(&dataset, created).to_bytes().unwrap())
            .unwrap()
    }

    async fn mock_container(server: &mut Server) {
        server
            .mock("GET", "/gists")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!([{"id": "g1", "description": "Shop Backups", "files": {}}]).to_string())
            .create_async()
            .await;
    }

    fn engine_keeping_one(server: &Server) -> BackupSyncEngine {
        let options = EngineOptions {
            retention: RetentionPolicy::keep_last(1),
            ..EngineOptions::default()
        };
        BackupSyncEngine::new(
            Arc::new(GistBackend::new(&server.url()).unwrap()),
            Arc::new(StaticCredentials::new("ghp_test")),
            options,
        )
        .with_clock(Arc::new(ManualClock::new(stamp())))
    }

    #[tokio::test]
    async fn test_new_backup_survives_retention_in_the_same_second() {
        let mut server = Server::new_async().await;
        let labelled = "shop_backup_2025-03-10T09-00-00Z_manual.json";
        let plain = "shop_backup_2025-03-10T09-00-00Z.json";

        mock_container(&mut server).await;
        server
            .mock("GET", "/gists/g1")
            .with_status(200)
            .with_body(
                json!({"id": "g1", "files": {
                    "README.md": {"size": 10, "content": "# Shop"},
                    labelled: {"size": 50, "content": document(stamp(), "old")}
                }})
                .to_string(),
            )
            .create_async()
            .await;
        let upload = server
            .mock("PATCH", "/gists/g1")
            .match_body(Matcher::Regex(format!(r#""{}":\{{"content""#, plain)))
            .with_status(200)
            .with_body(json!({"id": "g1", "files": {plain: {"size": 60}}}).to_string())
            .expect(1)
            .create_async()
            .await;
        let prune = server
            .mock("PATCH", "/gists/g1")
            .match_body(Matcher::Json(json!({"files": {labelled: null}})))
            .with_status(200)
            .with_body(json!({"id": "g1", "files": {}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let engine = engine_keeping_one(&server);
        let created = engine
            .create_backup(&Dataset::default(), None)
            .await
            .unwrap();

        assert_eq!(created.name, plain);
        upload.assert_async().await;
        prune.assert_async().await;
    }

    #[tokio::test]
    async fn test_payload_stamp_orders_files_from_the_same_second() {
        let mut server = Server::new_async().await;
        let labelled = "shop_backup_2025-03-10T09-00-00Z_manual.json";
        let plain = "shop_backup_2025-03-10T09-00-00Z.json";

        mock_container(&mut server).await;
        server
            .mock("GET", "/gists/g1")
            .with_status(200)
            .with_body(
                json!({"id": "g1", "files": {
                    plain: {"size": 50, "content": document(stamp() + Duration::milliseconds(200), "old")},
                    labelled: {"size": 50, "content": document(stamp() + Duration::milliseconds(800), "new")}
                }})
                .to_string(),
            )
            .create_async()
            .await;
        let prune = server
            .mock("PATCH", "/gists/g1")
            .match_body(Matcher::Json(json!({"files": {plain: null}})))
            .with_status(200)
            .with_body(json!({"id": "g1", "files": {}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let engine = engine_keeping_one(&server);
        let deleted = engine
            .prune_by_retention(&RetentionPolicy::keep_last(1))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        prune.assert_async().await;
    }

    #[test]
    fn test_parse_gist_reference() {
        let id = "0123456789abcdef0123";
        for reference in [
            id.to_string(),
            format!("https://gist.github.com/maria/{}", id),
            format!("https://gist.github.com/maria/{}#file-backup-json", id),
            format!("gist.github.com/{}", id),
            format!("https://gist.githubusercontent.com/maria/{}/raw/abc/backup.json", id),
            format!("https://api.github.com/gists/{}", id),
        ] {
            assert_eq!(parse_gist_reference(&reference).unwrap(), id, "{}", reference);
        }

        for bad in [
            "",
            "https://example.com/maria/abc",
            "https://evilgithub.com/maria/abc",
            "abc/../x",
            "https://gist.github.com/",
        ] {
            assert!(parse_gist_reference(bad).is_err(), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_fetch_shared_legacy_gist_without_token() {
        let mut server = Server::new_async().await;
        let legacy = json!({
            "version": "2.0",
            "created": "2025-03-01T10:00:00Z",
            "description": "Backup Camarim",
            "data": {"products": [{"id": 2}], "sales": [], "settings": {}}
        })
        .to_string();
        let mock = server
            .mock("GET", "/gists/0123456789abcdef0123")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(
                json!({"id": "0123456789abcdef0123", "files": {
                    "README.md": {"size": 5, "content": "hello"},
                    "camarim-backup.json": {"size": 120, "content": legacy}
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let shared = backend
            .fetch_shared(None, "https://gist.github.com/maria/0123456789abcdef0123")
            .await
            .unwrap();

        assert_eq!(shared.file_name, "camarim-backup.json");
        let doc = BackupDocument::parse(&shared.content).unwrap();
        assert_eq!(doc.products, vec![json!({"id": 2})]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_shared_missing_gist() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/gists/abc123")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        let backend = GistBackend::new(&server.url()).unwrap();
        let err = backend.fetch_shared(None, "abc123").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
