use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use reqwest::{Client as HttpClient, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::auth::{refresh_tokens, save_token_file, TokenSet, TOKEN_URL};
use crate::models::Item;

/// Graph-style API root; the personal drive hangs off `/me/drive`.
const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Fixed by the remote: a multiple of 320 KiB.
pub const UPLOAD_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

const CHILD_SELECT: &str = "id,name,file,folder,size,fileSystemInfo";

/// Raised when the remote answers 429. Batch operations surface it to the
/// caller; single-shot operations absorb it by sleeping and retrying.
#[derive(Debug)]
pub struct ThrottleError {
    pub retry_after: Duration,
}

impl ThrottleError {
    fn from_response(resp: &Response) -> Self {
        ThrottleError {
            retry_after: Duration::from_secs_f64(retry_after_secs(resp)),
        }
    }

    pub async fn sleep(&self) {
        tokio::time::sleep(self.retry_after).await;
    }
}

impl fmt::Display for ThrottleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "throttled, retry after {:.1}s",
            self.retry_after.as_secs_f64()
        )
    }
}

impl std::error::Error for ThrottleError {}

fn retry_after_secs(resp: &Response) -> f64 {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| *v > 0.0)
        .unwrap_or(5.0)
}

struct AuthState {
    client_id: String,
    client_secret: String,
    token_url: String,
    token_path: PathBuf,
    tokens: Mutex<TokenSet>,
}

impl AuthState {
    async fn ensure_access_token(&self, http: &HttpClient) -> Result<()> {
        let needs_refresh = { self.tokens.lock().await.needs_refresh() };
        if !needs_refresh {
            return Ok(());
        }

        let refresh_token = { self.tokens.lock().await.refresh_token.clone() };
        let Some(refresh_token) = refresh_token else {
            anyhow::bail!("no refresh token, run login first");
        };

        let fresh = refresh_tokens(
            http,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            &refresh_token,
        )
        .await?;
        // Persist before use so a crash never strands a rotated refresh token.
        save_token_file(&self.token_path, &fresh).context("save token file")?;
        *self.tokens.lock().await = fresh;
        Ok(())
    }

    async fn access_token(&self) -> String {
        self.tokens.lock().await.access_token.clone()
    }

    async fn has_refresh_token(&self) -> bool {
        self.tokens.lock().await.refresh_token.is_some()
    }

    async fn clear_access_token(&self) {
        let mut tokens = self.tokens.lock().await;
        tokens.access_token.clear();
        tokens.expires_at = 0;
    }
}

/// Authenticated session against the remote drive. One instance per service
/// cycle; reconstruction forces a token refresh.
pub struct DriveClient {
    http: HttpClient,
    graph_base: String,
    drive_base: String,
    auth: Arc<AuthState>,
}

impl DriveClient {
    pub fn new(client_id: &str, client_secret: &str, token_path: &Path) -> Result<Self> {
        Self::with_endpoints(client_id, client_secret, token_path, GRAPH_BASE, TOKEN_URL)
    }

    pub fn with_endpoints(
        client_id: &str,
        client_secret: &str,
        token_path: &Path,
        graph_base: &str,
        token_url: &str,
    ) -> Result<Self> {
        let tokens = crate::auth::load_token_file(token_path)
            .context("load token file (run login first)")?;

        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(10 * 60))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("drive-mirror/0.1")
            .no_proxy()
            .build()?;

        let graph_base = graph_base.trim_end_matches('/').to_string();
        Ok(DriveClient {
            http,
            drive_base: format!("{graph_base}/me/drive"),
            graph_base,
            auth: Arc::new(AuthState {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                token_url: token_url.to_string(),
                token_path: token_path.to_path_buf(),
                tokens: Mutex::new(tokens),
            }),
        })
    }

    /// Liveness probe issued at cycle start. A cheap authed GET that forces
    /// the token refresh and surfaces connectivity errors before any
    /// mutation.
    pub async fn get_drives(&self) -> Result<()> {
        let url = format!("{}/me/drives", self.graph_base);
        let resp = self
            .send_authed(|| self.http.get(url.clone()))
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("drives probe failed: {status} {text}");
        }
        Ok(())
    }

    /// Enumerate direct children of a remote folder, following server-side
    /// pagination until exhausted. 429 surfaces as `ThrottleError`; any other
    /// failure returns the partial list, so callers treat missing results as
    /// unknown rather than empty.
    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<Item>> {
        let mut url = format!(
            "{}/items/{}/children?select={}",
            self.drive_base, parent_id, CHILD_SELECT
        );
        let mut children = Vec::new();
        loop {
            let resp = self.send_authed(|| self.http.get(url.clone())).await?;
            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(ThrottleError::from_response(&resp).into());
            }
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                crate::logging::error(format!(
                    "could not list children of {parent_id}: {status} {text}"
                ));
                break;
            }
            let page: ChildrenPage = resp.json().await.context("parse children page")?;
            children.extend(page.value.into_iter().filter_map(|obj| obj.into_item(None)));
            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(children)
    }

    /// Resolve a drive-root-relative path to an item, or `None`.
    pub async fn get_by_path(&self, path: &str) -> Result<Option<Item>> {
        let url = format!("{}/root:/{}", self.drive_base, path.trim_matches('/'));
        let resp = self.send_authed(|| self.http.get(url.clone())).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            crate::logging::error(format!("could not get item {path}: {status} {text}"));
            return Ok(None);
        }
        let obj: DriveItemJson = resp.json().await.context("parse item")?;
        Ok(obj.into_item(None))
    }

    /// Create a folder, accepting the remote's rename-on-conflict result.
    /// `parent_id = None` addresses the drive root. Idempotent enough to
    /// retry in place on 429.
    pub async fn create_folder(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Item>> {
        let parent_segment = parent_id.unwrap_or("root");
        let url = format!("{}/items/{}/children", self.drive_base, parent_segment);
        let body = serde_json::json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "rename",
        });

        loop {
            let resp = self
                .send_authed(|| self.http.post(url.clone()).json(&body))
                .await?;
            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                let throttle = ThrottleError::from_response(&resp);
                crate::logging::info(format!("folder creation {throttle}"));
                throttle.sleep().await;
                continue;
            }
            if resp.status() != StatusCode::CREATED {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                crate::logging::error(format!(
                    "could not create folder {name}: {status} {text}"
                ));
                return Ok(None);
            }

            let obj: DriveItemJson = resp.json().await.context("parse created folder")?;
            if obj.name != name {
                crate::logging::info(format!(
                    "folder {name} renamed to {} to avoid a conflict",
                    obj.name
                ));
            }
            return Ok(Some(Item::folder(
                obj.id,
                obj.name,
                parent_id.map(String::from),
            )));
        }
    }

    /// Delete a remote item. 404 means it is already gone and counts as
    /// success; 429 sleeps and retries.
    pub async fn delete(&self, remote_id: &str) -> Result<bool> {
        let url = format!("{}/items/{}", self.drive_base, remote_id);
        loop {
            let resp = self.send_authed(|| self.http.delete(url.clone())).await?;
            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                let throttle = ThrottleError::from_response(&resp);
                crate::logging::info(format!("item deletion {throttle}"));
                throttle.sleep().await;
                continue;
            }
            if resp.status() == StatusCode::NOT_FOUND {
                crate::logging::info(format!("delete of {remote_id}: already gone"));
                return Ok(true);
            }
            if resp.status().is_success() {
                return Ok(true);
            }
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            crate::logging::error(format!(
                "could not delete item {remote_id}: {status} {text}"
            ));
            return Ok(false);
        }
    }

    /// Resumable chunked upload. `target` is an existing item id when
    /// `target_is_id`, otherwise a drive-root-relative path created with
    /// rename-on-conflict. Zero-length files are rejected with a warning
    /// (no upload session can be created for them). Returns the final
    /// remote item enriched with the source path.
    pub async fn upload(
        &self,
        source: &Path,
        target: &str,
        parent_id: Option<&str>,
        target_is_id: bool,
    ) -> Result<Option<Item>> {
        let meta = std::fs::metadata(source)
            .with_context(|| format!("stat {}", source.display()))?;
        let size = meta.len();
        if size == 0 {
            crate::logging::warn(format!("ignoring empty file {}", source.display()));
            return Ok(None);
        }

        let modified: DateTime<Utc> = meta
            .modified()
            .with_context(|| format!("mtime of {}", source.display()))?
            .into();
        let created: DateTime<Utc> = meta.created().map(Into::into).unwrap_or(modified);

        let session_url = if target_is_id {
            format!("{}/items/{}/createUploadSession", self.drive_base, target)
        } else {
            format!(
                "{}/root:/{}:/createUploadSession",
                self.drive_base,
                target.trim_matches('/')
            )
        };

        // Remote timestamps track the source file.
        let mut item_body = serde_json::json!({
            "fileSystemInfo": {
                "createdDateTime": format_remote_time(&created),
                "lastModifiedDateTime": format_remote_time(&modified),
            }
        });
        if !target_is_id {
            item_body["name"] = serde_json::json!(basename(target));
            item_body["@microsoft.graph.conflictBehavior"] = serde_json::json!("rename");
        }
        let body = serde_json::json!({ "item": item_body });

        let resp = self
            .send_authed(|| self.http.post(session_url.clone()).json(&body))
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            crate::logging::error(format!(
                "cannot create upload session for {}: {status} {text}",
                source.display()
            ));
            return Ok(None);
        }
        let session: UploadSessionResponse =
            resp.json().await.context("parse upload session")?;

        // The session URL is pre-authorized; chunks go up without the bearer.
        let mut file = std::fs::File::open(source)
            .with_context(|| format!("open {}", source.display()))?;
        let mut sent: u64 = 0;
        let mut last_body: Option<DriveItemJson> = None;
        while sent < size {
            let upper = size.min(sent + UPLOAD_CHUNK_SIZE);
            let mut buf = vec![0u8; (upper - sent) as usize];
            file.read_exact(&mut buf)
                .with_context(|| format!("read {}", source.display()))?;

            let content_range = format!("bytes {}-{}/{}", sent, upper - 1, size);
            let resp = self
                .http
                .put(&session.upload_url)
                .header(reqwest::header::CONTENT_RANGE, content_range)
                .body(buf)
                .send()
                .await
                .context("send chunk")?;

            let status = resp.status();
            if !matches!(status.as_u16(), 200 | 201 | 202) {
                let text = resp.text().await.unwrap_or_default();
                crate::logging::error(format!(
                    "cannot upload chunk at {sent} of {}: {status} {text}",
                    source.display()
                ));
                return Ok(None);
            }
            sent = upper;
            if sent == size {
                last_body = Some(resp.json().await.context("parse uploaded item")?);
            }
        }

        let Some(obj) = last_body else {
            return Ok(None);
        };
        let Some(mut item) = obj.into_item(parent_id) else {
            return Ok(None);
        };
        item.local_path = Some(source.to_path_buf());
        Ok(Some(item))
    }

    async fn send_authed<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.auth.ensure_access_token(&self.http).await?;
        let resp = self.send_once(build()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        // Retry once after forcing a refresh (if possible).
        if !self.auth.has_refresh_token().await {
            return Ok(resp);
        }
        self.auth.clear_access_token().await;
        self.auth.ensure_access_token(&self.http).await?;
        self.send_once(build()).await
    }

    async fn send_once(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req
            .bearer_auth(self.auth.access_token().await)
            .send()
            .await?;
        Ok(resp)
    }
}

/// Times sent to the remote are UTC with millisecond precision.
fn format_remote_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn basename(target: &str) -> &str {
    target.rsplit('/').next().unwrap_or(target)
}

#[derive(Debug, Deserialize)]
struct UploadSessionResponse {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItemJson>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveItemJson {
    id: String,
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    folder: Option<serde_json::Value>,
    #[serde(default)]
    file: Option<FileFacet>,
    #[serde(rename = "fileSystemInfo", default)]
    file_system_info: Option<FileSystemInfo>,
}

#[derive(Debug, Deserialize)]
struct FileFacet {
    #[serde(default)]
    hashes: Option<HashesFacet>,
}

#[derive(Debug, Deserialize)]
struct HashesFacet {
    #[serde(rename = "quickXorHash", default)]
    quick_xor_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileSystemInfo {
    #[serde(rename = "lastModifiedDateTime", default)]
    last_modified: Option<DateTime<FixedOffset>>,
}

impl DriveItemJson {
    /// Items that are neither files nor folders (e.g. packages) are skipped.
    fn into_item(self, parent_id: Option<&str>) -> Option<Item> {
        let parent_id = parent_id.filter(|p| *p != "root").map(String::from);
        if self.folder.is_some() {
            return Some(Item::folder(self.id, self.name, parent_id));
        }
        let file = self.file?;
        let mtime = self
            .file_system_info
            .and_then(|info| info.last_modified)
            .map(|t| t.with_timezone(&Utc).timestamp())
            .unwrap_or(0);
        // Zero-length files usually carry no hash.
        let content_hash = file.hashes.and_then(|h| h.quick_xor_hash);
        Some(Item::file(
            self.id,
            self.name,
            self.size.unwrap_or(0),
            mtime,
            content_hash,
            parent_id,
        ))
    }
}
