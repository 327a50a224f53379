use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// OAuth2 token endpoint, also used for refresh.
pub const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
/// Authorization-code endpoint used by the login flow.
pub const LOGIN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
/// Scopes the mirror needs on the drive.
pub const SCOPES: &[&str] = &[
    "User.Read",
    "offline_access",
    "Files.Read",
    "Files.Read.All",
    "Files.ReadWrite",
    "Files.ReadWrite.All",
];

/// Durable OAuth2 state. The token file is the only persistent piece of the
/// session and is rewritten atomically whenever it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Epoch seconds.
    #[serde(default)]
    pub expires_at: i64,
}

impl TokenSet {
    /// Refresh slightly ahead of the deadline so in-flight requests don't
    /// race the expiry.
    pub fn needs_refresh(&self) -> bool {
        self.access_token.trim().is_empty()
            || self.expires_at <= chrono::Utc::now().timestamp() + 60
    }
}

pub fn load_token_file(path: &Path) -> Result<TokenSet> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read token file {}", path.display()))?;
    serde_json::from_str(&data).context("parse token file")
}

/// Write-temp-then-rename so a crash mid-write never leaves a torn file.
pub fn save_token_file(path: &Path, tokens: &TokenSet) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(tokens).context("encode token file")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

pub fn authorize_url(client_id: &str, redirect_uri: &str) -> Result<String> {
    let mut url = Url::parse(LOGIN_URL).context("parse login url")?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &SCOPES.join(" "));
    Ok(url.to_string())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
}

impl TokenResponse {
    fn into_token_set(self, previous_refresh: Option<&str>) -> TokenSet {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh.map(|s| s.to_string()));
        TokenSet {
            access_token: self.access_token,
            refresh_token,
            expires_at: chrono::Utc::now().timestamp() + self.expires_in,
        }
    }
}

pub async fn exchange_code(
    http: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
    code: &str,
) -> Result<TokenSet> {
    let params = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("scope", &SCOPES.join(" ")),
    ];
    let resp = http
        .post(TOKEN_URL)
        .form(&params)
        .send()
        .await
        .context("http post")?;
    let status = resp.status();
    let bytes = resp.bytes().await.context("read body")?;
    if !status.is_success() {
        anyhow::bail!(
            "code exchange failed: http {status} {}",
            String::from_utf8_lossy(&bytes)
        );
    }
    let parsed: TokenResponse =
        serde_json::from_slice(&bytes).context("parse token response")?;
    Ok(parsed.into_token_set(None))
}

pub async fn refresh_tokens(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenSet> {
    let params = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("scope", &SCOPES.join(" ")),
    ];
    let resp = http
        .post(token_url)
        .form(&params)
        .send()
        .await
        .context("http post")?;
    let status = resp.status();
    let bytes = resp.bytes().await.context("read body")?;
    if !status.is_success() {
        anyhow::bail!(
            "token refresh failed: http {status} {}",
            String::from_utf8_lossy(&bytes)
        );
    }
    let parsed: TokenResponse =
        serde_json::from_slice(&bytes).context("parse token response")?;
    Ok(parsed.into_token_set(Some(refresh_token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_temp_dir(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("drive-mirror-auth-test-{tag}"));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn token_file_round_trip() {
        let tmp = make_temp_dir("roundtrip");
        let path = tmp.join("token.json");
        let tokens = TokenSet {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expires_at: 9_999_999_999,
        };
        save_token_file(&path, &tokens).unwrap();
        let loaded = load_token_file(&path).unwrap();
        assert_eq!(loaded.access_token, "at");
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt"));
        assert!(!loaded.needs_refresh());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn expired_and_blank_tokens_need_refresh() {
        let expired = TokenSet {
            access_token: "at".into(),
            refresh_token: None,
            expires_at: 1,
        };
        assert!(expired.needs_refresh());

        let blank = TokenSet {
            access_token: String::new(),
            refresh_token: Some("rt".into()),
            expires_at: 9_999_999_999,
        };
        assert!(blank.needs_refresh());
    }

    #[test]
    fn save_replaces_existing_file() {
        let tmp = make_temp_dir("replace");
        let path = tmp.join("token.json");
        std::fs::write(&path, "{not json").unwrap();
        let tokens = TokenSet {
            access_token: "fresh".into(),
            refresh_token: None,
            expires_at: 10,
        };
        save_token_file(&path, &tokens).unwrap();
        assert_eq!(load_token_file(&path).unwrap().access_token, "fresh");
    }

    #[test]
    fn authorize_url_carries_client_and_scopes() {
        let url = authorize_url("app-id", "http://localhost:8912/auth").unwrap();
        assert!(url.starts_with(LOGIN_URL));
        assert!(url.contains("client_id=app-id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("offline_access"));
    }
}
