use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// OAuth2 application identifier.
    pub client_id: String,
    /// OAuth2 application secret.
    pub client_secret: String,
    /// Used only by the login flow.
    #[serde(default)]
    pub redirect_uri: String,
    /// Remote path (drive-root-relative) to local directory.
    #[serde(default)]
    pub synchronize: BTreeMap<String, PathBuf>,
    /// Days between content-hash verification passes.
    #[serde(default = "default_hash_check_days")]
    pub hash_check_days: i64,
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_hash_check_days() -> i64 {
    3
}

impl Config {
    pub fn default_config_path() -> PathBuf {
        home_dir().join(".drive-mirror").join("config.json")
    }

    pub fn resolve_config_path(flag_path: Option<&Path>) -> PathBuf {
        if let Some(p) = flag_path {
            return absolutize_path(p);
        }

        if let Ok(env_path) = std::env::var("DRIVE_MIRROR_CONFIG") {
            let env_path = env_path.trim();
            if !env_path.is_empty() {
                return absolutize_path(Path::new(env_path));
            }
        }

        let candidates = [Self::default_config_path(), PathBuf::from("config.json")];
        for p in candidates {
            if p.exists() {
                return absolutize_path(&p);
            }
        }

        absolutize_path(&Self::default_config_path())
    }

    /// Missing or unreadable configuration is fatal at startup.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut cfg: Config =
            serde_json::from_str(&data).context("parse config json")?;
        cfg.config_path = absolutize_path(path);
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            anyhow::bail!("client_id missing");
        }
        if self.client_secret.trim().is_empty() {
            anyhow::bail!("client_secret missing");
        }
        if !self.redirect_uri.trim().is_empty() {
            Url::parse(&self.redirect_uri).context("redirect_uri")?;
        }
        if self.hash_check_days < 1 {
            anyhow::bail!("hash_check_days must be at least 1");
        }
        Ok(())
    }

    /// The service refuses to run without anything to mirror.
    pub fn require_synchronize(&self) -> Result<()> {
        if self.synchronize.is_empty() {
            anyhow::bail!("synchronize map is empty");
        }
        for (remote, local) in &self.synchronize {
            if remote.trim().is_empty() || remote.contains('\\') {
                anyhow::bail!("invalid remote path {remote:?} in synchronize");
            }
            if !local.is_absolute() {
                anyhow::bail!(
                    "local path {} for {remote:?} must be absolute",
                    local.display()
                );
            }
        }
        Ok(())
    }

    pub fn require_redirect_uri(&self) -> Result<()> {
        if self.redirect_uri.trim().is_empty() {
            anyhow::bail!("redirect_uri missing");
        }
        Ok(())
    }

    fn state_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// OAuth2 tokens, rewritten atomically on refresh.
    pub fn token_path(&self) -> PathBuf {
        self.state_dir().join("token.json")
    }

    /// Single-file catalog database.
    pub fn catalog_path(&self) -> PathBuf {
        self.state_dir().join("items.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir().join("logs").join("drive-mirror.log")
    }
}

fn home_dir() -> PathBuf {
    if let Ok(h) = std::env::var("HOME") {
        if !h.trim().is_empty() {
            return PathBuf::from(h);
        }
    }
    if let Ok(h) = std::env::var("USERPROFILE") {
        if !h.trim().is_empty() {
            return PathBuf::from(h);
        }
    }
    PathBuf::from(".")
}

fn absolutize_path(p: &Path) -> PathBuf {
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(p))
            .unwrap_or_else(|_| p.to_path_buf())
    };

    // Lexical cleanup only; no symlink resolution.
    let mut out = PathBuf::new();
    for comp in abs.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
