use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the portal's login session cookie.
pub const SESSION_COOKIE: &str = "central_production_session_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
}

fn root_path() -> String {
    "/".to_string()
}

/// Persisted login state, written as JSON after authentication and read back
/// by the catalog and download steps.
///
/// ```json
/// { "cookies": [{ "name": "...", "value": "...", "domain": "...", "path": "/" }], "origins": [] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<serde_json::Value>,
}

impl StorageState {
    /// Captures the cookies `jar` would send to `url`.
    pub fn from_jar(jar: &Jar, url: &Url) -> Self {
        let domain = url.host_str().unwrap_or_default().to_string();
        let cookies = jar
            .cookies(url)
            .and_then(|h| h.to_str().ok().map(str::to_string))
            .map(|header| parse_cookie_header(&header, &domain))
            .unwrap_or_default();

        Self {
            cookies,
            origins: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session file {}", path.display()))?;
        let state = serde_json::from_str(&content)
            .with_context(|| format!("session file {} is not valid JSON", path.display()))?;
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)
            .with_context(|| format!("failed to write session file {}", path.display()))?;
        Ok(())
    }

    /// The login session cookie, falling back to the first stored cookie.
    pub fn session_cookie(&self) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == SESSION_COOKIE)
            .or_else(|| self.cookies.first())
            .map(|c| c.value.as_str())
    }

    /// `(name, value)` pairs for replaying every stored cookie.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies
            .iter()
            .map(|c| (c.name.as_str(), c.value.as_str()))
    }
}

pub(crate) fn parse_cookie_header(header: &str, domain: &str) -> Vec<StoredCookie> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some(StoredCookie {
                name: name.to_string(),
                value: value.to_string(),
                domain: domain.to_string(),
                path: root_path(),
            })
        })
        .collect()
}
