//! Portal login and session persistence.

use crate::fetch::{BasicClient, HttpClient, fetch_text, post_form};
use crate::portal::session::StorageState;
use anyhow::{Context, Result, anyhow, bail};
use reqwest::Url;
use reqwest::cookie::Jar;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Page-load timeout for the login flow.
pub const AUTH_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

pub const USERNAME_FIELD: &str = "username";
pub const PASSWORD_FIELD: &str = "password";

#[derive(Clone)]
pub struct AuthConfig {
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub session_file: PathBuf,
    pub navigation_timeout: Duration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("session_file", &self.session_file)
            .finish_non_exhaustive()
    }
}

/// A login form found on a page: where it submits and the hidden inputs it
/// carries alongside the credential field.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginForm {
    pub action: Url,
    pub hidden: Vec<(String, String)>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e}"))
}

impl LoginForm {
    /// Finds the first form on `html` that has an input named `field`.
    /// Relative actions are resolved against `page_url`.
    pub fn find(html: &str, page_url: &Url, field: &str) -> Result<Self> {
        let document = Html::parse_document(html);
        let forms = selector("form")?;
        let field_input = selector(&format!("input[name=\"{field}\"]"))?;
        let hidden_inputs = selector("input[type=\"hidden\"][name]")?;

        for form in document.select(&forms) {
            if form.select(&field_input).next().is_none() {
                continue;
            }

            let action = match form.value().attr("action").filter(|a| !a.is_empty()) {
                Some(action) => page_url
                    .join(action)
                    .with_context(|| format!("bad form action {action:?}"))?,
                None => page_url.clone(),
            };

            let hidden = form
                .select(&hidden_inputs)
                .filter_map(|input| {
                    let el = input.value();
                    Some((el.attr("name")?.to_string(), el.attr("value").unwrap_or_default().to_string()))
                })
                .collect();

            return Ok(Self { action, hidden });
        }

        bail!("no form with an input named '{field}' at {page_url}")
    }

    /// Hidden inputs plus `field = value`, ready to submit.
    pub fn fields_with(&self, field: &str, value: &str) -> Vec<(String, String)> {
        let mut fields = self.hidden.clone();
        fields.push((field.to_string(), value.to_string()));
        fields
    }
}

/// Logs into the portal and stores the resulting session in
/// [`AuthConfig::session_file`].
pub struct AuthProvider {
    config: AuthConfig,
}

impl AuthProvider {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn session_file(&self) -> &Path {
        &self.config.session_file
    }

    /// Runs the two-step username/password login and submits each form.
    #[tracing::instrument(skip_all, fields(base_url = %self.config.base_url))]
    pub async fn login<C: HttpClient>(&self, client: &C) -> Result<()> {
        info!("Started navigation to auth link");
        let (page_url, html) = fetch_text(client, self.config.base_url.as_str()).await?;

        info!("Started completion of username");
        let form = LoginForm::find(&html, &page_url, USERNAME_FIELD)?;
        let fields = form.fields_with(USERNAME_FIELD, &self.config.username);
        let (page_url, html) = post_form(client, form.action, &fields).await?;

        info!("Started completion of password");
        let form = LoginForm::find(&html, &page_url, PASSWORD_FIELD)?;
        let fields = form.fields_with(PASSWORD_FIELD, &self.config.password);
        let (landing, _) = post_form(client, form.action, &fields).await?;

        info!(landing = %landing, "Login submitted");
        Ok(())
    }

    /// Authenticates and writes the session file, returning its path.
    pub async fn create_authentication_session(&self) -> Result<PathBuf> {
        let jar = Arc::new(Jar::default());
        let client = BasicClient::with_cookie_jar(jar.clone(), self.config.navigation_timeout)?;

        self.login(&client).await?;

        let state = StorageState::from_jar(&jar, &self.config.base_url);
        if state.session_cookie().is_none() {
            bail!("login finished without any session cookie; check the credentials");
        }
        state.save(&self.config.session_file)?;

        info!(
            path = %self.config.session_file.display(),
            cookies = state.cookies.len(),
            "Saved auth details"
        );
        Ok(self.config.session_file.clone())
    }
}
