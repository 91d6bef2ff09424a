use super::client::HttpClient;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        Self(reqwest::Client::new())
    }

    /// Client with an overall request timeout, as used for page loads.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self(client))
    }

    /// Client that stores cookies set by responses in `jar` and replays them.
    pub fn with_cookie_jar(jar: Arc<Jar>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_provider(jar)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self(client))
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
