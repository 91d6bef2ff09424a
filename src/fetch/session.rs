use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderValue};

/// An [`HttpClient`] wrapper that sends a fixed `cookie` header with every
/// request, replaying a session captured at login.
pub struct SessionCookie<C> {
    pub inner: C,
    header: HeaderValue,
}

impl<C> SessionCookie<C> {
    /// Builds the wrapper from `name=value` pairs.
    ///
    /// # Errors
    ///
    /// Fails when the joined cookie string is not a valid header value.
    pub fn new<'a>(
        inner: C,
        cookies: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> anyhow::Result<Self> {
        let joined = cookies
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        Ok(Self {
            inner,
            header: HeaderValue::from_str(&joined)?,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for SessionCookie<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut().insert(COOKIE, self.header.clone());
        self.inner.execute(req).await
    }
}
