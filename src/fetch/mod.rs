//! HTTP plumbing for the study portal.
//!
//! Requests go through the [`HttpClient`] trait so callers can stack
//! decorators such as [`SessionCookie`] and tests can substitute a recorder.

mod basic;
mod client;
#[cfg(test)]
pub(crate) mod mock;
mod session;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use session::SessionCookie;

use anyhow::{Result, bail};
use reqwest::{Method, Request, StatusCode, Url};
use reqwest::header::{CONTENT_TYPE, HeaderValue};

async fn execute_ok<C: HttpClient + ?Sized>(client: &C, req: Request) -> Result<reqwest::Response> {
    let url = req.url().clone();
    let resp = client.execute(req).await?;
    if resp.status() != StatusCode::OK {
        bail!(
            "Response code for {} expected to be 200, received {}",
            url,
            resp.status().as_u16()
        );
    }
    Ok(resp)
}

/// GETs `url` and returns the body. Any status other than 200 is an error.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = Request::new(Method::GET, url.parse()?);
    let resp = execute_ok(client, req).await?;
    Ok(resp.bytes().await?.to_vec())
}

/// GETs `url` and returns the body decoded as text, plus the final URL after
/// redirects.
pub async fn fetch_text<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<(Url, String)> {
    let req = Request::new(Method::GET, url.parse()?);
    let resp = execute_ok(client, req).await?;
    let final_url = resp.url().clone();
    Ok((final_url, resp.text().await?))
}

/// POSTs `fields` as an urlencoded form and returns the final URL and body.
pub async fn post_form<C: HttpClient + ?Sized>(
    client: &C,
    url: Url,
    fields: &[(String, String)],
) -> Result<(Url, String)> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish();

    let mut req = Request::new(Method::POST, url);
    req.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    *req.body_mut() = Some(body.into());

    let resp = execute_ok(client, req).await?;
    let final_url = resp.url().clone();
    Ok((final_url, resp.text().await?))
}

#[cfg(test)]
mod tests {
    use super::mock::MockClient;
    use super::*;

    #[tokio::test]
    async fn test_fetch_bytes_returns_body() {
        let client = MockClient::with_body(200, "hello");
        let bytes = fetch_bytes(&client, "https://portal.test/a").await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(client.requests(), ["GET https://portal.test/a"]);
    }

    #[tokio::test]
    async fn test_non_200_is_an_error() {
        let client = MockClient::with_body(302, "");
        let err = fetch_bytes(&client, "https://portal.test/a").await.unwrap_err();
        assert!(err.to_string().contains("received 302"));
    }

    #[tokio::test]
    async fn test_session_cookie_is_injected() {
        let client = SessionCookie::new(
            MockClient::with_body(200, ""),
            [("central_production_session_id", "abc"), ("return_to", "x")],
        )
        .unwrap();
        fetch_bytes(&client, "https://portal.test/b").await.unwrap();

        assert_eq!(
            client.inner.cookie_headers(),
            ["central_production_session_id=abc; return_to=x"]
        );
    }

    #[tokio::test]
    async fn test_post_form_encodes_fields() {
        let client = MockClient::with_body(200, "ok");
        let fields = vec![("username".to_string(), "a b&c".to_string())];
        let (_, body) = post_form(&client, "https://portal.test/login".parse().unwrap(), &fields)
            .await
            .unwrap();

        assert_eq!(body, "ok");
        assert_eq!(client.bodies(), ["username=a+b%26c"]);
    }
}
