//! Recording [`HttpClient`] for unit tests.

use super::client::HttpClient;
use async_trait::async_trait;
use reqwest::ResponseBuilderExt;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
struct Recorded {
    requests: Vec<String>,
    cookies: Vec<String>,
    bodies: Vec<String>,
}

/// Answers requests from a queue of canned `(status, body)` pairs; the last
/// pair is repeated once the queue runs dry.
pub(crate) struct MockClient {
    responses: Mutex<VecDeque<(u16, String)>>,
    recorded: Mutex<Recorded>,
}

impl MockClient {
    pub(crate) fn new(responses: Vec<(u16, &str)>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(s, b)| (s, b.to_string()))
                    .collect(),
            ),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub(crate) fn with_body(status: u16, body: &str) -> Self {
        Self::new(vec![(status, body)])
    }

    /// `"<METHOD> <url>"` for each request, in order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.recorded.lock().unwrap().requests.clone()
    }

    pub(crate) fn cookie_headers(&self) -> Vec<String> {
        self.recorded.lock().unwrap().cookies.clone()
    }

    pub(crate) fn bodies(&self) -> Vec<String> {
        self.recorded.lock().unwrap().bodies.clone()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let url = req.url().clone();
        {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.requests.push(format!("{} {}", req.method(), req.url()));
            if let Some(cookie) = req.headers().get(reqwest::header::COOKIE) {
                recorded
                    .cookies
                    .push(cookie.to_str().unwrap_or_default().to_string());
            }
            if let Some(body) = req.body().and_then(|b| b.as_bytes()) {
                recorded
                    .bodies
                    .push(String::from_utf8_lossy(body).into_owned());
            }
        }

        let (status, body) = {
            let mut queue = self.responses.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or((404, String::new()))
            }
        };

        let resp = http::Response::builder()
            .status(status)
            .url(url)
            .body(body)
            .unwrap();
        Ok(reqwest::Response::from(resp))
    }
}
