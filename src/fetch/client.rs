use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests. Implemented by the real reqwest client and by
/// wrappers that decorate requests before passing them on.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
