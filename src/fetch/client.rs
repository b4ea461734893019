use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes a single HTTP request. Production code uses
/// [`BasicClient`](super::BasicClient); tests substitute canned responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
