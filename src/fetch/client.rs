use async_trait::async_trait;
use reqwest::{Request, Response};

/// Sends one prepared HTTP request.
///
/// Everything that talks to the network goes through this trait so tests
/// can hand in a scripted transport instead of a live server.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
