use std::time::Duration;

use anyhow::anyhow;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use task_local_extensions::Extensions;

/// Bounds the whole exchange, body included for non-streamed responses.
/// [`reqwest::ClientBuilder::timeout`] doesn't cover every stall, see
/// [`reqwest#issue:1279`].
///
/// Attach it **last**.
///
/// [`reqwest#issue:1279`]: https://github.com/seanmonstar/reqwest/issues/1279
pub struct TimeoutMiddleware {
    waiting: Duration,
}

impl TimeoutMiddleware {
    #[inline]
    pub fn new(waiting: Duration) -> Self {
        Self { waiting }
    }
}

#[async_trait::async_trait]
impl Middleware for TimeoutMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let url = req.url().clone();
        match tokio::time::timeout(self.waiting, next.run(req, extensions)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%url, "Request timed out after {:?}", self.waiting);
                Err(reqwest_middleware::Error::Middleware(anyhow!(
                    "request to {url} timed out after {:?}",
                    self.waiting
                )))
            }
        }
    }
}
