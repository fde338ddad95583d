use async_trait::async_trait;
use log::{debug, warn};
use std::time::Instant;
use surf::middleware::{Middleware, Next};
use surf::{Client, Request, Response, Result};

/// Client middleware that logs every outgoing request with its status and latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct SurfLogging;

#[async_trait]
impl Middleware for SurfLogging {
    async fn handle(&self, req: Request, client: Client, next: Next<'_>) -> Result<Response> {
        let method = req.method();
        let url = req.url().to_string();
        debug!("{} {}", method, url);

        let started = Instant::now();
        let result = next.run(req, client).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(response) if response.status().is_success() => {
                debug!("{} {} -> {} in {:?}", method, url, response.status(), elapsed)
            }
            Ok(response) => warn!("{} {} -> {} in {:?}", method, url, response.status(), elapsed),
            Err(e) => warn!("{} {} failed after {:?}: {}", method, url, elapsed, e),
        }

        result
    }
}
