use chrono::Duration;
use keyed_request_cache::{
    CacheConfig, CallOptions, HttpTransport, KeyedRequestCache, RequestDescriptor,
};
use serde_json::json;
use std::path::PathBuf;
use surf::Url;

/// Usage: caching_example [BASE_URL] [CONFIG_YAML]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let base_url = Url::parse(
        &args
            .next()
            .unwrap_or_else(|| "https://httpbin.org/".to_string()),
    )?;
    let config = match args.next().map(PathBuf::from) {
        Some(path) => CacheConfig::load(Some(&path))?,
        None => CacheConfig::new(Some(500), Some(Duration::minutes(10))),
    };

    let cache = KeyedRequestCache::with_config(HttpTransport::with_base_url(base_url), config)?;
    let descriptor = RequestDescriptor::get("get").with_body(json!({"page": 1, "state": "open"}));

    // Three concurrent callers, one network call
    println!("=== Concurrent resolves ===");
    let start = std::time::Instant::now();
    let entries = futures::future::join_all(vec![
        cache.resolve(&descriptor),
        cache.resolve(&descriptor),
        cache.resolve(&descriptor),
    ])
    .await;
    println!("Resolved {} callers in {:?}", entries.len(), start.elapsed());
    println!("Cache stats: {:?}", cache.stats());

    // Memoized
    println!("\n=== Memoized resolve ===");
    let start = std::time::Instant::now();
    let entry = cache.resolve(&descriptor).await?;
    println!("Cached resolve took: {:?} ({})", start.elapsed(), entry.state());

    // Forced refresh, surfacing failures
    println!("\n=== Refresh ===");
    match cache.refresh_with(&descriptor, CallOptions::strict()).await {
        Ok(entry) => println!("Refreshed to generation {}", entry.generation()),
        Err(e) => println!("Refresh failed: {}", e),
    }

    println!("\n=== Cache Management ===");
    println!("Evicted {} expired entries", cache.evict_expired());
    println!("Cache stats: {:?}", cache.stats());

    Ok(())
}
