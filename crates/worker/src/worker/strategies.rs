//! The five caching algorithms.
//!
//! Each strategy answers one request against one [`Route`]. Shared rules:
//! - only 2xx network responses are written to a bucket;
//! - a failed bucket write is logged and never fails the request;
//! - a failed bucket read is treated as a miss;
//! - an entry past the route's `max_age` is a miss and is removed;
//! - after a write the bucket is trimmed to the route's `max_entries`.

use std::sync::Arc;

use offgrid_core::{CacheDb, Error, Request, Response, Route, Strategy};

use crate::fetch::Network;

/// Storage and network handles a strategy runs against.
#[derive(Clone)]
pub struct StrategyContext {
    pub cache: CacheDb,
    pub network: Arc<dyn Network>,
}

impl StrategyContext {
    pub fn new(cache: CacheDb, network: Arc<dyn Network>) -> Self {
        Self { cache, network }
    }
}

/// Serve `request` using the route's strategy.
pub async fn respond(ctx: &StrategyContext, route: &Route, request: &Request) -> Result<Response, Error> {
    match route.strategy {
        Strategy::CacheFirst => cache_first(ctx, route, request).await,
        Strategy::NetworkFirst => network_first(ctx, route, request).await,
        Strategy::StaleWhileRevalidate => stale_while_revalidate(ctx, route, request).await,
        Strategy::CacheOnly => cache_only(ctx, route, request).await,
        Strategy::NetworkOnly => ctx.network.fetch(request).await,
    }
}

/// Cached entry if present, else network (and store a 2xx).
pub async fn cache_first(ctx: &StrategyContext, route: &Route, request: &Request) -> Result<Response, Error> {
    if let Some(hit) = lookup(ctx, route, request).await {
        return Ok(hit);
    }

    let response = ctx.network.fetch(request).await?;
    store(ctx, route, request, &response).await;
    Ok(response)
}

/// Network (storing a 2xx); on network failure the cached entry; else the network error.
///
/// A non-2xx network response is returned as-is, not replaced by the cache.
pub async fn network_first(ctx: &StrategyContext, route: &Route, request: &Request) -> Result<Response, Error> {
    match ctx.network.fetch(request).await {
        Ok(response) => {
            store(ctx, route, request, &response).await;
            Ok(response)
        }
        Err(err) => {
            tracing::debug!(url = %request.url, error = %err, "network failed, trying cache");
            lookup(ctx, route, request).await.ok_or(err)
        }
    }
}

/// Cached entry immediately when present, while the network refreshes the bucket.
///
/// The refresh runs on its own task so it outlives the response. With no
/// cached entry the caller waits for that same fetch.
pub async fn stale_while_revalidate(
    ctx: &StrategyContext, route: &Route, request: &Request,
) -> Result<Response, Error> {
    let refresh = tokio::spawn({
        let ctx = ctx.clone();
        let route = route.clone();
        let request = request.clone();
        async move { revalidate(&ctx, &route, &request).await }
    });

    match lookup(ctx, route, request).await {
        Some(hit) => Ok(hit),
        None => refresh.await.map_err(|e| Error::Network(format!("revalidation task failed: {e}")))?,
    }
}

async fn revalidate(ctx: &StrategyContext, route: &Route, request: &Request) -> Result<Response, Error> {
    let response = ctx.network.fetch(request).await.inspect_err(|err| {
        tracing::debug!(url = %request.url, error = %err, "revalidation fetch failed");
    })?;
    store(ctx, route, request, &response).await;
    Ok(response)
}

/// Cached entry or [`Error::CacheMiss`]. Never touches the network.
pub async fn cache_only(ctx: &StrategyContext, route: &Route, request: &Request) -> Result<Response, Error> {
    lookup(ctx, route, request).await.ok_or_else(|| Error::CacheMiss(request.cache_url().to_string()))
}

/// Read the route's bucket, honoring `max_age`.
pub(crate) async fn lookup(ctx: &StrategyContext, route: &Route, request: &Request) -> Option<Response> {
    let entry = match ctx.cache.match_request(&route.bucket, request).await {
        Ok(entry) => entry?,
        Err(err) => {
            tracing::warn!(bucket = %route.bucket, url = %request.url, error = %err, "cache read failed");
            return None;
        }
    };

    let expired = route.expiration.and_then(|e| e.max_age()).is_some_and(|max_age| entry.is_older_than(max_age));
    if expired {
        tracing::debug!(bucket = %route.bucket, url = %entry.url, "cached entry expired");
        if let Err(err) = ctx.cache.delete_stale_entry(&route.bucket, request, entry.stored_at).await {
            tracing::warn!(bucket = %route.bucket, error = %err, "failed to remove expired entry");
        }
        return None;
    }

    Some(entry.response)
}

/// Write a 2xx response into the route's bucket, then apply `max_entries`.
pub(crate) async fn store(ctx: &StrategyContext, route: &Route, request: &Request, response: &Response) {
    if !response.is_success() {
        tracing::debug!(url = %request.url, status = response.status, "not caching non-success response");
        return;
    }

    if let Err(err) = ctx.cache.put(&route.bucket, request, response).await {
        tracing::warn!(bucket = %route.bucket, url = %request.url, error = %err, "cache write failed");
        return;
    }

    if let Some(max_entries) = route.expiration.and_then(|e| e.max_entries) {
        match ctx.cache.trim_bucket(&route.bucket, max_entries).await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(bucket = %route.bucket, removed, "trimmed bucket"),
            Err(err) => tracing::warn!(bucket = %route.bucket, error = %err, "failed to trim bucket"),
        }
    }
}
