//! The offline worker: one deployed version of the caching layer.
//!
//! A worker owns a [`StrategyTable`] and a precache [`Manifest`], both fixed at
//! construction. It moves through [`LifecycleState`]s driven by the
//! [`Registration`]:
//!
//! - **install** fetches every manifest entry concurrently and writes them to
//!   the precache bucket in one transaction. Any failure leaves the worker
//!   redundant and writes nothing.
//! - **activate** deletes every bucket the table does not name, then claims
//!   all open pages.
//! - **fetch** intercepts same-origin `GET` requests over http(s) and serves
//!   them through the strategy the table assigns.

pub mod clients;
pub mod events;
pub mod lifecycle;
pub mod push;
pub mod registration;
pub mod strategies;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::try_join_all;
use http::Method;
use offgrid_core::{AppConfig, CacheDb, Error, Manifest, PrecacheEntry, Request, Response, Route, Strategy, StrategyTable};
use tokio::sync::watch;
use url::Url;

use crate::fetch::{Network, is_fetchable, parse_origin, resolve, same_origin};

pub use clients::{Client, ClientAction, ClientRegistry};
pub use events::{ActivationReport, EventOutcome, FetchOutcome, WorkerEvent};
pub use lifecycle::LifecycleState;
pub use push::{Notification, parse_push};
pub use registration::{Registration, RegistrationStatus, RegisterOutcome};
pub use strategies::StrategyContext;

/// Header carrying the manifest revision of a precached response.
pub const REVISION_HEADER: &str = "x-offgrid-revision";

/// Everything that identifies one worker version apart from its manifest.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub version: String,
    pub origin: Url,
    pub offline_fallback: String,
    pub table: StrategyTable,
}

impl WorkerConfig {
    /// Derive a worker config; the version combines the cache version and the manifest build time.
    pub fn from_app_config(config: &AppConfig, manifest: &Manifest) -> Result<Self, Error> {
        let origin = parse_origin(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            version: format!("{}+{}", config.cache_version, manifest.timestamp),
            origin,
            offline_fallback: config.offline_fallback.clone(),
            table: config.strategy_table(),
        })
    }
}

pub struct OfflineWorker {
    config: WorkerConfig,
    manifest: Manifest,
    ctx: StrategyContext,
    clients: ClientRegistry,
    state: watch::Sender<LifecycleState>,
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("version", &self.config.version)
            .field("state", &self.state())
            .field("precache", &self.manifest.precache.len())
            .finish()
    }
}

impl OfflineWorker {
    pub fn new(
        config: WorkerConfig, manifest: Manifest, cache: CacheDb, network: Arc<dyn Network>, clients: ClientRegistry,
    ) -> Self {
        let tables_match = match (serde_json::to_value(&config.table), serde_json::to_value(&manifest.config)) {
            (Ok(runtime), Ok(built)) => runtime == built,
            _ => false,
        };
        if !tables_match {
            tracing::warn!(
                version = %config.version,
                "strategy table in the manifest differs from the runtime table; runtime table wins"
            );
        }

        let (state, _) = watch::channel(LifecycleState::Installing);
        Self { config, manifest, ctx: StrategyContext::new(cache, network), clients, state }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn table(&self) -> &StrategyTable {
        &self.config.table
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn cache(&self) -> &CacheDb {
        &self.ctx.cache
    }

    fn transition(&self, next: LifecycleState) -> Result<(), Error> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                tracing::info!(version = %self.config.version, from = %state, to = %next, "worker state changed");
                *state = next;
                true
            } else {
                result = Err(Error::InvalidState(format!(
                    "worker {} cannot move from {state} to {next}",
                    self.config.version
                )));
                false
            }
        });
        result
    }

    /// Mark this worker as superseded.
    pub fn retire(&self) -> Result<(), Error> {
        self.transition(LifecycleState::Redundant)
    }

    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, Error> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.handle_fetch(&request).await.map(EventOutcome::Fetch),
            WorkerEvent::Push(data) => Ok(EventOutcome::Notification(self.handle_push(&data))),
            WorkerEvent::NotificationClick(notification) => {
                self.handle_notification_click(&notification).await.map(EventOutcome::Client)
            }
            WorkerEvent::SyncRegister(tag) => self.register_sync(&tag).await.map(EventOutcome::SyncRegistered),
            WorkerEvent::Sync(tag) => {
                self.handle_sync(&tag);
                Ok(EventOutcome::SyncCompleted)
            }
        }
    }

    /// Precache every manifest entry. Returns how many entries were fetched.
    ///
    /// Entries already stored under the same revision are kept without a fetch.
    pub async fn install(&self) -> Result<usize, Error> {
        if self.state() != LifecycleState::Installing {
            return Err(Error::InvalidState(format!("worker {} is {}, not installing", self.version(), self.state())));
        }

        match self.precache().await {
            Ok(fetched) => {
                self.transition(LifecycleState::Installed)?;
                Ok(fetched)
            }
            Err(err) => {
                tracing::error!(version = %self.config.version, error = %err, "install failed");
                if let Err(state_err) = self.transition(LifecycleState::Redundant) {
                    tracing::warn!(error = %state_err, "could not mark failed worker redundant");
                }
                Err(err)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let bucket = self.config.table.precache_bucket();
        let fetches = self.manifest.precache.iter().map(|entry| self.precache_entry(&bucket, entry));
        let fresh: Vec<(Request, Response)> = try_join_all(fetches).await?.into_iter().flatten().collect();

        if !fresh.is_empty() {
            self.ctx
                .cache
                .put_all(&bucket, &fresh)
                .await
                .map_err(|e| Error::InstallFailed(format!("writing {bucket}: {e}")))?;
        }

        tracing::info!(
            version = %self.config.version,
            bucket = %bucket,
            fetched = fresh.len(),
            reused = self.manifest.precache.len() - fresh.len(),
            "precache complete"
        );
        Ok(fresh.len())
    }

    async fn precache_entry(&self, bucket: &str, entry: &PrecacheEntry) -> Result<Option<(Request, Response)>, Error> {
        let url =
            resolve(&self.config.origin, &entry.url).map_err(|e| Error::InstallFailed(format!("{}: {e}", entry.url)))?;
        let request = Request::get(url);

        if let Ok(Some(cached)) = self.ctx.cache.match_request(bucket, &request).await
            && cached.response.header(REVISION_HEADER) == Some(entry.revision.as_str())
        {
            return Ok(None);
        }

        let response = self
            .ctx
            .network
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed(format!("{}: {e}", entry.url)))?;

        if !response.is_success() {
            return Err(Error::InstallFailed(format!("{} returned status {}", entry.url, response.status)));
        }

        Ok(Some((request, response.with_header(REVISION_HEADER, entry.revision.clone()))))
    }

    /// Sweep stale buckets, claim open pages and start controlling them.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        self.transition(LifecycleState::Activating)?;

        let deleted_buckets = sweep_buckets(&self.ctx.cache, &self.config.table.expected_buckets()).await;
        let claimed_clients = self.clients.claim(&self.config.version).await;

        self.transition(LifecycleState::Activated)?;
        Ok(ActivationReport { version: self.config.version.clone(), deleted_buckets, claimed_clients })
    }

    /// Answer a fetch, or decline it.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, Error> {
        if self.state() != LifecycleState::Activated {
            return Err(Error::InvalidState(format!("worker {} is {} and cannot handle fetches", self.version(), self.state())));
        }

        if request.method != Method::GET || !is_fetchable(&request.url) || !same_origin(&self.config.origin, &request.url)
        {
            tracing::trace!(method = %request.method, url = %request.url, "bypassing request");
            return Ok(FetchOutcome::Bypassed);
        }

        let response = if request.is_navigation() {
            self.navigate(request).await?
        } else if self.manifest.contains(request.path()) {
            strategies::cache_first(&self.ctx, &self.precache_route(), request).await?
        } else {
            let route = self.config.table.classify(request).into_route();
            strategies::respond(&self.ctx, &route, request).await?
        };

        Ok(FetchOutcome::Intercepted(response))
    }

    fn precache_route(&self) -> Route {
        Route { strategy: Strategy::CacheFirst, bucket: self.config.table.precache_bucket(), expiration: None }
    }

    /// Navigations are always network-first. With neither network nor a cached copy,
    /// the offline fallback document is served from any bucket.
    async fn navigate(&self, request: &Request) -> Result<Response, Error> {
        let mut route = self.config.table.classify(request).into_route();
        route.strategy = Strategy::NetworkFirst;

        match strategies::network_first(&self.ctx, &route, request).await {
            Err(err) if err.is_network() => self.offline_fallback(err).await,
            other => other,
        }
    }

    async fn offline_fallback(&self, err: Error) -> Result<Response, Error> {
        let url = resolve(&self.config.origin, &self.config.offline_fallback)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.config.offline_fallback)))?;

        match self.ctx.cache.match_any(&Request::get(url)).await {
            Ok(Some(entry)) => {
                tracing::info!(fallback = %self.config.offline_fallback, "serving offline fallback");
                Ok(entry.response)
            }
            Ok(None) => Err(err),
            Err(cache_err) => {
                tracing::warn!(error = %cache_err, "offline fallback lookup failed");
                Err(err)
            }
        }
    }

    pub fn handle_push(&self, data: &[u8]) -> Option<Notification> {
        let notification = parse_push(data)?;
        tracing::info!(title = %notification.title, url = %notification.url, "showing notification");
        Some(notification)
    }

    /// Focus a page already showing the notification's URL, or open one.
    pub async fn handle_notification_click(&self, notification: &Notification) -> Result<ClientAction, Error> {
        let url = self
            .config
            .origin
            .join(&notification.url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", notification.url)))?;

        Ok(self.clients.focus_or_open(url.as_str(), Some(self.config.version.clone())).await)
    }

    pub async fn register_sync(&self, tag: &str) -> Result<bool, Error> {
        if tag.trim().is_empty() {
            return Err(Error::InvalidInput("sync tag must not be empty".into()));
        }
        self.ctx.cache.register_sync_tag(tag).await
    }

    /// Background sync is accepted but has no work attached.
    pub fn handle_sync(&self, tag: &str) {
        tracing::debug!(tag, "sync event received; nothing queued");
    }
}

/// Delete every bucket not in `expected`. Returns the deleted names.
///
/// Failures are logged; a partial sweep is retried on the next activation.
pub async fn sweep_buckets(cache: &CacheDb, expected: &BTreeSet<String>) -> Vec<String> {
    let names = match cache.bucket_names().await {
        Ok(names) => names,
        Err(err) => {
            tracing::warn!(error = %err, "could not list buckets for sweep");
            return Vec::new();
        }
    };

    let mut deleted = Vec::new();
    for name in names.into_iter().filter(|name| !expected.contains(name)) {
        match cache.delete_bucket(&name).await {
            Ok(true) => {
                tracing::info!(bucket = %name, "deleted stale bucket");
                deleted.push(name);
            }
            Ok(false) => {}
            Err(err) => tracing::warn!(bucket = %name, error = %err, "failed to delete stale bucket"),
        }
    }
    deleted
}
