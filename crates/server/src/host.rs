//! Boots the worker registration the host serves.

use std::sync::Arc;
use std::time::Duration;

use offgrid_core::{AppConfig, CacheDb, Error, Manifest};
use offgrid_worker::{ClientRegistry, Network, OfflineWorker, RegisterOutcome, Registration, WorkerConfig};
use url::Url;

/// Shared state behind every tool call.
#[derive(Clone)]
pub struct HostState {
    pub registration: Arc<Registration>,
    pub cache: CacheDb,
    pub origin: Url,
    pub reload_timeout: Duration,
}

impl HostState {
    /// Register the worker built from `manifest`.
    ///
    /// A failed install is logged and the host keeps running with every
    /// request going straight to the network.
    pub async fn boot(
        config: &AppConfig, manifest: Manifest, cache: CacheDb, network: Arc<dyn Network>,
    ) -> Result<Self, Error> {
        let worker_config = WorkerConfig::from_app_config(config, &manifest)?;
        let origin = worker_config.origin.clone();
        let clients = ClientRegistry::new();
        let registration = Arc::new(Registration::new(config.scope.clone(), network.clone(), clients.clone()));

        tracing::info!(
            version = %worker_config.version,
            origin = %origin,
            precache = manifest.precache.len(),
            "booting worker"
        );

        let worker = Arc::new(OfflineWorker::new(worker_config, manifest, cache.clone(), network, clients));
        match registration.register(worker).await {
            Ok(RegisterOutcome::Activated) => tracing::info!("worker active"),
            Ok(RegisterOutcome::Waiting) => tracing::info!("worker waiting"),
            Err(err) => tracing::error!(error = %err, "worker install failed; serving from network only"),
        }

        Ok(Self { registration, cache, origin, reload_timeout: config.reload_timeout() })
    }

    /// Resolve a tool-supplied path or absolute URL against the origin.
    pub fn resolve(&self, input: &str) -> Result<Url, Error> {
        if input.trim().is_empty() {
            return Err(Error::InvalidInput("url cannot be empty".into()));
        }
        self.origin.join(input.trim()).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
    }
}
