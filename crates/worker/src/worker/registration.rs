//! Registration: which worker version is installing, waiting and active.
//!
//! Fetches hold the read side of the slot lock; installs, activations and
//! `SKIP_WAITING` take the write side. A new version therefore never starts
//! its sweep while the old one is still answering a request, and requests
//! arriving during activation wait for the new controller.

use std::sync::Arc;

use offgrid_core::{Error, Request, Response};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc, watch};

use super::clients::{Client, ClientRegistry};
use super::events::{ActivationReport, EventOutcome, FetchOutcome, WorkerEvent};
use super::lifecycle::LifecycleState;
use super::OfflineWorker;
use crate::bridge::{ClientMessage, PendingUpdate};
use crate::fetch::Network;

#[derive(Default)]
struct Slots {
    installing: Option<Arc<OfflineWorker>>,
    waiting: Option<Arc<OfflineWorker>>,
    active: Option<Arc<OfflineWorker>>,
}

/// Where a registered worker ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// Activated immediately: first install, or no page was controlled.
    Activated,
    /// Installed and waiting for `SKIP_WAITING` or for every page to close.
    Waiting,
}

/// A response and who produced it.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    /// Version of the worker that answered; `None` when the request went straight to the network.
    pub worker: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub version: String,
    pub state: LifecycleState,
}

impl WorkerStatus {
    fn of(worker: &OfflineWorker) -> Self {
        Self { version: worker.version().to_string(), state: worker.state() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationStatus {
    pub scope: String,
    pub installing: Option<WorkerStatus>,
    pub waiting: Option<WorkerStatus>,
    pub active: Option<WorkerStatus>,
    pub controller: Option<String>,
    pub update_pending: bool,
    pub clients: Vec<Client>,
}

pub struct Registration {
    scope: String,
    network: Arc<dyn Network>,
    clients: ClientRegistry,
    slots: RwLock<Slots>,
    controller: watch::Sender<Option<String>>,
    waiting: watch::Sender<Option<String>>,
    pending: PendingUpdate,
}

fn retire_quietly(worker: &OfflineWorker) {
    if let Err(err) = worker.retire() {
        tracing::debug!(version = %worker.version(), error = %err, "worker already retired");
    }
}

impl Registration {
    pub fn new(scope: impl Into<String>, network: Arc<dyn Network>, clients: ClientRegistry) -> Self {
        Self {
            scope: scope.into(),
            network,
            clients,
            slots: RwLock::new(Slots::default()),
            controller: watch::channel(None).0,
            waiting: watch::channel(None).0,
            pending: PendingUpdate::default(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn pending_update(&self) -> PendingUpdate {
        self.pending.clone()
    }

    /// Version of the worker controlling pages. Changes once per activation.
    pub fn subscribe_controller(&self) -> watch::Receiver<Option<String>> {
        self.controller.subscribe()
    }

    /// Version of the worker waiting to activate, if any.
    pub fn subscribe_waiting(&self) -> watch::Receiver<Option<String>> {
        self.waiting.subscribe()
    }

    pub fn controller(&self) -> Option<String> {
        self.controller.borrow().clone()
    }

    pub async fn active(&self) -> Option<Arc<OfflineWorker>> {
        self.slots.read().await.active.clone()
    }

    /// Install a new worker version and activate it or park it as waiting.
    ///
    /// A failed install leaves the current active worker in charge.
    pub async fn register(&self, worker: Arc<OfflineWorker>) -> Result<RegisterOutcome, Error> {
        tracing::info!(scope = %self.scope, version = %worker.version(), "registering worker");
        {
            let mut slots = self.slots.write().await;
            if let Some(previous) = slots.installing.replace(worker.clone()) {
                retire_quietly(&previous);
            }
        }

        let installed = worker.install().await;

        let mut slots = self.slots.write().await;
        if slots.installing.as_ref().is_some_and(|w| Arc::ptr_eq(w, &worker)) {
            slots.installing = None;
        }
        installed?;

        if slots.active.is_none() || self.clients.controlled_count().await == 0 {
            self.promote(&mut slots, worker).await?;
            return Ok(RegisterOutcome::Activated);
        }

        if let Some(previous) = slots.waiting.replace(worker.clone()) {
            retire_quietly(&previous);
        }
        self.waiting.send_replace(Some(worker.version().to_string()));
        self.pending.set();
        tracing::info!(version = %worker.version(), "update installed and waiting");
        Ok(RegisterOutcome::Waiting)
    }

    async fn promote(&self, slots: &mut Slots, worker: Arc<OfflineWorker>) -> Result<ActivationReport, Error> {
        if let Some(previous) = slots.active.take() {
            retire_quietly(&previous);
        }

        let report = worker.activate().await?;
        slots.active = Some(worker);
        self.pending.clear();
        self.waiting.send_replace(None);
        self.controller.send_replace(Some(report.version.clone()));
        tracing::info!(
            version = %report.version,
            deleted = report.deleted_buckets.len(),
            claimed = report.claimed_clients,
            "controller changed"
        );
        Ok(report)
    }

    /// Activate the waiting worker now. `None` if nothing was waiting.
    pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>, Error> {
        let mut slots = self.slots.write().await;
        let Some(worker) = slots.waiting.take() else {
            tracing::debug!("skip waiting requested with no waiting worker");
            return Ok(None);
        };
        self.promote(&mut slots, worker).await.map(Some)
    }

    /// Handle a message a page posted to the worker.
    pub async fn post_message(&self, message: ClientMessage) -> Result<(), Error> {
        match message {
            ClientMessage::SkipWaiting => self.skip_waiting().await.map(|_| ()),
            ClientMessage::Unknown => {
                tracing::debug!("ignoring unknown client message");
                Ok(())
            }
        }
    }

    /// Open a message channel from a page to the worker.
    ///
    /// Messages are handled in order on a background task that ends when the
    /// returned sender is dropped.
    pub fn message_port(self: &Arc<Self>) -> mpsc::UnboundedSender<ClientMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(err) = registration.post_message(message).await {
                    tracing::warn!(error = %err, "client message failed");
                }
            }
        });
        tx
    }

    /// A page opened within the scope; it is controlled by the active worker, if any.
    pub async fn open_client(&self, url: &str) -> Client {
        self.clients.open(url, self.controller()).await
    }

    /// A page closed. Closing the last controlled page lets a waiting worker activate.
    pub async fn client_closed(&self, id: &str) -> Result<Option<ActivationReport>, Error> {
        if self.clients.remove(id).await.is_none() {
            return Err(Error::InvalidInput(format!("unknown client: {id}")));
        }

        if self.clients.controlled_count().await == 0 {
            return self.skip_waiting().await;
        }
        Ok(None)
    }

    /// Route a page request through the active worker, or straight to the network.
    pub async fn fetch(&self, request: Request) -> Result<Served, Error> {
        let slots = self.slots.read().await;
        if let Some(active) = &slots.active
            && let FetchOutcome::Intercepted(response) = active.handle_fetch(&request).await?
        {
            return Ok(Served { response, worker: Some(active.version().to_string()) });
        }
        drop(slots);

        let response = self.network.fetch(&request).await?;
        Ok(Served { response, worker: None })
    }

    /// Deliver a functional event (push, notification click, sync) to the active worker.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, Error> {
        if matches!(event, WorkerEvent::Install | WorkerEvent::Activate) {
            return Err(Error::InvalidInput("lifecycle events are driven by the registration".into()));
        }

        let slots = self.slots.read().await;
        let active = slots.active.as_ref().ok_or_else(|| Error::InvalidState("no active worker".into()))?;
        active.dispatch(event).await
    }

    pub async fn status(&self) -> RegistrationStatus {
        let slots = self.slots.read().await;
        RegistrationStatus {
            scope: self.scope.clone(),
            installing: slots.installing.as_deref().map(WorkerStatus::of),
            waiting: slots.waiting.as_deref().map(WorkerStatus::of),
            active: slots.active.as_deref().map(WorkerStatus::of),
            controller: self.controller(),
            update_pending: self.pending.is_set(),
            clients: self.clients.match_all().await,
        }
    }
}
