//! Events delivered to a worker and what handling them produced.

use bytes::Bytes;
use offgrid_core::{Request, Response};
use serde::Serialize;

use super::clients::ClientAction;
use super::push::Notification;

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    /// Raw push message body.
    Push(Bytes),
    NotificationClick(Notification),
    /// A page asked for a background sync under this tag.
    SyncRegister(String),
    /// The platform fired a sync for this tag.
    Sync(String),
}

/// Result of a fetch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The worker answered the request.
    Intercepted(Response),
    /// The worker declined; the request goes straight to the network.
    Bypassed,
}

/// Summary of an activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub version: String,
    /// Buckets removed by the sweep.
    pub deleted_buckets: Vec<String>,
    /// Pages whose controller changed to this version.
    pub claimed_clients: usize,
}

#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// Number of precache entries fetched (entries reused by revision are not counted).
    Installed(usize),
    Activated(ActivationReport),
    Fetch(FetchOutcome),
    /// `None` when the push payload was discarded.
    Notification(Option<Notification>),
    Client(ClientAction),
    /// `false` when the tag was already registered.
    SyncRegistered(bool),
    SyncCompleted,
}
