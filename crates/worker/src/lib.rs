//! Offline worker runtime.
//!
//! This crate runs the caching layer between pages and the network: the five
//! caching strategies, the worker lifecycle with its activation sweep, the
//! registration that swaps worker versions, and the page-side update bridge.

pub mod bridge;
pub mod fetch;
pub mod worker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::{ClientMessage, PendingUpdate, ReloadCause, Reloader, UpdateBridge};
pub use fetch::{FetchConfig, HttpNetwork, Network};
pub use worker::registration::{Served, WorkerStatus};
pub use worker::{
    ActivationReport, Client, ClientAction, ClientRegistry, EventOutcome, FetchOutcome, LifecycleState, Notification,
    OfflineWorker, RegisterOutcome, Registration, RegistrationStatus, WorkerConfig, WorkerEvent,
};
