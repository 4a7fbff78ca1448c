//! Tools that deliver events to the worker.

pub mod fetch;
pub mod message;
pub mod push;
pub mod status;

pub use fetch::{WorkerFetchParams, fetch_impl};
pub use message::{WorkerMessageParams, message_impl};
pub use push::{NotificationClickParams, WorkerPushParams, notification_click_impl, push_impl};
pub use status::status_impl;
