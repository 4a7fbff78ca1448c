//! Scripted network for tests.
//!
//! Available to this crate's tests and, through the `testing` feature, to
//! dependents such as the host server.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use offgrid_core::{Error, Request, Response};

use crate::fetch::Network;

/// What the scripted network does for a path.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(Response),
    Fail(String),
}

/// A [`Network`] whose answers are set per URL path and whose calls are counted.
///
/// Unscripted paths answer `404`.
#[derive(Debug, Default)]
pub struct MockNetwork {
    replies: Mutex<HashMap<String, MockReply>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `path` with a `200` and the given body.
    pub fn serve(&self, path: &str, body: &str) -> &Self {
        self.respond(path, Response::ok(body.to_string()))
    }

    pub fn respond(&self, path: &str, response: Response) -> &Self {
        self.set(path, MockReply::Respond(response))
    }

    /// Make `path` fail at the network level.
    pub fn fail(&self, path: &str) -> &Self {
        self.set(path, MockReply::Fail(format!("connection refused for {path}")))
    }

    fn set(&self, path: &str, reply: MockReply) -> &Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert(path.to_string(), reply);
        }
        self
    }

    /// Fail every request regardless of script.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every answer, to observe work that overlaps a fetch.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.delay.lock() {
            *d = delay;
        }
    }

    /// Number of fetches issued for `path`, including failed ones.
    pub fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|calls| calls.values().sum()).unwrap_or(0)
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let path = request.path().to_string();
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(path.clone()).or_default() += 1;
        }

        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let reply = self.replies.lock().ok().and_then(|replies| replies.get(&path).cloned());
        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(reason)) => Err(Error::Network(reason)),
            None => Ok(Response::new(404, "not found")),
        }
    }
}
