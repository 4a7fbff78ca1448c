//! Pages (clients) within the worker's scope.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use offgrid_core::Error;
use serde::Serialize;
use tokio::sync::RwLock;

/// An open page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: String,
    pub url: String,
    pub focused: bool,
    /// Version of the worker controlling this page, if any.
    pub controller: Option<String>,
}

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "client", rename_all = "snake_case")]
pub enum ClientAction {
    /// An existing page showing the URL was focused.
    Focused(Client),
    /// No page showed the URL; a new one was opened.
    Opened(Client),
}

/// Shared, cloneable view of every open page.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<BTreeMap<String, Client>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new page. It becomes the focused one.
    pub async fn open(&self, url: &str, controller: Option<String>) -> Client {
        let id = format!("client-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let client = Client { id: id.clone(), url: url.to_string(), focused: true, controller };

        let mut clients = self.clients.write().await;
        for other in clients.values_mut() {
            other.focused = false;
        }
        clients.insert(id, client.clone());
        client
    }

    pub async fn remove(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    pub async fn match_all(&self) -> Vec<Client> {
        self.clients.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Take control of every open page. Returns how many changed controller.
    pub async fn claim(&self, version: &str) -> usize {
        let mut clients = self.clients.write().await;
        let mut changed = 0;
        for client in clients.values_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                changed += 1;
            }
        }
        changed
    }

    /// Pages controlled by any worker.
    pub async fn controlled_count(&self) -> usize {
        self.clients.read().await.values().filter(|c| c.controller.is_some()).count()
    }

    pub async fn focus(&self, id: &str) -> Result<Client, Error> {
        let mut clients = self.clients.write().await;
        if !clients.contains_key(id) {
            return Err(Error::InvalidInput(format!("unknown client: {id}")));
        }

        let mut focused = None;
        for client in clients.values_mut() {
            client.focused = client.id == id;
            if client.focused {
                focused = Some(client.clone());
            }
        }
        focused.ok_or_else(|| Error::InvalidInput(format!("unknown client: {id}")))
    }

    /// Focus a page already showing `url`, or open one.
    pub async fn focus_or_open(&self, url: &str, controller: Option<String>) -> ClientAction {
        let existing = self.clients.read().await.values().find(|c| c.url == url).map(|c| c.id.clone());

        if let Some(id) = existing
            && let Ok(client) = self.focus(&id).await
        {
            return ClientAction::Focused(client);
        }

        ClientAction::Opened(self.open(url, controller).await)
    }
}
