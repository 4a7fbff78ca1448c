//! Page side of the update handshake.
//!
//! When a new worker version is waiting, the page offers the update. Accepting
//! it posts `SKIP_WAITING` and reloads once the controller changes, or after a
//! timeout if the change never arrives. The page reloads at most once no matter
//! how many paths race to trigger it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use offgrid_core::Error;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::worker::Registration;

/// Message a page posts to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Activate the waiting worker now.
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a posted message, e.g. `{"type":"SKIP_WAITING"}`.
    pub fn parse(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Flag set when an update is installed and waiting; cleared when the page accepts it.
#[derive(Debug, Clone, Default)]
pub struct PendingUpdate(Arc<AtomicBool>);

impl PendingUpdate {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the flag, returning whether it was set.
    pub fn clear(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the page reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadCause {
    ControllerChanged,
    /// The controller did not change within the reload timeout.
    Timeout,
    /// The registration went away while waiting.
    Detached,
}

/// Reloads the page.
pub trait Reloader: Send + Sync {
    fn reload(&self, cause: ReloadCause);
}

pub struct UpdateBridge {
    port: mpsc::UnboundedSender<ClientMessage>,
    controller: watch::Receiver<Option<String>>,
    pending: PendingUpdate,
    reload_timeout: Duration,
    reloader: Arc<dyn Reloader>,
    reloaded: AtomicBool,
}

impl UpdateBridge {
    pub fn new(
        port: mpsc::UnboundedSender<ClientMessage>, controller: watch::Receiver<Option<String>>, pending: PendingUpdate,
        reload_timeout: Duration, reloader: Arc<dyn Reloader>,
    ) -> Self {
        Self { port, controller, pending, reload_timeout, reloader, reloaded: AtomicBool::new(false) }
    }

    /// Bridge a page to a registration through a fresh message port.
    pub fn connect(registration: &Arc<Registration>, reload_timeout: Duration, reloader: Arc<dyn Reloader>) -> Self {
        Self::new(
            registration.message_port(),
            registration.subscribe_controller(),
            registration.pending_update(),
            reload_timeout,
            reloader,
        )
    }

    /// Whether to show the update prompt.
    pub fn update_available(&self) -> bool {
        self.pending.is_set()
    }

    pub fn has_reloaded(&self) -> bool {
        self.reloaded.load(Ordering::SeqCst)
    }

    /// The user accepted the update.
    ///
    /// Returns the cause of the reload this call performed, or `None` when the
    /// page had already reloaded through another path.
    pub async fn accept_update(&self) -> Result<Option<ReloadCause>, Error> {
        let mut controller = self.controller.clone();
        controller.borrow_and_update();

        self.pending.clear();
        self.port
            .send(ClientMessage::SkipWaiting)
            .map_err(|_| Error::InvalidState("worker message port is closed".into()))?;

        let cause = match tokio::time::timeout(self.reload_timeout, controller.changed()).await {
            Ok(Ok(())) => ReloadCause::ControllerChanged,
            Ok(Err(_)) => ReloadCause::Detached,
            Err(_) => {
                tracing::warn!(timeout_ms = self.reload_timeout.as_millis() as u64, "controller did not change; reloading anyway");
                ReloadCause::Timeout
            }
        };

        Ok(self.reload_once(cause).then_some(cause))
    }

    /// Reload when a new worker takes over from a previous controller.
    ///
    /// The first controller a page gets (initial install) does not trigger a reload.
    pub fn watch_controller(self: &Arc<Self>) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        let mut controller = self.controller.clone();
        let mut previous = controller.borrow_and_update().clone();

        tokio::spawn(async move {
            while controller.changed().await.is_ok() {
                let current = controller.borrow_and_update().clone();
                if previous.is_some() && current != previous {
                    bridge.reload_once(ReloadCause::ControllerChanged);
                    return;
                }
                previous = current;
            }
        })
    }

    fn reload_once(&self, cause: ReloadCause) -> bool {
        if self.reloaded.swap(true, Ordering::SeqCst) {
            tracing::debug!(?cause, "reload already triggered");
            return false;
        }
        tracing::info!(?cause, "reloading page");
        self.reloader.reload(cause);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CountingReloader(Mutex<Vec<ReloadCause>>);

    impl CountingReloader {
        fn causes(&self) -> Vec<ReloadCause> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Reloader for CountingReloader {
        fn reload(&self, cause: ReloadCause) {
            self.0.lock().unwrap().push(cause);
        }
    }

    struct Harness {
        bridge: Arc<UpdateBridge>,
        reloader: Arc<CountingReloader>,
        controller: watch::Sender<Option<String>>,
        inbox: mpsc::UnboundedReceiver<ClientMessage>,
        pending: PendingUpdate,
    }

    fn harness(timeout: Duration) -> Harness {
        let (port, inbox) = mpsc::unbounded_channel();
        let (controller, rx) = watch::channel(Some("v1".to_string()));
        let pending = PendingUpdate::default();
        pending.set();
        let reloader = Arc::new(CountingReloader::default());
        let bridge = Arc::new(UpdateBridge::new(port, rx, pending.clone(), timeout, reloader.clone()));
        Harness { bridge, reloader, controller, inbox, pending }
    }

    #[test]
    fn test_client_message_wire_format() {
        assert_eq!(ClientMessage::parse(r#"{"type":"SKIP_WAITING"}"#).unwrap(), ClientMessage::SkipWaiting);
        assert_eq!(ClientMessage::parse(r#"{"type":"PING"}"#).unwrap(), ClientMessage::Unknown);
        assert!(ClientMessage::parse("SKIP_WAITING").is_err());
        assert_eq!(serde_json::to_string(&ClientMessage::SkipWaiting).unwrap(), r#"{"type":"SKIP_WAITING"}"#);
    }

    #[test]
    fn test_pending_update_flag() {
        let pending = PendingUpdate::default();
        assert!(!pending.clear());
        pending.set();
        assert!(pending.clone().is_set());
        assert!(pending.clear());
        assert!(!pending.is_set());
    }

    #[tokio::test]
    async fn test_accept_posts_skip_waiting_and_reloads_on_change() {
        let Harness { bridge, reloader, controller, mut inbox, pending } = harness(Duration::from_secs(5));
        assert!(bridge.update_available());

        let worker = tokio::spawn(async move {
            let message = inbox.recv().await;
            controller.send_replace(Some("v2".into()));
            message
        });

        let cause = bridge.accept_update().await.unwrap();
        assert_eq!(cause, Some(ReloadCause::ControllerChanged));
        assert_eq!(worker.await.unwrap(), Some(ClientMessage::SkipWaiting));
        assert!(!pending.is_set());
        assert_eq!(reloader.causes(), vec![ReloadCause::ControllerChanged]);
    }

    #[tokio::test]
    async fn test_accept_falls_back_to_timeout() {
        let Harness { bridge, reloader, controller: _controller, inbox: _inbox, .. } = harness(Duration::from_millis(100));

        let cause = bridge.accept_update().await.unwrap();
        assert_eq!(cause, Some(ReloadCause::Timeout));
        assert_eq!(reloader.causes(), vec![ReloadCause::Timeout]);
    }

    #[tokio::test]
    async fn test_reload_happens_once() {
        let Harness { bridge, reloader, controller, mut inbox, .. } = harness(Duration::from_secs(5));
        let watcher = bridge.watch_controller();

        tokio::spawn(async move {
            if inbox.recv().await.is_some() {
                controller.send_replace(Some("v2".into()));
            }
        });

        bridge.accept_update().await.unwrap();
        watcher.await.unwrap();

        assert_eq!(reloader.causes().len(), 1);
        assert!(bridge.has_reloaded());
    }

    #[tokio::test]
    async fn test_first_controller_does_not_reload() {
        let (port, _inbox) = mpsc::unbounded_channel();
        let (controller, rx) = watch::channel(None);
        let reloader = Arc::new(CountingReloader::default());
        let bridge = Arc::new(UpdateBridge::new(
            port,
            rx,
            PendingUpdate::default(),
            Duration::from_secs(1),
            reloader.clone(),
        ));
        let watcher = bridge.watch_controller();

        controller.send_replace(Some("v1".into()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reloader.causes().is_empty());

        controller.send_replace(Some("v2".into()));
        tokio::time::timeout(Duration::from_secs(1), watcher).await.unwrap().unwrap();
        assert_eq!(reloader.causes(), vec![ReloadCause::ControllerChanged]);
    }

    #[tokio::test]
    async fn test_closed_port_is_an_error() {
        let (port, inbox) = mpsc::unbounded_channel();
        drop(inbox);
        let (_controller, rx) = watch::channel(Some("v1".to_string()));
        let bridge =
            UpdateBridge::new(port, rx, PendingUpdate::default(), Duration::from_millis(100), Arc::new(CountingReloader::default()));

        assert!(matches!(bridge.accept_update().await, Err(Error::InvalidState(_))));
        assert!(!bridge.has_reloaded());
    }
}
