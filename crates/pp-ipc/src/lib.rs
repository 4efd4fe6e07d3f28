//! Cross-boundary messaging between embedded content and the host.
//!
//! The bus models the host window's `message` event target: content posts
//! a [`BoundaryMessage`] stamped with its origin, and every live
//! [`Subscription`] receives a copy. Subscriptions unregister themselves when
//! dropped, so a listener can never outlive the monitor that owns it.

use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::sync::mpsc;

const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;
const HARD_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// One cross-boundary message as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryMessage {
    /// Origin claimed by the browsing context that posted the message.
    pub origin: String,
    pub data: String,
}

impl BoundaryMessage {
    pub fn new(origin: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            data: data.into(),
        }
    }
}

/// Limits applied to every message crossing the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub max_message_bytes: usize,
}

impl BusConfig {
    pub fn hardened() -> PlaypenResult<Self> {
        let config = Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PlaypenResult<()> {
        if self.max_message_bytes == 0 {
            return Err(PlaypenError::new(
                "ipc.max_message_bytes_invalid",
                "bus max_message_bytes must be greater than zero",
            ));
        }

        if self.max_message_bytes > HARD_MAX_MESSAGE_BYTES {
            return Err(PlaypenError::new(
                "ipc.max_message_bytes_too_large",
                "bus max_message_bytes exceeds hard limit (16 MiB)",
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
struct BusInner {
    config: BusConfig,
    next_listener_id: u64,
    listeners: Vec<(u64, mpsc::Sender<BoundaryMessage>)>,
}

/// Host-side message event target shared by every monitor.
#[derive(Debug, Clone)]
pub struct MessageBus {
    inner: Arc<Mutex<BusInner>>,
}

impl MessageBus {
    pub fn new(config: BusConfig) -> PlaypenResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(BusInner {
                config,
                next_listener_id: 1,
                listeners: Vec::new(),
            })),
        })
    }

    pub fn hardened() -> PlaypenResult<Self> {
        Self::new(BusConfig::hardened()?)
    }

    /// Registers a listener; it stays registered until the returned
    /// subscription is dropped.
    pub fn subscribe(&self) -> PlaypenResult<Subscription> {
        let mut inner = lock_bus(&self.inner)?;
        let id = inner.next_listener_id;
        inner.next_listener_id = inner.next_listener_id.saturating_add(1);

        let (tx, rx) = mpsc::channel();
        inner.listeners.push((id, tx));

        Ok(Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Delivers `message` to every live listener and returns how many got it.
    pub fn post(&self, message: BoundaryMessage) -> PlaypenResult<usize> {
        let mut inner = lock_bus(&self.inner)?;
        let size = message.data.len().saturating_add(message.origin.len());
        if size > inner.config.max_message_bytes {
            return Err(PlaypenError::new(
                "ipc.message_too_large",
                format!(
                    "message exceeds max_message_bytes ({size} > {})",
                    inner.config.max_message_bytes
                ),
            ));
        }

        // Receivers that vanished without unsubscribing are pruned here.
        inner
            .listeners
            .retain(|(_, tx)| tx.send(message.clone()).is_ok());
        Ok(inner.listeners.len())
    }

    pub fn listener_count(&self) -> usize {
        lock_bus(&self.inner)
            .map(|inner| inner.listeners.len())
            .unwrap_or_default()
    }
}

/// Live registration on a [`MessageBus`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<BoundaryMessage>,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    pub fn try_next(&self) -> Option<BoundaryMessage> {
        self.rx.try_recv().ok()
    }

    pub fn drain(&self) -> Vec<BoundaryMessage> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        if let Ok(mut inner) = inner.lock() {
            inner.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock_bus(inner: &Mutex<BusInner>) -> PlaypenResult<std::sync::MutexGuard<'_, BusInner>> {
    inner.lock().map_err(|_| {
        PlaypenError::new(
            "ipc.bus_poisoned",
            "message bus lock was poisoned by a panicking listener",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::BoundaryMessage;
    use super::BusConfig;
    use super::MessageBus;

    fn bus() -> MessageBus {
        MessageBus::hardened().unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn delivers_to_every_subscriber() {
        let bus = bus();
        let first = bus.subscribe().unwrap_or_else(|_| unreachable!());
        let second = bus.subscribe().unwrap_or_else(|_| unreachable!());

        let delivered = bus.post(BoundaryMessage::new("https://playpen.app", "score:10"));
        assert_eq!(delivered, Ok(2));
        assert_eq!(first.drain().len(), 1);
        assert_eq!(
            second.try_next().map(|message| message.data),
            Some("score:10".to_owned())
        );
    }

    #[test]
    fn dropping_subscription_unregisters_listener() {
        let bus = bus();
        let subscription = bus.subscribe().unwrap_or_else(|_| unreachable!());
        assert_eq!(bus.listener_count(), 1);
        drop(subscription);
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.post(BoundaryMessage::new("https://a.example", "x")), Ok(0));
    }

    #[test]
    fn rejects_oversized_messages() {
        let bus = MessageBus::new(BusConfig {
            max_message_bytes: 16,
        })
        .unwrap_or_else(|_| unreachable!());
        let _subscription = bus.subscribe();
        let result = bus.post(BoundaryMessage::new("https://a.example", "x".repeat(64)));
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "ipc.message_too_large");
        }
    }

    #[test]
    fn config_validation_bounds() {
        assert!(BusConfig { max_message_bytes: 0 }.validate().is_err());
        assert!(
            BusConfig {
                max_message_bytes: 32 * 1024 * 1024
            }
            .validate()
            .is_err()
        );
        assert!(BusConfig::hardened().is_ok());
    }
}
