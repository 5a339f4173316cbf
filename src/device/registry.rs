//! Device registry and change notification
//!
//! The registry maps device identifiers to capability-typed handles. It only
//! tracks references: opening and closing devices is the job of whoever owns
//! them (see [`crate::listener::ReceiverHandle`]).
//!
//! Change notification lives in its own lock domain ([`ChangeNotifier`]) so a
//! device signalling a change never touches the device map. Two delivery paths
//! exist side by side:
//!
//! - a single global [`ChangeCallback`], invoked synchronously on the receive
//!   task of the device that changed. It must return quickly.
//! - any number of [`ChangeSubscription`]s, fed through bounded queues with
//!   `try_send`. A full queue already holds a pending signal, so further
//!   signals are coalesced and ingestion never waits for a slow consumer.
//!
//! Both are a coalesced "something changed" signal, not an event payload;
//! consumers re-read device state themselves.

use super::{read_lock, write_lock, Gamepad};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shared handle to a registered device
pub type GamepadHandle = Arc<dyn Gamepad>;

/// Global change callback
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Queue depth per subscription
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Message delivered to subscriptions after a device merged a packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChanged {
    pub device_id: String,
}

/// Process-wide device map, passed explicitly to whoever needs it
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, GamepadHandle>>>,
    notifier: ChangeNotifier,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let devices = read_lock(&self.devices);
        let mut ids: Vec<&String> = devices.keys().collect();
        ids.sort();
        f.debug_struct("DeviceRegistry")
            .field("devices", &ids)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::with_subscriber_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Creates a registry whose subscriptions buffer up to `capacity` signals
    pub fn with_subscriber_capacity(capacity: usize) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            notifier: ChangeNotifier::new(capacity),
        }
    }

    /// Inserts or replaces the entry for `id`
    ///
    /// Re-registration silently overwrites the previous handle.
    pub fn register(&self, id: impl Into<String>, handle: GamepadHandle) {
        let id = id.into();
        let replaced = write_lock(&self.devices).insert(id.clone(), handle);
        if replaced.is_some() {
            info!("Replaced registered device: {}", id);
        } else {
            info!("Registered device: {}", id);
        }
    }

    /// Removes the entry for `id`, returning it if it was present
    pub fn unregister(&self, id: &str) -> Option<GamepadHandle> {
        let removed = write_lock(&self.devices).remove(id);
        match removed {
            Some(_) => info!("Unregistered device: {}", id),
            None => debug!("Unregister of unknown device ignored: {}", id),
        }
        removed
    }

    /// Removes the entry for `id` only while it still refers to `handle`
    ///
    /// Returns `false` and leaves the map untouched if the id is unknown or was
    /// re-registered with a different handle.
    pub fn unregister_handle(&self, id: &str, handle: &GamepadHandle) -> bool {
        let mut devices = write_lock(&self.devices);
        let owned = devices
            .get(id)
            .is_some_and(|current| same_device(current, handle));
        if owned {
            devices.remove(id);
            info!("Unregistered device: {}", id);
        } else {
            debug!("Device {} is not registered with this handle, kept", id);
        }
        owned
    }

    pub fn get(&self, id: &str) -> Option<GamepadHandle> {
        read_lock(&self.devices).get(id).cloned()
    }

    /// Independent copy of the current device map
    pub fn snapshot(&self) -> HashMap<String, GamepadHandle> {
        read_lock(&self.devices).clone()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.devices).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installs or clears the global change callback
    ///
    /// A new callback replaces the old one; `None` disables callback delivery.
    pub fn set_change_callback(&self, callback: Option<ChangeCallback>) {
        self.notifier.set_callback(callback);
    }

    /// Opens a new change subscription
    pub fn subscribe(&self) -> ChangeSubscription {
        self.notifier.subscribe()
    }

    /// Handle devices use to signal changes into this registry
    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }
}

// Compares data addresses only; vtable pointers of the same type may differ
fn same_device(a: &GamepadHandle, b: &GamepadHandle) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Notification side of the registry
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    callback: RwLock<Option<ChangeCallback>>,
    subscribers: RwLock<HashMap<u64, mpsc::Sender<DeviceChanged>>>,
    next_subscriber: AtomicU64,
    capacity: usize,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("callback", &read_lock(&self.inner.callback).is_some())
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                callback: RwLock::new(None),
                subscribers: RwLock::new(HashMap::new()),
                next_subscriber: AtomicU64::new(0),
                // mpsc::channel panics on zero capacity
                capacity: capacity.max(1),
            }),
        }
    }

    /// Signals that `device_id` merged a packet
    ///
    /// The callback is cloned out under the shared lock and invoked after the
    /// lock is released. Fire-and-forget: outcomes are not observed.
    pub fn notify(&self, device_id: &str) {
        let callback = read_lock(&self.inner.callback).clone();
        if let Some(callback) = callback {
            callback();
        }

        let mut closed = Vec::new();
        {
            let subscribers = read_lock(&self.inner.subscribers);
            for (id, sender) in subscribers.iter() {
                let message = DeviceChanged {
                    device_id: device_id.to_string(),
                };
                match sender.try_send(message) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Subscriber {} has pending changes, signal coalesced", id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = write_lock(&self.inner.subscribers);
            for id in closed {
                warn!("Dropping closed change subscriber {}", id);
                subscribers.remove(&id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        read_lock(&self.inner.subscribers).len()
    }

    fn set_callback(&self, callback: Option<ChangeCallback>) {
        let installed = callback.is_some();
        *write_lock(&self.inner.callback) = callback;
        if installed {
            debug!("Change callback installed");
        } else {
            debug!("Change callback cleared");
        }
    }

    fn subscribe(&self) -> ChangeSubscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        write_lock(&self.inner.subscribers).insert(id, sender);
        debug!("New change subscriber {}", id);

        ChangeSubscription {
            id,
            receiver,
            notifier: Arc::downgrade(&self.inner),
        }
    }
}

/// Cancellable observer of device changes
///
/// Dropping the subscription (or calling [`cancel`](Self::cancel)) removes it
/// from the registry.
#[derive(Debug)]
pub struct ChangeSubscription {
    id: u64,
    receiver: mpsc::Receiver<DeviceChanged>,
    notifier: Weak<NotifierInner>,
}

impl ChangeSubscription {
    /// Waits for the next change signal
    ///
    /// Returns `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<DeviceChanged> {
        self.receiver.recv().await
    }

    /// Returns a pending change signal without waiting
    pub fn try_recv(&mut self) -> Result<DeviceChanged, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn cancel(self) {}
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.notifier.upgrade() {
            write_lock(&inner.subscribers).remove(&self.id);
            debug!("Change subscriber {} cancelled", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::RawValue;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct FixedGamepad {
        id: String,
    }

    impl Gamepad for FixedGamepad {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            "fixed"
        }
        fn instance_id(&self) -> i32 {
            0
        }
        fn axis_count(&self) -> usize {
            2
        }
        fn button_count(&self) -> usize {
            1
        }
        fn hat_count(&self) -> usize {
            0
        }
        fn axis(&self, _index: usize) -> RawValue {
            7
        }
        fn button(&self, _index: usize) -> RawValue {
            1
        }
        fn hat(&self, _index: usize) -> RawValue {
            0
        }
        fn close(&self) {}
    }

    fn handle(id: &str) -> GamepadHandle {
        Arc::new(FixedGamepad { id: id.to_string() })
    }

    #[test]
    fn register_snapshot_unregister() {
        let registry = DeviceRegistry::new();
        let h = handle("r1");
        registry.register("r1", h.clone());

        let snapshot = registry.snapshot();
        assert!(Arc::ptr_eq(&snapshot["r1"], &h));

        assert!(registry.unregister("r1").is_some());
        assert!(!registry.snapshot().contains_key("r1"));
        assert!(registry.unregister("r1").is_none());
    }

    #[test]
    fn reregistration_overwrites() {
        let registry = DeviceRegistry::new();
        let first = handle("pad");
        let second = handle("pad");
        registry.register("pad", first.clone());
        registry.register("pad", second.clone());

        assert_eq!(registry.len(), 1);
        let current = registry.get("pad").expect("registered");
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
    }

    #[test]
    fn snapshot_is_independent() {
        let registry = DeviceRegistry::new();
        registry.register("a", handle("a"));

        let mut snapshot = registry.snapshot();
        snapshot.remove("a");
        snapshot.insert("b".to_string(), handle("b"));

        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn callback_is_replaced_not_chained() {
        let registry = DeviceRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        registry.set_change_callback(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let counter = second.clone();
        registry.set_change_callback(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        registry.notifier().notify("pad");
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        registry.set_change_callback(None);
        registry.notifier().notify("pad");
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_read_the_registry() {
        let registry = DeviceRegistry::new();
        registry.register("pad", handle("pad"));
        let seen = Arc::new(AtomicUsize::new(0));

        let inner = registry.clone();
        let counter = seen.clone();
        registry.set_change_callback(Some(Arc::new(move || {
            counter.fetch_add(inner.snapshot().len(), Ordering::SeqCst);
        })));

        registry.notifier().notify("pad");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_receives_each_signal() {
        let registry = DeviceRegistry::new();
        let mut subscription = registry.subscribe();

        registry.notifier().notify("a");
        registry.notifier().notify("b");

        assert_eq!(
            subscription.try_recv().expect("first signal").device_id,
            "a"
        );
        assert_eq!(
            subscription.try_recv().expect("second signal").device_id,
            "b"
        );
        assert!(subscription.try_recv().is_err());
    }

    #[test]
    fn full_subscription_coalesces() {
        let registry = DeviceRegistry::with_subscriber_capacity(2);
        let mut subscription = registry.subscribe();

        for _ in 0..5 {
            registry.notifier().notify("pad");
        }

        assert!(subscription.try_recv().is_ok());
        assert!(subscription.try_recv().is_ok());
        assert!(subscription.try_recv().is_err());
        assert_eq!(registry.notifier().subscriber_count(), 1);
    }

    #[test]
    fn dropped_subscription_is_removed() {
        let registry = DeviceRegistry::new();
        let subscription = registry.subscribe();
        let other = registry.subscribe();
        assert_eq!(registry.notifier().subscriber_count(), 2);

        subscription.cancel();
        assert_eq!(registry.notifier().subscriber_count(), 1);

        drop(other);
        assert_eq!(registry.notifier().subscriber_count(), 0);
        registry.notifier().notify("pad");
    }

    #[test]
    fn unregister_handle_keeps_a_replacement() {
        let registry = DeviceRegistry::new();
        let original = handle("pad");
        let replacement = handle("pad");
        registry.register("pad", original.clone());
        registry.register("pad", replacement.clone());

        assert!(!registry.unregister_handle("pad", &original));
        let current = registry.get("pad").expect("still registered");
        assert!(Arc::ptr_eq(&current, &replacement));

        assert!(registry.unregister_handle("pad", &replacement));
        assert!(registry.is_empty());
        assert!(!registry.unregister_handle("pad", &replacement));
    }
}
