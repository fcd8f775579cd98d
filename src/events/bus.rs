//! Typed, priority-ordered publish/subscribe

use crate::error::{FormError, Result};
use crate::sync::lock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Listener ceiling per event before a leak warning is logged
pub const DEFAULT_MAX_LISTENERS: usize = 100;

/// Boxed future returned by async listeners and handlers
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// An event carried by an [`EventBus`].
///
/// Every event names its kind so listeners can subscribe to one variant of
/// a closed event enum.
pub trait BusEvent: Clone + Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type SyncListener<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;
type AsyncListener<E> = Arc<dyn Fn(E) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

enum Callback<E> {
    Sync(SyncListener<E>),
    Async(AsyncListener<E>),
}

impl<E> Clone for Callback<E> {
    fn clone(&self) -> Self {
        match self {
            Callback::Sync(f) => Callback::Sync(Arc::clone(f)),
            Callback::Async(f) => Callback::Async(Arc::clone(f)),
        }
    }
}

/// Identifies one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct ListenerEntry<E> {
    id: ListenerId,
    priority: i32,
    once: bool,
    callback: Callback<E>,
}

impl<E> Clone for ListenerEntry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            priority: self.priority,
            once: self.once,
            callback: self.callback.clone(),
        }
    }
}

struct BusInner<E: BusEvent> {
    listeners: HashMap<E::Kind, Vec<ListenerEntry<E>>>,
    max_listeners: usize,
    destroyed: bool,
}

impl<E: BusEvent> BusInner<E> {
    fn remove(&mut self, kind: E::Kind, id: ListenerId) {
        if let Some(entries) = self.listeners.get_mut(&kind) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                self.listeners.remove(&kind);
            }
        }
    }
}

/// Handle returned by [`EventBus::on`]; call [`Subscription::unsubscribe`]
/// to remove the listener. Dropping the handle keeps the listener alive.
pub struct Subscription<E: BusEvent> {
    kind: E::Kind,
    id: ListenerId,
    bus: Weak<Mutex<BusInner<E>>>,
}

impl<E: BusEvent> Subscription<E> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn kind(&self) -> E::Kind {
        self.kind
    }

    /// Remove the listener. A no-op if the bus is gone or destroyed.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut inner = lock(&inner);
            if !inner.destroyed {
                inner.remove(self.kind, self.id);
            }
        }
    }
}

impl<E: BusEvent> fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

/// Publish/subscribe bus over a closed event type.
///
/// Listeners for one event run in descending priority order; ties keep
/// registration order. A failing listener is logged and its siblings still
/// run.
pub struct EventBus<E: BusEvent> {
    inner: Arc<Mutex<BusInner<E>>>,
    next_id: AtomicU64,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("EventBus")
            .field("events", &inner.listeners.len())
            .field("max_listeners", &inner.max_listeners)
            .field("destroyed", &inner.destroyed)
            .finish()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::with_max_listeners(DEFAULT_MAX_LISTENERS)
    }

    pub fn with_max_listeners(max_listeners: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                listeners: HashMap::new(),
                max_listeners,
                destroyed: false,
            })),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener with priority 0
    pub fn on<F>(&self, kind: E::Kind, listener: F) -> Result<Subscription<E>>
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_with_priority(kind, 0, listener)
    }

    /// Register a listener; higher priorities run first
    pub fn on_with_priority<F>(
        &self,
        kind: E::Kind,
        priority: i32,
        listener: F,
    ) -> Result<Subscription<E>>
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_listener(kind, priority, false, Callback::Sync(Arc::new(listener)))
    }

    /// Register a listener that is removed after its first invocation
    pub fn once<F>(&self, kind: E::Kind, listener: F) -> Result<Subscription<E>>
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.once_with_priority(kind, 0, listener)
    }

    pub fn once_with_priority<F>(
        &self,
        kind: E::Kind,
        priority: i32,
        listener: F,
    ) -> Result<Subscription<E>>
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_listener(kind, priority, true, Callback::Sync(Arc::new(listener)))
    }

    /// Register an async listener. [`EventBus::emit`] awaits it in order;
    /// [`EventBus::emit_sync`] spawns it on the current tokio runtime.
    pub fn on_async<F, Fut>(
        &self,
        kind: E::Kind,
        priority: i32,
        listener: F,
    ) -> Result<Subscription<E>>
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback: AsyncListener<E> =
            Arc::new(move |event| -> BoxFuture<anyhow::Result<()>> { Box::pin(listener(event)) });
        self.add_listener(kind, priority, false, Callback::Async(callback))
    }

    fn add_listener(
        &self,
        kind: E::Kind,
        priority: i32,
        once: bool,
        callback: Callback<E>,
    ) -> Result<Subscription<E>> {
        let mut inner = lock(&self.inner);
        if inner.destroyed {
            return Err(FormError::Destroyed("event bus"));
        }

        let max_listeners = inner.max_listeners;
        let entries = inner.listeners.entry(kind).or_default();
        if entries.len() >= max_listeners {
            tracing::warn!(
                "max listeners ({max_listeners}) for event {kind:?} exceeded; this might indicate a leak"
            );
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.push(ListenerEntry {
            id,
            priority,
            once,
            callback,
        });

        Ok(Subscription {
            kind,
            id,
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Remove one listener, or every listener of `kind` when `id` is `None`
    pub fn off(&self, kind: E::Kind, id: Option<ListenerId>) {
        let mut inner = lock(&self.inner);
        if inner.destroyed {
            return;
        }
        match id {
            Some(id) => inner.remove(kind, id),
            None => {
                inner.listeners.remove(&kind);
            }
        }
    }

    /// Listeners for `kind` in dispatch order
    fn dispatch_order(&self, kind: E::Kind) -> Vec<ListenerEntry<E>> {
        let inner = lock(&self.inner);
        if inner.destroyed {
            return Vec::new();
        }
        let mut entries = inner.listeners.get(&kind).cloned().unwrap_or_default();
        // stable sort keeps registration order for equal priorities
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        entries
    }

    fn remove_fired_once(&self, kind: E::Kind, fired: &[ListenerId]) {
        if fired.is_empty() {
            return;
        }
        let mut inner = lock(&self.inner);
        for id in fired {
            inner.remove(kind, *id);
        }
    }

    /// Dispatch `event`, awaiting async listeners one after another
    pub async fn emit(&self, event: E) {
        let kind = event.kind();
        let entries = self.dispatch_order(kind);
        if entries.is_empty() {
            return;
        }

        let mut fired = Vec::new();
        for entry in &entries {
            let outcome = match &entry.callback {
                Callback::Sync(f) => f(&event),
                Callback::Async(f) => f(event.clone()).await,
            };
            if let Err(err) = outcome {
                tracing::error!("error in event listener for {kind:?}: {err:#}");
            }
            if entry.once {
                fired.push(entry.id);
            }
        }

        self.remove_fired_once(kind, &fired);
    }

    /// Dispatch `event` without awaiting anything.
    ///
    /// Async listeners are spawned on the current tokio runtime; without a
    /// runtime they are skipped with a warning.
    pub fn emit_sync(&self, event: E) {
        let kind = event.kind();
        let entries = self.dispatch_order(kind);
        if entries.is_empty() {
            return;
        }

        let mut fired = Vec::new();
        for entry in &entries {
            match &entry.callback {
                Callback::Sync(f) => {
                    if let Err(err) = f(&event) {
                        tracing::error!("error in event listener for {kind:?}: {err:#}");
                    }
                }
                Callback::Async(f) => match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let fut = f(event.clone());
                        handle.spawn(async move {
                            if let Err(err) = fut.await {
                                tracing::error!("error in event listener for {kind:?}: {err:#}");
                            }
                        });
                    }
                    Err(_) => {
                        tracing::warn!("no async runtime; skipping async listener for {kind:?}");
                    }
                },
            }
            if entry.once {
                fired.push(entry.id);
            }
        }

        self.remove_fired_once(kind, &fired);
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        lock(&self.inner)
            .listeners
            .get(&kind)
            .map_or(0, |entries| entries.len())
    }

    /// Kinds that currently have at least one listener
    pub fn event_kinds(&self) -> Vec<E::Kind> {
        lock(&self.inner).listeners.keys().copied().collect()
    }

    pub fn remove_all_listeners(&self, kind: Option<E::Kind>) {
        let mut inner = lock(&self.inner);
        match kind {
            Some(kind) => {
                inner.listeners.remove(&kind);
            }
            None => inner.listeners.clear(),
        }
    }

    /// Drop every listener. Later `on`/`once` calls fail; `off` and `emit`
    /// become no-ops.
    pub fn destroy(&self) {
        let mut inner = lock(&self.inner);
        inner.listeners.clear();
        inner.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        lock(&self.inner).destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone)]
    enum TestEvent {
        Ping(u32),
        Pong,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestKind {
        Ping,
        Pong,
    }

    impl BusEvent for TestEvent {
        type Kind = TestKind;

        fn kind(&self) -> TestKind {
            match self {
                TestEvent::Ping(_) => TestKind::Ping,
                TestEvent::Pong => TestKind::Pong,
            }
        }
    }

    fn recorder() -> Arc<Mutex<Vec<i32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_listeners_run_in_descending_priority() {
        let bus = EventBus::<TestEvent>::new();
        let calls = recorder();
        for priority in [1, 3, 2] {
            let calls = Arc::clone(&calls);
            bus.on_with_priority(TestKind::Ping, priority, move |_| {
                calls.lock().unwrap().push(priority);
                Ok(())
            })
            .unwrap();
        }

        bus.emit_sync(TestEvent::Ping(1));

        assert_eq!(*calls.lock().unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_equal_priorities_keep_registration_order() {
        let bus = EventBus::<TestEvent>::new();
        let calls = recorder();
        for tag in [10, 20, 30] {
            let calls = Arc::clone(&calls);
            bus.on(TestKind::Ping, move |_| {
                calls.lock().unwrap().push(tag);
                Ok(())
            })
            .unwrap();
        }

        bus.emit_sync(TestEvent::Ping(0));

        assert_eq!(*calls.lock().unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_once_listener_fires_a_single_time() {
        let bus = EventBus::<TestEvent>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        bus.once(TestKind::Pong, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        bus.emit_sync(TestEvent::Pong);
        bus.emit_sync(TestEvent::Pong);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(TestKind::Pong), 0);
    }

    #[test]
    fn test_once_listener_removed_after_siblings_run() {
        let bus = Arc::new(EventBus::<TestEvent>::new());
        let counts = recorder();
        bus.once_with_priority(TestKind::Ping, 10, |_| Ok(())).unwrap();
        for _ in 0..2 {
            let counts = Arc::clone(&counts);
            let weak = Arc::downgrade(&bus);
            bus.on(TestKind::Ping, move |_| {
                if let Some(bus) = weak.upgrade() {
                    counts.lock().unwrap().push(bus.listener_count(TestKind::Ping) as i32);
                }
                Ok(())
            })
            .unwrap();
        }

        bus.emit_sync(TestEvent::Ping(0));
        assert_eq!(*counts.lock().unwrap(), vec![3, 3]);
        assert_eq!(bus.listener_count(TestKind::Ping), 2);

        bus.emit_sync(TestEvent::Ping(1));
        assert_eq!(*counts.lock().unwrap(), vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_failing_listener_does_not_stop_siblings() {
        let bus = EventBus::<TestEvent>::new();
        let calls = recorder();
        bus.on_with_priority(TestKind::Ping, 5, |_| anyhow::bail!("boom"))
            .unwrap();
        let sink = Arc::clone(&calls);
        bus.on(TestKind::Ping, move |event| {
            if let TestEvent::Ping(n) = event {
                sink.lock().unwrap().push(*n as i32);
            }
            Ok(())
        })
        .unwrap();

        bus.emit_sync(TestEvent::Ping(7));

        assert_eq!(*calls.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_only_matching_kind_is_dispatched() {
        let bus = EventBus::<TestEvent>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        bus.on(TestKind::Pong, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        bus.emit_sync(TestEvent::Ping(1));

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_and_off() {
        let bus = EventBus::<TestEvent>::new();
        let first = bus.on(TestKind::Ping, |_| Ok(())).unwrap();
        let second = bus.on(TestKind::Ping, |_| Ok(())).unwrap();
        bus.on(TestKind::Pong, |_| Ok(())).unwrap();
        assert_eq!(bus.listener_count(TestKind::Ping), 2);

        first.unsubscribe();
        assert_eq!(bus.listener_count(TestKind::Ping), 1);

        bus.off(TestKind::Ping, Some(second.id()));
        assert_eq!(bus.listener_count(TestKind::Ping), 0);

        bus.off(TestKind::Pong, None);
        assert!(bus.event_kinds().is_empty());
    }

    #[test]
    fn test_destroyed_bus_rejects_new_listeners() {
        let bus = EventBus::<TestEvent>::new();
        bus.on(TestKind::Ping, |_| Ok(())).unwrap();
        bus.destroy();

        assert!(bus.is_destroyed());
        assert!(matches!(
            bus.on(TestKind::Ping, |_| Ok(())),
            Err(FormError::Destroyed(_))
        ));
        assert!(bus.once(TestKind::Ping, |_| Ok(())).is_err());

        // off and emit are silent no-ops
        bus.off(TestKind::Ping, None);
        bus.emit_sync(TestEvent::Ping(1));
        assert_eq!(bus.listener_count(TestKind::Ping), 0);
    }

    #[test]
    fn test_exceeding_max_listeners_still_registers() {
        let bus = EventBus::<TestEvent>::with_max_listeners(2);
        for _ in 0..3 {
            bus.on(TestKind::Ping, |_| Ok(())).unwrap();
        }
        assert_eq!(bus.listener_count(TestKind::Ping), 3);
    }

    #[tokio::test]
    async fn test_emit_awaits_async_listeners_in_order() {
        let bus = EventBus::<TestEvent>::new();
        let calls = recorder();

        let slow = Arc::clone(&calls);
        bus.on_async(TestKind::Ping, 2, move |_| {
            let slow = Arc::clone(&slow);
            async move {
                tokio::task::yield_now().await;
                slow.lock().unwrap().push(2);
                Ok(())
            }
        })
        .unwrap();
        let fast = Arc::clone(&calls);
        bus.on_with_priority(TestKind::Ping, 1, move |_| {
            fast.lock().unwrap().push(1);
            Ok(())
        })
        .unwrap();

        bus.emit(TestEvent::Ping(0)).await;

        assert_eq!(*calls.lock().unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_emit_sync_spawns_async_listeners() {
        let bus = EventBus::<TestEvent>::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        bus.on_async(TestKind::Ping, 0, move |event| {
            let tx = Arc::clone(&tx);
            async move {
                if let (TestEvent::Ping(n), Some(tx)) = (event, tx.lock().unwrap().take()) {
                    let _ = tx.send(n);
                }
                Ok(())
            }
        })
        .unwrap();

        bus.emit_sync(TestEvent::Ping(42));

        assert_eq!(rx.await.unwrap(), 42);
    }
}
