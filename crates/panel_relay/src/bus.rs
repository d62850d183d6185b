use crate::*;

use futures::StreamExt;
use std::sync::{Arc, Mutex};

/// Callback invoked once for every signal matching a subscription, in delivery order.
pub type SignalHandler = Arc<dyn Fn(&zbus::Message) + Send + Sync>;

/// A message bus that signal handlers can be registered on.
#[allow(async_fn_in_trait)]
pub trait SignalBus {
    /// Identifies a registered handler so it can be removed again.
    type Handle;

    /// Register `handler` for every signal matching `filter`. Once this returns, matching
    /// signals are delivered.
    async fn subscribe(&self, filter: &SignalFilter, handler: SignalHandler) -> Result<Self::Handle>;

    /// Remove a handler. No new deliveries are started once this returns.
    fn unsubscribe(&self, handle: Self::Handle);
}

/// [`SignalBus`] on top of a dbus connection.
///
/// Every subscription adds a match rule to the bus daemon and runs a task that forwards the
/// matching messages to its handler.
#[derive(Debug, Clone)]
pub struct DbusBus {
    con: zbus::Connection,
}

impl DbusBus {
    pub fn new(con: zbus::Connection) -> Self {
        Self { con }
    }

    /// Connect to the session bus.
    pub async fn session() -> Result<Self> {
        Ok(Self::new(zbus::Connection::session().await?))
    }
}

impl SignalBus for DbusBus {
    type Handle = tokio::task::JoinHandle<()>;

    async fn subscribe(&self, filter: &SignalFilter, handler: SignalHandler) -> Result<Self::Handle> {
        let rule = filter.match_rule()?;
        // the match rule is registered with the daemon before this returns
        let mut stream = zbus::MessageStream::for_match_rule(rule, &self.con, None).await?;
        let description = filter.to_string();
        log::debug!("listening for {}", description);

        Ok(tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(msg) => handler(&*msg),
                    Err(e) => log::warn!("Error while receiving {}: {}", description, e),
                }
            }
            log::debug!("signal stream for {} ended", description);
        }))
    }

    fn unsubscribe(&self, handle: Self::Handle) {
        // dropping the stream inside the task removes the match rule again
        handle.abort();
    }
}

/// A [`SignalBus`] that only exists within this process.
///
/// Messages given to [`LocalBus::publish`] are delivered synchronously on the calling thread, to
/// every handler whose filter matches.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Mutex<LocalBusInner>>,
}

#[derive(Default)]
struct LocalBusInner {
    next_id: u64,
    subscribers: Vec<(LocalSubscription, SignalFilter, SignalHandler)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSubscription(u64);

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `msg` as if it was sent by `sender`. Returns how many handlers received it.
    pub fn publish(&self, sender: Option<&str>, msg: &zbus::Message) -> usize {
        let handlers: Vec<SignalHandler> = {
            let inner = self.inner.lock().unwrap(); // unwrap: mutex poisoning is okay
            inner
                .subscribers
                .iter()
                .filter(|(_, filter, _)| filter.matches(sender, msg))
                .map(|(_, _, handler)| handler.clone())
                .collect()
        };
        // not holding the lock here, handlers may subscribe or unsubscribe themselves
        for handler in &handlers {
            handler(msg);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len() // unwrap: mutex poisoning is okay
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus").field("subscribers", &self.subscriber_count()).finish()
    }
}

impl SignalBus for LocalBus {
    type Handle = LocalSubscription;

    async fn subscribe(&self, filter: &SignalFilter, handler: SignalHandler) -> Result<Self::Handle> {
        let mut inner = self.inner.lock().unwrap(); // unwrap: mutex poisoning is okay
        let id = LocalSubscription(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push((id, filter.clone(), handler));
        Ok(id)
    }

    fn unsubscribe(&self, handle: Self::Handle) {
        let mut inner = self.inner.lock().unwrap(); // unwrap: mutex poisoning is okay
        inner.subscribers.retain(|(id, _, _)| *id != handle);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler() -> (Arc<AtomicUsize>, SignalHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler: SignalHandler = {
            let count = count.clone();
            Arc::new(move |_: &zbus::Message| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, handler)
    }

    #[tokio::test]
    async fn test_local_bus_routing() {
        let bus = LocalBus::new();
        let filter = SignalFilter::default();
        let (count, handler) = counting_handler();
        let sub = bus.subscribe(&filter, handler).await.unwrap();

        let msg = signal_message(&filter, &("a",)).unwrap();
        assert_eq!(bus.publish(Some(":1.1"), &msg), 1);

        let elsewhere = SignalFilter { object_path: "/somewhere/Else".to_string(), ..Default::default() };
        let msg = signal_message(&elsewhere, &("b",)).unwrap();
        assert_eq!(bus.publish(Some(":1.1"), &msg), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        bus.unsubscribe(sub);
        assert_eq!(bus.subscriber_count(), 0);
        let msg = signal_message(&filter, &("c",)).unwrap();
        assert_eq!(bus.publish(None, &msg), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_bus_unsubscribe_only_removes_own_handler() {
        let bus = LocalBus::new();
        let filter = SignalFilter::default();
        let (first_count, first) = counting_handler();
        let (second_count, second) = counting_handler();
        let first = bus.subscribe(&filter, first).await.unwrap();
        bus.subscribe(&filter, second).await.unwrap();

        bus.unsubscribe(first);
        bus.unsubscribe(first);
        let msg = signal_message(&filter, &("x",)).unwrap();
        assert_eq!(bus.publish(None, &msg), 1);
        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }
}
