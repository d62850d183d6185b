use crate::*;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Forwards the message of every matching signal to a [`DisplaySink`].
///
/// A relay is either idle or subscribed to exactly one signal. Signals that can't be decoded are
/// logged and otherwise ignored, so the sink keeps showing the previous message.
pub struct Relay<B: SignalBus, S: DisplaySink + 'static> {
    bus: B,
    sink: Arc<S>,
    subscription: Option<Subscription<B::Handle>>,
}

struct Subscription<H> {
    filter: SignalFilter,
    handle: H,
    /// Shared with the registered handler, cleared before the handler is unregistered.
    active: Arc<AtomicBool>,
}

impl<B: SignalBus, S: DisplaySink + 'static> Relay<B, S> {
    pub fn new(bus: B, sink: Arc<S>) -> Self {
        Self { bus, sink, subscription: None }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// The filter of the current subscription, if there is one.
    pub fn filter(&self) -> Option<&SignalFilter> {
        self.subscription.as_ref().map(|sub| &sub.filter)
    }

    /// Subscribe to the signals matching `filter`.
    ///
    /// Fails with [`Error::AlreadySubscribed`] if the relay is already subscribed; the existing
    /// subscription is kept in that case.
    pub async fn start(&mut self, filter: SignalFilter) -> Result<()> {
        if let Some(sub) = &self.subscription {
            return Err(Error::AlreadySubscribed(sub.filter.to_string()));
        }

        let active = Arc::new(AtomicBool::new(true));
        let handler: SignalHandler = {
            let active = active.clone();
            let sink = self.sink.clone();
            Arc::new(move |envelope: &zbus::Message| dispatch(&active, sink.as_ref(), envelope))
        };
        let handle = self.bus.subscribe(&filter, handler).await?;
        log::info!("Subscribed to {}", filter);

        self.subscription = Some(Subscription { filter, handle, active });
        Ok(())
    }

    /// Handle a single received signal, exactly like the registered bus handler does.
    ///
    /// Signals arriving while the relay is idle are dropped.
    pub fn on_event(&self, envelope: &zbus::Message) {
        match &self.subscription {
            Some(sub) => dispatch(&sub.active, self.sink.as_ref(), envelope),
            None => log::debug!("Dropping signal received while not subscribed"),
        }
    }

    /// Unsubscribe. Once this returns, the sink won't be given any new messages.
    ///
    /// Stopping an idle relay does nothing.
    pub fn stop(&mut self) {
        let Some(sub) = self.subscription.take() else {
            return;
        };
        sub.active.store(false, Ordering::Release);
        self.bus.unsubscribe(sub.handle);
        log::info!("Unsubscribed from {}", sub.filter);
    }
}

impl<B: SignalBus, S: DisplaySink + 'static> Drop for Relay<B, S> {
    fn drop(&mut self) {
        if self.is_active() {
            log::warn!("Relay dropped while still subscribed, unsubscribing now");
            self.stop();
        }
    }
}

impl<B: SignalBus + std::fmt::Debug, S: DisplaySink + std::fmt::Debug + 'static> std::fmt::Debug for Relay<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay").field("bus", &self.bus).field("sink", &self.sink).field("filter", &self.filter()).finish()
    }
}

fn dispatch<S: DisplaySink + ?Sized>(active: &AtomicBool, sink: &S, envelope: &zbus::Message) {
    // a delivery may still be in flight while unsubscribing
    if !active.load(Ordering::Acquire) {
        log::debug!("Dropping signal received after unsubscribing");
        return;
    }
    match decode(envelope) {
        Ok(message) => {
            log::debug!("Received message {:?}", message);
            sink.set_text(&message);
        }
        Err(e) => log::warn!("Failed to parse D-Bus signal: {}", e),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn relay() -> (LocalBus, Relay<LocalBus, DisplayState>) {
        let bus = LocalBus::new();
        let relay = Relay::new(bus.clone(), Arc::new(DisplayState::default()));
        (bus, relay)
    }

    fn publish<B>(bus: &LocalBus, body: &B) -> usize
    where
        B: serde::ser::Serialize + zbus::zvariant::DynamicType,
    {
        bus.publish(Some(":1.23"), &signal_message(&SignalFilter::default(), body).unwrap())
    }

    /// Keeps every handler it was given, even after unsubscribing, to simulate late deliveries.
    #[derive(Default)]
    struct LeakyBus {
        handlers: Mutex<Vec<SignalHandler>>,
    }

    impl SignalBus for &LeakyBus {
        type Handle = ();

        async fn subscribe(&self, _filter: &SignalFilter, handler: SignalHandler) -> Result<()> {
            self.handlers.lock().unwrap().push(handler);
            Ok(())
        }

        fn unsubscribe(&self, _handle: ()) {}
    }

    #[tokio::test]
    async fn test_forwards_message() {
        let (bus, mut relay) = relay();
        relay.start(SignalFilter::default()).await.unwrap();
        assert!(relay.is_active());

        assert_eq!(publish(&bus, &("Caps: ON",)), 1);
        assert_eq!(relay.sink().text(), "Caps: ON");

        assert_eq!(publish(&bus, &("",)), 1);
        assert_eq!(relay.sink().text(), "");
        relay.stop();
    }

    #[tokio::test]
    async fn test_ignores_malformed_signals() {
        let (bus, mut relay) = relay();
        relay.start(SignalFilter::default()).await.unwrap();

        let empty = signal_message(&SignalFilter::default(), &()).unwrap();
        assert_eq!(decode(&empty), Err(DecodeError::Empty));
        assert_eq!(bus.publish(Some(":1.23"), &empty), 1);
        assert_eq!(relay.sink().text(), "L: Base");

        let number = signal_message(&SignalFilter::default(), &(42i32,)).unwrap();
        assert_eq!(decode(&number), Err(DecodeError::WrongType { found: "i".to_string() }));
        assert_eq!(bus.publish(Some(":1.23"), &number), 1);
        assert_eq!(relay.sink().text(), "L: Base");

        let garbled = crate::decode::test::invalid_utf8_message();
        assert!(matches!(decode(&garbled), Err(DecodeError::Malformed(_))));
        assert_eq!(bus.publish(Some(":1.23"), &garbled), 1);
        assert_eq!(relay.sink().text(), "L: Base");

        publish(&bus, &("L: 1",));
        publish(&bus, &(true, "L: 2"));
        assert_eq!(relay.sink().text(), "L: 1");
        relay.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (bus, mut relay) = relay();
        relay.stop();
        relay.start(SignalFilter::default()).await.unwrap();
        publish(&bus, &("L: 1",));

        relay.stop();
        relay.stop();
        assert!(!relay.is_active());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(relay.sink().text(), "L: 1");
    }

    #[tokio::test]
    async fn test_nothing_delivered_after_stop() {
        let (bus, mut relay) = relay();
        relay.start(SignalFilter::default()).await.unwrap();
        relay.stop();

        assert_eq!(publish(&bus, &("L: 4",)), 0);
        relay.on_event(&signal_message(&SignalFilter::default(), &("L: 4",)).unwrap());
        assert_eq!(relay.sink().text(), "L: Base");
    }

    #[tokio::test]
    async fn test_late_callback_after_stop() {
        let bus = LeakyBus::default();
        let mut relay = Relay::new(&bus, Arc::new(DisplayState::default()));
        relay.start(SignalFilter::default()).await.unwrap();

        let msg = signal_message(&SignalFilter::default(), &("early",)).unwrap();
        let handler = bus.handlers.lock().unwrap()[0].clone();
        handler(&msg);
        assert_eq!(relay.sink().text(), "early");

        relay.stop();
        let msg = signal_message(&SignalFilter::default(), &("late",)).unwrap();
        handler(&msg);
        assert_eq!(relay.sink().text(), "early");
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let (bus, mut relay) = relay();
        relay.start(SignalFilter::default()).await.unwrap();

        let other = SignalFilter { signal: "Other".to_string(), ..Default::default() };
        let result = relay.start(other).await;
        assert!(matches!(result, Err(Error::AlreadySubscribed(_))));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(relay.filter(), Some(&SignalFilter::default()));

        publish(&bus, &("still here",));
        assert_eq!(relay.sink().text(), "still here");
        relay.stop();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (bus, mut relay) = relay();
        relay.start(SignalFilter::default()).await.unwrap();
        relay.stop();
        relay.start(SignalFilter::default()).await.unwrap();

        assert_eq!(publish(&bus, &("again",)), 1);
        assert_eq!(relay.sink().text(), "again");
        relay.stop();
    }

    #[tokio::test]
    async fn test_sender_filter() {
        let (bus, mut relay) = relay();
        let filter = SignalFilter { sender: Some(":1.5".to_string()), ..Default::default() };
        relay.start(filter.clone()).await.unwrap();

        let msg = signal_message(&filter, &("from someone else",)).unwrap();
        assert_eq!(bus.publish(Some(":1.6"), &msg), 0);
        let msg = signal_message(&filter, &("trusted",)).unwrap();
        assert_eq!(bus.publish(Some(":1.5"), &msg), 1);
        assert_eq!(relay.sink().text(), "trusted");
        relay.stop();
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (bus, mut relay) = relay();
        relay.start(SignalFilter::default()).await.unwrap();
        drop(relay);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
