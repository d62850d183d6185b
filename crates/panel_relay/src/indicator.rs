use crate::*;

use std::sync::Arc;

/// A panel indicator showing the last message, with the enable/disable lifecycle a desktop shell
/// drives its extensions with.
///
/// Enabling creates a fresh [`DisplayState`] and subscribes to the bus. Disabling unsubscribes
/// first and only then drops the display, so no message can reach a display that is gone.
pub struct Indicator<B: SignalBus + Clone> {
    bus: B,
    filter: SignalFilter,
    initial_text: String,
    relay: Option<Relay<B, DisplayState>>,
}

impl<B: SignalBus + Clone> Indicator<B> {
    pub fn new(bus: B, filter: SignalFilter) -> Self {
        Self { bus, filter, initial_text: names::INITIAL_MESSAGE.to_string(), relay: None }
    }

    /// Text to show after enabling, before any message was received.
    pub fn with_initial_text(mut self, text: impl Into<String>) -> Self {
        self.initial_text = text.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.relay.is_some()
    }

    /// The display of the enabled indicator.
    pub fn display(&self) -> Option<&DisplayState> {
        self.relay.as_ref().map(|relay| relay.sink().as_ref())
    }

    pub async fn enable(&mut self) -> Result<()> {
        if let Some(relay) = &self.relay {
            return Err(Error::AlreadySubscribed(relay.filter().map(ToString::to_string).unwrap_or_default()));
        }
        let display = Arc::new(DisplayState::new(self.initial_text.clone()));
        let mut relay = Relay::new(self.bus.clone(), display);
        relay.start(self.filter.clone()).await?;
        self.relay = Some(relay);
        log::debug!("Indicator enabled");
        Ok(())
    }

    /// Does nothing when the indicator isn't enabled.
    pub fn disable(&mut self) {
        if let Some(mut relay) = self.relay.take() {
            relay.stop();
            drop(relay);
            log::debug!("Indicator disabled");
        }
    }
}
