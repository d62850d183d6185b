use crate::names;

/// Something that shows the current message, like a label in a panel.
///
/// Implementations must not block and must accept any string, including empty ones. Messages are
/// passed on exactly as they were received; truncating them is up to the sink.
pub trait DisplaySink: Send + Sync {
    fn set_text(&self, message: &str);
}

/// The last message that was received.
///
/// Every call to [`DisplaySink::set_text`] replaces the previous value; nothing is queued.
/// Interested parties can [`subscribe`](DisplayState::subscribe) to be woken up on changes.
#[derive(Debug)]
pub struct DisplayState {
    text: tokio::sync::watch::Sender<String>,
}

impl DisplayState {
    pub fn new(initial: impl Into<String>) -> Self {
        let (text, _) = tokio::sync::watch::channel(initial.into());
        Self { text }
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    /// A receiver that always observes the latest message. Intermediate values may be skipped.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<String> {
        self.text.subscribe()
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new(names::INITIAL_MESSAGE)
    }
}

impl DisplaySink for DisplayState {
    fn set_text(&self, message: &str) {
        self.text.send_replace(message.to_owned());
    }
}
