//! Well-known values shared with every existing publisher of panel messages.

pub const OBJECT_PATH: &str = "/de/nichtsfrei/PanelMessage";
pub const INTERFACE_NAME: &str = "de.nichtsfrei.PanelMessage";
pub const SIGNAL_NAME: &str = "Message";

/// Shown until the first message arrives.
pub const INITIAL_MESSAGE: &str = "L: Base";
