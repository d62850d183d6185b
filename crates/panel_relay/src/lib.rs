//! Relay the most recent message broadcast on the session bus into a panel indicator.
//!
//! A [`Relay`] subscribes to a single signal, decodes its one string argument and hands it to a
//! [`DisplaySink`]. The sink only ever holds the last message it received.

pub mod names;

mod bus;
pub use bus::*;

mod decode;
pub use decode::*;

mod error;
pub use error::*;

mod filter;
pub use filter::*;

mod indicator;
pub use indicator::*;

mod publish;
pub use publish::*;

mod relay;
pub use relay::*;

mod sink;
pub use sink::*;
