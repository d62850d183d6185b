use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Dbus connection error")]
    DbusError(#[from] zbus::Error),
    #[error("Relay is already subscribed to {0}")]
    AlreadySubscribed(String),
}

/// Why a received signal could not be turned into a display message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("signal carried no arguments")]
    Empty,
    #[error("expected a string as first argument, got a value of type `{found}`")]
    WrongType { found: String },
    #[error("could not unpack signal body: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
