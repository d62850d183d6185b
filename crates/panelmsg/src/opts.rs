use clap::{Args, Parser, Subcommand};
use panel_relay::{names, SignalFilter};
use std::path::PathBuf;

/// Struct that gets generated from `RawOpt`.
#[derive(Debug, PartialEq)]
pub struct Opt {
    pub log_debug: bool,
    pub action: Action,
}

#[derive(Parser, Debug, PartialEq)]
#[command(version, about)]
pub(super) struct RawOpt {
    /// Write out debug logs.
    #[arg(long = "debug", global = true)]
    log_debug: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Action {
    /// Generate a shell completion script
    ShellCompletions {
        #[arg(short, long)]
        shell: clap_complete::Shell,
    },

    /// Print the current panel message, and every following one, on its own line.
    ///
    /// Meant to be used as the source of a status bar widget that displays the last line a command printed.
    #[command(name = "listen", alias = "l")]
    Listen {
        /// Only accept messages sent by this bus name. By default, any process on the session bus may send messages.
        #[arg(long)]
        sender: Option<String>,

        /// Text to show until the first message arrives.
        #[arg(long, default_value = names::INITIAL_MESSAGE)]
        initial: String,

        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Send a message to every listening panel indicator.
    #[command(name = "send", alias = "s")]
    Send {
        message: String,

        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Watch QMK keyboards for layer changes and announce the active layer as a panel message.
    #[command(name = "layerd")]
    Layerd {
        /// Directory that contains the hidraw devices.
        #[arg(long, default_value = "/dev")]
        hid_dir: PathBuf,

        /// Seconds to wait before probing for keyboards again if none were found.
        #[arg(long, default_value_t = 30)]
        idle_timeout: u64,
    },

    /// Print the keyboards known to a running layerd, together with their active layer.
    #[command(name = "layers")]
    Layers,
}

/// The signal panel messages are sent as.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct SignalArgs {
    /// Object path of the signal.
    #[arg(long, default_value = names::OBJECT_PATH)]
    path: String,

    /// Interface of the signal.
    #[arg(long, default_value = names::INTERFACE_NAME)]
    interface: String,

    /// Name of the signal.
    #[arg(long, default_value = names::SIGNAL_NAME)]
    signal: String,
}

impl SignalArgs {
    pub fn into_filter(self, sender: Option<String>) -> SignalFilter {
        let SignalArgs { path, interface, signal } = self;
        SignalFilter { sender, interface, signal, object_path: path }
    }
}

impl Opt {
    pub fn from_env() -> Self {
        let raw: RawOpt = RawOpt::parse();
        raw.into()
    }
}

impl From<RawOpt> for Opt {
    fn from(other: RawOpt) -> Self {
        let RawOpt { log_debug, action } = other;
        Opt { log_debug, action }
    }
}
