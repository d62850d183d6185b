//! Daemon announcing the active layer of QMK keyboards as panel messages.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::{Context, Result};
use panel_relay::SignalFilter;
use tokio_util::sync::CancellationToken;

use crate::paths::Paths;

pub mod keyboard;
pub mod status;

use keyboard::{HidDevice, Report};

#[derive(Debug, Clone)]
pub struct LayerdConfig {
    pub hid_dir: PathBuf,
    /// How long to wait before probing again when no keyboard was found.
    pub idle_timeout: Duration,
    pub probe_timeout: Duration,
    pub target: SignalFilter,
}

impl Default for LayerdConfig {
    fn default() -> Self {
        Self {
            hid_dir: PathBuf::from("/dev"),
            idle_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(1),
            target: SignalFilter::default(),
        }
    }
}

/// A keyboard as reported through the status socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardStatus {
    pub path: PathBuf,
    pub layer: u8,
}

/// The keyboards currently being watched, shared with the status socket.
#[derive(Debug, Clone, Default)]
pub struct KeyboardTable {
    // never held across an await
    keyboards: Arc<RwLock<Vec<KeyboardStatus>>>,
}

impl KeyboardTable {
    pub fn replace(&self, keyboards: Vec<KeyboardStatus>) {
        *self.keyboards.write().unwrap() = keyboards; // unwrap: lock poisoning is okay
    }

    pub fn set_layer(&self, path: &Path, layer: u8) {
        let mut keyboards = self.keyboards.write().unwrap(); // unwrap: lock poisoning is okay
        if let Some(keyboard) = keyboards.iter_mut().find(|kb| kb.path == path) {
            keyboard.layer = layer;
        }
    }

    pub fn snapshot(&self) -> Vec<KeyboardStatus> {
        self.keyboards.read().unwrap().clone() // unwrap: lock poisoning is okay
    }
}

/// Where layer changes end up.
pub trait LayerAnnouncer: Clone + Send + Sync + 'static {
    fn announce(&self, layer: u8) -> impl std::future::Future<Output = ()> + Send;
}

/// Sends layer changes to the panel indicators.
#[derive(Debug, Clone)]
struct BusAnnouncer {
    con: zbus::Connection,
    target: SignalFilter,
}

impl LayerAnnouncer for BusAnnouncer {
    async fn announce(&self, layer: u8) {
        let message = keyboard::layer_message(layer);
        crate::print_result_err!("while announcing layer", panel_relay::emit_message(&self.con, &self.target, &message).await);
    }
}

/// Run the daemon until SIGINT or SIGTERM is received.
pub async fn run(config: LayerdConfig, paths: &Paths) -> Result<()> {
    let signals = crate::util::ShutdownSignals::install().context("Failed to install signal handlers")?;
    let con = zbus::Connection::session().await.context("Failed to connect to the session bus")?;
    let announcer = BusAnnouncer { con, target: config.target.clone() };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            signals.wait().await;
            cancel.cancel();
        }
    });

    serve(config, announcer, paths.get_layerd_socket_file(), cancel).await
}

/// Watch keyboards and answer status requests on `socket_file` until `cancel` is triggered.
async fn serve<A: LayerAnnouncer>(config: LayerdConfig, announcer: A, socket_file: &Path, cancel: CancellationToken) -> Result<()> {
    let _ = std::fs::remove_file(socket_file);
    let listener = tokio::net::UnixListener::bind(socket_file)
        .with_context(|| format!("Failed to create status socket at {}", socket_file.display()))?;
    log::info!("listening on {}", socket_file.display());

    let layerd = Layerd { config, announcer, keyboards: KeyboardTable::default() };
    let status_server = tokio::spawn(status::serve(listener, layerd.keyboards.clone(), cancel.clone()));

    tokio::select! {
        _ = layerd.watch_keyboards() => {}
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();

    crate::print_result_err!("while stopping the status socket", status_server.await);
    let _ = std::fs::remove_file(socket_file);
    Ok(())
}

struct Layerd<A> {
    config: LayerdConfig,
    announcer: A,
    keyboards: KeyboardTable,
}

impl<A: LayerAnnouncer> Layerd<A> {
    /// Probe for keyboards and follow their layer changes. Starts over whenever a keyboard is lost.
    async fn watch_keyboards(&self) {
        loop {
            let found = self.probe_all().await;
            self.keyboards
                .replace(found.iter().map(|(device, layer)| KeyboardStatus { path: device.path().to_path_buf(), layer: *layer }).collect());
            log::info!("found {} devices. Timeout is at {} seconds.", found.len(), self.config.idle_timeout.as_secs_f32());

            if found.is_empty() {
                tokio::time::sleep(self.config.idle_timeout).await;
                continue;
            }

            let mut followers = tokio::task::JoinSet::new();
            for (device, _) in found {
                followers.spawn(follow_keyboard(device, self.announcer.clone(), self.keyboards.clone(), self.config.idle_timeout));
            }
            match followers.join_next().await {
                Some(Ok(Err(e))) => log::warn!("{:?}", e),
                Some(Err(e)) => log::error!("keyboard task failed: {}", e),
                Some(Ok(Ok(()))) | None => {}
            }
            followers.shutdown().await;
        }
    }

    /// Probe every hidraw device concurrently and announce the layer of each keyboard found.
    async fn probe_all(&self) -> Vec<(HidDevice, u8)> {
        let paths = match keyboard::list_hidraw_devices(&self.config.hid_dir) {
            Ok(paths) => paths,
            Err(e) => {
                log::error!("Failed to open {}: {}", self.config.hid_dir.display(), e);
                return Vec::new();
            }
        };

        let mut probes = tokio::task::JoinSet::new();
        for path in paths {
            let timeout = self.config.probe_timeout;
            probes.spawn(async move { (path.clone(), keyboard::probe(path, timeout).await) });
        }

        let mut found = Vec::new();
        while let Some(probed) = probes.join_next().await {
            match probed {
                Ok((_, Ok(Some((device, layer))))) => {
                    log::info!("probed {}\tlayer: {}", device.path().display(), layer);
                    self.announcer.announce(layer).await;
                    found.push((device, layer));
                }
                Ok((path, Ok(None))) => log::debug!("probed {}\tnot a layered keyboard", path.display()),
                Ok((path, Err(e))) => log::debug!("probed {}\tfailed: {}", path.display(), e),
                Err(e) => log::error!("probe task failed: {}", e),
            }
        }
        found.sort_by(|(a, _), (b, _)| a.path().cmp(b.path()));
        found
    }
}

/// Follow the layer changes of a single keyboard. Only returns once the device can't be read anymore.
async fn follow_keyboard<A: LayerAnnouncer>(device: HidDevice, announcer: A, keyboards: KeyboardTable, idle_timeout: Duration) -> Result<()> {
    loop {
        let data = match tokio::time::timeout(idle_timeout, device.read_report()).await {
            Ok(data) => data.with_context(|| format!("Device {} lost", device.path().display()))?,
            Err(_) => {
                log::debug!("{}\tno report within {} seconds", device.path().display(), idle_timeout.as_secs_f32());
                continue;
            }
        };

        match Report::parse(&data) {
            Report::Layer(layer) => {
                log::info!("{}\tlayer: {}", device.path().display(), layer);
                keyboards.set_layer(device.path(), layer);
                announcer.announce(layer).await;
            }
            Report::Unknown { kind, size } => {
                log::warn!("{}\tunknown message: {:?}\tsize: {}", device.path().display(), kind as char, size)
            }
        }
    }
}
