//! Talking to QMK keyboards over hidraw.
//!
//! The keyboard firmware answers a 32 byte request starting with `L` with a report starting with
//! `L`, `1` and ending in the active layer. On every layer change, it sends `L` followed by the new
//! layer in the last byte without being asked.

use std::{
    io::{self, Read, Write},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::io::unix::AsyncFd;

pub const REPORT_SIZE: usize = 32;
const LAYER_REPORT: u8 = b'L';
const HIDRAW_PREFIX: &str = "hidraw";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Layer(u8),
    Unknown { kind: u8, size: u8 },
}

impl Report {
    pub fn parse(data: &[u8; REPORT_SIZE]) -> Self {
        if data[0] == LAYER_REPORT {
            Report::Layer(data[REPORT_SIZE - 1])
        } else {
            Report::Unknown { kind: data[0], size: data[1] }
        }
    }
}

/// The request asking a keyboard for its active layer.
pub fn layer_request() -> [u8; REPORT_SIZE] {
    let mut data = [0u8; REPORT_SIZE];
    data[0] = LAYER_REPORT;
    data
}

/// Check whether `data` is a layered keyboard answering to [`layer_request`], and return the active layer if so.
pub fn parse_probe_response(data: &[u8; REPORT_SIZE]) -> Option<u8> {
    (data[0] == LAYER_REPORT && data[1] == 1).then_some(data[REPORT_SIZE - 1])
}

/// The panel message announcing `layer`.
pub fn layer_message(layer: u8) -> String {
    format!("L: {}", layer)
}

/// All hidraw device nodes in `dir`, sorted by path.
pub fn list_hidraw_devices(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut devices = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(HIDRAW_PREFIX) {
            devices.push(entry.path());
        }
    }
    devices.sort();
    Ok(devices)
}

/// A hidraw device node, opened non-blocking and driven by the tokio reactor.
#[derive(Debug)]
pub struct HidDevice {
    path: PathBuf,
    fd: AsyncFd<std::fs::File>,
}

impl HidDevice {
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(&path)?;
        Self::from_file(path, file)
    }

    /// Wrap an already opened device. `file` has to be in non-blocking mode.
    pub fn from_file(path: PathBuf, file: std::fs::File) -> io::Result<Self> {
        Ok(Self { path, fd: AsyncFd::new(file)? })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_report(&self, data: &[u8; REPORT_SIZE]) -> io::Result<()> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| inner.get_ref().write(data)) {
                Ok(Ok(written)) if written == data.len() => return Ok(()),
                Ok(Ok(written)) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, format!("only wrote {} of {} bytes", written, data.len())))
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }

    /// Wait for the next report. Shorter reports are padded with zeroes.
    pub async fn read_report(&self) -> io::Result<[u8; REPORT_SIZE]> {
        let mut data = [0u8; REPORT_SIZE];
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| inner.get_ref().read(&mut data)) {
                Ok(Ok(0)) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "device was closed")),
                Ok(Ok(_)) => return Ok(data),
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }
}

/// Ask the device at `path` for its active layer.
///
/// Returns `None` if the device didn't answer within `timeout`, or isn't a layered keyboard.
pub async fn probe(path: PathBuf, timeout: Duration) -> io::Result<Option<(HidDevice, u8)>> {
    let device = HidDevice::open(path)?;
    device.write_report(&layer_request()).await?;
    match tokio::time::timeout(timeout, device.read_report()).await {
        Ok(report) => Ok(parse_probe_response(&report?).map(|layer| (device, layer))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report(head: &[u8], layer: u8) -> [u8; REPORT_SIZE] {
        let mut data = [0u8; REPORT_SIZE];
        data[..head.len()].copy_from_slice(head);
        data[REPORT_SIZE - 1] = layer;
        data
    }

    #[test]
    fn test_parse_report() {
        assert_eq!(Report::parse(&report(b"L", 3)), Report::Layer(3));
        assert_eq!(Report::parse(&report(b"L\x01", 0)), Report::Layer(0));
        assert_eq!(Report::parse(&report(b"X\x05", 3)), Report::Unknown { kind: b'X', size: 5 });
    }

    #[test]
    fn test_parse_probe_response() {
        assert_eq!(parse_probe_response(&report(b"L\x01", 2)), Some(2));
        assert_eq!(parse_probe_response(&report(b"L\x00", 2)), None);
        assert_eq!(parse_probe_response(&report(b"K\x01", 2)), None);
    }

    #[test]
    fn test_layer_request() {
        let request = layer_request();
        assert_eq!(request[0], b'L');
        assert!(request[1..].iter().all(|b| *b == 0));
        assert_eq!(layer_message(4), "L: 4");
        assert_eq!(layer_message(255), "L: 255");
    }

    #[test]
    fn test_list_hidraw_devices() {
        let dir = std::env::temp_dir().join(format!("panelmsg-hidraw-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["hidraw1", "hidraw0", "tty0", "myhidraw"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }
        let devices = list_hidraw_devices(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(devices, vec![dir.join("hidraw0"), dir.join("hidraw1")]);
    }
}
