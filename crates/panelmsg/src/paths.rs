use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const LAYERD_SOCKET_NAME: &str = "lkbd.sock";

/// Stores references to all the paths relevant to panelmsg.
#[derive(Debug, Clone)]
pub struct Paths {
    runtime_dir: PathBuf,
    layerd_socket_file: PathBuf,
}

impl Paths {
    pub fn from_runtime_dir<P: AsRef<Path>>(runtime_dir: P) -> Self {
        let runtime_dir = runtime_dir.as_ref().to_path_buf();
        let layerd_socket_file = runtime_dir.join(LAYERD_SOCKET_NAME);

        // 100 as the limit isn't quite 108 everywhere (i.e 104 on BSD or mac)
        if format!("{}", layerd_socket_file.display()).len() > 100 {
            log::warn!("The layerd socket file's absolute path exceeds 100 bytes, the socket may fail to create.");
        }
        Paths { runtime_dir, layerd_socket_file }
    }

    pub fn from_env() -> Result<Self> {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR").context("XDG_RUNTIME_DIR missing")?;
        Ok(Self::from_runtime_dir(runtime_dir))
    }

    pub fn get_layerd_socket_file(&self) -> &Path {
        self.layerd_socket_file.as_path()
    }
}

impl std::fmt::Display for Paths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime-dir: {}, layerd-socket: {}", self.runtime_dir.display(), self.layerd_socket_file.display())
    }
}
