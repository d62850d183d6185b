//! Unix socket reporting the watched keyboards and their active layer.
//!
//! A client sends a single message starting with `L` and receives a tab separated table with a
//! `device\tlayer` header and one line per keyboard. Any other message is answered by closing the
//! connection.

use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::{KeyboardStatus, KeyboardTable};

const QUERY_LAYERS: u8 = b'L';
const MAX_REQUEST_SIZE: usize = 32;

pub fn format_status(keyboards: &[KeyboardStatus]) -> String {
    let rows = keyboards.iter().map(|kb| format!("{}\t{}\n", kb.path.display(), kb.layer)).join("");
    format!("device\tlayer\n{}", rows)
}

/// Answer status requests on `listener` until `cancel` is triggered.
pub async fn serve(listener: tokio::net::UnixListener, keyboards: KeyboardTable, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            connection = listener.accept() => match connection {
                Ok((stream, _addr)) => {
                    let keyboards = keyboards.clone();
                    tokio::spawn(async move {
                        let result = handle_connection(stream, &keyboards).await;
                        crate::print_result_err!("while handling status request", result);
                    });
                }
                Err(e) => log::error!("Failed to accept status connection: {:?}", e),
            }
        }
    }
    log::debug!("status socket closed");
}

async fn handle_connection(mut stream: tokio::net::UnixStream, keyboards: &KeyboardTable) -> Result<()> {
    let mut request = [0u8; MAX_REQUEST_SIZE];
    let read = stream.read(&mut request).await.context("Failed to read status request")?;
    if read > 0 && request[0] == QUERY_LAYERS {
        let response = format_status(&keyboards.snapshot());
        stream.write_all(response.as_bytes()).await.context("Failed to send status")?;
    } else {
        log::debug!("ignoring unknown status request {:?}", &request[..read]);
    }
    stream.shutdown().await?;
    Ok(())
}

/// Ask the daemon listening on `socket_file` for its keyboards.
pub async fn query(socket_file: &Path) -> Result<String> {
    let mut stream = tokio::net::UnixStream::connect(socket_file).await?;
    stream.write_all(&[QUERY_LAYERS]).await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await.context("Failed to read status")?;
    Ok(response)
}
