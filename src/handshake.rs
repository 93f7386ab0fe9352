/// Per-connection handshake: read the token line, decrypt it, dial the
/// backend with retry, and report the outcome to the client with a status
/// code.
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::Config;
use crate::crypto;
use crate::status::StatusCode;

const HANDSHAKE_WINDOW: usize = 256;

/// Outcome of a successful handshake: the dialed backend stream, ready for
/// the relay stage. On any other outcome the handshake has already written
/// the appropriate status code and the client connection should simply be
/// dropped.
pub struct Handshake {
    pub backend: TcpStream,
}

/// Run the handshake procedure against a freshly accepted client stream.
///
/// Returns `Some(Handshake)` once `200` has been written and, if present,
/// the remainder has been forwarded to the backend. Returns `None` once a
/// non-`200` status has been written (or the client write itself failed) —
/// the caller's only remaining job is to drop both sockets.
pub async fn perform(client: &mut TcpStream, config: &Config) -> Option<Handshake> {
    let (token, remainder) = match read_token_line(client).await {
        Ok(parts) => parts,
        Err(()) => {
            write_status(client, StatusCode::MalformedRequest).await;
            return None;
        }
    };

    let address = match crypto::decrypt_token(&config.secret, &token) {
        Ok(address) => address,
        Err(_) => {
            write_status(client, StatusCode::BadAddress).await;
            return None;
        }
    };

    let backend = match dial_with_retry(&address, config.dial_retry, config.dial_timeout).await {
        Ok(stream) => stream,
        Err(DialError::Timeout) => {
            write_status(client, StatusCode::DialTimeout).await;
            return None;
        }
        Err(DialError::Failed) => {
            write_status(client, StatusCode::DialFailed).await;
            return None;
        }
    };

    let mut backend = backend;
    if client.write_all(StatusCode::Ok.as_bytes()).await.is_err() {
        return None;
    }

    if !remainder.is_empty() && backend.write_all(&remainder).await.is_err() {
        return None;
    }

    Some(Handshake { backend })
}

/// Read from `client` into a 256-byte window, accumulating across short
/// reads, until a `\n` is seen or the window fills without one. Returns the
/// bytes strictly before the delimiter (the token) and the bytes strictly
/// after it within what was read (the remainder). `Err(())` covers any read
/// error, EOF before a delimiter was found, or a full window with no `\n`.
async fn read_token_line(client: &mut TcpStream) -> Result<(Vec<u8>, Vec<u8>), ()> {
    let mut window = [0u8; HANDSHAKE_WINDOW];
    let mut filled = 0usize;

    loop {
        if filled == window.len() {
            return Err(());
        }

        let n = client.read(&mut window[filled..]).await.map_err(|_| ())?;
        if n == 0 {
            return Err(());
        }
        filled += n;

        if let Some(pos) = window[..filled].iter().position(|&b| b == b'\n') {
            let token = window[..pos].to_vec();
            let remainder = window[pos + 1..filled].to_vec();
            return Ok((token, remainder));
        }
    }
}

enum DialError {
    Timeout,
    Failed,
}

/// Dial `address` up to `retries` times with `timeout` per attempt. Retries
/// only on timeout; any other connect error stops the loop immediately.
async fn dial_with_retry(
    address: &str,
    retries: u32,
    timeout: Duration,
) -> Result<TcpStream, DialError> {
    let mut last_was_timeout = false;

    for _ in 0..retries.max(1) {
        match time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(_)) => return Err(DialError::Failed),
            Err(_) => {
                last_was_timeout = true;
            }
        }
    }

    if last_was_timeout {
        Err(DialError::Timeout)
    } else {
        Err(DialError::Failed)
    }
}

async fn write_status(client: &mut TcpStream, status: StatusCode) {
    let _ = client.write_all(status.as_bytes()).await;
}
