/// Bidirectional relay: two unidirectional byte pumps sharing a pooled
/// scratch buffer each. The first pump to observe closure on either side
/// tears down both sockets, which unblocks its sibling.
///
/// Grounded on the spawn-two-tasks-then-select pattern used to relay
/// Postgres wire traffic in the examples pack's pbprobe proxy, adapted to
/// pull scratch space from the process-wide buffer pool instead of
/// streaming owned `Bytes` through a channel.
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::pool;

/// Relay bytes between `client` and `backend` until either side closes,
/// then close both. A panic inside a pump is caught, logged, and treated as
/// ordinary teardown — it must never take down the gateway process.
pub async fn run(client: TcpStream, backend: TcpStream, buffer_size: usize) {
    let (client_read, client_write) = client.into_split();
    let (backend_read, backend_write) = backend.into_split();

    let mut client_to_backend = tokio::spawn(pump(client_read, backend_write, buffer_size));
    let mut backend_to_client = tokio::spawn(pump(backend_read, client_write, buffer_size));

    tokio::select! {
        result = &mut client_to_backend => log_pump_result("client->backend", result),
        result = &mut backend_to_client => log_pump_result("backend->client", result),
    }

    // Whichever pump finished first, abort the other: closing its half of
    // the split stream (via drop, once the task is aborted) unblocks it if
    // it's parked on a read, and the sibling's in-flight write simply fails.
    client_to_backend.abort();
    backend_to_client.abort();
}

async fn pump(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    buffer_size: usize,
) {
    let mut buf = pool::checkout(buffer_size);

    loop {
        // Pooled buffers may hold residue from a prior session; every pass
        // writes into the buffer via `read` before anything reads from it.
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        if writer.write_all(&buf[..n]).await.is_err() {
            break;
        }
    }

    let _ = writer.shutdown().await;
    pool::release(buf);
}

fn log_pump_result(direction: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => log::debug!("relay pump {} finished", direction),
        Err(err) if err.is_panic() => {
            log::error!("relay pump {} panicked: {:?}", direction, err);
        }
        Err(err) => log::debug!("relay pump {} cancelled: {:?}", direction, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn relays_bytes_in_both_directions() {
        let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend_listener.local_addr().unwrap();

        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client_listener.local_addr().unwrap();

        let backend_task = tokio::spawn(async move {
            let (mut backend, _) = backend_listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            backend.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"PINGA");
            backend.write_all(b"PONGB").await.unwrap();
            // Half-close to let the relay's client->backend pump observe EOF.
            backend.shutdown().await.unwrap();
        });

        let relay_task = tokio::spawn(async move {
            let (client_side, _) = client_listener.accept().await.unwrap();
            let backend_side = TcpStream::connect(backend_addr).await.unwrap();
            run(client_side, backend_side, 1024).await;
        });

        let mut client = TcpStream::connect(client_addr).await.unwrap();
        client.write_all(b"PINGA").await.unwrap();

        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"PONGB");

        backend_task.await.unwrap();
        let _ = tokio::time::timeout(std::time::Duration::from_millis(500), relay_task).await;
    }
}
