/// Listener loop: owns an accepting endpoint and dispatches one handler
/// task per accepted connection.
///
/// The endpoint itself is abstracted behind [`Acceptor`] so the loop below
/// doesn't know or care whether it was handed a plain `TcpListener` or a
/// `SO_REUSEPORT`-enabled one.
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;

use crate::errors::GatewayError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Bind a plain `tokio::net::TcpListener`.
pub async fn bind_plain(addr: &str) -> Result<TcpListener, GatewayError> {
    TcpListener::bind(addr)
        .await
        .map_err(GatewayError::Listener)
}

/// Bind a `tokio::net::TcpListener` with `SO_REUSEPORT` set before
/// `bind`/`listen`, via `socket2`.
pub fn bind_reuse_port(addr: &str) -> Result<TcpListener, GatewayError> {
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| GatewayError::Config(format!("invalid bind address {:?}: {}", addr, e)))?;

    let domain = if socket_addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(GatewayError::Listener)?;

    socket.set_reuse_address(true).map_err(GatewayError::Listener)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(GatewayError::Listener)?;

    socket
        .bind(&socket_addr.into())
        .map_err(GatewayError::Listener)?;
    socket.listen(1024).map_err(GatewayError::Listener)?;
    socket
        .set_nonblocking(true)
        .map_err(GatewayError::Listener)?;

    TcpListener::from_std(socket.into()).map_err(GatewayError::Listener)
}

/// Accept connections from `acceptor` until a non-transient error occurs,
/// invoking `on_accept` for each one. Transient errors are recovered with
/// exponential backoff starting at 5 ms, doubling per consecutive failure,
/// capped at 1 s; a successful accept resets the delay.
pub async fn run<A, F>(acceptor: A, mut on_accept: F) -> Result<(), GatewayError>
where
    A: Acceptor,
    F: FnMut(TcpStream, SocketAddr),
{
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match acceptor.accept().await {
            Ok((stream, peer)) => {
                backoff = INITIAL_BACKOFF;
                on_accept(stream, peer);
            }
            Err(err) if is_transient(&err) => {
                log::warn!("transient accept error: {}; backing off {:?}", err, backoff);
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(err) => {
                log::error!("fatal accept error: {}", err);
                return Err(GatewayError::Listener(err));
            }
        }
    }
}

/// Errors the OS can throw transiently under load (fd exhaustion, ephemeral
/// port exhaustion on the accepted socket, a momentary connection reset
/// before `accept()` returns it) — recoverable by backing off and retrying,
/// as opposed to a listener socket that is simply no longer usable.
fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind::*;
    matches!(
        err.kind(),
        ConnectionRefused | ConnectionReset | ConnectionAborted | Interrupted | WouldBlock
    ) || matches!(err.raw_os_error(), Some(libc_emfile) if libc_emfile == 24 || libc_emfile == 23)
}
