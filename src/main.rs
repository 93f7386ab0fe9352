mod config;
mod crypto;
mod diagnostics;
mod errors;
mod handshake;
mod listener;
mod pidfile;
mod pool;
mod relay;
mod status;

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;

use config::Config;
use errors::GatewayError;
use pidfile::PidFile;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("failed to start runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), GatewayError> {
    let _pid_file = PidFile::write(pidfile::PID_FILE_NAME).map_err(GatewayError::Io)?;
    let config = Arc::new(config);
    let stats = Arc::new(diagnostics::Stats::default());

    let tcp_listener = if config.reuse_port {
        listener::bind_reuse_port(&config.bind_addr)?
    } else {
        listener::bind_plain(&config.bind_addr).await?
    };

    log::info!(
        "listening on {} (reuse_port={})",
        tcp_listener.local_addr().map_err(GatewayError::Io)?,
        config.reuse_port
    );

    if let Some(pprof_addr) = config.pprof_addr.clone() {
        let started_at = Utc::now();
        let diag_stats = stats.clone();
        tokio::spawn(diagnostics::serve(pprof_addr, started_at, diag_stats));
    }

    let accept_loop = {
        let config = config.clone();
        let stats = stats.clone();
        listener::run(tcp_listener, move |stream, peer| {
            let config = config.clone();
            let stats = stats.clone();
            stats.connection_opened();
            tokio::spawn(async move {
                handle_connection(stream, peer, config).await;
                stats.connection_closed();
            });
        })
    };

    tokio::select! {
        result = accept_loop => result,
        _ = shutdown_signal() => {
            log::info!("received SIGTERM, exiting");
            Ok(())
        }
    }
}

async fn handle_connection(mut stream: tokio::net::TcpStream, peer: std::net::SocketAddr, config: Arc<Config>) {
    log::debug!("accepted connection from {}", peer);

    match handshake::perform(&mut stream, &config).await {
        Some(handshake::Handshake { backend }) => {
            log::info!("handshake ok for {}", peer);
            relay::run(stream, backend, config.buffer_size).await;
            log::debug!("connection from {} closed", peer);
        }
        None => {
            log::warn!("handshake rejected for {}", peer);
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            log::error!("failed to install SIGTERM handler: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    std::future::pending::<()>().await;
}
