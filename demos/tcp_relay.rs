//! Minimal TCP relay
//!
//! Run with: cargo run --example tcp_relay <CONFIG> [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example tcp_relay relay.yaml                  # binds to 0.0.0.0:9000
//!   cargo run --example tcp_relay relay.yaml 127.0.0.1:9100
//!
//! A client connects, sends one line naming a source id and then receives
//! raw MPEG-TS until it disconnects:
//!
//!   (echo cam1; cat) | nc localhost 9000 | ffplay -
//!
//! The transcoder for a source only runs while at least one client is
//! connected to it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camrelay::{
    ChannelSink, RelayConfig, SinkMessage, SourceId, SourceRegistry, SupervisorError,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
const SINK_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: tcp_relay <CONFIG> [BIND_ADDR]");
        std::process::exit(2);
    };
    let bind_addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "0.0.0.0:9000".to_string())
        .parse()?;

    let config = RelayConfig::load(&config_path)?;
    let registry = Arc::new(SourceRegistry::from_config(&config)?);
    tracing::info!(sources = registry.len(), path = %config_path, "Configuration loaded");

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Relay listening");

    let next_session_id = AtomicU64::new(1);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
        _ = async {
            loop {
                match listener.accept().await {
                    Ok((socket, peer)) => {
                        let session_id = next_session_id.fetch_add(1, Ordering::Relaxed);
                        let registry = Arc::clone(&registry);
                        tokio::spawn(async move {
                            if let Err(e) = serve(session_id, socket, peer, registry).await {
                                tracing::debug!(
                                    session_id,
                                    error = %e,
                                    "Connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                }
            }
        } => {}
    }

    registry.shutdown().await;

    for (id, snapshot) in registry.snapshot() {
        tracing::info!(
            source = %id,
            state = snapshot.state,
            restarts = snapshot.restarts,
            "Final state"
        );
    }

    Ok(())
}

async fn serve(
    session_id: u64,
    mut socket: TcpStream,
    peer: SocketAddr,
    registry: Arc<SourceRegistry>,
) -> std::io::Result<()> {
    socket.set_nodelay(true)?;

    let mut line = String::new();
    {
        let mut reader = BufReader::new(&mut socket);
        match tokio::time::timeout(HELLO_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(Ok(n)) if n > 0 => {}
            _ => {
                tracing::debug!(session_id, peer = %peer, "No source requested");
                return Ok(());
            }
        }
    }
    let source = SourceId::new(line.trim());

    let (sink, mut rx) = ChannelSink::new(SINK_CAPACITY);
    let (supervisor, client) = match registry.add_client(&source, Arc::new(sink)).await {
        Ok(attached) => attached,
        Err(e) => {
            tracing::info!(
                session_id,
                peer = %peer,
                source = %source,
                error = %e,
                "Client rejected"
            );
            let reply = match &e {
                SupervisorError::SourceNotFound(_) => "ERR unknown source\n".to_string(),
                other => format!("ERR {} {}\n", other.close_code(), other),
            };
            socket.write_all(reply.as_bytes()).await?;
            return Ok(());
        }
    };

    tracing::info!(
        session_id,
        peer = %peer,
        source = %source,
        client = %client,
        "Client attached"
    );

    let (mut rd, mut wr) = socket.split();
    let mut scratch = [0u8; 256];

    let result = loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(SinkMessage::Chunk(chunk)) => {
                    if let Err(e) = wr.write_all(&chunk).await {
                        break Err(e);
                    }
                }
                Some(SinkMessage::Close { code, reason }) => {
                    tracing::info!(
                        session_id,
                        source = %source,
                        code,
                        reason = %reason,
                        "Stream closed"
                    );
                    break Ok(());
                }
                None => break Ok(()),
            },
            read = rd.read(&mut scratch) => match read {
                Ok(0) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            },
        }
    };

    supervisor.remove_client(client).await;
    tracing::info!(session_id, source = %source, "Client detached");

    result
}
