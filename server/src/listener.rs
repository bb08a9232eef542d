//! TCP accept loop and per-connection handling.
//!
//! Each accepted connection runs one task that multiplexes its read side
//! (newline-delimited JSON lines into the engine) and its write side
//! (draining the engine's outbound queue). The engine never writes to a
//! socket directly; it only enqueues frames.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use engine::engine::{BroadcastEngine, Outbound, now_ms};
use engine::protocol::Response;

pub async fn run(
    engine: Arc<BroadcastEngine>,
    port: u16,
    max_connections: usize,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening for client connections");

    loop {
        let (stream, peer) = listener.accept().await?;

        if engine.connection_count().await >= max_connections {
            warn!(%peer, max_connections, "connection limit reached, refusing");
            refuse(stream).await;
            continue;
        }

        let conn = Uuid::new_v4();
        debug!(conn = %conn, %peer, "connection accepted");

        let outbound_rx = engine.register_connection(conn).await;
        tokio::spawn(handle_connection(engine.clone(), conn, stream, outbound_rx));
    }
}

/// Answer an over-capacity connection with one error frame, then close.
async fn refuse(mut stream: TcpStream) {
    let frame = Response::Error {
        error_code: "CAPACITY_EXCEEDED",
        message: "server is at maximum connections, try again later".into(),
    };

    if let Ok(mut json) = serde_json::to_string(&frame) {
        json.push('\n');
        let _ = stream.write_all(json.as_bytes()).await;
    }
    let _ = stream.shutdown().await;
}

async fn handle_connection(
    engine: Arc<BroadcastEngine>,
    conn: Uuid,
    stream: TcpStream,
    mut outbound_rx: mpsc::Receiver<Outbound>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            next = lines.next_line() => {
                match next {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if !engine.handle_line(conn, &line, now_ms()).await {
                            break;
                        }
                    }
                    // peer closed or the read failed
                    Ok(None) => break,
                    Err(e) => {
                        debug!(conn = %conn, error = %e, "read failed");
                        break;
                    }
                }
            }
            out = outbound_rx.recv() => {
                match out {
                    Some(Outbound::Frame(mut frame)) => {
                        frame.push('\n');
                        if write_half.write_all(frame.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => break,
                }
            }
        }
    }

    engine.disconnect(conn).await;

    // Flush whatever was queued before teardown (auth-failure answers,
    // the last response before an engine-initiated close).
    while let Ok(out) = outbound_rx.try_recv() {
        if let Outbound::Frame(mut frame) = out {
            frame.push('\n');
            if write_half.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    let _ = write_half.shutdown().await;
    debug!(conn = %conn, "connection closed");
}
