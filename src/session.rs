// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The per-connection dispatcher: greeting, command-parse pipelining, and
//! teardown.
//!
//! Grounded on `original_source/aioftp/server.py`'s `Server.dispatcher`:
//! exactly one command-parse task is ever pending, and the next one is
//! scheduled *before* the just-parsed command's handler runs, so a
//! long-running transfer worker never blocks the dispatcher from noticing
//! `ABOR` on the very next line (spec.md §4.5). Unlike the original's
//! `asyncio.wait(..., return_when=FIRST_COMPLETED)` over an open-ended set
//! of futures, this is a plain `tokio::select!` loop: the one thing here
//! that genuinely races the parser is session cancellation and the idle
//! timer, while extra workers (transfers, listings) run independently and
//! are only ever joined from teardown or `ABOR`.

use std::sync::{Arc, atomic::Ordering};

use tokio::{
    net::TcpStream,
    sync::{Mutex, Notify},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    commands::{self, Outcome},
    connection::{Connection, ConnectionState, TransferType},
    error::as_path_io_error,
    response,
    server::ServerShared,
    stream::{NamedThrottle, ThrottledStream},
    vpath::VirtualPath,
};

/// Splits `cmd` (uppercased by the caller) from its argument string. FTP
/// commands are one word followed by free-form text, e.g. `CWD /a/b`.
fn parse_line(line: &str) -> (String, String) {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.split_once(' ') {
        Some((cmd, rest)) => (cmd.to_string(), rest.trim_start().to_string()),
        None => (line.to_string(), String::new()),
    }
}

/// `PASS` arguments never reach the log; everything else does verbatim.
fn log_safe(cmd: &str, rest: &str) -> String {
    if cmd.eq_ignore_ascii_case("PASS") { format!("{cmd} ***") } else { format!("{cmd} {rest}") }
}

async fn idle_timeout_sleep(timeout: Option<std::time::Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Runs one accepted connection to completion: greeting, command loop,
/// teardown. Never returns early except through teardown — every exit path
/// (QUIT, broken socket, idle timeout, server shutdown) funnels through it.
pub async fn run_session(shared: Arc<ServerShared>, socket: TcpStream, peer: std::net::SocketAddr) {
    let _ = socket.set_nodelay(true);
    let local_port = socket.local_addr().map(|a| a.port()).unwrap_or(shared.port);
    let (read_half, write_half) = socket.into_split();

    let server_per_connection = NamedThrottle::fresh(
        "server_per_connection",
        shared.server_per_conn_read,
        shared.server_per_conn_write,
    );
    let throttles = vec![shared.server_global.clone(), server_per_connection];
    let stream = Arc::new(ThrottledStream::new(
        read_half,
        write_half,
        throttles,
        shared.timeouts.socket,
        shared.timeouts.socket,
    ));

    let (sink, writer) = response::channel(stream.clone());
    let writer_task = tokio::spawn(writer.run());

    let conn = Arc::new(Connection {
        client_host: peer.ip().to_string(),
        client_port: peer.port(),
        server_host: shared.host.clone(),
        server_port: local_port,
        command_stream: stream.clone(),
        response: sink,
        timeouts: shared.timeouts,
        block_size: shared.block_size,
        path_io: shared.path_io.clone(),
        data_connection: Arc::new(Mutex::new(None)),
        data_ready: Arc::new(Notify::new()),
        state: Mutex::new(ConnectionState {
            user: None,
            logged: false,
            current_directory: VirtualPath::root(),
            passive_server: None,
            transfer_type: TransferType::default(),
            rename_from: None,
            restart_offset: 0,
            acquired: false,
        }),
        extra_workers: Mutex::new(Vec::new()),
    });

    let session_id = shared.next_session_id.fetch_add(1, Ordering::SeqCst);
    let cancel = CancellationToken::new();
    shared.sessions.insert(session_id, cancel.clone());

    // NEW->GREETED on a global slot, NEW->CLOSED ("421") on refusal.
    if shared.global_connections.acquire().is_ok() {
        conn.state.lock().await.acquired = true;
        conn.respond("220", "aftpd ready");
        dispatch_loop(&conn, &shared, &cancel).await;
    } else {
        conn.respond("421", "too many connections");
    }

    teardown(&conn, &shared, session_id).await;
    drop(conn);
    let _ = writer_task.await;
}

async fn dispatch_loop(conn: &Arc<Connection>, shared: &Arc<ServerShared>, cancel: &CancellationToken) {
    let stream = conn.command_stream.clone();
    let mut parse_task = tokio::spawn({
        let stream = stream.clone();
        async move { stream.readline().await }
    });

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = idle_timeout_sleep(conn.timeouts.idle) => {
                conn.respond("421", "idle timeout");
                break;
            }
            parsed = &mut parse_task => {
                let bytes = match parsed {
                    Ok(Ok(bytes)) => bytes,
                    Ok(Err(err)) => {
                        if let Some(pio_err) = as_path_io_error(&err) {
                            conn.respond("451", pio_err.to_string());
                        } else {
                            warn!(error = %err, "command stream failed, closing session");
                        }
                        break;
                    }
                    Err(join_err) => {
                        warn!(error = %join_err, "command parse task failed");
                        break;
                    }
                };
                if bytes.is_empty() {
                    break;
                }

                // Schedule the next parse before the handler runs, so ABOR
                // reaches the dispatcher even while a transfer is in flight.
                parse_task = tokio::spawn({
                    let stream = stream.clone();
                    async move { stream.readline().await }
                });

                let text = String::from_utf8_lossy(&bytes).trim_end_matches(['\r', '\n']).to_string();
                if text.is_empty() {
                    continue;
                }
                let (cmd, rest) = parse_line(&text);
                debug!(command = %log_safe(&cmd, &rest), "command received");

                let outcome = commands::dispatch(conn, shared, &cmd, &rest).await;
                if !commands::consumes_restart_offset(&cmd) {
                    conn.reset_restart_offset().await;
                }
                if outcome == Outcome::Stop {
                    break;
                }
            }
        }
    }

    parse_task.abort();
}

/// Cancels every extra worker, closes the passive listener and data channel,
/// releases the global/user slots, and removes the session from the
/// shutdown-broadcast registry (spec.md §4.5 teardown).
async fn teardown(conn: &Arc<Connection>, shared: &Arc<ServerShared>, session_id: u64) {
    conn.cancel_all_workers().await;

    let (passive_server, user, acquired) = {
        let mut state = conn.state.lock().await;
        (state.passive_server.take(), state.user.take(), state.acquired)
    };
    if let Some(listener) = passive_server {
        listener.close().await;
    }
    conn.take_data_connection().await;
    conn.command_stream.shutdown().await;

    if let Some(user) = user {
        shared.user_manager.notify_logout(&user).await;
    }
    if acquired {
        let _ = shared.global_connections.release();
    }
    shared.sessions.remove(&session_id);
}
