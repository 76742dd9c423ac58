// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `PASV`/`EPSV`: passive-mode data port allocation.
//!
//! Grounded on `original_source/aioftp/server.py`'s `ftp_PASV`/`ftp_EPSV`:
//! both reuse an existing listener if one is already bound, otherwise close
//! any stale data connection and start a fresh one from the shared port
//! pool (`passive.rs`), sharing the command stream's throttle set so the
//! data channel inherits `server_per_connection`/`user_per_connection`
//! limits.

use std::sync::Arc;

use crate::{connection::Connection, guards::login_required, passive::PassiveListener, server::ServerShared};

use super::{Outcome, fail};

async fn ensure_listener(conn: &Connection, shared: &ServerShared) -> Result<u16, (&'static str, String)> {
    {
        let state = conn.state.lock().await;
        if let Some(listener) = &state.passive_server {
            if !listener.is_ipv4() {
                return Err(("503", "this server started in ipv6 mode".to_string()));
            }
            return Ok(listener.port());
        }
    }

    conn.take_data_connection().await;

    let throttles = conn.command_stream.throttles().await;
    let listener = PassiveListener::start(
        &shared.host,
        shared.port_pool.as_ref(),
        throttles,
        conn.timeouts.socket,
        conn.data_connection.clone(),
        conn.data_ready.clone(),
    )
    .await
    .map_err(|_| ("421", "no free ports".to_string()))?;

    if !listener.is_ipv4() {
        listener.close().await;
        return Err(("503", "this server started in ipv6 mode".to_string()));
    }

    let port = listener.port();
    conn.state.lock().await.passive_server = Some(listener);
    Ok(port)
}

pub async fn pasv(conn: &Arc<Connection>, shared: &Arc<ServerShared>) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    match ensure_listener(conn, shared).await {
        Ok(port) => respond_pasv(conn, shared, port),
        Err((code, msg)) => conn.respond(code, msg),
    }
    Outcome::Continue
}

fn respond_pasv(conn: &Connection, shared: &ServerShared, port: u16) {
    let host = shared.ipv4_pasv_forced_response_address.as_deref().unwrap_or(&shared.host);
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 {
        conn.respond("421", "invalid advertised address");
        return;
    }
    let (p1, p2) = ((port >> 8) as u8, (port & 0xFF) as u8);
    conn.respond(
        "227",
        format!(
            "listen socket created ({},{},{},{},{p1},{p2})",
            octets[0], octets[1], octets[2], octets[3]
        ),
    );
}

pub async fn epsv(conn: &Arc<Connection>, shared: &Arc<ServerShared>, rest: &str) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    if !rest.trim().is_empty() {
        conn.respond("522", "custom protocols support not implemented");
        return Outcome::Continue;
    }
    match ensure_listener(conn, shared).await {
        Ok(port) => conn.respond("229", format!("listen socket created (|||{port}|)")),
        Err((code, msg)) => conn.respond(code, msg),
    }
    Outcome::Continue
}
