// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `RETR`/`STOR`/`APPE`/`REST`/`SIZE`/`TYPE`: file transfer and its supporting
//! commands.
//!
//! Grounded on `original_source/aioftp/server.py`'s `ftp_RETR`/`ftp_STOR`/
//! `ftp_APPE`/`ftp_REST`/`ftp_SIZE`/`ftp_TYPE`. `STOR`/`APPE` share one
//! implementation here (`store`) since they differ only in where they seek
//! before writing: `APPE` (and a restarted `STOR`) opens without truncating
//! and seeks to end-of-file or `restart_offset` respectively, which is
//! exactly what `pathio::OpenMode::Append` already provides — see
//! `pathio/filesystem.rs`'s own `append_seek_resumes_at_offset` test.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    connection::{Connection, TransferType},
    guards::{
        data_connection_made, login_required, path_must_be_file, path_must_exist, path_permissions,
        readable, with_path_timeout, writable,
    },
    pathio::{self, OpenMode},
    path_resolver::get_paths,
    worker::worker,
};

use super::{Outcome, current_user_cwd, fail};

pub async fn type_cmd(conn: &Arc<Connection>, rest: &str) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    match rest.trim().split_whitespace().next().unwrap_or("").to_ascii_uppercase().as_str() {
        "A" => {
            conn.state.lock().await.transfer_type = TransferType::Ascii;
            conn.respond("200", "TYPE A");
        },
        "I" | "L" => {
            conn.state.lock().await.transfer_type = TransferType::Image;
            conn.respond("200", "TYPE I");
        },
        _ => conn.respond("502", format!("TYPE {} not implemented", rest.trim())),
    }
    Outcome::Continue
}

pub async fn size(conn: &Arc<Connection>, rest: &str) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let (user, cwd) = current_user_cwd(conn).await;
    let user = user.expect("login_required guarantees a user is set");
    let (real, _virt) = get_paths(&user, &cwd, rest);

    if let Err(e) = path_must_exist(conn.path_io.as_ref(), &real, conn.timeouts.path).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    if let Err(e) = path_must_be_file(conn.path_io.as_ref(), &real, conn.timeouts.path).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    match with_path_timeout(conn.timeouts.path, &real, conn.path_io.size(&real)).await {
        Ok(n) => conn.respond("213", n.to_string()),
        Err(e) => conn.respond("451", e.to_string()),
    }
    Outcome::Continue
}

pub async fn rest(conn: &Arc<Connection>, rest: &str) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    match rest.trim().parse::<u64>() {
        Ok(offset) => {
            conn.state.lock().await.restart_offset = offset;
            conn.respond("350", format!("restarting at {offset}"));
        },
        Err(_) => conn.respond("501", "invalid REST argument"),
    }
    Outcome::Continue
}

pub async fn retr(conn: &Arc<Connection>, rest: &str) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let (user, cwd) = current_user_cwd(conn).await;
    let user = user.expect("login_required guarantees a user is set");
    let (real, virt) = get_paths(&user, &cwd, rest);

    if let Err(e) = path_must_exist(conn.path_io.as_ref(), &real, conn.timeouts.path).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    if let Err(e) = path_must_be_file(conn.path_io.as_ref(), &real, conn.timeouts.path).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    if let Err(e) = path_permissions(&user, &virt, &[readable]) {
        fail(conn, e);
        return Outcome::Continue;
    }
    if let Err(e) = data_connection_made(conn, true).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let Some(data_stream) = conn.take_data_connection().await else {
        conn.respond("425", "no data connection made");
        return Outcome::Continue;
    };

    let offset = std::mem::take(&mut conn.state.lock().await.restart_offset);
    conn.respond("150", "data transfer started");

    let block_size = conn.block_size;
    let path_io = conn.path_io.clone();
    let cancel = CancellationToken::new();
    let cancel_for_worker = cancel.clone();
    let conn2 = conn.clone();
    let handle = tokio::spawn(async move {
        worker(&conn2, cancel_for_worker, async move {
            let mut file = with_path_timeout(conn2.timeouts.path, &real, path_io.open(&real, OpenMode::Read))
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            if offset > 0 {
                file.seek(offset).await.map_err(|e| anyhow::anyhow!(e))?;
            }
            while let Some(chunk) = pathio::read_block(file.as_mut(), block_size).await.map_err(|e| anyhow::anyhow!(e))? {
                data_stream.write(&chunk).await?;
            }
            file.close().await.map_err(|e| anyhow::anyhow!(e))?;
            data_stream.shutdown().await;
            conn2.respond("226", "data transfer done");
            Ok(())
        })
        .await;
    });
    conn.track_worker(cancel, handle).await;
    Outcome::Continue
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Stor,
    Appe,
}

async fn store(conn: &Arc<Connection>, rest: &str, direction: Direction) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let (user, cwd) = current_user_cwd(conn).await;
    let user = user.expect("login_required guarantees a user is set");
    let (real, virt) = get_paths(&user, &cwd, rest);

    if let Err(e) = path_permissions(&user, &virt, &[writable]) {
        fail(conn, e);
        return Outcome::Continue;
    }
    if let Err(e) = data_connection_made(conn, true).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let Some(data_stream) = conn.take_data_connection().await else {
        conn.respond("425", "no data connection made");
        return Outcome::Continue;
    };

    let offset = std::mem::take(&mut conn.state.lock().await.restart_offset);
    conn.respond("150", "data transfer started");

    let block_size = conn.block_size;
    let path_io = conn.path_io.clone();
    let cancel = CancellationToken::new();
    let cancel_for_worker = cancel.clone();
    let conn2 = conn.clone();
    let handle = tokio::spawn(async move {
        worker(&conn2, cancel_for_worker, async move {
            let open_mode = if direction == Direction::Appe || offset > 0 {
                OpenMode::Append
            } else {
                OpenMode::Write
            };
            let mut file = with_path_timeout(conn2.timeouts.path, &real, path_io.open(&real, open_mode))
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            let seek_to = match direction {
                Direction::Appe => with_path_timeout(conn2.timeouts.path, &real, path_io.size(&real))
                    .await
                    .unwrap_or(0),
                Direction::Stor => offset,
            };
            if seek_to > 0 {
                file.seek(seek_to).await.map_err(|e| anyhow::anyhow!(e))?;
            }
            while let Some(chunk) = data_stream.read_block(block_size).await? {
                file.write_all(&chunk).await.map_err(|e| anyhow::anyhow!(e))?;
            }
            file.close().await.map_err(|e| anyhow::anyhow!(e))?;
            conn2.respond("226", "data transfer done");
            Ok(())
        })
        .await;
    });
    conn.track_worker(cancel, handle).await;
    Outcome::Continue
}

pub async fn stor(conn: &Arc<Connection>, rest: &str) -> Outcome {
    store(conn, rest, Direction::Stor).await
}

pub async fn appe(conn: &Arc<Connection>, rest: &str) -> Outcome {
    store(conn, rest, Direction::Appe).await
}
