// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `LIST`/`MLSD`/`MLST`: directory listings.
//!
//! Grounded on `original_source/aioftp/server.py`'s `ftp_LIST`/`ftp_MLSD`/
//! `ftp_MLST` and `build_list_string`/`build_mlsx_string`. `LIST` and
//! `MLSD` are transfer workers (they stream over the data channel); `MLST`
//! answers a single entry's facts on the command channel using list-mode
//! framing (spec.md §4.6).
//!
//! `chrono`'s `%b`/`%e` formatting always uses English month abbreviations
//! regardless of host locale, so unlike the original's `time.strftime` this
//! needs no process-wide `setlocale` guard (spec.md §9's locale note).

use std::{sync::Arc, time::SystemTime};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    connection::Connection,
    guards::{
        data_connection_made, login_required, path_must_be_dir, path_must_exist, path_permissions,
        readable, with_path_timeout,
    },
    pathio::{PathIO, Stat},
    path_resolver::get_paths,
    server::ServerShared,
    worker::worker,
};

use super::{Outcome, current_user_cwd, fail};

const HALF_YEAR: i64 = 15_778_476;

fn format_mtime(modified: SystemTime) -> String {
    let dt: DateTime<Utc> = modified.into();
    let age = Utc::now().signed_duration_since(dt).num_seconds();
    if age.abs() <= HALF_YEAR {
        dt.format("%b %e %H:%M").to_string()
    } else {
        dt.format("%b %e  %Y").to_string()
    }
}

fn unix_list_line(stat: &Stat, name: &str) -> String {
    let mode = if stat.is_dir { "drwxrwxrwx" } else { "-rwxrwxrwx" };
    format!("{mode} 1 none none {} {} {name}", stat.len, format_mtime(stat.modified))
}

fn mlsx_facts(stat: Option<&Stat>, name: &str) -> String {
    match stat {
        Some(s) => {
            let kind = if s.is_dir { "dir" } else if s.is_file { "file" } else { "unknown" };
            let ts: DateTime<Utc> = s.modified.into();
            let ts = ts.format("%Y%m%d%H%M%S");
            format!("Size={};Create={ts};Modify={ts};Type={kind}; {name}", s.len)
        },
        None => format!("Type=unknown; {name}"),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Unix,
    Mlsx,
}

async fn run(conn: &Arc<Connection>, _shared: &Arc<ServerShared>, rest: &str, kind: Kind) -> Outcome {
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
    if let Err(e) = path_must_be_dir(conn.path_io.as_ref(), &real, conn.timeouts.path).await {
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

    conn.respond("150", "list transfer started");

    let cancel = CancellationToken::new();
    let cancel_for_worker = cancel.clone();
    let conn2 = conn.clone();
    let path_io = conn.path_io.clone();
    let handle = tokio::spawn(async move {
        worker(&conn2, cancel_for_worker, async move {
            let entries = with_path_timeout(conn2.timeouts.path, &real, path_io.list(&real))
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            for entry in entries {
                let name = entry.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                let stat = with_path_timeout(conn2.timeouts.path, &entry, path_io.stat(&entry)).await.ok();
                let line = match kind {
                    Kind::Unix => match &stat {
                        Some(s) => unix_list_line(s, &name),
                        None => continue,
                    },
                    Kind::Mlsx => mlsx_facts(stat.as_ref(), &name),
                };
                data_stream.write(format!("{line}\r\n").as_bytes()).await?;
            }
            data_stream.shutdown().await;
            conn2.respond("226", "list transfer done");
            Ok(())
        })
        .await;
    });
    conn.track_worker(cancel, handle).await;
    Outcome::Continue
}

pub async fn list(conn: &Arc<Connection>, shared: &Arc<ServerShared>, rest: &str) -> Outcome {
    run(conn, shared, rest, Kind::Unix).await
}

pub async fn mlsd(conn: &Arc<Connection>, shared: &Arc<ServerShared>, rest: &str) -> Outcome {
    run(conn, shared, rest, Kind::Mlsx).await
}

pub async fn mlst(conn: &Arc<Connection>, rest: &str) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let (user, cwd) = current_user_cwd(conn).await;
    let user = user.expect("login_required guarantees a user is set");
    let (real, virt) = get_paths(&user, &cwd, rest);

    let stat = with_path_timeout(conn.timeouts.path, &real, conn.path_io.stat(&real)).await.ok();
    let name = virt.file_name().unwrap_or("/").to_string();
    let facts = mlsx_facts(stat.as_ref(), &name);

    conn.response.respond_list(
        "250",
        vec!["Listing".to_string(), facts, "End".to_string()],
    );
    Outcome::Continue
}
