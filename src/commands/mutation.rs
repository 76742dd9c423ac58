// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `MKD`/`RMD`/`DELE`/`RNFR`/`RNTO`: filesystem mutations.
//!
//! Grounded on `original_source/aioftp/server.py`'s `ftp_MKD`/`ftp_RMD`/
//! `ftp_DELE`/`ftp_RNFR`/`ftp_RNTO`.

use std::sync::Arc;

use crate::{
    connection::Connection,
    guards::{
        login_required, path_must_be_dir, path_must_be_file, path_must_exist,
        path_must_not_exist, path_permissions, rename_from_required, with_path_timeout, writable,
    },
    path_resolver::get_paths,
};

use super::{Outcome, current_user_cwd, fail};

pub async fn mkd(conn: &Arc<Connection>, rest: &str) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let (user, cwd) = current_user_cwd(conn).await;
    let user = user.expect("login_required guarantees a user is set");
    let (real, virt) = get_paths(&user, &cwd, rest);

    if let Err(e) = path_must_not_exist(conn.path_io.as_ref(), &real, conn.timeouts.path).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    if let Err(e) = path_permissions(&user, &virt, &[writable]) {
        fail(conn, e);
        return Outcome::Continue;
    }
    match with_path_timeout(conn.timeouts.path, &real, conn.path_io.mkdir(&real, true)).await {
        Ok(()) => conn.respond("257", format!("\"{virt}\" created")),
        Err(e) => conn.respond("451", e.to_string()),
    }
    Outcome::Continue
}

pub async fn rmd(conn: &Arc<Connection>, rest: &str) -> Outcome {
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
    if let Err(e) = path_permissions(&user, &virt, &[writable]) {
        fail(conn, e);
        return Outcome::Continue;
    }
    match with_path_timeout(conn.timeouts.path, &real, conn.path_io.rmdir(&real)).await {
        Ok(()) => conn.respond("250", "directory removed"),
        Err(e) => conn.respond("451", e.to_string()),
    }
    Outcome::Continue
}

pub async fn dele(conn: &Arc<Connection>, rest: &str) -> Outcome {
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
    if let Err(e) = path_permissions(&user, &virt, &[writable]) {
        fail(conn, e);
        return Outcome::Continue;
    }
    match with_path_timeout(conn.timeouts.path, &real, conn.path_io.unlink(&real)).await {
        Ok(()) => conn.respond("250", "file deleted"),
        Err(e) => conn.respond("451", e.to_string()),
    }
    Outcome::Continue
}

pub async fn rnfr(conn: &Arc<Connection>, rest: &str) -> Outcome {
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
    conn.state.lock().await.rename_from = Some(real);
    conn.respond("350", "rename pivot set");
    Outcome::Continue
}

pub async fn rnto(conn: &Arc<Connection>, rest: &str) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    if let Err(e) = rename_from_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let source = conn
        .state
        .lock()
        .await
        .rename_from
        .take()
        .expect("rename_from_required guarantees this is set");

    let (user, cwd) = current_user_cwd(conn).await;
    let user = user.expect("login_required guarantees a user is set");
    let (destination, dest_virt) = get_paths(&user, &cwd, rest);

    if let Err(e) = path_permissions(&user, &dest_virt, &[writable]) {
        fail(conn, e);
        return Outcome::Continue;
    }
    match with_path_timeout(conn.timeouts.path, &source, conn.path_io.rename(&source, &destination)).await {
        Ok(()) => conn.respond("250", "rename done"),
        Err(e) => conn.respond("451", e.to_string()),
    }
    Outcome::Continue
}
