// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `PWD`/`CWD`/`CDUP`: reporting and changing the virtual current directory.
//!
//! Grounded on `original_source/aioftp/server.py`'s `ftp_PWD`/`ftp_CWD`/
//! `ftp_CDUP` (the latter is just `ftp_CWD` called with `".."`).

use std::sync::Arc;

use crate::{
    connection::Connection,
    guards::{login_required, path_must_be_dir, path_must_exist},
    path_resolver::get_paths,
};

use super::{Outcome, current_user_cwd, fail};

pub async fn pwd(conn: &Arc<Connection>) -> Outcome {
    if let Err(e) = login_required(conn).await {
        fail(conn, e);
        return Outcome::Continue;
    }
    let cwd = conn.state.lock().await.current_directory.clone();
    conn.respond("257", format!("\"{cwd}\""));
    Outcome::Continue
}

pub async fn cwd(conn: &Arc<Connection>, rest: &str) -> Outcome {
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

    conn.state.lock().await.current_directory = virt;
    conn.respond("250", "cwd done");
    Outcome::Continue
}

pub async fn cdup(conn: &Arc<Connection>) -> Outcome {
    cwd(conn, "..").await
}
