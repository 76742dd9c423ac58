// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `USER`/`PASS`: user selection and authentication.
//!
//! Grounded on `original_source/aioftp/server.py`'s `ftp_USER`/`ftp_PASS`,
//! which re-issue through `user_manager.get_user` and attach the per-user
//! throttles (`throttle.update`) the moment a user is selected, not only
//! once `PASS` succeeds — an anonymous or passwordless user is fully logged
//! in right out of `USER`.

use std::sync::Arc;

use crate::{
    connection::Connection,
    server::ServerShared,
    stream::NamedThrottle,
    users::{User, UserHandle, UserManagerResponse},
};

use super::Outcome;

pub async fn user(conn: &Arc<Connection>, shared: &Arc<ServerShared>, rest: &str) -> Outcome {
    let login = rest.trim();
    let login = if login.is_empty() { None } else { Some(login) };

    // *->USER_GIVEN: a prior logged-in user is logged out first (spec.md
    // §4.9), so re-issuing USER mid-session doesn't leak its connection slot.
    let prior = {
        let mut state = conn.state.lock().await;
        state.logged = false;
        state.user.take()
    };
    if let Some(prior) = prior {
        shared.user_manager.notify_logout(&prior).await;
    }

    let (status, found, info) = shared.user_manager.get_user(login).await;
    match status {
        UserManagerResponse::Error => conn.respond("530", info),
        UserManagerResponse::Ok => {
            let found = found.expect("UserManagerResponse::Ok always carries a user");
            finish_login(conn, shared, found).await;
            conn.respond("230", info);
        },
        UserManagerResponse::PasswordRequired => {
            conn.state.lock().await.user = found;
            conn.respond("331", info);
        },
    }
    Outcome::Continue
}

pub async fn pass(conn: &Arc<Connection>, shared: &Arc<ServerShared>, rest: &str) -> Outcome {
    let pending = { conn.state.lock().await.user.clone() };
    let Some(pending) = pending else {
        conn.respond("503", "no user (use USER firstly)");
        return Outcome::Continue;
    };

    if shared.user_manager.authenticate(&pending, rest).await {
        finish_login(conn, shared, pending).await;
        conn.respond("230", "normal login");
    } else {
        conn.respond("530", "wrong password");
    }
    Outcome::Continue
}

/// USER_GIVEN→AUTHED: records the user as logged in, resets `cwd` to the
/// user's `home_path`, and attaches the user-scoped throttles to the command
/// stream (shared `user_global`, fresh `user_per_connection`).
async fn finish_login(conn: &Connection, shared: &ServerShared, user: Arc<User>) {
    attach_user_throttles(conn, shared, &user).await;
    let mut state = conn.state.lock().await;
    state.current_directory = user.home_path.clone();
    state.user = Some(user);
    state.logged = true;
}

async fn attach_user_throttles(conn: &Connection, shared: &ServerShared, user: &Arc<User>) {
    let user_global = shared
        .user_throttles
        .entry(UserHandle(user.clone()))
        .or_insert_with(|| NamedThrottle::fresh("user_global", user.read_limit, user.write_limit))
        .clone();
    conn.command_stream.attach(user_global).await;

    let per_connection = NamedThrottle::fresh(
        "user_per_connection",
        user.read_limit_per_conn,
        user.write_limit_per_conn,
    );
    conn.command_stream.attach(per_connection).await;
}
