// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The ~25 FTP command handlers and the table that routes a parsed command
//! to one of them.
//!
//! Grounded on `original_source/aioftp/server.py`'s `ftp_*` methods, one
//! function per command here instead of one method per command there.
//! Each handler runs its own precondition guards (`crate::guards`) rather
//! than relying on decorator stacking, since Rust has no decorator syntax —
//! see `guards.rs`'s own doc comment.

use std::sync::Arc;

use crate::{
    connection::Connection,
    guards::GuardFailure,
    server::ServerShared,
    users::User,
    vpath::VirtualPath,
};

mod auth;
mod control;
mod listing;
mod mutation;
mod navigation;
mod pasv;
mod transfer;

/// Whether the dispatcher should keep reading commands (`Continue`) or tear
/// the session down (`Stop`, only `QUIT` and a refused greeting return this).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Stop,
}

/// Sends a guard's failure response. Every handler's first moves are a
/// sequence of guard calls each short-circuiting through this on `Err`.
pub(crate) fn fail(conn: &Connection, failure: GuardFailure) {
    conn.respond(failure.code, failure.message);
}

/// The user and current directory a handler needs to resolve a path; `user`
/// is `None` only if `login_required` was skipped by mistake, since every
/// path-touching command calls it first.
pub(crate) async fn current_user_cwd(conn: &Connection) -> (Option<Arc<User>>, VirtualPath) {
    let state = conn.state.lock().await;
    (state.user.clone(), state.current_directory.clone())
}

/// Routes one parsed command line to its handler. `cmd` is matched
/// case-insensitively per spec.md §6; unrecognized commands answer "502".
pub async fn dispatch(
    conn: &Arc<Connection>,
    shared: &Arc<ServerShared>,
    cmd: &str,
    rest: &str,
) -> Outcome {
    match cmd.to_ascii_uppercase().as_str() {
        "USER" => auth::user(conn, shared, rest).await,
        "PASS" => auth::pass(conn, shared, rest).await,

        "PWD" => navigation::pwd(conn).await,
        "CWD" => navigation::cwd(conn, rest).await,
        "CDUP" => navigation::cdup(conn).await,

        "LIST" => listing::list(conn, shared, rest).await,
        "MLSD" => listing::mlsd(conn, shared, rest).await,
        "MLST" => listing::mlst(conn, rest).await,

        "RETR" => transfer::retr(conn, rest).await,
        "STOR" => transfer::stor(conn, rest).await,
        "APPE" => transfer::appe(conn, rest).await,
        "REST" => transfer::rest(conn, rest).await,
        "SIZE" => transfer::size(conn, rest).await,
        "TYPE" => transfer::type_cmd(conn, rest).await,

        "MKD" => mutation::mkd(conn, rest).await,
        "RMD" => mutation::rmd(conn, rest).await,
        "DELE" => mutation::dele(conn, rest).await,
        "RNFR" => mutation::rnfr(conn, rest).await,
        "RNTO" => mutation::rnto(conn, rest).await,

        "PASV" => pasv::pasv(conn, shared).await,
        "EPSV" => pasv::epsv(conn, shared, rest).await,

        "ABOR" => control::abor(conn).await,
        "QUIT" => control::quit(conn).await,
        "NOOP" => control::noop(conn).await,
        "SYST" => control::syst(conn).await,
        "PBSZ" => control::pbsz(conn, rest).await,
        "PROT" => control::prot(conn, rest).await,

        other => {
            conn.respond("502", format!("'{other}' not implemented"));
            Outcome::Continue
        },
    }
}

/// Whether `cmd` is one of the three commands that are allowed to consume a
/// pending `REST` offset; every other command resets it (spec.md §4.8,
/// invariant 6).
pub(crate) fn consumes_restart_offset(cmd: &str) -> bool {
    matches!(cmd.to_ascii_uppercase().as_str(), "RETR" | "STOR" | "APPE")
}
