// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `ABOR`/`QUIT`/`NOOP`/`SYST`/`PBSZ`/`PROT`: session control commands with
//! no path or transfer state of their own.
//!
//! Grounded on `original_source/aioftp/server.py`'s `ftp_ABOR`/`ftp_QUIT`/
//! `ftp_NOOP`/`ftp_SYST`/`ftp_PBSZ`/`ftp_PROT`. `PBSZ`/`PROT` exist only so
//! clients that probe for FTPS support get an answer; TLS itself is out of
//! scope (spec.md §1) so both are accepted and otherwise inert.

use std::sync::Arc;

use crate::connection::Connection;

use super::Outcome;

pub async fn abor(conn: &Arc<Connection>) -> Outcome {
    let has_workers = !conn.extra_workers.lock().await.is_empty();
    if has_workers {
        conn.cancel_all_workers().await;
    } else {
        conn.respond("226", "nothing to abort");
    }
    Outcome::Continue
}

pub async fn quit(conn: &Arc<Connection>) -> Outcome {
    conn.respond("221", "bye");
    Outcome::Stop
}

pub async fn noop(conn: &Arc<Connection>) -> Outcome {
    conn.respond("200", "noop done");
    Outcome::Continue
}

pub async fn syst(conn: &Arc<Connection>) -> Outcome {
    conn.respond("215", "UNIX Type: L8");
    Outcome::Continue
}

pub async fn pbsz(conn: &Arc<Connection>, rest: &str) -> Outcome {
    conn.respond("200", format!("PBSZ={}", rest.trim()));
    Outcome::Continue
}

pub async fn prot(conn: &Arc<Connection>, rest: &str) -> Outcome {
    conn.respond("200", format!("PROT {}", rest.trim()));
    Outcome::Continue
}
