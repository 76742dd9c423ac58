// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-session mutable state.
//!
//! Grounded on `original_source/aioftp/server.py`'s `Connection`. Where the
//! original uses a `defaultdict`-of-futures so any field can be read before
//! it's set (the "future-keyed state container" spec.md §9 flags for
//! redesign), this is a plain struct: most fields live behind one
//! `Mutex<ConnectionState>` a handler locks briefly to read or mutate, plus
//! `data_connection` gets its own `Mutex` (so the passive-accept background
//! task can fill it independent of whatever else a handler is doing) and
//! one `Notify` (`data_ready`) — the single field that genuinely needs a
//! waiter, per spec.md §9.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{passive::PassiveListener, pathio::PathIO, response::ResponseSink, stream::ThrottledStream, users::User, vpath::VirtualPath};

/// `TYPE I` (image/binary, the default) or `TYPE A` (ASCII). Non-goals
/// exclude ASCII transcoding — `Ascii` is tracked and answered but bytes
/// are never transformed either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferType {
    #[default]
    Image,
    Ascii,
}

/// The handful of fields more than one task can touch concurrently: the
/// handler that owns the current command, the passive-accept background
/// task, and `ABOR`.
pub struct ConnectionState {
    pub user: Option<Arc<User>>,
    pub logged: bool,
    pub current_directory: VirtualPath,
    pub passive_server: Option<PassiveListener>,
    pub transfer_type: TransferType,
    pub rename_from: Option<PathBuf>,
    pub restart_offset: u64,
    pub acquired: bool,
}

/// Timeout knobs, copied once per connection from `ServerConfig` (spec.md
/// §6 "Configuration surface").
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    pub socket: Option<Duration>,
    pub idle: Option<Duration>,
    pub wait_future: Duration,
    pub path: Option<Duration>,
}

pub struct Connection {
    pub client_host: String,
    pub client_port: u16,
    pub server_host: String,
    pub server_port: u16,
    pub command_stream: Arc<ThrottledStream>,
    pub response: ResponseSink,
    pub timeouts: Timeouts,
    pub block_size: usize,
    pub path_io: Arc<dyn PathIO>,
    pub data_connection: Arc<Mutex<Option<Arc<ThrottledStream>>>>,
    pub data_ready: Arc<Notify>,
    pub state: Mutex<ConnectionState>,
    /// Transfer workers spawned for LIST/MLSD/RETR/STOR/APPE, each with the
    /// token that cancels it. `ABOR` cancels every entry; session teardown
    /// cancels and awaits whatever is still here.
    pub extra_workers: Mutex<Vec<(CancellationToken, JoinHandle<()>)>>,
}

impl Connection {
    pub fn respond(&self, code: &'static str, line: impl Into<String>) {
        self.response.respond(code, line);
    }

    /// Takes the current data connection out of the session, if any —
    /// transfer workers call this once at the start so a later command
    /// cannot reuse an in-flight data channel (spec.md §4.8).
    pub async fn take_data_connection(&self) -> Option<Arc<ThrottledStream>> {
        self.data_connection.lock().await.take()
    }

    /// `REST n` applies only to the very next RETR/STOR/APPE; any other
    /// command resets it. The dispatcher calls this after every command
    /// except those three (spec.md §4.8).
    pub async fn reset_restart_offset(&self) {
        self.state.lock().await.restart_offset = 0;
    }

    /// Registers a spawned transfer worker so `ABOR` and teardown can reach
    /// it, and opportunistically drops handles of workers that already
    /// finished on their own.
    pub async fn track_worker(&self, cancel: CancellationToken, handle: JoinHandle<()>) {
        let mut guard = self.extra_workers.lock().await;
        guard.retain(|(_, h)| !h.is_finished());
        guard.push((cancel, handle));
    }

    /// Cancels every outstanding transfer worker and waits for them to
    /// finish. Used by `ABOR` (workers remain registered afterwards only if
    /// new ones are spawned) and by session teardown.
    pub async fn cancel_all_workers(&self) {
        let workers = std::mem::take(&mut *self.extra_workers.lock().await);
        for (cancel, handle) in workers {
            cancel.cancel();
            let _ = handle.await;
        }
    }
}
