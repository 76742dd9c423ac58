// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The abortable-transfer wrapper: runs a transfer future to completion,
//! reports `PathIOError`s as "451", and answers `ABOR`'s cancellation with
//! the 426/226 response pair.
//!
//! Grounded on `original_source/aioftp/server.py`'s `worker` decorator,
//! which catches `asyncio.CancelledError` around the wrapped coroutine and
//! sends `426 transfer aborted` / `226 abort successful`. `ABOR` here
//! signals cancellation through a `tokio_util::sync::CancellationToken`
//! rather than relying on `JoinHandle::abort` (which would drop the future
//! without this module ever getting to run its response lines).

use std::future::Future;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{connection::Connection, error::as_path_io_error};

/// Runs `fut` to completion unless `cancel` fires first. A fired `cancel`
/// while `fut` is still pending drops `fut` at its current await point
/// (same effect as `asyncio`'s `CancelledError` unwinding the coroutine)
/// and sends the abort response pair instead of whatever `fut` would have
/// sent.
///
/// `fut`'s own `Err` is expected to carry a `PathIOError` for filesystem
/// failures (answered "451") — anything else is logged and swallowed,
/// since a transfer worker has no caller left to propagate to.
pub async fn worker<F>(conn: &Connection, cancel: CancellationToken, fut: F)
where
    F: Future<Output = Result<()>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            conn.respond("426", "transfer aborted");
            conn.respond("226", "abort successful");
        }
        result = fut => {
            if let Err(err) = result {
                if let Some(pio_err) = as_path_io_error(&err) {
                    conn.respond("451", pio_err.to_string());
                } else {
                    warn!(error = %err, "transfer worker failed");
                    conn.respond("451", "action aborted, local error in processing");
                }
            }
        }
    }
}
