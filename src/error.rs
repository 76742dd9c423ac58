// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Leaf error kinds named by the server's error handling design.
//!
//! Everywhere else in the crate propagates with `anyhow::Result` and
//! `.context(...)`; these are the few kinds that the dispatcher needs to
//! pattern-match on rather than just log and continue.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration-time error: a user's `home_path` was not absolute.
#[derive(Debug, Error)]
#[error("home_path must be absolute posix path, got {0:?}")]
pub struct PathIsNotAbsolute(pub PathBuf);

/// Raised when the passive-mode port pool has no free port left to try.
#[derive(Debug, Error)]
#[error("no free data ports available")]
pub struct NoAvailablePort;

/// Error kind surfaced by the `PathIO` trait. Any failure talking to the
/// on-disk (or otherwise virtualized) filesystem is wrapped in this so the
/// dispatcher can recognize it and answer "451 file system error" instead of
/// tearing the session down.
#[derive(Debug, Error)]
#[error("path io error on {path:?}: {source}")]
pub struct PathIOError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl PathIOError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self { path: path.into(), source }
    }
}

/// A read/write/wait operation did not complete within its configured
/// timeout. Fatal for the operation; fatal for the session only when it is
/// the idle timeout on the command channel (the dispatcher decides that).
#[derive(Debug, Error)]
#[error("{0} timed out")]
pub struct OperationTimeout(pub &'static str);

/// Downcasts an `anyhow::Error` to a `PathIOError` if that's what it wraps.
///
/// Used at the dispatcher boundary to distinguish "451 file system error"
/// (session survives) from any other unexpected failure (logged, session
/// still survives unless the command stream itself is broken).
pub fn as_path_io_error(err: &anyhow::Error) -> Option<&PathIOError> {
    err.downcast_ref::<PathIOError>()
}
