// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The on-disk I/O seam: a `PathIO` trait the dispatcher talks to, plus one
//! concrete implementation (`FilesystemPathIO`) backed by `tokio::fs`.
//!
//! Every path handed to this trait has already been jailed and translated
//! from virtual to real by `path_resolver::get_paths` — nothing here
//! re-validates that a path stays under some root. Every failure is wrapped
//! in [`PathIOError`] so the dispatcher can recognize it and answer
//! "451 file system error" per the server's error handling design, rather
//! than tearing the session down.

use std::{path::Path, time::SystemTime};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::PathIOError;

pub mod filesystem;

/// The facts this server needs about a filesystem entry, independent of any
/// particular backing implementation.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub is_dir: bool,
    pub is_file: bool,
    pub len: u64,
    pub modified: SystemTime,
}

/// How a file is opened: FTP only ever needs these three modes (`REST`
/// seeks after opening for read or write, it never needs read-write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

/// An open file handle. `Box<dyn FileHandle>` is what `PathIO::open` hands
/// back, since the concrete file type varies by implementation.
#[async_trait]
pub trait FileHandle: Send {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, PathIOError>;
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), PathIOError>;
    async fn seek(&mut self, offset: u64) -> Result<(), PathIOError>;
    async fn close(&mut self) -> Result<(), PathIOError>;
}

/// One block of a block-iterated file read: `None` signals EOF, the same
/// contract as `stream::ThrottledStream::read_block`.
pub async fn read_block(
    handle: &mut dyn FileHandle,
    block_size: usize,
) -> Result<Option<bytes::Bytes>, PathIOError> {
    let mut buf = vec![0u8; block_size];
    let n = handle.read(&mut buf).await?;
    if n == 0 {
        Ok(None)
    } else {
        buf.truncate(n);
        Ok(Some(bytes::Bytes::from(buf)))
    }
}

/// The abstract path-I/O provider spec.md treats as an external collaborator.
/// `FilesystemPathIO` (below) is the one concrete implementation this crate
/// ships; embedders are free to provide another (e.g. an in-memory or
/// S3-backed one) behind the same trait.
#[async_trait]
pub trait PathIO: Send + Sync {
    async fn stat(&self, path: &Path) -> Result<Stat, PathIOError>;
    async fn exists(&self, path: &Path) -> Result<bool, PathIOError>;
    async fn is_file(&self, path: &Path) -> Result<bool, PathIOError>;
    async fn is_dir(&self, path: &Path) -> Result<bool, PathIOError>;
    async fn size(&self, path: &Path) -> Result<u64, PathIOError>;
    /// Direct children of `path`, unsorted — callers sort if they need to.
    async fn list(&self, path: &Path) -> Result<Vec<std::path::PathBuf>, PathIOError>;
    async fn open(
        &self,
        path: &Path,
        mode: OpenMode,
    ) -> Result<Box<dyn FileHandle>, PathIOError>;
    async fn mkdir(&self, path: &Path, parents: bool) -> Result<(), PathIOError>;
    async fn rmdir(&self, path: &Path) -> Result<(), PathIOError>;
    async fn unlink(&self, path: &Path) -> Result<(), PathIOError>;
    async fn rename(&self, source: &Path, destination: &Path) -> Result<(), PathIOError>;
}

pub use filesystem::FilesystemPathIO;

pub(crate) struct TokioFileHandle {
    pub(crate) file: tokio::fs::File,
}

#[async_trait]
impl FileHandle for TokioFileHandle {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, PathIOError> {
        self.file
            .read(buf)
            .await
            .map_err(|e| PathIOError::new("<open file>", e))
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), PathIOError> {
        self.file
            .write_all(buf)
            .await
            .map_err(|e| PathIOError::new("<open file>", e))
    }

    async fn seek(&mut self, offset: u64) -> Result<(), PathIOError> {
        self.file
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map(|_| ())
            .map_err(|e| PathIOError::new("<open file>", e))
    }

    async fn close(&mut self) -> Result<(), PathIOError> {
        self.file
            .flush()
            .await
            .map_err(|e| PathIOError::new("<open file>", e))
    }
}
