// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The one concrete `PathIO` implementation this crate ships, backed by
//! `tokio::fs`. Real filesystem semantics: case-sensitive, symlinks followed,
//! permissions enforced by the OS on top of whatever this server's own
//! permission layer already decided.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{FileHandle, OpenMode, PathIO, Stat, TokioFileHandle};
use crate::error::PathIOError;

#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemPathIO;

impl FilesystemPathIO {
    pub fn new() -> Self {
        Self
    }
}

fn wrap(path: &Path, err: std::io::Error) -> PathIOError {
    PathIOError::new(path, err)
}

#[async_trait]
impl PathIO for FilesystemPathIO {
    async fn stat(&self, path: &Path) -> Result<Stat, PathIOError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| wrap(path, e))?;
        Ok(Stat {
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            len: meta.len(),
            modified: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool, PathIOError> {
        match tokio::fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(wrap(path, e)),
        }
    }

    async fn is_file(&self, path: &Path) -> Result<bool, PathIOError> {
        Ok(self.exists(path).await? && self.stat(path).await?.is_file)
    }

    async fn is_dir(&self, path: &Path) -> Result<bool, PathIOError> {
        Ok(self.exists(path).await? && self.stat(path).await?.is_dir)
    }

    async fn size(&self, path: &Path) -> Result<u64, PathIOError> {
        Ok(self.stat(path).await?.len)
    }

    async fn list(&self, path: &Path) -> Result<Vec<PathBuf>, PathIOError> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| wrap(path, e))?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| wrap(path, e))? {
            out.push(entry.path());
        }
        Ok(out)
    }

    async fn open(
        &self,
        path: &Path,
        mode: OpenMode,
    ) -> Result<Box<dyn FileHandle>, PathIOError> {
        let file = match mode {
            OpenMode::Read => tokio::fs::File::open(path).await,
            OpenMode::Write => {
                tokio::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .await
            }
            OpenMode::Append => {
                tokio::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .open(path)
                    .await
            }
        }
        .map_err(|e| wrap(path, e))?;
        Ok(Box::new(TokioFileHandle { file }))
    }

    async fn mkdir(&self, path: &Path, parents: bool) -> Result<(), PathIOError> {
        if parents {
            tokio::fs::create_dir_all(path).await
        } else {
            tokio::fs::create_dir(path).await
        }
        .map_err(|e| wrap(path, e))
    }

    async fn rmdir(&self, path: &Path) -> Result<(), PathIOError> {
        tokio::fs::remove_dir(path).await.map_err(|e| wrap(path, e))
    }

    async fn unlink(&self, path: &Path) -> Result<(), PathIOError> {
        tokio::fs::remove_file(path).await.map_err(|e| wrap(path, e))
    }

    async fn rename(&self, source: &Path, destination: &Path) -> Result<(), PathIOError> {
        tokio::fs::rename(source, destination)
            .await
            .map_err(|e| wrap(source, e))
    }
}
