// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The client-visible virtual path: a posix-normalized absolute path, kept
//! distinct from the host `real_path` a [`crate::users::User`]'s
//! `base_path` resolves to.
//!
//! Grounded on `original_source/aioftp/server.py`'s `Server.get_paths`, which
//! works on `pathlib.PurePosixPath` throughout; Rust has no posix-only path
//! type in `std`, so this is a small purpose-built one instead of abusing
//! `std::path::PathBuf` (which is platform-separator-aware and would be
//! wrong on a non-unix build host).

use std::fmt;

/// A normalized, always-absolute posix path as the FTP client sees it.
/// `segments` never contains `.`, `..`, or empty components — those are
/// resolved away at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    /// The root path, `/`.
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Parses `input` as a posix path. If it is relative, `base` supplies the
    /// leading directory (mirroring `get_paths`'s
    /// `connection.current_directory / virtual_path` when the client sends a
    /// relative argument). The result is always normalized: `..` pops the
    /// last segment (stopping at the root), `.` and empty segments are
    /// dropped, everything else is appended verbatim.
    pub fn parse_relative_to(input: &str, base: &VirtualPath) -> Self {
        let joined: Vec<&str> = if input.starts_with('/') {
            input.split('/').collect()
        } else {
            let mut parts: Vec<&str> = base.segments.iter().map(String::as_str).collect();
            parts.extend(input.split('/'));
            parts
        };
        let mut out: Vec<String> = Vec::new();
        for part in joined {
            match part {
                "" | "." => {},
                ".." => {
                    out.pop();
                },
                other => out.push(other.to_string()),
            }
        }
        Self { segments: out }
    }

    /// Parses `input` as an absolute posix path. Fails (returns `None`) if
    /// it does not start with `/` — used for config-time `home_path`
    /// validation where relative resolution makes no sense.
    pub fn parse_absolute(input: &str) -> Option<Self> {
        if !input.starts_with('/') {
            return None;
        }
        Some(Self::parse_relative_to(input, &Self::root()))
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The parent of this path; the parent of the root is the root itself
    /// (mirrors `pathlib.PurePosixPath("/").parent == PurePosixPath("/")`).
    pub fn parent(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn join(&self, child: &str) -> Self {
        Self::parse_relative_to(child, self)
    }

    /// Number of path components below `self`, if `other` is `self` or a
    /// descendant of it; `None` otherwise. Used by permission lookup to find
    /// the *nearest* (longest) matching ancestor permission.
    pub fn depth_below(&self, other: &VirtualPath) -> Option<usize> {
        if other.segments.len() < self.segments.len() {
            return None;
        }
        if other.segments[..self.segments.len()] != self.segments[..] {
            return None;
        }
        Some(other.segments.len() - self.segments.len())
    }

    /// This path's segments, joined onto `base` as a host filesystem path —
    /// the "tail" half of `real = base_path / virtual.relative_to("/")`.
    pub fn to_real(&self, base: &std::path::Path) -> std::path::PathBuf {
        let mut real = base.to_path_buf();
        for seg in &self.segments {
            real.push(seg);
        }
        real
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}
