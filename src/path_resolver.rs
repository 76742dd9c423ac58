// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Virtual-to-real path translation and jail enforcement.
//!
//! Grounded on `original_source/aioftp/server.py`'s `Server.get_paths`:
//! normalize the client-given path against the session's current directory,
//! then join it onto the user's `base_path`; if the result ever manages to
//! land outside `base_path`, silently clamp to `(base_path, "/")` rather
//! than erroring, exactly as the original does.

use std::path::PathBuf;

use crate::{users::User, vpath::VirtualPath};

/// Resolves a client-supplied path string into `(real, virtual)`, per
/// spec.md §4.3.
pub fn get_paths(
    user: &User,
    current_directory: &VirtualPath,
    input: &str,
) -> (PathBuf, VirtualPath) {
    let virtual_path = VirtualPath::parse_relative_to(input, current_directory);
    let real_path = virtual_path.to_real(&user.base_path);
    if real_path.starts_with(&user.base_path) {
        (real_path, virtual_path)
    } else {
        (user.base_path.clone(), VirtualPath::root())
    }
}
