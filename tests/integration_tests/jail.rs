// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;

use crate::integration_tests::common::{ScratchDir, connect, recv_line, send_line, start_anonymous_server};

/// spec.md §8 scenario S3 / invariant 2: a `..`-escape attempt from the
/// root stays pinned at the root instead of reaching outside `base_path`
/// (spec.md §4.3's jail enforcement — `VirtualPath` normalization stops
/// each `..` at the root rather than letting it underflow).
#[tokio::test]
async fn cwd_escape_attempt_stays_at_root() -> Result<()> {
    let scratch = ScratchDir::new("jail-escape");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "CWD ../../../../..").await?;
    assert_eq!(recv_line(&mut client).await?, "250 cwd done\r\n");

    send_line(&mut client, "PWD").await?;
    assert_eq!(recv_line(&mut client).await?, "257 \"/\"\r\n");

    Ok(())
}

/// A subdirectory created inside the jail can be entered, and `..` from
/// there returns to root rather than escaping the jail a second time.
#[tokio::test]
async fn cwd_into_subdir_then_dotdot_back_to_root() -> Result<()> {
    let scratch = ScratchDir::new("jail-subdir");
    std::fs::create_dir(scratch.0.join("sub"))?;
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "CWD sub").await?;
    assert_eq!(recv_line(&mut client).await?, "250 cwd done\r\n");
    send_line(&mut client, "PWD").await?;
    assert_eq!(recv_line(&mut client).await?, "257 \"/sub\"\r\n");

    send_line(&mut client, "CDUP").await?;
    assert_eq!(recv_line(&mut client).await?, "250 cwd done\r\n");
    send_line(&mut client, "PWD").await?;
    assert_eq!(recv_line(&mut client).await?, "257 \"/\"\r\n");

    Ok(())
}

/// `CWD` into a path that does not exist on disk is rejected with 550, not
/// silently accepted.
#[tokio::test]
async fn cwd_into_nonexistent_dir_is_rejected() -> Result<()> {
    let scratch = ScratchDir::new("jail-missing");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "CWD nope").await?;
    let reply = recv_line(&mut client).await?;
    assert!(reply.starts_with("550"), "unexpected reply: {reply}");

    Ok(())
}
