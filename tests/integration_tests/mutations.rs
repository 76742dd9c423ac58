// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use aftpd::cfg::config::{Config, PermissionConfig, ServerConfig, UserConfig};
use aftpd::server::{BoundServer, Server};
use anyhow::{Context, Result};

use crate::integration_tests::common::{ScratchDir, connect, recv_line, send_line, start_anonymous_server};

#[tokio::test]
async fn mkd_rmd_round_trip() -> Result<()> {
    let scratch = ScratchDir::new("mkd-rmd");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));
    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "MKD sub").await?;
    assert_eq!(recv_line(&mut client).await?, "257 \"/sub\" created\r\n");
    assert!(scratch.0.join("sub").is_dir());

    // MKD on an already-existing path is rejected.
    send_line(&mut client, "MKD sub").await?;
    let reply = recv_line(&mut client).await?;
    assert!(reply.starts_with("550"), "unexpected reply: {reply}");

    send_line(&mut client, "RMD sub").await?;
    assert_eq!(recv_line(&mut client).await?, "250 directory removed\r\n");
    assert!(!scratch.0.join("sub").exists());

    Ok(())
}

#[tokio::test]
async fn dele_removes_file() -> Result<()> {
    let scratch = ScratchDir::new("dele");
    std::fs::write(scratch.0.join("f"), b"x")?;
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));
    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "DELE f").await?;
    assert_eq!(recv_line(&mut client).await?, "250 file deleted\r\n");
    assert!(!scratch.0.join("f").exists());

    Ok(())
}

#[tokio::test]
async fn rnfr_rnto_renames_file() -> Result<()> {
    let scratch = ScratchDir::new("rename");
    std::fs::write(scratch.0.join("old"), b"x")?;
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));
    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "RNFR old").await?;
    assert_eq!(recv_line(&mut client).await?, "350 rename pivot set\r\n");

    send_line(&mut client, "RNTO new").await?;
    assert_eq!(recv_line(&mut client).await?, "250 rename done\r\n");

    assert!(!scratch.0.join("old").exists());
    assert!(scratch.0.join("new").exists());

    Ok(())
}

/// `RNTO` without a preceding successful `RNFR` is refused with 503.
#[tokio::test]
async fn rnto_without_rnfr_is_refused() -> Result<()> {
    let scratch = ScratchDir::new("rename-no-pivot");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));
    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "RNTO new").await?;
    let reply = recv_line(&mut client).await?;
    assert!(reply.starts_with("503"), "unexpected reply: {reply}");

    Ok(())
}

/// A user whose permission for `/` is read-only cannot `STOR`, `MKD`, or
/// `DELE` — spec.md §4.4's path-permission guard, fail-closed per the
/// resolved Open Question in DESIGN.md.
#[tokio::test]
async fn read_only_user_cannot_mutate() -> Result<()> {
    let scratch = ScratchDir::new("read-only");
    let user = UserConfig {
        login: None,
        password: None,
        base_path: scratch.0.clone(),
        home_path: "/".to_string(),
        permissions: vec![PermissionConfig { path: "/".to_string(), readable: true, writable: false }],
        maximum_connections: 10,
        read_speed_limit: None,
        write_speed_limit: None,
        read_speed_limit_per_connection: None,
        write_speed_limit_per_connection: None,
    };
    let cfg = Config {
        server: ServerConfig {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            wait_future_timeout: Duration::from_millis(200),
            ..Default::default()
        },
        users: vec![user],
    };
    let server: BoundServer = Server::bind(&cfg).await.context("bind loopback server")?;
    let addr = server.local_addr()?;
    tokio::spawn(async move {
        let _ = server.serve().await;
    });

    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));
    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "MKD sub").await?;
    let reply = recv_line(&mut client).await?;
    assert!(reply.starts_with("550"), "unexpected reply: {reply}");
    assert!(!scratch.0.join("sub").exists());

    Ok(())
}
