// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use aftpd::cfg::config::{Config, PermissionConfig, ServerConfig, UserConfig};
use aftpd::server::{BoundServer, Server};
use anyhow::{Context, Result};

use crate::integration_tests::common::{ScratchDir, connect, parse_pasv_port, recv_line, send_line};

/// A throttled anonymous user: `write_speed_limit_per_connection` is small
/// enough that a multi-megabyte RETR takes seconds rather than
/// milliseconds, giving the test room to send `ABOR` mid-transfer.
async fn start_throttled_server(base_path: &PathBuf) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let user = UserConfig {
        login: None,
        password: None,
        base_path: base_path.clone(),
        home_path: "/".to_string(),
        permissions: vec![PermissionConfig { path: "/".to_string(), readable: true, writable: true }],
        maximum_connections: 10,
        read_speed_limit: None,
        write_speed_limit: None,
        read_speed_limit_per_connection: None,
        write_speed_limit_per_connection: Some(32 * 1024),
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
    let handle = tokio::spawn(async move {
        let _ = server.serve().await;
    });
    Ok((addr, handle))
}

/// spec.md §8 scenario S6: `ABOR` sent mid-`RETR` yields "426 transfer
/// aborted" then "226 abort successful" on the command channel, and the
/// session stays alive afterwards (`NOOP` still answers).
#[tokio::test]
async fn abor_mid_retr_sends_426_then_226() -> Result<()> {
    let scratch = ScratchDir::new("abor-retr");
    // 4 MiB at a 32 KiB/s cap takes well over a minute to finish outright;
    // plenty of time to observe it mid-flight and cancel it.
    std::fs::write(scratch.0.join("big"), vec![0u8; 4 * 1024 * 1024])?;
    let (addr, _server) = start_throttled_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "PASV").await?;
    let pasv_reply = recv_line(&mut client).await?;
    let data_port = parse_pasv_port(&pasv_reply);
    let data_addr = SocketAddr::new(addr.ip(), data_port);
    let mut data = tokio::net::TcpStream::connect(data_addr).await?;

    send_line(&mut client, "RETR big").await?;
    assert_eq!(recv_line(&mut client).await?, "150 data transfer started\r\n");

    // Drain the data channel in the background so the throttle — not TCP
    // backpressure — paces the transfer; otherwise a full send buffer could
    // itself stall the write before ABOR even gets sent.
    let drain = tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 4096];
        loop {
            match data.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {},
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    send_line(&mut client, "ABOR").await?;

    assert_eq!(recv_line(&mut client).await?, "426 transfer aborted\r\n");
    assert_eq!(recv_line(&mut client).await?, "226 abort successful\r\n");

    send_line(&mut client, "NOOP").await?;
    assert_eq!(recv_line(&mut client).await?, "200 noop done\r\n");

    drop(drain);
    Ok(())
}
