// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{path::PathBuf, time::Duration};

use aftpd::{
    cfg::config::{Config, PermissionConfig, ServerConfig, UserConfig},
    server::{BoundServer, Server},
};
use anyhow::{Context, Result};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// A directory under `std::env::temp_dir` removed on drop, avoiding a
/// `tempfile` dependency the teacher's stack doesn't carry.
pub struct ScratchDir(pub PathBuf);

impl ScratchDir {
    pub fn new(label: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "aftpd-integration-{label}-{:?}",
            std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .expect("system clock")
        ));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        Self(dir)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn anonymous_user(base_path: &PathBuf) -> UserConfig {
    UserConfig {
        login: None,
        password: None,
        base_path: base_path.clone(),
        home_path: "/".to_string(),
        permissions: vec![PermissionConfig { path: "/".to_string(), readable: true, writable: true }],
        maximum_connections: 10,
        read_speed_limit: None,
        write_speed_limit: None,
        read_speed_limit_per_connection: None,
        write_speed_limit_per_connection: None,
    }
}

fn password_user(base_path: &PathBuf, login: &str, password: &str) -> UserConfig {
    UserConfig {
        login: Some(login.to_string()),
        password: Some(password.to_string()),
        base_path: base_path.clone(),
        home_path: "/".to_string(),
        permissions: vec![PermissionConfig { path: "/".to_string(), readable: true, writable: true }],
        maximum_connections: 10,
        read_speed_limit: None,
        write_speed_limit: None,
        read_speed_limit_per_connection: None,
        write_speed_limit_per_connection: None,
    }
}

/// Binds a loopback server over `users`, spawns its accept loop, and returns
/// it alongside the bound address. The caller is responsible for keeping
/// `scratch` alive for as long as the server runs.
pub async fn start_server(users: Vec<UserConfig>) -> Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let cfg = Config {
        server: ServerConfig {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            wait_future_timeout: Duration::from_millis(200),
            ..Default::default()
        },
        users,
    };
    let server: BoundServer = Server::bind(&cfg).await.context("bind loopback server")?;
    let addr = server.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = server.serve().await;
    });
    Ok((addr, handle))
}

pub async fn start_anonymous_server(base_path: &PathBuf) -> Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    start_server(vec![anonymous_user(base_path)]).await
}

pub async fn start_password_server(
    base_path: &PathBuf,
    login: &str,
    password: &str,
) -> Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    start_server(vec![password_user(base_path, login, password)]).await
}

pub async fn connect(addr: std::net::SocketAddr) -> Result<TcpStream> {
    TcpStream::connect(addr).await.context("connect to loopback server")
}

pub async fn recv_line(stream: &mut TcpStream) -> Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n") {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).to_string())
}

pub async fn send_line(stream: &mut TcpStream, line: &str) -> Result<()> {
    stream.write_all(format!("{line}\r\n").as_bytes()).await?;
    Ok(())
}

/// Parses `227 listen socket created (h1,h2,h3,h4,p1,p2)` into the data
/// channel's port number.
pub fn parse_pasv_port(reply: &str) -> u16 {
    let start = reply.find('(').expect("pasv reply carries a tuple");
    let end = reply.find(')').expect("pasv reply carries a tuple");
    let nums: Vec<u16> = reply[start + 1..end]
        .split(',')
        .map(|s| s.trim().parse().expect("numeric pasv field"))
        .collect();
    (nums[4] << 8) | nums[5]
}
