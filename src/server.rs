// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The bound listener and the state every session shares.
//!
//! Grounded on `original_source/aioftp/server.py`'s `Server`: one
//! `available_connections` counter, one optional port pool, one throttle set
//! at the server/server-per-connection scope, and a dict of live connections
//! used to implement `close()`'s "cancel everyone" shutdown. Rust has no
//! `async def start`/`await server.wait_closed()` pair, so that becomes
//! `Server::bind` (construct + listen) and `BoundServer::serve` (accept
//! loop), with a separate `ShutdownHandle` a caller can hold onto after
//! `serve()` is spawned.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cfg::config::Config,
    connection::Timeouts,
    passive::PortPool,
    pathio::{PathIO, filesystem::FilesystemPathIO},
    session,
    stream::NamedThrottle,
    users::{AvailableConnections, MemoryUserManager, UserHandle, UserManager},
};

/// State shared by every session spawned off one listener.
pub struct ServerShared {
    pub host: String,
    pub port: u16,
    pub timeouts: Timeouts,
    pub block_size: usize,
    pub path_io: Arc<dyn PathIO>,
    pub port_pool: Option<Arc<PortPool>>,
    pub server_global: NamedThrottle,
    pub server_per_conn_read: Option<u64>,
    pub server_per_conn_write: Option<u64>,
    pub user_throttles: DashMap<UserHandle, NamedThrottle>,
    pub global_connections: AvailableConnections,
    pub user_manager: Arc<dyn UserManager>,
    pub ipv4_pasv_forced_response_address: Option<String>,
    /// Every live session's cancellation token, keyed by its id, so
    /// [`ShutdownHandle::shutdown`] can reach all of them at once.
    pub sessions: DashMap<u64, CancellationToken>,
    pub next_session_id: AtomicU64,
}

/// A listener bound and ready to accept, plus the shared state its sessions
/// will use. Not yet serving connections — call [`BoundServer::serve`].
pub struct BoundServer {
    listener: TcpListener,
    shared: Arc<ServerShared>,
}

/// Builds the domain `User`s, user manager, port pool, and throttle set from
/// `Config`, and binds the listening socket.
pub struct Server;

impl Server {
    pub async fn bind(cfg: &Config) -> Result<BoundServer> {
        let users = cfg
            .users
            .iter()
            .map(|u| u.to_domain().map(Arc::new))
            .collect::<Result<Vec<_>>>()
            .context("failed to build users from configuration")?;
        let user_manager: Arc<dyn UserManager> = Arc::new(MemoryUserManager::new(users));

        let listener = TcpListener::bind((cfg.server.bind_host.as_str(), cfg.server.bind_port))
            .await
            .with_context(|| format!("failed to bind {}:{}", cfg.server.bind_host, cfg.server.bind_port))?;
        let local_addr = listener.local_addr()?;

        let timeouts = Timeouts {
            socket: cfg.server.socket_timeout,
            idle: cfg.server.idle_timeout,
            wait_future: cfg.server.wait_future_timeout,
            path: cfg.server.path_timeout,
        };

        let port_pool = PortPool::new(cfg.server.data_ports.clone()).map(Arc::new);
        let server_global = NamedThrottle::fresh(
            "server_global",
            cfg.server.read_speed_limit,
            cfg.server.write_speed_limit,
        );

        let shared = Arc::new(ServerShared {
            host: cfg.server.bind_host.clone(),
            port: local_addr.port(),
            timeouts,
            block_size: cfg.server.block_size,
            path_io: Arc::new(FilesystemPathIO),
            port_pool,
            server_global,
            server_per_conn_read: cfg.server.read_speed_limit_per_connection,
            server_per_conn_write: cfg.server.write_speed_limit_per_connection,
            user_throttles: DashMap::new(),
            global_connections: AvailableConnections::new(cfg.server.maximum_connections),
            user_manager,
            ipv4_pasv_forced_response_address: cfg.server.ipv4_pasv_forced_response_address.clone(),
            sessions: DashMap::new(),
            next_session_id: AtomicU64::new(0),
        });

        Ok(BoundServer { listener, shared })
    }
}

impl BoundServer {
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { shared: self.shared.clone() }
    }

    /// Accepts connections until the listener itself errors out, spawning
    /// one dispatcher task per connection. Never returns on the happy path;
    /// a caller wanting graceful shutdown holds a [`ShutdownHandle`] from
    /// before calling this and races it elsewhere.
    pub async fn serve(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "accepting connections");
        loop {
            let (socket, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                },
            };
            let shared = self.shared.clone();
            tokio::spawn(async move {
                session::run_session(shared, socket, peer).await;
            });
        }
    }
}

/// Lets a caller outside the accept loop cancel every live session, e.g. on
/// `SIGINT`/`SIGTERM`. Each session's own teardown (`session::teardown`)
/// handles releasing its slot and closing its passive listener.
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<ServerShared>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        for entry in self.shared.sessions.iter() {
            entry.value().cancel();
        }
    }
}
