// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Passive-mode data port lifecycle: a bounded port pool plus a single-shot
//! accept listener bound to one session.
//!
//! Grounded on `original_source/aioftp/server.py`'s `Server._start_passive_server`
//! (port pool walk with `viewed_ports`, `EADDRINUSE` retry-with-demoted-priority)
//! and `ftp_pasv`/`ftp_epsv`'s inline accept `handler` (first connection wins,
//! everything after is closed).

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
    task::JoinHandle,
};

use crate::{
    error::NoAvailablePort,
    stream::{ThrottleSet, ThrottledStream},
};

/// A min-heap of `(priority, port)`, ascending — the same ordering
/// `asyncio.PriorityQueue` gives the original. Demoting a port (bumping its
/// priority) sends it to the back of the round-robin.
pub struct PortPool {
    heap: Mutex<BinaryHeap<Reverse<(u32, u16)>>>,
}

impl PortPool {
    /// `None` when `ports` is empty — the server runs "unconstrained"
    /// (ephemeral OS-chosen ports) rather than from a fixed pool.
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Option<Self> {
        let heap: BinaryHeap<Reverse<(u32, u16)>> =
            ports.into_iter().map(|p| Reverse((0, p))).collect();
        if heap.is_empty() { None } else { Some(Self { heap: Mutex::new(heap) }) }
    }

    async fn pop(&self) -> Option<(u32, u16)> {
        self.heap.lock().await.pop().map(|Reverse(x)| x)
    }

    pub async fn return_port(&self, port: u16, priority: u32) {
        self.heap.lock().await.push(Reverse((priority, port)));
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    #[cfg(test)]
    async fn snapshot_ports(&self) -> Vec<u16> {
        let mut v: Vec<u16> = self.heap.lock().await.iter().map(|Reverse((_, p))| *p).collect();
        v.sort_unstable();
        v
    }
}

/// Binds a listener either from `pool` (retrying on `EADDRINUSE` with a
/// demoted priority, failing with [`NoAvailablePort`] once every pool port
/// has been seen this attempt) or, if `pool` is `None`, on an OS-chosen
/// ephemeral port.
async fn bind_from_pool(
    pool: Option<&Arc<PortPool>>,
    host: &str,
) -> Result<(TcpListener, Option<(Arc<PortPool>, u32)>)> {
    let Some(pool) = pool else {
        let listener = TcpListener::bind((host, 0)).await?;
        return Ok((listener, None));
    };

    let mut viewed = HashSet::new();
    loop {
        let Some((priority, port)) = pool.pop().await else {
            return Err(NoAvailablePort.into());
        };
        if viewed.contains(&port) {
            // Conserve the pool: this attempt failed entirely, put the port
            // back rather than leaking it (spec.md §8 invariant 5).
            pool.return_port(port, priority).await;
            return Err(NoAvailablePort.into());
        }
        viewed.insert(port);
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok((listener, Some((pool.clone(), priority)))),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                pool.return_port(port, priority + 1).await;
            },
            Err(e) => return Err(e.into()),
        }
    }
}

/// A listener bound for one session's `PASV`/`EPSV`. Accepts connections in
/// the background for its entire lifetime; the first one is handed to the
/// session (via `data_slot`/`data_ready`), every later one is dropped
/// immediately — see spec.md §4.7.
pub struct PassiveListener {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
    pool_return: Option<(Arc<PortPool>, u32)>,
}

impl PassiveListener {
    pub async fn start(
        host: &str,
        pool: Option<&Arc<PortPool>>,
        throttles: ThrottleSet,
        socket_timeout: Option<Duration>,
        data_slot: Arc<Mutex<Option<Arc<ThrottledStream>>>>,
        data_ready: Arc<Notify>,
    ) -> Result<Self> {
        let (listener, pool_return) = bind_from_pool(pool, host).await?;
        let local_addr = listener.local_addr()?;

        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((socket, _peer)) = listener.accept().await else {
                    return;
                };
                let mut slot = data_slot.lock().await;
                if slot.is_some() {
                    // Single-accept binding: anything after the first is
                    // closed without disturbing the session's data channel.
                    drop(socket);
                    continue;
                }
                let (read_half, write_half) = socket.into_split();
                let stream = ThrottledStream::new(
                    read_half,
                    write_half,
                    throttles.clone(),
                    socket_timeout,
                    socket_timeout,
                );
                *slot = Some(Arc::new(stream));
                data_ready.notify_waiters();
            }
        });

        Ok(Self { local_addr, accept_task, pool_return })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_ipv4(&self) -> bool {
        self.local_addr.is_ipv4()
    }

    /// Stops accepting and, if this listener came from a bounded pool,
    /// returns its port with `priority+1` so recently-used ports drift to
    /// the back of the round-robin (spec.md §4.5 teardown).
    pub async fn close(self) {
        self.accept_task.abort();
        if let Some((pool, priority)) = self.pool_return {
            pool.return_port(self.port(), priority + 1).await;
        }
    }
}
