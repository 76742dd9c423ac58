// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A throttled, line/block-oriented wrapper around one TCP connection's two
//! halves.
//!
//! Grounded on the teacher's `client::client::ClientConnection`, which also
//! splits a socket into a mutex-guarded read half and write half so one task
//! can read while another writes. Here the pair additionally runs every I/O
//! through a named set of shared throttles, porting
//! `original_source/aioftp/common.py`'s `ThrottleStreamIO`: `wait(name)`
//! consults every throttle attached under that name and blocks for the
//! longest of their individual waits (waiting for the max duration is
//! equivalent to waiting for all of them in parallel, since none of them has
//! a side effect on the others), and `append(name, data, start)` updates all
//! of them after the I/O actually happens.
//!
//! The command connection and its data connection share the same
//! [`ThrottleSet`] (cloned, not rebuilt) so `server_per_connection` and
//! `user_per_connection` limits apply across both, exactly as the original's
//! single `self.throttle` dict is threaded into the passive-mode data stream.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Result;
use bytes::Bytes;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::Mutex,
    time::Instant,
};

use crate::{error::OperationTimeout, throttle::Throttle};

/// A throttle shared by pointer across every stream it is attached to.
pub type SharedThrottle = Arc<Mutex<Throttle>>;

/// One named throttle attached to a stream, split by direction so a read
/// wait never contends with a concurrent write's bookkeeping.
#[derive(Clone)]
pub struct NamedThrottle {
    pub name: &'static str,
    pub read: SharedThrottle,
    pub write: SharedThrottle,
}

impl NamedThrottle {
    pub fn fresh(name: &'static str, read_bps: Option<u64>, write_bps: Option<u64>) -> Self {
        Self {
            name,
            read: Arc::new(Mutex::new(Throttle::new(read_bps))),
            write: Arc::new(Mutex::new(Throttle::new(write_bps))),
        }
    }
}

/// All throttles attached to one stream, in attachment order.
pub type ThrottleSet = Vec<NamedThrottle>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Read,
    Write,
}

/// Wraps one TCP connection's split halves with shared throttling and
/// timeout-bounded line/block/exact reads.
pub struct ThrottledStream {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    /// Mutable so a session can attach `user_global`/`user_per_connection`
    /// throttles once login succeeds, after the stream already exists —
    /// mirrors `original_source/aioftp/server.py`'s `ftp_user` doing
    /// `connection.command_connection.throttles.update(...)` on a
    /// dict-of-throttles that outlives the stream's construction.
    throttles: Mutex<ThrottleSet>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl ThrottledStream {
    pub fn new(
        read_half: OwnedReadHalf,
        write_half: OwnedWriteHalf,
        throttles: ThrottleSet,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            throttles: Mutex::new(throttles),
            read_timeout,
            write_timeout,
        }
    }

    /// The throttle set this stream is using, for attaching to a sibling
    /// data connection (cloning a `ThrottleSet` clones `Arc`s, not state).
    pub async fn throttles(&self) -> ThrottleSet {
        self.throttles.lock().await.clone()
    }

    /// Adds a throttle this stream did not start with — used once a session
    /// identifies its user and the user-scoped limits become known.
    pub async fn attach(&self, throttle: NamedThrottle) {
        self.throttles.lock().await.push(throttle);
    }

    async fn wait(&self, dir: Direction) {
        let mut longest = Duration::ZERO;
        for named in self.throttles.lock().await.iter() {
            let arc = match dir {
                Direction::Read => &named.read,
                Direction::Write => &named.write,
            };
            let guard = arc.lock().await;
            if let Some(d) = guard.wait_duration(Instant::now()) {
                longest = longest.max(d);
            }
        }
        if longest > Duration::ZERO {
            tokio::time::sleep(longest).await;
        }
    }

    async fn append(&self, dir: Direction, len: usize, start: Instant) {
        for named in self.throttles.lock().await.iter() {
            let arc = match dir {
                Direction::Read => &named.read,
                Direction::Write => &named.write,
            };
            arc.lock().await.append(len, start);
        }
    }

    async fn with_read_timeout<F, T>(&self, label: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        apply_timeout(self.read_timeout, label, fut).await
    }

    async fn with_write_timeout<F, T>(&self, label: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        apply_timeout(self.write_timeout, label, fut).await
    }

    /// Reads one line, including the trailing `\n` if present. Returns an
    /// empty buffer at EOF.
    pub async fn readline(&self) -> Result<Bytes> {
        self.wait(Direction::Read).await;
        let start = Instant::now();
        let mut buf = Vec::new();
        let n = self
            .with_read_timeout("readline", async {
                let mut r = self.reader.lock().await;
                r.read_until(b'\n', &mut buf).await
            })
            .await?;
        self.append(Direction::Read, n, start).await;
        Ok(Bytes::from(buf))
    }

    /// Reads up to `max` bytes in one underlying read call. An empty result
    /// means EOF.
    pub async fn read(&self, max: usize) -> Result<Bytes> {
        self.wait(Direction::Read).await;
        let start = Instant::now();
        let mut buf = vec![0u8; max];
        let n = self
            .with_read_timeout("read", async {
                let mut r = self.reader.lock().await;
                r.read(&mut buf).await
            })
            .await?;
        buf.truncate(n);
        self.append(Direction::Read, n, start).await;
        Ok(Bytes::from(buf))
    }

    /// Reads exactly `count` bytes, failing if the peer closes first.
    pub async fn readexactly(&self, count: usize) -> Result<Bytes> {
        self.wait(Direction::Read).await;
        let start = Instant::now();
        let mut buf = vec![0u8; count];
        self.with_read_timeout("readexactly", async {
            let mut r = self.reader.lock().await;
            r.read_exact(&mut buf).await
        })
        .await?;
        self.append(Direction::Read, count, start).await;
        Ok(Bytes::from(buf))
    }

    /// Writes the whole buffer and flushes it.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.wait(Direction::Write).await;
        let start = Instant::now();
        self.with_write_timeout("write", async {
            let mut w = self.writer.lock().await;
            w.write_all(data).await?;
            w.flush().await
        })
        .await?;
        self.append(Direction::Write, data.len(), start).await;
        Ok(())
    }

    /// One block of a block-iterated transfer: `None` signals EOF, matching
    /// the original's `iter_by_block` generator.
    pub async fn read_block(&self, block_size: usize) -> Result<Option<Bytes>> {
        let chunk = self.read(block_size).await?;
        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }

    /// One line of a line-iterated transfer: `None` signals EOF.
    pub async fn read_line_iter(&self) -> Result<Option<Bytes>> {
        let line = self.readline().await?;
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }

    pub async fn shutdown(&self) {
        let mut w = self.writer.lock().await;
        let _ = w.shutdown().await;
    }
}

async fn apply_timeout<F, T>(d: Option<Duration>, label: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match d {
        Some(dur) => match tokio::time::timeout(dur, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(OperationTimeout(label).into()),
        },
        None => Ok(fut.await?),
    }
}
