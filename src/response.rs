// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! FTP multi-line response framing, and the single queue-draining writer
//! task that keeps a session's replies in FIFO order.
//!
//! Grounded on `original_source/aioftp/server.py`'s `Server.write_response`/
//! `write_line`/`response_writer`: a handler never writes to the socket
//! directly, it enqueues `(code, lines, list_mode)` and one task drains the
//! queue in order, so two concurrently-running handlers (a command handler
//! racing a transfer worker) can never interleave their output mid-line.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::debug;

use crate::stream::ThrottledStream;

pub const END_OF_LINE: &str = "\r\n";

/// One queued reply: a response code, its line(s), and whether it should be
/// framed in "list" style (used only by `MLST`).
#[derive(Debug, Clone)]
pub struct ResponseMessage {
    pub code: &'static str,
    pub lines: Vec<String>,
    pub list_mode: bool,
}

impl ResponseMessage {
    pub fn single(code: &'static str, line: impl Into<String>) -> Self {
        Self { code, lines: vec![line.into()], list_mode: false }
    }

    pub fn lines(code: &'static str, lines: Vec<String>) -> Self {
        Self { code, lines, list_mode: false }
    }

    pub fn list(code: &'static str, lines: Vec<String>) -> Self {
        Self { code, lines, list_mode: true }
    }
}

/// Sending half of a session's response queue. Cloned freely: any command
/// handler or transfer worker can enqueue without fighting over ordering,
/// since the queue itself serializes them.
#[derive(Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<ResponseMessage>,
}

impl ResponseSink {
    pub fn respond(&self, code: &'static str, line: impl Into<String>) {
        let _ = self.tx.send(ResponseMessage::single(code, line));
    }

    pub fn respond_lines(&self, code: &'static str, lines: Vec<String>) {
        let _ = self.tx.send(ResponseMessage::lines(code, lines));
    }

    pub fn respond_list(&self, code: &'static str, lines: Vec<String>) {
        let _ = self.tx.send(ResponseMessage::list(code, lines));
    }
}

/// Builds the `(sink, receiver)` pair for one session, and the writer task
/// that drains `receiver` onto `stream` until the sink side is dropped.
pub fn channel(stream: Arc<ThrottledStream>) -> (ResponseSink, ResponseWriter) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResponseSink { tx }, ResponseWriter { stream, rx })
}

pub struct ResponseWriter {
    stream: Arc<ThrottledStream>,
    rx: mpsc::UnboundedReceiver<ResponseMessage>,
}

impl ResponseWriter {
    /// Runs until the channel closes (every `ResponseSink` clone dropped),
    /// writing each queued reply in order. Mirrors `Server.response_writer`.
    pub async fn run(mut self) -> Result<()> {
        while let Some(msg) = self.rx.recv().await {
            write_response(&self.stream, &msg).await?;
        }
        Ok(())
    }
}

async fn write_line(stream: &ThrottledStream, line: &str) -> Result<()> {
    debug!(%line, "response line");
    let mut buf = String::with_capacity(line.len() + 2);
    buf.push_str(line);
    buf.push_str(END_OF_LINE);
    stream.write(buf.as_bytes()).await
}

/// Writes one framed, possibly multi-line, FTP reply. See spec.md §4.6.
pub async fn write_response(stream: &ThrottledStream, msg: &ResponseMessage) -> Result<()> {
    let code = msg.code;
    if msg.list_mode {
        let (head, rest) = msg.lines.split_first().expect("list replies carry >=1 line");
        let (body, tail) = rest.split_at(rest.len().saturating_sub(1));
        write_line(stream, &format!("{code}-{head}")).await?;
        for line in body {
            write_line(stream, &format!(" {line}")).await?;
        }
        let tail = tail.first().map(String::as_str).unwrap_or(head);
        write_line(stream, &format!("{code} {tail}")).await?;
    } else {
        let (tail, body) = msg.lines.split_last().expect("replies carry >=1 line");
        for line in body {
            write_line(stream, &format!("{code}-{line}")).await?;
        }
        write_line(stream, &format!("{code} {tail}")).await?;
    }
    Ok(())
}
