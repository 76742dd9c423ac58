// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddr;

use anyhow::Result;
use tokio::io::AsyncWriteExt;

use crate::integration_tests::common::{
    ScratchDir, connect, parse_pasv_port, recv_line, send_line, start_anonymous_server,
};

/// spec.md §8 scenario S5: `REST 3` then `STOR` writes starting at offset 3
/// of an existing 5-byte file, leaving "abcXY" behind.
#[tokio::test]
async fn rest_then_stor_resumes_at_offset() -> Result<()> {
    let scratch = ScratchDir::new("rest-stor");
    std::fs::write(scratch.0.join("f"), b"abcde")?;
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "REST 3").await?;
    assert_eq!(recv_line(&mut client).await?, "350 restarting at 3\r\n");

    send_line(&mut client, "PASV").await?;
    let pasv_reply = recv_line(&mut client).await?;
    let data_port = parse_pasv_port(&pasv_reply);
    let data_addr = SocketAddr::new(addr.ip(), data_port);
    let mut data = tokio::net::TcpStream::connect(data_addr).await?;

    send_line(&mut client, "STOR f").await?;
    assert_eq!(recv_line(&mut client).await?, "150 data transfer started\r\n");

    data.write_all(b"XY").await?;
    data.shutdown().await?;

    assert_eq!(recv_line(&mut client).await?, "226 data transfer done\r\n");

    let contents = std::fs::read(scratch.0.join("f"))?;
    assert_eq!(contents, b"abcXY");

    Ok(())
}

/// spec.md §8 invariant 6: any non-transfer command following `REST` resets
/// the restart offset back to zero.
#[tokio::test]
async fn rest_offset_resets_after_unrelated_command() -> Result<()> {
    let scratch = ScratchDir::new("rest-reset");
    std::fs::write(scratch.0.join("f"), b"abcde")?;
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "REST 3").await?;
    assert_eq!(recv_line(&mut client).await?, "350 restarting at 3\r\n");

    // NOOP is not RETR/STOR/APPE, so it must clear the pending offset.
    send_line(&mut client, "NOOP").await?;
    assert_eq!(recv_line(&mut client).await?, "200 noop done\r\n");

    send_line(&mut client, "PASV").await?;
    let pasv_reply = recv_line(&mut client).await?;
    let data_port = parse_pasv_port(&pasv_reply);
    let data_addr = SocketAddr::new(addr.ip(), data_port);
    let mut data = tokio::net::TcpStream::connect(data_addr).await?;

    send_line(&mut client, "STOR f").await?;
    assert_eq!(recv_line(&mut client).await?, "150 data transfer started\r\n");
    data.write_all(b"Z").await?;
    data.shutdown().await?;
    assert_eq!(recv_line(&mut client).await?, "226 data transfer done\r\n");

    // STOR without a restart offset truncates and writes from the start.
    let contents = std::fs::read(scratch.0.join("f"))?;
    assert_eq!(contents, b"Z");

    Ok(())
}

/// `SIZE` on an existing file reports its byte length via "213".
#[tokio::test]
async fn size_reports_file_length() -> Result<()> {
    let scratch = ScratchDir::new("size");
    std::fs::write(scratch.0.join("f"), b"abcde")?;
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));
    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "SIZE f").await?;
    assert_eq!(recv_line(&mut client).await?, "213 5\r\n");

    Ok(())
}

/// `RETR` streams an existing file's bytes over the data channel.
#[tokio::test]
async fn retr_streams_file_contents() -> Result<()> {
    use tokio::io::AsyncReadExt;

    let scratch = ScratchDir::new("retr");
    std::fs::write(scratch.0.join("f"), b"hello world")?;
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));
    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "PASV").await?;
    let pasv_reply = recv_line(&mut client).await?;
    let data_port = parse_pasv_port(&pasv_reply);
    let data_addr = SocketAddr::new(addr.ip(), data_port);
    let mut data = tokio::net::TcpStream::connect(data_addr).await?;

    send_line(&mut client, "RETR f").await?;
    assert_eq!(recv_line(&mut client).await?, "150 data transfer started\r\n");

    let mut buf = Vec::new();
    data.read_to_end(&mut buf).await?;
    assert_eq!(buf, b"hello world");

    assert_eq!(recv_line(&mut client).await?, "226 data transfer done\r\n");

    Ok(())
}
