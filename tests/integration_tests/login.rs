// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;

use crate::integration_tests::common::{
    ScratchDir, connect, recv_line, send_line, start_anonymous_server, start_password_server,
};

/// spec.md §8 scenario S1: anonymous login, then PWD reports the root.
#[tokio::test]
async fn anonymous_login_then_pwd() -> Result<()> {
    let scratch = ScratchDir::new("anon-login");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;

    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert_eq!(recv_line(&mut client).await?, "230 anonymous login\r\n");

    send_line(&mut client, "PWD").await?;
    assert_eq!(recv_line(&mut client).await?, "257 \"/\"\r\n");

    Ok(())
}

/// spec.md §8 scenario S2: wrong password is rejected, correct one logs in.
#[tokio::test]
async fn password_user_wrong_then_right() -> Result<()> {
    let scratch = ScratchDir::new("password-login");
    let (addr, _server) = start_password_server(&scratch.0, "u", "p").await?;
    let mut client = connect(addr).await?;

    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER u").await?;
    assert_eq!(recv_line(&mut client).await?, "331 password required\r\n");

    send_line(&mut client, "PASS x").await?;
    assert_eq!(recv_line(&mut client).await?, "530 wrong password\r\n");

    send_line(&mut client, "PASS p").await?;
    assert_eq!(recv_line(&mut client).await?, "230 normal login\r\n");

    Ok(())
}

/// Commands that require a user before login are refused with 503, not a
/// panic or silent drop — guards.rs's `login_required`.
#[tokio::test]
async fn commands_before_login_are_refused() -> Result<()> {
    let scratch = ScratchDir::new("pre-login");
    let (addr, _server) = start_password_server(&scratch.0, "u", "p").await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "PWD").await?;
    let reply = recv_line(&mut client).await?;
    assert!(reply.starts_with("530"), "unexpected reply: {reply}");

    Ok(())
}

/// USER re-issued mid-session after a successful login must log the prior
/// user out (so its connection slot isn't leaked) before starting over.
#[tokio::test]
async fn reissuing_user_logs_out_prior_user() -> Result<()> {
    let scratch = ScratchDir::new("reissue-user");
    let (addr, _server) = start_anonymous_server(&scratch.0).await?;
    let mut client = connect(addr).await?;
    assert!(recv_line(&mut client).await?.starts_with("220"));

    send_line(&mut client, "USER anonymous").await?;
    assert_eq!(recv_line(&mut client).await?, "230 anonymous login\r\n");

    send_line(&mut client, "USER anonymous").await?;
    assert_eq!(recv_line(&mut client).await?, "230 anonymous login\r\n");

    send_line(&mut client, "PWD").await?;
    assert_eq!(recv_line(&mut client).await?, "257 \"/\"\r\n");

    Ok(())
}
