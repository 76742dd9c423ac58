// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use aftpd::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    server::Server,
};
use anyhow::{Context, Result};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _init_logger = init_logger("config/logger.yaml")?;

    let cfg = resolve_config_path("config/server.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let server = Server::bind(&cfg).await.context("failed to bind listener")?;
    let shutdown = server.shutdown_handle();
    let addr = server.local_addr()?;
    info!(%addr, "aftpd listening");

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal, cancelling live sessions");
            shutdown.shutdown();
        }
    });

    server.serve().await
}
