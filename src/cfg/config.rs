// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::users::{Permission, User};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Listen address, timeouts, throttling, and data-port policy.
    pub server: ServerConfig,
    /// Registered users; an entry with `login: null` is the anonymous
    /// fallback. An empty list falls back to one all-access anonymous user,
    /// same as `MemoryUserManager::new`'s default.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(rename = "BindHost", default = "default_bind_host")]
    pub bind_host: String,
    #[serde(rename = "BindPort", default)]
    pub bind_port: u16,

    #[serde(rename = "BlockSize", default = "default_block_size")]
    pub block_size: usize,

    #[serde(rename = "SocketTimeout", default, with = "serde_secs_opt")]
    pub socket_timeout: Option<Duration>,
    #[serde(rename = "IdleTimeout", default, with = "serde_secs_opt")]
    pub idle_timeout: Option<Duration>,
    #[serde(rename = "WaitFutureTimeout", with = "serde_secs")]
    pub wait_future_timeout: Duration,
    #[serde(rename = "PathTimeout", default, with = "serde_secs_opt")]
    pub path_timeout: Option<Duration>,

    #[serde(rename = "MaximumConnections", default = "default_maximum_connections")]
    pub maximum_connections: u32,

    #[serde(rename = "ReadSpeedLimit", default)]
    pub read_speed_limit: Option<u64>,
    #[serde(rename = "WriteSpeedLimit", default)]
    pub write_speed_limit: Option<u64>,
    #[serde(rename = "ReadSpeedLimitPerConnection", default)]
    pub read_speed_limit_per_connection: Option<u64>,
    #[serde(rename = "WriteSpeedLimitPerConnection", default)]
    pub write_speed_limit_per_connection: Option<u64>,

    #[serde(rename = "Ipv4PasvForcedResponseAddress", default)]
    pub ipv4_pasv_forced_response_address: Option<String>,

    /// Explicit passive-mode data port pool. Empty means "unconstrained"
    /// (ephemeral OS-chosen ports).
    #[serde(rename = "DataPorts", default)]
    pub data_ports: Vec<u16>,

    /// Must be `"utf-8"`; Non-goals exclude other transcodings, this field
    /// exists only so the config shape matches spec.md §6, not because
    /// another value is supported.
    #[serde(rename = "Encoding", default = "default_encoding")]
    pub encoding: String,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_block_size() -> usize {
    8192
}
fn default_maximum_connections() -> u32 {
    512
}
fn default_encoding() -> String {
    "utf-8".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UserConfig {
    #[serde(rename = "Login", default)]
    pub login: Option<String>,
    #[serde(rename = "Password", default)]
    pub password: Option<String>,
    #[serde(rename = "BasePath")]
    pub base_path: PathBuf,
    #[serde(rename = "HomePath", default = "default_home_path")]
    pub home_path: String,
    #[serde(rename = "Permissions", default)]
    pub permissions: Vec<PermissionConfig>,
    #[serde(rename = "MaximumConnections", default = "default_user_max_connections")]
    pub maximum_connections: u32,
    #[serde(rename = "ReadSpeedLimit", default)]
    pub read_speed_limit: Option<u64>,
    #[serde(rename = "WriteSpeedLimit", default)]
    pub write_speed_limit: Option<u64>,
    #[serde(rename = "ReadSpeedLimitPerConnection", default)]
    pub read_speed_limit_per_connection: Option<u64>,
    #[serde(rename = "WriteSpeedLimitPerConnection", default)]
    pub write_speed_limit_per_connection: Option<u64>,
}

fn default_home_path() -> String {
    "/".to_string()
}
fn default_user_max_connections() -> u32 {
    10
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PermissionConfig {
    #[serde(rename = "Path", default = "default_home_path")]
    pub path: String,
    #[serde(rename = "Readable", default = "default_true")]
    pub readable: bool,
    #[serde(rename = "Writable", default = "default_true")]
    pub writable: bool,
}

fn default_true() -> bool {
    true
}

impl UserConfig {
    /// Builds the runtime `users::User` this config entry maps to, per
    /// SPEC_FULL.md §3.1.
    pub fn to_domain(&self) -> Result<User> {
        let permissions = self
            .permissions
            .iter()
            .map(|p| {
                let path = crate::vpath::VirtualPath::parse_absolute(&p.path)
                    .ok_or_else(|| crate::error::PathIsNotAbsolute(PathBuf::from(&p.path)))?;
                Ok(Permission::new(path, p.readable, p.writable))
            })
            .collect::<Result<Vec<_>>>()?;
        User::new(
            self.login.clone(),
            self.password.clone(),
            self.base_path.clone(),
            &self.home_path,
            permissions,
            self.maximum_connections,
            self.read_speed_limit,
            self.write_speed_limit,
            self.read_speed_limit_per_connection,
            self.write_speed_limit_per_connection,
        )
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants. Per-user `home_path` validity is checked when
    /// each `UserConfig` is converted via `to_domain`.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(self.server.maximum_connections >= 1, "MaximumConnections must be >= 1");
        ensure!(self.server.block_size >= 1, "BlockSize must be >= 1");
        ensure!(self.server.encoding == "utf-8", "Encoding must be \"utf-8\"");
        ensure!(
            !self.server.wait_future_timeout.is_zero(),
            "WaitFutureTimeout must be > 0"
        );

        let mut seen_anonymous = false;
        for user in &self.users {
            ensure!(user.maximum_connections >= 1, "user MaximumConnections must be >= 1");
            if user.login.is_none() {
                ensure!(!seen_anonymous, "at most one anonymous (Login: null) user allowed");
                seen_anonymous = true;
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            bind_port: 0,
            block_size: default_block_size(),
            socket_timeout: None,
            idle_timeout: None,
            wait_future_timeout: Duration::from_secs(1),
            path_timeout: None,
            maximum_connections: default_maximum_connections(),
            read_speed_limit: None,
            write_speed_limit: None,
            read_speed_limit_per_connection: None,
            write_speed_limit_per_connection: None,
            ipv4_pasv_forced_response_address: None,
            data_ports: Vec::new(),
            encoding: default_encoding(),
        }
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// As `serde_secs`, for the optional-duration fields (`socket`/`idle`/`path`
/// timeouts, any of which may be left unset to mean "no timeout").
mod serde_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<u64>::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}
