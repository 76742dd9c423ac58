// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Users, path permissions, and the pluggable user manager seam.
//!
//! Grounded on `original_source/aioftp/server.py`'s `Permission`, `User`,
//! `AbstractUserManager`, `MemoryUserManager`, and `AvailableConnections`.

use std::{
    hash::{Hash, Hasher},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::{error::PathIsNotAbsolute, vpath::VirtualPath};

/// A readable/writable grant on a subtree of the virtual filesystem.
#[derive(Debug, Clone)]
pub struct Permission {
    pub path: VirtualPath,
    pub readable: bool,
    pub writable: bool,
}

impl Default for Permission {
    /// The fallback permission when nothing else matches: full access at
    /// the root, same as `original_source`'s `Permission()` default.
    fn default() -> Self {
        Self { path: VirtualPath::root(), readable: true, writable: true }
    }
}

impl Permission {
    pub fn new(path: VirtualPath, readable: bool, writable: bool) -> Self {
        Self { path, readable, writable }
    }
}

/// A registered FTP user. `login: None` is the anonymous fallback record —
/// at most one such record is ever consulted by a user manager.
#[derive(Debug)]
pub struct User {
    pub login: Option<String>,
    pub password: Option<String>,
    pub base_path: PathBuf,
    pub home_path: VirtualPath,
    pub permissions: Vec<Permission>,
    pub maximum_connections: u32,
    pub read_limit: Option<u64>,
    pub write_limit: Option<u64>,
    pub read_limit_per_conn: Option<u64>,
    pub write_limit_per_conn: Option<u64>,
}

impl User {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        login: Option<String>,
        password: Option<String>,
        base_path: PathBuf,
        home_path: &str,
        permissions: Vec<Permission>,
        maximum_connections: u32,
        read_limit: Option<u64>,
        write_limit: Option<u64>,
        read_limit_per_conn: Option<u64>,
        write_limit_per_conn: Option<u64>,
    ) -> Result<Self> {
        let home_path = VirtualPath::parse_absolute(home_path)
            .ok_or_else(|| PathIsNotAbsolute(PathBuf::from(home_path)))?;
        let permissions =
            if permissions.is_empty() { vec![Permission::default()] } else { permissions };
        Ok(Self {
            login,
            password,
            base_path,
            home_path,
            permissions,
            maximum_connections,
            read_limit,
            write_limit,
            read_limit_per_conn,
            write_limit_per_conn,
        })
    }

    /// The applicable permission for `path`: the permission whose path is an
    /// ancestor of `path` with the *longest* match (i.e. smallest
    /// `depth_below`); ties keep the first one found (insertion order),
    /// matching `min(..., default=Permission())` over a stable iterator in
    /// the original.
    pub fn get_permissions(&self, path: &VirtualPath) -> Permission {
        self.permissions
            .iter()
            .filter_map(|p| p.path.depth_below(path).map(|d| (d, p)))
            .min_by_key(|(d, _)| *d)
            .map(|(_, p)| p.clone())
            .unwrap_or_default()
    }
}

/// Hands out `Arc<User>` keyed by pointer identity rather than value
/// equality — two `User`s with coincidentally-equal fields must not share a
/// connection quota. See `DESIGN.md` §3.2.
#[derive(Debug, Clone)]
pub struct UserHandle(pub Arc<User>);

impl PartialEq for UserHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for UserHandle {}

impl Hash for UserHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state)
    }
}

/// A bounded, non-blocking counter. `acquire`/`release` fail (instead of
/// blocking) when they would cross a bound, mirroring
/// `original_source`'s `AvailableConnections`, which raises `ValueError`
/// rather than waiting.
#[derive(Debug)]
pub struct AvailableConnections {
    max: i64,
    value: AtomicI64,
}

impl AvailableConnections {
    pub fn new(max: u32) -> Self {
        Self { max: max as i64, value: AtomicI64::new(max as i64) }
    }

    pub fn locked(&self) -> bool {
        self.value.load(Ordering::SeqCst) == 0
    }

    pub fn acquire(&self) -> Result<()> {
        let v = self.value.fetch_sub(1, Ordering::SeqCst) - 1;
        if v < 0 {
            self.value.fetch_add(1, Ordering::SeqCst);
            bail!("too many acquires");
        }
        Ok(())
    }

    pub fn release(&self) -> Result<()> {
        let v = self.value.fetch_add(1, Ordering::SeqCst) + 1;
        if v > self.max {
            self.value.fetch_sub(1, Ordering::SeqCst);
            bail!("too many releases");
        }
        Ok(())
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }
}

/// Outcome of a `get_user` lookup, matching `AbstractUserManager.GetUserResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserManagerResponse {
    Ok,
    PasswordRequired,
    Error,
}

/// Pluggable user directory + authenticator, the seam spec.md §4.2 names.
/// `MemoryUserManager` below is the one implementation this crate ships;
/// embedders can supply their own (LDAP, a database, ...).
#[async_trait]
pub trait UserManager: Send + Sync {
    /// Selects a user for `login` (pre-acquiring its connection slot on
    /// success) and reports what `USER` should answer.
    async fn get_user(
        &self,
        login: Option<&str>,
    ) -> (UserManagerResponse, Option<Arc<User>>, String);

    /// Whether `password` authenticates `user`.
    async fn authenticate(&self, user: &Arc<User>, password: &str) -> bool;

    /// Releases the connection slot acquired by a prior `get_user`.
    async fn notify_logout(&self, user: &Arc<User>);
}

/// The built-in user manager: a fixed, in-memory set of users.
pub struct MemoryUserManager {
    users: Vec<Arc<User>>,
    available: DashMap<UserHandle, Arc<AvailableConnections>>,
}

impl MemoryUserManager {
    pub fn new(users: Vec<Arc<User>>) -> Self {
        let users = if users.is_empty() {
            vec![Arc::new(
                User::new(None, None, PathBuf::from("."), "/", Vec::new(), 10, None, None, None, None)
                    .expect("default user home_path is absolute"),
            )]
        } else {
            users
        };
        let available = DashMap::new();
        for u in &users {
            available.insert(
                UserHandle(u.clone()),
                Arc::new(AvailableConnections::new(u.maximum_connections)),
            );
        }
        Self { users, available }
    }

    fn slot_for(&self, user: &Arc<User>) -> Arc<AvailableConnections> {
        self.available
            .get(&UserHandle(user.clone()))
            .expect("every tracked user has a slot counter")
            .clone()
    }
}

#[async_trait]
impl UserManager for MemoryUserManager {
    async fn get_user(
        &self,
        login: Option<&str>,
    ) -> (UserManagerResponse, Option<Arc<User>>, String) {
        // Single pass: an exact login match always wins even if found after
        // an anonymous candidate, per `original_source`'s scan.
        let mut anonymous: Option<&Arc<User>> = None;
        let mut found: Option<&Arc<User>> = None;
        for u in &self.users {
            if u.login.is_none() && anonymous.is_none() {
                anonymous = Some(u);
            } else if u.login.as_deref() == login {
                found = Some(u);
                break;
            }
        }
        let user = found.or(anonymous);

        let Some(user) = user else {
            return (UserManagerResponse::Error, None, "no such username".to_string());
        };

        let slot = self.slot_for(user);
        if slot.locked() {
            let name = user.login.clone().unwrap_or_else(|| "anonymous".to_string());
            return (
                UserManagerResponse::Error,
                None,
                format!("too much connections for {name:?}"),
            );
        }

        let (state, info) = if user.login.is_none() {
            (UserManagerResponse::Ok, "anonymous login".to_string())
        } else if user.password.is_none() {
            (UserManagerResponse::Ok, "login without password".to_string())
        } else {
            (UserManagerResponse::PasswordRequired, "password required".to_string())
        };

        // Pre-acquire on selection, before PASS — see spec.md §4.2 rationale.
        let _ = slot.acquire();
        (state, Some(user.clone()), info)
    }

    async fn authenticate(&self, user: &Arc<User>, password: &str) -> bool {
        user.password.as_deref() == Some(password)
    }

    async fn notify_logout(&self, user: &Arc<User>) {
        let _ = self.slot_for(user).release();
    }
}
