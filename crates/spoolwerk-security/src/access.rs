// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Access control: per-role permission sets cached at authentication time.
//
// The cache is filled from the credential store each time a user
// authenticates and is never refreshed behind their back, so an
// administrative role change only applies from the user's next login.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use spoolwerk_core::types::{Operation, SessionToken};
use tracing::{debug, instrument};

use crate::session::{SessionRegistry, token_fingerprint};

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The token resolves and the user's role permits the operation.
    Granted { username: String },
    /// The token does not belong to a live session.
    Unauthenticated,
    /// The session is valid but the operation is not permitted (or no
    /// permission set has been loaded for the user).
    Denied { username: String },
}

#[derive(Default)]
struct PermissionCache {
    /// role -> permitted operations
    roles: HashMap<String, HashSet<Operation>>,
    /// username -> role, as of the user's last authentication
    members: HashMap<String, String>,
}

/// Authorization gate composed over the session registry.
pub struct AccessControl {
    sessions: Arc<SessionRegistry>,
    cache: Mutex<PermissionCache>,
}

impl AccessControl {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            sessions,
            cache: Mutex::new(PermissionCache::default()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, PermissionCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `username`'s role and that role's permission set.
    ///
    /// Called after every successful register/authenticate.
    #[instrument(skip(self, operations), fields(granted = operations.len()))]
    pub fn load(&self, username: &str, role: &str, operations: HashSet<Operation>) {
        let mut cache = self.cache();
        cache.roles.insert(role.to_owned(), operations);
        cache.members.insert(username.to_owned(), role.to_owned());
        debug!("permission set cached");
    }

    /// Decide whether `token` may perform `operation`.
    #[instrument(skip_all, fields(token = %token_fingerprint(token), %operation))]
    pub fn authorize(&self, token: &SessionToken, operation: Operation) -> AccessDecision {
        let Some(username) = self.sessions.resolve(token) else {
            debug!("token does not resolve");
            return AccessDecision::Unauthenticated;
        };

        let cache = self.cache();
        let permitted = cache
            .members
            .get(&username)
            .and_then(|role| cache.roles.get(role))
            .is_some_and(|ops| ops.contains(&operation));
        drop(cache);

        if permitted {
            AccessDecision::Granted { username }
        } else {
            debug!(%username, "operation not permitted");
            AccessDecision::Denied { username }
        }
    }

    /// Drop `username`'s role binding (on logout).
    pub fn forget(&self, username: &str) {
        self.cache().members.remove(username);
    }

    /// Drop every cached binding and permission set (on server stop).
    pub fn clear(&self) {
        let mut cache = self.cache();
        cache.roles.clear();
        cache.members.clear();
    }

    /// The role cached for `username`, if any.
    pub fn role_of(&self, username: &str) -> Option<String> {
        self.cache().members.get(username).cloned()
    }
}
