// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session registry: in-memory mapping of session token to username.
//
// Sessions are never persisted: they die on logout, on server stop, or when
// the process exits.  A user holds at most one live token; logging in again
// hands back the token already issued.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::SessionToken;
use tracing::{debug, info, instrument};

/// Random bytes per token before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

/// A live session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct SessionTable {
    by_token: HashMap<SessionToken, Session>,
    by_user: HashMap<String, SessionToken>,
}

/// Issues and validates session tokens.
pub struct SessionRegistry {
    table: Mutex<SessionTable>,
    rng: SystemRandom,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(SessionTable::default()),
            rng: SystemRandom::new(),
        }
    }

    fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind a token to `username` and return it.
    ///
    /// If the user already holds a live token, that token is returned
    /// unchanged instead of minting a second one.
    #[instrument(skip(self))]
    pub fn issue(&self, username: &str) -> Result<SessionToken> {
        let mut table = self.table();
        if let Some(existing) = table.by_user.get(username) {
            debug!(token = %token_fingerprint(existing), "reusing live session");
            return Ok(existing.clone());
        }

        let token = loop {
            let candidate = self.fresh_token()?;
            if !table.by_token.contains_key(&candidate) {
                break candidate;
            }
        };

        table.by_user.insert(username.to_owned(), token.clone());
        table.by_token.insert(
            token.clone(),
            Session {
                token: token.clone(),
                username: username.to_owned(),
                created_at: Utc::now(),
            },
        );

        info!(token = %token_fingerprint(&token), "session issued");
        Ok(token)
    }

    fn fresh_token(&self) -> Result<SessionToken> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| SpoolError::Crypto("system RNG failed to produce a token".into()))?;
        Ok(SessionToken::new(hex::encode(bytes)))
    }

    /// The username bound to `token`, if the session is live.
    pub fn resolve(&self, token: &SessionToken) -> Option<String> {
        self.table()
            .by_token
            .get(token)
            .map(|session| session.username.clone())
    }

    /// Full session details for `token`.
    pub fn session(&self, token: &SessionToken) -> Option<Session> {
        self.table().by_token.get(token).cloned()
    }

    /// Revoke a single session.  Returns the username it belonged to.
    #[instrument(skip_all, fields(token = %token_fingerprint(token)))]
    pub fn revoke(&self, token: &SessionToken) -> Option<String> {
        let mut table = self.table();
        let session = table.by_token.remove(token)?;
        table.by_user.remove(&session.username);
        info!(username = %session.username, "session revoked");
        Some(session.username)
    }

    /// Invalidate every outstanding token.  Returns how many were revoked.
    pub fn revoke_all(&self) -> usize {
        let mut table = self.table();
        let revoked = table.by_token.len();
        table.by_token.clear();
        table.by_user.clear();
        info!(revoked, "all sessions revoked");
        revoked
    }

    /// Number of live sessions.
    pub fn live_count(&self) -> usize {
        self.table().by_token.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Short, non-reversible identifier for a token, safe to put in logs.
pub fn token_fingerprint(token: &SessionToken) -> String {
    let digest = Sha256::digest(token.as_str().as_bytes());
    hex::encode(&digest[..6])
}
