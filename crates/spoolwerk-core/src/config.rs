// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpoolError};

/// Persistent service settings, stored as `config.json` in the data directory.
///
/// These are deployment settings, not the runtime key/value parameters that
/// clients manipulate through `readConfig`/`setConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the spooler listens on.
    pub listen_addr: SocketAddr,
    /// Credential database path (defaults to `credentials.db` in the data dir).
    pub credentials_db: Option<PathBuf>,
    /// Audit database path (defaults to `audit.db` in the data dir).
    pub audit_db: Option<PathBuf>,
    /// Enable audit trail logging.
    pub audit_enabled: bool,
    /// Role assigned to self-registered users.
    pub default_role: String,
    /// Allow `start` without a session token (bootstrap from OFF).
    pub allow_anonymous_start: bool,
    /// Upper bound on the handling time of a single request.
    pub request_timeout_secs: u64,
    /// Largest accepted request frame.
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8631)),
            credentials_db: None,
            audit_db: None,
            audit_enabled: true,
            default_role: "admin".into(),
            allow_anonymous_start: true,
            request_timeout_secs: 10,
            max_request_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(SpoolError::InvalidConfig(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.max_request_bytes == 0 {
            return Err(SpoolError::InvalidConfig(
                "max_request_bytes must be greater than zero".into(),
            ));
        }
        if self.default_role.trim().is_empty() {
            return Err(SpoolError::InvalidConfig("default_role must not be empty".into()));
        }
        Ok(())
    }
}
