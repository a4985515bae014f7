// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spooler services: resolves the on-disk layout, opens the credential and
// audit databases, and builds the shared `Dispatcher`.
//
// Layout of the data directory:
//
//   config.json       deployment settings (`ServerConfig`)
//   credentials.db    users, roles, role permissions
//   audit.db          append-only audit trail

use std::path::{Path, PathBuf};
use std::sync::Arc;

use spoolwerk_core::config::ServerConfig;
use spoolwerk_core::error::Result;
use spoolwerk_print::{DispatchPolicy, Dispatcher};
use spoolwerk_security::{AuditLog, CredentialStore, SqliteCredentialStore};
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "config.json";
const CREDENTIALS_FILE: &str = "credentials.db";
const AUDIT_FILE: &str = "audit.db";

/// Everything the listener needs, opened once at startup.
#[derive(Clone)]
pub struct SpoolerServices {
    config: ServerConfig,
    data_dir: PathBuf,
    credentials: Arc<SqliteCredentialStore>,
    dispatcher: Arc<Dispatcher>,
}

impl SpoolerServices {
    /// Open the persistent stores under `data_dir`.
    pub fn init(data_dir: PathBuf, config: ServerConfig) -> Result<Self> {
        config.validate()?;
        info!(path = %data_dir.display(), "initialising spooler services");

        let credentials = Arc::new(SqliteCredentialStore::open(credentials_path(
            &data_dir, &config,
        ))?);
        let audit = if config.audit_enabled {
            Some(AuditLog::open(audit_path(&data_dir, &config))?)
        } else {
            None
        };

        Ok(Self::assemble(data_dir, config, credentials, audit))
    }

    /// In-memory stores only.  Nothing survives the process.
    pub fn ephemeral(data_dir: PathBuf, config: ServerConfig) -> Result<Self> {
        config.validate()?;
        warn!("using in-memory credential and audit stores; nothing will persist");

        let credentials = Arc::new(SqliteCredentialStore::open_in_memory()?);
        let audit = if config.audit_enabled {
            Some(AuditLog::open_in_memory()?)
        } else {
            None
        };

        Ok(Self::assemble(data_dir, config, credentials, audit))
    }

    fn assemble(
        data_dir: PathBuf,
        config: ServerConfig,
        credentials: Arc<SqliteCredentialStore>,
        audit: Option<AuditLog>,
    ) -> Self {
        let store: Arc<dyn CredentialStore> = credentials.clone();
        let mut dispatcher = Dispatcher::new(store, DispatchPolicy::from(&config));
        if let Some(audit) = audit {
            dispatcher = dispatcher.with_audit(audit);
        }

        info!(
            default_role = %config.default_role,
            audit = config.audit_enabled,
            "spooler services initialised"
        );

        Self {
            config,
            data_dir,
            credentials,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn credentials(&self) -> &SqliteCredentialStore {
        &self.credentials
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }
}

pub fn credentials_path(data_dir: &Path, config: &ServerConfig) -> PathBuf {
    config
        .credentials_db
        .clone()
        .unwrap_or_else(|| data_dir.join(CREDENTIALS_FILE))
}

pub fn audit_path(data_dir: &Path, config: &ServerConfig) -> PathBuf {
    config
        .audit_db
        .clone()
        .unwrap_or_else(|| data_dir.join(AUDIT_FILE))
}

// ---------------------------------------------------------------------------
// Config persistence
// ---------------------------------------------------------------------------

/// Load `path`, falling back to defaults (with a warning) if it is missing
/// or unreadable.
pub fn load_config(path: &Path) -> ServerConfig {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file not readable, using defaults");
            return ServerConfig::default();
        }
    };
    match serde_json::from_str(&data) {
        Ok(config) => {
            info!(path = %path.display(), "config loaded");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file invalid, using defaults");
            ServerConfig::default()
        }
    }
}

pub fn persist_config(path: &Path, config: &ServerConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}
