// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `spoolwerk admin`: edits the credential database directly.  Changes reach
// a logged-in user on their next authentication.

use std::path::Path;

use clap::Subcommand;
use spoolwerk_core::config::ServerConfig;
use spoolwerk_core::error::Result;
use spoolwerk_core::types::Operation;
use spoolwerk_security::{AuditLog, SqliteCredentialStore};
use tracing::warn;

use crate::services::spooler::{audit_path, credentials_path};

/// Username recorded in the audit trail for offline changes.
const ADMIN_ACTOR: &str = "admin-cli";

#[derive(Subcommand, Debug)]
pub enum AdminAction {
    /// Move a user to another role
    SetRole { username: String, role: String },

    /// Allow a role to perform an operation
    Grant { role: String, operation: Operation },

    /// Withdraw an operation from a role
    Revoke { role: String, operation: Operation },

    /// Show the most recent audit entries
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

pub fn run(action: AdminAction, data_dir: &Path, config: &ServerConfig) -> Result<()> {
    for line in execute(action, data_dir, config)? {
        println!("{line}");
    }
    Ok(())
}

/// Apply `action` and return the lines to show the operator.
fn execute(action: AdminAction, data_dir: &Path, config: &ServerConfig) -> Result<Vec<String>> {
    let open_store = || SqliteCredentialStore::open(credentials_path(data_dir, config));

    let (event, details, line) = match action {
        AdminAction::Audit { limit } => return audit_lines(data_dir, config, limit),
        AdminAction::SetRole { username, role } => {
            if !open_store()?.set_user_role(&username, &role)? {
                return Ok(vec![format!("No user named \"{username}\".")]);
            }
            (
                "set-role",
                format!("{username} -> {role}"),
                format!("\"{username}\" now has role \"{role}\"."),
            )
        }
        AdminAction::Grant { role, operation } => {
            open_store()?.grant(&role, operation)?;
            (
                "grant",
                format!("{role} +{operation}"),
                format!("Role \"{role}\" may now use \"{operation}\"."),
            )
        }
        AdminAction::Revoke { role, operation } => {
            if !open_store()?.revoke(&role, operation)? {
                return Ok(vec![format!(
                    "Role \"{role}\" did not have \"{operation}\"."
                )]);
            }
            (
                "revoke",
                format!("{role} -{operation}"),
                format!("Role \"{role}\" may no longer use \"{operation}\"."),
            )
        }
    };

    if config.audit_enabled {
        let recorded = AuditLog::open(audit_path(data_dir, config))
            .and_then(|log| log.record(event, ADMIN_ACTOR, true, Some(&details)));
        if let Err(e) = recorded {
            warn!(error = %e, %event, "failed to write audit entry");
        }
    }
    Ok(vec![line])
}

fn audit_lines(data_dir: &Path, config: &ServerConfig, limit: u32) -> Result<Vec<String>> {
    let log = AuditLog::open(audit_path(data_dir, config))?;
    Ok(log
        .recent_entries(limit)?
        .into_iter()
        .map(|entry| {
            format!(
                "{} {:<14} {:<12} {} {}",
                entry.timestamp,
                entry.action,
                entry.username,
                if entry.success { "ok  " } else { "FAIL" },
                entry.details.unwrap_or_default()
            )
        })
        .collect())
}
