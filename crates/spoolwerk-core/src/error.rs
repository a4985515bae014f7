// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spoolwerk.
//
// Only collaborator-level faults live here.  Guard failures (bad token,
// missing permission, server offline, unknown job) are ordinary replies and
// never travel as errors.

use thiserror::Error;

/// Top-level error type for all Spoolwerk operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    // -- Credential store / persistence --
    #[error("credential store unavailable: {0}")]
    CredentialStore(String),

    #[error("audit log error: {0}")]
    Audit(String),

    // -- Security --
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    // -- Transport --
    #[error("malformed request: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolError>;
