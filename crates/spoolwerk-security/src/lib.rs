// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! spoolwerk-security: identity and authorization primitives for the spooler.
//!
//! This crate owns everything that decides *who* a caller is and *what* they
//! may do: salted password derivation, the durable credential store, the
//! in-memory session registry, the per-role permission cache, and the
//! append-only audit trail.

pub mod access;
pub mod audit;
pub mod credentials;
pub mod password;
pub mod session;

pub use access::{AccessControl, AccessDecision};
pub use audit::AuditLog;
pub use credentials::{CredentialStore, InsertOutcome, MemoryCredentialStore, SqliteCredentialStore};
pub use password::PasswordHasher;
pub use session::{SessionRegistry, token_fingerprint};
