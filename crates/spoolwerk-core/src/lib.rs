// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwerk: Core types, errors, and reply texts shared across all crates.

pub mod config;
pub mod error;
pub mod messages;
pub mod types;

pub use config::ServerConfig;
pub use error::SpoolError;
pub use types::*;
