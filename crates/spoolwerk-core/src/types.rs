// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Spoolwerk print spooler.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SpoolError;

/// A protected operation that a role may be permitted to perform.
///
/// The wire and storage names are the camelCase forms (`topQueue`,
/// `readConfig`, ...), matching the remote operation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Print,
    Queue,
    TopQueue,
    Start,
    Stop,
    Restart,
    Status,
    ReadConfig,
    SetConfig,
}

impl Operation {
    /// Every protected operation, in declaration order.
    pub const ALL: [Operation; 9] = [
        Self::Print,
        Self::Queue,
        Self::TopQueue,
        Self::Start,
        Self::Stop,
        Self::Restart,
        Self::Status,
        Self::ReadConfig,
        Self::SetConfig,
    ];

    /// Name used on the wire and in the credential store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Queue => "queue",
            Self::TopQueue => "topQueue",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Status => "status",
            Self::ReadConfig => "readConfig",
            Self::SetConfig => "setConfig",
        }
    }

    /// Whether the operation may run while the server is OFF.
    pub fn allowed_while_off(&self) -> bool {
        matches!(self, Self::Start | Self::Status)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = SpoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SpoolError::UnknownOperation(s.to_owned()))
    }
}

/// Process-wide lifecycle state of the spooler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    #[default]
    Off,
    On,
}

impl ServerState {
    pub fn is_on(&self) -> bool {
        *self == Self::On
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("OFF"),
            Self::On => f.write_str("ON"),
        }
    }
}

/// Opaque session token handed to a client after register/authenticate.
///
/// `Debug` is redacted so tokens never leak through `?` formatting in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored user, as held by the credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    /// PBKDF2 output for the user's password.
    pub password_hash: Vec<u8>,
    /// Per-user random salt.
    pub salt: Vec<u8>,
    pub role: String,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// A job admitted to the print queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    pub filename: String,
    pub printer: String,
    /// Username of the session that submitted the job.
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
}

impl PrintJob {
    pub fn new(
        filename: impl Into<String>,
        printer: impl Into<String>,
        submitted_by: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            printer: printer.into(),
            submitted_by: submitted_by.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Classification of a reply from the dispatcher.
///
/// Every request produces exactly one reply; the outcome tells the caller
/// which guard (if any) stopped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    /// Unknown user, wrong password, duplicate registration, or a token that
    /// does not resolve.
    AuthenticationFailure,
    /// Valid session, but the role does not permit the operation.
    AuthorizationFailure,
    /// The server is OFF.
    ServerOffline,
    /// Bad job position or missing config key.
    NotFound,
    /// A collaborator (credential store, worker pool) failed.
    Unavailable,
}

/// The single response produced for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub outcome: Outcome,
    pub message: String,
    /// Present only on a successful register/authenticate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SessionToken>,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Outcome::Ok, message)
    }

    pub fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            token: None,
        }
    }

    /// Successful login or registration carrying the session token.
    pub fn session(token: SessionToken, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Ok,
            message: message.into(),
            token: Some(token),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}
