// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire protocol: newline-delimited JSON frames.
//
// A request is one JSON object tagged by `op`:
//
//   {"op":"print","filename":"report.pdf","printer":"hp1","token":"9f2c..."}
//   {"op":"topQueue","job":0,"token":"9f2c..."}
//   {"op":"status"}
//
// A response is one serialised `Reply`:
//
//   {"outcome":"ok","message":"0 report.pdf"}
//   {"outcome":"ok","message":"You're in!","token":"9f2c..."}

use std::fmt;

use serde::{Deserialize, Serialize};
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{Operation, Reply, SessionToken};

/// One remote call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    Register {
        username: String,
        password: String,
    },
    Authenticate {
        username: String,
        password: String,
    },
    Logout {
        token: SessionToken,
    },
    Print {
        filename: String,
        printer: String,
        token: SessionToken,
    },
    Queue {
        token: SessionToken,
    },
    TopQueue {
        job: i64,
        token: SessionToken,
    },
    Start {
        #[serde(default)]
        token: Option<SessionToken>,
    },
    Stop {
        token: SessionToken,
    },
    Restart {
        token: SessionToken,
    },
    Status {
        #[serde(default)]
        token: Option<SessionToken>,
    },
    ReadConfig {
        key: String,
        token: SessionToken,
    },
    SetConfig {
        key: String,
        value: String,
        token: SessionToken,
    },
}

impl Request {
    /// Wire name of the request.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Authenticate { .. } => "authenticate",
            Self::Logout { .. } => "logout",
            other => other
                .operation()
                .map(|op| op.as_str())
                .unwrap_or("unknown"),
        }
    }

    /// The protected operation this request performs, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Register { .. } | Self::Authenticate { .. } | Self::Logout { .. } => None,
            Self::Print { .. } => Some(Operation::Print),
            Self::Queue { .. } => Some(Operation::Queue),
            Self::TopQueue { .. } => Some(Operation::TopQueue),
            Self::Start { .. } => Some(Operation::Start),
            Self::Stop { .. } => Some(Operation::Stop),
            Self::Restart { .. } => Some(Operation::Restart),
            Self::Status { .. } => Some(Operation::Status),
            Self::ReadConfig { .. } => Some(Operation::ReadConfig),
            Self::SetConfig { .. } => Some(Operation::SetConfig),
        }
    }
}

// Passwords and tokens must never reach a log line through `{:?}`.
impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request::{}", self.name())
    }
}

/// Encode a frame, including the trailing newline.
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode a request from one line (without its newline).
pub fn decode_request(line: &[u8]) -> Result<Request> {
    serde_json::from_slice(line).map_err(|e| SpoolError::Protocol(e.to_string()))
}

/// Decode a reply from one line (without its newline).
pub fn decode_reply(line: &[u8]) -> Result<Reply> {
    serde_json::from_slice(line).map_err(|e| SpoolError::Protocol(e.to_string()))
}
