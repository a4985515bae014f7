// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable reply texts.
//
// Every guard failure and every successful operation is answered with one
// line of plain English.  Keeping the wording here means the dispatcher, the
// shell, and the tests all agree on what a caller sees.

use crate::error::SpoolError;
use crate::types::{Operation, Outcome, Reply, ServerState};

pub const QUEUE_EMPTY: &str = "The print queue is empty.";
pub const SERVER_STARTED: &str = "The print server has been started.";
pub const SERVER_STOPPED: &str = "The print server has been stopped.";
pub const ALREADY_ON: &str = "The print server is already ON.";
pub const ALREADY_OFF: &str = "The print server is already OFF.";
pub const RESTART_WHILE_OFF: &str = "The print server is OFF. Use \"start\" instead of \"restart\".";
pub const LOGGED_IN: &str = "You're in!";
pub const LOGGED_OUT: &str = "You have been logged out.";

/// The presented token does not belong to a live session.
pub fn not_authenticated() -> Reply {
    Reply::new(
        Outcome::AuthenticationFailure,
        "You are not logged in. Please log in or register first.",
    )
}

/// Login failed: unknown username or wrong password.
pub fn bad_credentials(username: &str) -> Reply {
    Reply::new(
        Outcome::AuthenticationFailure,
        format!("Could not authenticate, or there is no user named \"{username}\"."),
    )
}

/// Registration failed because the username is taken.
pub fn username_taken(username: &str) -> Reply {
    Reply::new(
        Outcome::AuthenticationFailure,
        format!("Could not register: a user named \"{username}\" already exists."),
    )
}

/// Registration rejected empty input.
pub fn blank_credentials() -> Reply {
    Reply::new(
        Outcome::AuthenticationFailure,
        "Username and password must not be empty.",
    )
}

pub fn not_authorized(operation: Operation) -> Reply {
    Reply::new(
        Outcome::AuthorizationFailure,
        format!("You are not allowed to use \"{operation}\"."),
    )
}

pub fn server_offline() -> Reply {
    Reply::new(
        Outcome::ServerOffline,
        "The print server is OFF. Please enter \"start\" to start it.",
    )
}

pub fn job_not_found(position: i64) -> Reply {
    Reply::new(
        Outcome::NotFound,
        format!("There is no job at position {position} in the queue."),
    )
}

pub fn config_not_found(key: &str) -> Reply {
    Reply::new(
        Outcome::NotFound,
        format!("No configuration value is set for \"{key}\"."),
    )
}

pub fn status(state: ServerState) -> Reply {
    Reply::ok(state.to_string())
}

pub fn job_queued(position: usize, filename: &str, printer: &str) -> String {
    format!("Job {position}: \"{filename}\" queued on printer \"{printer}\".")
}

pub fn config_value(key: &str, value: &str) -> String {
    format!("{key} = {value}")
}

pub fn config_set(key: &str, value: &str) -> String {
    format!("\"{key}\" has been set to \"{value}\".")
}

/// Convert a collaborator fault into a safe, generic reply.
///
/// The technical detail stays in the server log; the caller only learns that
/// the operation did not happen.
pub fn unavailable(err: &SpoolError) -> Reply {
    let message = match err {
        SpoolError::CredentialStore(_) => {
            "The user database is unavailable right now. Nothing was changed; please try again later."
        }
        SpoolError::Crypto(_) => {
            "A security component failed. Nothing was changed; please try again later."
        }
        SpoolError::Protocol(_) => "The request could not be understood.",
        SpoolError::Transport(_) => "The request could not be completed in time.",
        _ => "The print server had a problem. Nothing was changed; please try again later.",
    };
    Reply::new(Outcome::Unavailable, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_replies_carry_their_outcome() {
        assert_eq!(not_authenticated().outcome, Outcome::AuthenticationFailure);
        assert_eq!(
            not_authorized(Operation::Stop).outcome,
            Outcome::AuthorizationFailure
        );
        assert_eq!(server_offline().outcome, Outcome::ServerOffline);
        assert_eq!(job_not_found(7).outcome, Outcome::NotFound);
        assert_eq!(config_not_found("paper").outcome, Outcome::NotFound);
    }

    #[test]
    fn authorization_message_names_operation() {
        assert!(not_authorized(Operation::TopQueue).message.contains("topQueue"));
    }

    #[test]
    fn unavailable_hides_detail() {
        let reply = unavailable(&SpoolError::CredentialStore("disk I/O error at 0x7f".into()));
        assert_eq!(reply.outcome, Outcome::Unavailable);
        assert!(!reply.message.contains("0x7f"));
    }

    #[test]
    fn status_reply_is_literal_state() {
        assert_eq!(status(ServerState::On).message, "ON");
        assert_eq!(status(ServerState::Off).message, "OFF");
    }
}
