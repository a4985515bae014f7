// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Interactive shell: a line-oriented front end over `SpoolClient`.
//
// The shell is a loop over three modes:
//
//   Offline    server is OFF          status, start, quit
//   Anonymous  server ON, no token    login, register, status, quit
//   Session    holding a token        every operation, logout, quit
//
// The mode only changes on a reply: a successful login moves to Session, a
// stop moves to Offline, any "server offline" reply drops the token.

use std::fmt;

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::{Outcome, Reply, ServerState, SessionToken};
use spoolwerk_print::{Request, SpoolClient};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// A shell command, as typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Status,
    Start,
    Quit,
    Login,
    Register,
    Logout,
    Print,
    Queue,
    TopQueue,
    Stop,
    Restart,
    ReadConfig,
    SetConfig,
}

impl Command {
    const OFFLINE: &'static [Command] = &[Command::Status, Command::Start, Command::Quit];

    const ANONYMOUS: &'static [Command] = &[
        Command::Login,
        Command::Register,
        Command::Status,
        Command::Quit,
    ];

    const SESSION: &'static [Command] = &[
        Command::Print,
        Command::Queue,
        Command::TopQueue,
        Command::ReadConfig,
        Command::SetConfig,
        Command::Status,
        Command::Start,
        Command::Stop,
        Command::Restart,
        Command::Logout,
        Command::Quit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Start => "start",
            Self::Quit => "quit",
            Self::Login => "login",
            Self::Register => "register",
            Self::Logout => "logout",
            Self::Print => "print",
            Self::Queue => "queue",
            Self::TopQueue => "topQueue",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::ReadConfig => "readConfig",
            Self::SetConfig => "setConfig",
        }
    }

    /// Parse a typed word, ignoring case and surrounding whitespace.
    pub fn parse(input: &str) -> Option<Self> {
        let word = input.trim();
        Self::SESSION
            .iter()
            .chain(Self::ANONYMOUS)
            .copied()
            .find(|command| command.name().eq_ignore_ascii_case(word))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Offline,
    Anonymous,
    Session(SessionToken),
}

impl Mode {
    pub fn commands(&self) -> &'static [Command] {
        match self {
            Self::Offline => Command::OFFLINE,
            Self::Anonymous => Command::ANONYMOUS,
            Self::Session(_) => Command::SESSION,
        }
    }

    pub fn allows(&self, command: Command) -> bool {
        self.commands().contains(&command)
    }

    fn token(&self) -> Option<&SessionToken> {
        match self {
            Self::Session(token) => Some(token),
            _ => None,
        }
    }

    /// The mode after `command` received `reply`.
    pub fn after(self, command: Command, reply: &Reply) -> Mode {
        if reply.outcome == Outcome::ServerOffline {
            return Mode::Offline;
        }
        match (command, reply.outcome) {
            (Command::Login | Command::Register, Outcome::Ok) => match &reply.token {
                Some(token) => Mode::Session(token.clone()),
                None => self,
            },
            (Command::Start, Outcome::Ok) if self == Mode::Offline => Mode::Anonymous,
            (Command::Stop, Outcome::Ok) => Mode::Offline,
            (Command::Restart | Command::Logout, Outcome::Ok) => Mode::Anonymous,
            (Command::Status, Outcome::Ok) => {
                if reply.message == ServerState::Off.to_string() {
                    Mode::Offline
                } else if self == Mode::Offline {
                    Mode::Anonymous
                } else {
                    self
                }
            }
            // The session died under us (restart by someone else).
            (_, Outcome::AuthenticationFailure) if matches!(self, Mode::Session(_)) => {
                Mode::Anonymous
            }
            _ => self,
        }
    }
}

enum Step {
    Send(Request),
    Skip,
    Eof,
}

pub struct Shell<R, W> {
    client: SpoolClient,
    input: R,
    output: W,
    mode: Mode,
}

impl<R, W> Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Connect the shell to a client.  Asks the server for its state first.
    pub async fn new(mut client: SpoolClient, input: R, output: W) -> Result<Self> {
        let reply = client.send(&Request::Status { token: None }).await?;
        let mode = Mode::Offline.after(Command::Status, &reply);
        Ok(Self {
            client,
            input,
            output,
            mode,
        })
    }

    #[cfg(test)]
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Run until `quit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let menu = self
                .mode
                .commands()
                .iter()
                .map(Command::name)
                .collect::<Vec<_>>()
                .join(", ");
            self.say(&format!("Commands: {menu}")).await?;

            let Some(line) = self.prompt("> ").await? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            let Some(command) = Command::parse(&line).filter(|c| self.mode.allows(*c)) else {
                self.say(&format!("\"{}\" is not available right now.", line.trim()))
                    .await?;
                continue;
            };
            if command == Command::Quit {
                break;
            }

            let request = match self.build_request(command).await? {
                Step::Send(request) => request,
                Step::Skip => continue,
                Step::Eof => break,
            };
            let reply = self.client.send(&request).await?;
            self.say(&reply.message).await?;

            let mode = std::mem::replace(&mut self.mode, Mode::Offline);
            self.mode = mode.after(command, &reply);
            debug!(%command, outcome = ?reply.outcome, mode = ?self.mode, "shell step");
        }
        self.say("Goodbye.").await
    }

    async fn build_request(&mut self, command: Command) -> Result<Step> {
        let token = self.mode.token().cloned();
        let session = || {
            token
                .clone()
                .ok_or_else(|| SpoolError::Protocol(format!("{command} needs a session")))
        };

        let request = match command {
            Command::Status => Request::Status { token: None },
            Command::Start => Request::Start {
                token: token.clone(),
            },
            Command::Login | Command::Register => {
                let Some(username) = self.prompt("Username: ").await? else {
                    return Ok(Step::Eof);
                };
                let Some(password) = self.prompt("Password: ").await? else {
                    return Ok(Step::Eof);
                };
                let username = username.trim().to_owned();
                if command == Command::Login {
                    Request::Authenticate { username, password }
                } else {
                    Request::Register { username, password }
                }
            }
            Command::Logout => Request::Logout { token: session()? },
            Command::Print => {
                let Some(filename) = self.prompt("File name: ").await? else {
                    return Ok(Step::Eof);
                };
                let Some(printer) = self.prompt("Printer: ").await? else {
                    return Ok(Step::Eof);
                };
                Request::Print {
                    filename: filename.trim().to_owned(),
                    printer: printer.trim().to_owned(),
                    token: session()?,
                }
            }
            Command::Queue => Request::Queue { token: session()? },
            Command::TopQueue => {
                let Some(job) = self.prompt("Job position: ").await? else {
                    return Ok(Step::Eof);
                };
                let Ok(job) = job.trim().parse::<i64>() else {
                    self.say("Please enter a whole number.").await?;
                    return Ok(Step::Skip);
                };
                Request::TopQueue {
                    job,
                    token: session()?,
                }
            }
            Command::Stop => Request::Stop { token: session()? },
            Command::Restart => Request::Restart { token: session()? },
            Command::ReadConfig => {
                let Some(key) = self.prompt("Parameter: ").await? else {
                    return Ok(Step::Eof);
                };
                Request::ReadConfig {
                    key: key.trim().to_owned(),
                    token: session()?,
                }
            }
            Command::SetConfig => {
                let Some(key) = self.prompt("Parameter: ").await? else {
                    return Ok(Step::Eof);
                };
                let Some(value) = self.prompt("Value: ").await? else {
                    return Ok(Step::Eof);
                };
                Request::SetConfig {
                    key: key.trim().to_owned(),
                    value: value.trim().to_owned(),
                    token: session()?,
                }
            }
            Command::Quit => return Ok(Step::Eof),
        };
        Ok(Step::Send(request))
    }

    /// Print `label` and read one line.  `None` at end of input.
    async fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        self.output.write_all(label.as_bytes()).await?;
        self.output.flush().await?;

        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    async fn say(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }
}
