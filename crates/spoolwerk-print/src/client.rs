// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client side of the spooler protocol: one TCP connection, one request at a
// time, replies read in order.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info};

use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::types::Reply;

use crate::protocol::{self, Request};

/// Timeout for establishing a connection.
const CONNECT_TIMEOUT_SECS: u64 = 5;

pub struct SpoolClient {
    peer: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: Vec<u8>,
}

impl SpoolClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect(addr),
        )
        .await
        .map_err(|_| {
            SpoolError::Transport(format!(
                "connection to {addr} timed out after {CONNECT_TIMEOUT_SECS}s"
            ))
        })?
        .map_err(|e| SpoolError::Transport(format!("connect to {addr}: {e}")))?;

        info!(peer = %addr, "connected to spooler");
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            peer: addr,
            reader: BufReader::new(read_half),
            writer,
            line: Vec::new(),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send `request` and wait for its reply.
    pub async fn send(&mut self, request: &Request) -> Result<Reply> {
        debug!(?request, "sending request");
        self.writer.write_all(&protocol::encode(request)?).await?;

        self.line.clear();
        let read = self.reader.read_until(b'\n', &mut self.line).await?;
        if read == 0 {
            return Err(SpoolError::Transport("connection closed by server".into()));
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
        }
        protocol::decode_reply(&self.line)
    }
}
