// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TCP front end for the dispatcher.
//
// The transport listens on a configurable address and speaks the
// newline-delimited JSON protocol from `protocol.rs`.  A connection may carry
// any number of request/reply pairs; replies are written in request order.
//
// Note the difference between the *transport* and the *print server state*:
// the listener runs for the whole life of the process, while the OFF/ON
// state is toggled by clients through `start`/`stop`/`restart`.
//
// # Limits
//
//   - A frame longer than `max_request_bytes` is answered with a generic
//     "could not be understood" reply and the connection is closed.
//   - A request that does not finish within `request_timeout` is answered
//     with "could not be completed in time".  The dispatcher call itself runs
//     on the blocking pool and is not cancelled.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use spoolwerk_core::config::ServerConfig;
use spoolwerk_core::error::{Result, SpoolError};
use spoolwerk_core::messages;
use spoolwerk_core::types::Reply;

use crate::dispatcher::Dispatcher;
use crate::protocol::{self, Request};

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLimits {
    pub request_timeout: Duration,
    pub max_request_bytes: usize,
}

impl From<&ServerConfig> for ServerLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            max_request_bytes: config.max_request_bytes,
        }
    }
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// The network listener.
pub struct SpoolServer {
    /// Address to bind (port 0 picks a free port).
    addr: SocketAddr,
    limits: ServerLimits,
    /// Address actually bound, once running.
    local_addr: Option<SocketAddr>,
    /// Notification handle used to signal a graceful shutdown.
    shutdown_signal: Arc<Notify>,
    /// Handle to the Tokio task running the accept loop.
    task_handle: Option<JoinHandle<()>>,
    /// Counter of currently active TCP connections.
    active_connections: Arc<AtomicU32>,
}

impl SpoolServer {
    pub fn new(addr: SocketAddr, limits: ServerLimits) -> Self {
        Self {
            addr,
            limits,
            local_addr: None,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.listen_addr, ServerLimits::from(config))
    }

    /// The bound address, or `None` before [`start`](Self::start).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Return the number of currently active client connections.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Returns the bound address.  Calling `start` on a running server is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Transport`] if the address cannot be bound.
    pub async fn start(&mut self, dispatcher: Arc<Dispatcher>) -> Result<SocketAddr> {
        if let (Some(addr), true) = (self.local_addr, self.is_running()) {
            debug!(%addr, "listener already running");
            return Ok(addr);
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| SpoolError::Transport(format!("bind {}: {e}", self.addr)))?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "spooler listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let connections = Arc::clone(&self.active_connections);
        let limits = self.limits;

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, connections, dispatcher, limits).await;
        });

        self.task_handle = Some(handle);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Signal the accept loop to exit and wait for it.
    ///
    /// Connections already accepted run to completion on their own tasks.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };

        info!(addr = ?self.local_addr, "stopping listener");
        self.shutdown_signal.notify_one();
        handle
            .await
            .map_err(|e| SpoolError::Transport(format!("task join: {e}")))?;

        self.local_addr = None;
        info!("listener stopped");
        Ok(())
    }

    async fn accept_loop(
        listener: TcpListener,
        shutdown: Arc<Notify>,
        connections: Arc<AtomicU32>,
        dispatcher: Arc<Dispatcher>,
        limits: ServerLimits,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming connection");
                            let dispatcher = Arc::clone(&dispatcher);
                            let connections = Arc::clone(&connections);
                            tokio::spawn(async move {
                                connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = Self::handle_connection(stream, peer_addr, dispatcher, limits).await {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        limits: ServerLimits,
    ) -> Result<()> {
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = Vec::new();

        loop {
            let frame = read_frame(&mut reader, &mut line, limits.max_request_bytes).await?;
            let reply = match frame {
                Frame::Eof => break,
                Frame::Blank => continue,
                Frame::Oversized => {
                    warn!(peer = %peer_addr, limit = limits.max_request_bytes, "request frame too large");
                    let reply = messages::unavailable(&SpoolError::Protocol("frame too large".into()));
                    writer.write_all(&protocol::encode(&reply)?).await?;
                    break;
                }
                Frame::Line => match protocol::decode_request(&line) {
                    Ok(request) => match dispatch(&dispatcher, request, limits.request_timeout).await {
                        Ok(reply) => reply,
                        Err(reply) => {
                            // The timed-out call may still be running; later
                            // frames must not overtake it.
                            writer.write_all(&protocol::encode(&reply)?).await?;
                            break;
                        }
                    },
                    Err(e) => {
                        warn!(peer = %peer_addr, error = %e, "undecodable request");
                        let reply = messages::unavailable(&e);
                        writer.write_all(&protocol::encode(&reply)?).await?;
                        break;
                    }
                },
            };
            writer.write_all(&protocol::encode(&reply)?).await?;
        }

        debug!(peer = %peer_addr, "connection closed");
        Ok(())
    }
}

/// Run one request on the blocking pool, bounded by `timeout`.
///
/// `Err` carries the reply for a request that timed out, after which the
/// connection must close.
async fn dispatch(
    dispatcher: &Arc<Dispatcher>,
    request: Request,
    timeout: Duration,
) -> std::result::Result<Reply, Reply> {
    let op = request.name();
    debug!(?request, "dispatching");

    let dispatcher = Arc::clone(dispatcher);
    let task = tokio::task::spawn_blocking(move || dispatcher.handle(request));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(e)) => {
            error!(%op, error = %e, "request handler failed");
            Ok(messages::unavailable(&SpoolError::Transport(e.to_string())))
        }
        Err(_) => {
            warn!(%op, ?timeout, "request timed out, closing connection");
            Err(messages::unavailable(&SpoolError::Transport("timed out".into())))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Eof,
    Blank,
    Oversized,
    /// A complete frame is in the buffer, newline stripped.
    Line,
}

/// Read one newline-terminated frame of at most `max` bytes into `buf`.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max {
        return Ok(Frame::Oversized);
    }

    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(Frame::Blank);
    }
    Ok(Frame::Line)
}
