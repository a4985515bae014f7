// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Server lifecycle: the OFF/ON state machine and the stores it protects.
//
//   OFF --start--> ON      (fresh, empty queue and config)
//   ON  --stop---> OFF     (queue and config discarded)
//   ON  --restart-> ON     (stop then start, one critical section)
//
// The state flag, the queue, and the config live under one lock so that a
// transition and the stores it resets are observed together: a concurrent
// listing sees either the pre-stop queue or the cleared one, never a mix.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use spoolwerk_core::messages;
use spoolwerk_core::types::ServerState;
use tracing::{debug, info};

use crate::config_store::ConfigStore;
use crate::queue::PrintQueue;

/// The stores that only exist while the server is ON.
#[derive(Debug, Default)]
pub struct Spool {
    pub queue: PrintQueue,
    pub config: ConfigStore,
}

#[derive(Debug, Default)]
struct Inner {
    state: ServerState,
    spool: Spool,
}

/// Result of a lifecycle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    AlreadyOn,
    Stopped { discarded_jobs: usize },
    AlreadyOff,
    Restarted { discarded_jobs: usize },
    /// `restart` while OFF: nothing happens.
    NotRunning,
}

impl Transition {
    /// Whether the server state actually changed.
    pub fn changed_state(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Stopped { .. } | Self::Restarted { .. }
        )
    }

    pub fn message(&self) -> String {
        match self {
            Self::Started => messages::SERVER_STARTED.to_owned(),
            Self::AlreadyOn => messages::ALREADY_ON.to_owned(),
            Self::Stopped { .. } => messages::SERVER_STOPPED.to_owned(),
            Self::AlreadyOff => messages::ALREADY_OFF.to_owned(),
            Self::Restarted { .. } => {
                format!("{} {}", messages::SERVER_STOPPED, messages::SERVER_STARTED)
            }
            Self::NotRunning => messages::RESTART_WHILE_OFF.to_owned(),
        }
    }
}

/// Process-wide lifecycle, constructed once and shared by reference.
#[derive(Debug, Default)]
pub struct ServerLifecycle {
    inner: RwLock<Inner>,
}

impl ServerLifecycle {
    /// A lifecycle in the initial OFF state.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ServerState {
        self.read().state
    }

    /// OFF -> ON with fresh, empty stores.  ON -> ON reports "already on".
    pub fn start(&self) -> Transition {
        let mut inner = self.write();
        if inner.state.is_on() {
            debug!("start requested while already ON");
            return Transition::AlreadyOn;
        }
        inner.spool = Spool::default();
        inner.state = ServerState::On;
        info!("print server started");
        Transition::Started
    }

    /// ON -> OFF, discarding queue and config.  OFF -> OFF reports "already off".
    pub fn stop(&self) -> Transition {
        self.stop_with(|| {})
    }

    /// [`stop`](Self::stop), running `on_stop` inside the same critical
    /// section when the server actually goes OFF.
    pub fn stop_with(&self, on_stop: impl FnOnce()) -> Transition {
        let mut inner = self.write();
        if !inner.state.is_on() {
            debug!("stop requested while already OFF");
            return Transition::AlreadyOff;
        }
        let discarded_jobs = Self::reset(&mut inner);
        inner.state = ServerState::Off;
        on_stop();
        info!(discarded_jobs, "print server stopped");
        Transition::Stopped { discarded_jobs }
    }

    /// Stop then start in one critical section.  No-op while OFF.
    pub fn restart(&self) -> Transition {
        self.restart_with(|| {})
    }

    /// [`restart`](Self::restart), running `on_stop` between the stop and
    /// the start.
    pub fn restart_with(&self, on_stop: impl FnOnce()) -> Transition {
        let mut inner = self.write();
        if !inner.state.is_on() {
            debug!("restart requested while OFF");
            return Transition::NotRunning;
        }
        let discarded_jobs = Self::reset(&mut inner);
        on_stop();
        info!(discarded_jobs, "print server restarted");
        Transition::Restarted { discarded_jobs }
    }

    fn reset(inner: &mut Inner) -> usize {
        let discarded = std::mem::take(&mut inner.spool);
        discarded.queue.len()
    }

    /// Run `f` against the stores if the server is ON.
    ///
    /// Returns `None` while OFF.  The state check and `f` run under the same
    /// read lock.
    pub fn read_if_on<R>(&self, f: impl FnOnce(&Spool) -> R) -> Option<R> {
        let inner = self.read();
        inner.state.is_on().then(|| f(&inner.spool))
    }

    /// Mutable counterpart of [`read_if_on`](Self::read_if_on).
    pub fn write_if_on<R>(&self, f: impl FnOnce(&mut Spool) -> R) -> Option<R> {
        let mut inner = self.write();
        if !inner.state.is_on() {
            return None;
        }
        Some(f(&mut inner.spool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spoolwerk_core::types::PrintJob;
    use std::sync::Arc;
    use std::thread;

    fn enqueue(lifecycle: &ServerLifecycle, name: &str) -> Option<usize> {
        lifecycle.write_if_on(|spool| spool.queue.enqueue(PrintJob::new(name, "hp1", "alice")))
    }

    #[test]
    fn initial_state_is_off() {
        assert_eq!(ServerLifecycle::new().state(), ServerState::Off);
    }

    #[test]
    fn start_turns_on_and_is_idempotent() {
        let lifecycle = ServerLifecycle::new();
        assert_eq!(lifecycle.start(), Transition::Started);
        assert_eq!(lifecycle.state(), ServerState::On);
        assert_eq!(lifecycle.start(), Transition::AlreadyOn);
        assert!(!Transition::AlreadyOn.changed_state());
    }

    #[test]
    fn stop_discards_queue_and_config() {
        let lifecycle = ServerLifecycle::new();
        lifecycle.start();
        enqueue(&lifecycle, "a.pdf");
        enqueue(&lifecycle, "b.pdf");
        lifecycle.write_if_on(|spool| spool.config.set("paper", "A4"));

        assert_eq!(lifecycle.stop(), Transition::Stopped { discarded_jobs: 2 });
        assert_eq!(lifecycle.state(), ServerState::Off);
        assert_eq!(lifecycle.stop(), Transition::AlreadyOff);

        lifecycle.start();
        let (jobs, settings) =
            lifecycle.read_if_on(|spool| (spool.queue.len(), spool.config.len())).unwrap();
        assert_eq!((jobs, settings), (0, 0));
    }

    #[test]
    fn stores_are_unreachable_while_off() {
        let lifecycle = ServerLifecycle::new();
        assert!(enqueue(&lifecycle, "a.pdf").is_none());
        assert!(lifecycle.read_if_on(|spool| spool.queue.len()).is_none());
    }

    #[test]
    fn restart_resets_and_stays_on() {
        let lifecycle = ServerLifecycle::new();
        lifecycle.start();
        enqueue(&lifecycle, "a.pdf");

        let transition = lifecycle.restart();
        assert_eq!(transition, Transition::Restarted { discarded_jobs: 1 });
        assert_eq!(
            transition.message(),
            format!("{} {}", messages::SERVER_STOPPED, messages::SERVER_STARTED)
        );
        assert_eq!(lifecycle.state(), ServerState::On);
        assert_eq!(lifecycle.read_if_on(|spool| spool.queue.len()), Some(0));
    }

    #[test]
    fn restart_while_off_is_guidance_only() {
        let lifecycle = ServerLifecycle::new();
        let transition = lifecycle.restart();
        assert_eq!(transition, Transition::NotRunning);
        assert!(!transition.changed_state());
        assert_eq!(lifecycle.state(), ServerState::Off);
    }

    #[test]
    fn stop_hook_runs_only_on_real_transition() {
        let lifecycle = ServerLifecycle::new();
        let mut calls = 0;
        assert_eq!(lifecycle.stop_with(|| calls += 1), Transition::AlreadyOff);
        assert_eq!(lifecycle.restart_with(|| calls += 1), Transition::NotRunning);
        assert_eq!(calls, 0);

        lifecycle.start();
        lifecycle.restart_with(|| calls += 1);
        lifecycle.stop_with(|| calls += 1);
        assert_eq!(calls, 2);
    }

    #[test]
    fn stop_hook_runs_under_the_write_lock() {
        let lifecycle = ServerLifecycle::new();
        lifecycle.start();

        let mut locked = None;
        lifecycle.stop_with(|| locked = Some(lifecycle.inner.try_read().is_err()));
        assert_eq!(locked, Some(true));
        assert!(lifecycle.inner.try_read().is_ok());
    }

    #[test]
    fn concurrent_listing_never_sees_partial_stop() {
        let lifecycle = Arc::new(ServerLifecycle::new());
        lifecycle.start();
        for i in 0..50 {
            enqueue(&lifecycle, &format!("job{i}"));
        }

        let reader = {
            let lifecycle = Arc::clone(&lifecycle);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    if let Some(len) = lifecycle.read_if_on(|spool| spool.queue.len()) {
                        assert!(len == 50 || len == 0, "observed partial queue of {len}");
                    }
                }
            })
        };

        lifecycle.stop();
        reader.join().unwrap();
    }
}
