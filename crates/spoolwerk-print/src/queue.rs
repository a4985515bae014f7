// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory print job queue.
//
// Jobs are admitted FIFO and addressed by their *current* position (0-based).
// Positions are not stable identities: promoting a job shifts every job that
// was ahead of it down by one, so a position read from an earlier listing
// may name a different job afterwards.

use spoolwerk_core::messages;
use spoolwerk_core::types::PrintJob;
use tracing::{debug, instrument};

/// Ordered list of print jobs.
///
/// Not internally synchronised; the lifecycle owns it behind a lock.
#[derive(Debug, Default, Clone)]
pub struct PrintQueue {
    jobs: Vec<PrintJob>,
}

impl PrintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `job` and return the position it was admitted at.
    #[instrument(skip_all, fields(filename = %job.filename, printer = %job.printer))]
    pub fn enqueue(&mut self, job: PrintJob) -> usize {
        let position = self.jobs.len();
        self.jobs.push(job);
        debug!(position, "job queued");
        position
    }

    /// Jobs in queue order, paired with their current positions.
    pub fn list(&self) -> impl Iterator<Item = (usize, &PrintJob)> {
        self.jobs.iter().enumerate()
    }

    /// Move the job at `position` to the front.
    ///
    /// Returns `false` without touching the queue when `position` is not a
    /// current index (including negative values from the wire).
    #[instrument(skip(self))]
    pub fn promote(&mut self, position: i64) -> bool {
        let Some(index) = usize::try_from(position)
            .ok()
            .filter(|&index| index < self.jobs.len())
        else {
            debug!(len = self.jobs.len(), "no job at position");
            return false;
        };

        let job = self.jobs.remove(index);
        self.jobs.insert(0, job);
        debug!("job moved to top of queue");
        true
    }

    /// Human-readable listing: one `<position> <filename>` line per job, or
    /// an empty-queue marker.
    pub fn render(&self) -> String {
        if self.jobs.is_empty() {
            return messages::QUEUE_EMPTY.to_owned();
        }
        self.list()
            .map(|(position, job)| format!("{position} {}", job.filename))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn get(&self, position: usize) -> Option<&PrintJob> {
        self.jobs.get(position)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
