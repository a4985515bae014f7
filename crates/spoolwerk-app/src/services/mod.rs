// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: opens the on-disk stores and wires them into the
// dispatcher the listener serves.

pub mod data_dir;
pub mod spooler;
