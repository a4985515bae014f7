// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwerk Print: the print queue, the OFF/ON lifecycle that owns it, the
// request dispatcher that guards every remote call, and the TCP transport
// that carries those calls.  Identity and permissions come from
// `spoolwerk-security`; shared types from `spoolwerk-core`.

pub mod client;
pub mod config_store;
pub mod dispatcher;
pub mod lifecycle;
pub mod protocol;
pub mod queue;
pub mod server;

pub use client::SpoolClient;
pub use config_store::ConfigStore;
pub use dispatcher::{DispatchPolicy, Dispatcher};
pub use lifecycle::{ServerLifecycle, Transition};
pub use protocol::Request;
pub use queue::PrintQueue;
pub use server::{ServerLimits, SpoolServer};
