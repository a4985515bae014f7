// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for request decoding, guarded dispatch, and queue
// promotion in the spoolwerk-print crate.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use spoolwerk_core::types::{PrintJob, SessionToken};
use spoolwerk_print::protocol::decode_request;
use spoolwerk_print::{DispatchPolicy, Dispatcher, PrintQueue, Request};
use spoolwerk_security::{MemoryCredentialStore, PasswordHasher};

/// A running dispatcher with one logged-in admin.
fn logged_in() -> (Dispatcher, SessionToken) {
    let hasher = PasswordHasher::with_iterations(16).expect("non-zero iterations");
    let dispatcher = Dispatcher::new(
        Arc::new(MemoryCredentialStore::new()),
        DispatchPolicy::default(),
    )
    .with_hasher(hasher);
    dispatcher.start(None);
    let token = dispatcher
        .register("bench", "bench-pw")
        .token
        .expect("register issues a token");
    (dispatcher, token)
}

fn bench_decode_request(c: &mut Criterion) {
    let line = br#"{"op":"print","filename":"quarterly-report.pdf","printer":"hp-laserjet-4","token":"9f2c6a0d4e1b7c3a5f8e2d9b0c4a6e1f3b7d5c9a2e8f0b4d6c1a3e5f7b9d2c4a"}"#;

    c.bench_function("decode_request (print)", |b| {
        b.iter(|| {
            let request = decode_request(black_box(line)).expect("valid frame");
            black_box(request);
        });
    });
}

/// Full guard chain plus the queue mutation.
fn bench_dispatch_print(c: &mut Criterion) {
    let (dispatcher, token) = logged_in();

    c.bench_function("dispatch print", |b| {
        b.iter(|| {
            let reply = dispatcher.handle(Request::Print {
                filename: "report.pdf".into(),
                printer: "hp1".into(),
                token: token.clone(),
            });
            black_box(reply);
        });
    });
}

fn bench_promote_last(c: &mut Criterion) {
    let mut queue = PrintQueue::new();
    for i in 0..1_000 {
        queue.enqueue(PrintJob::new(format!("doc-{i}.pdf"), "hp1", "bench"));
    }

    c.bench_function("promote last of 1000", |b| {
        b.iter(|| {
            black_box(queue.promote(black_box(999)));
        });
    });
}

criterion_group!(
    benches,
    bench_decode_request,
    bench_dispatch_print,
    bench_promote_last,
);
criterion_main!(benches);
