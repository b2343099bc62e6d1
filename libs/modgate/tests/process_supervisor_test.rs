// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process supervisor lifecycle test with real child processes.
//!
//! Spawns short-lived shell commands, so the whole file is Unix-only.
#![cfg(unix)]

use std::time::{Duration, Instant};

use serde_json::json;

use modgate::{OutprocessEntrypoint, ProcessSupervisor};

fn init_logging() {
    // Best-effort: later calls in the same test binary hit the existing
    // global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn launch_entrypoint(argv: &[&str]) -> OutprocessEntrypoint {
    let args: Vec<serde_json::Value> = argv.iter().map(|a| json!(a)).collect();
    OutprocessEntrypoint::from_json(&json!({
        "activation.type": "launch",
        "control.id": "control_id",
        "launch": { "args": args }
    }))
    .expect("launch entrypoint parses")
}

/// Poll until the supervisor tracks `expected` handles, or panic after 10s.
fn wait_for_tracked(supervisor: &ProcessSupervisor, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while supervisor.tracked_children() != expected {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {} tracked children (currently {})",
            expected,
            supervisor.tracked_children()
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_spawn_and_reap_single_child() {
    init_logging();
    let supervisor = ProcessSupervisor::new();

    supervisor
        .launch(&launch_entrypoint(&["/bin/sh", "-c", "exit 0"]))
        .expect("launch enqueues");
    assert_eq!(supervisor.tracked_children(), 1);

    supervisor.run().expect("worker starts");

    // The worker spawns the child and removes the handle once it is reaped.
    wait_for_tracked(&supervisor, 0);

    supervisor.join_all();
}

#[test]
fn test_launches_queue_before_run() {
    init_logging();
    let supervisor = ProcessSupervisor::new();

    // Launch only enqueues; nothing spawns until run() starts the worker.
    for _ in 0..3 {
        supervisor
            .launch(&launch_entrypoint(&["/bin/sh", "-c", "exit 0"]))
            .expect("launch enqueues");
    }
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(supervisor.tracked_children(), 3);

    supervisor.run().expect("worker starts");
    supervisor.run().expect("second run is a no-op");

    wait_for_tracked(&supervisor, 0);
    supervisor.join_all();
}

#[test]
fn test_join_all_terminates_long_running_children() {
    init_logging();
    let supervisor = ProcessSupervisor::new();

    supervisor
        .launch(&launch_entrypoint(&["/bin/sh", "-c", "sleep 30"]))
        .expect("launch enqueues");
    supervisor.run().expect("worker starts");

    // Give the worker a moment to move the handle from Pending to Spawned.
    std::thread::sleep(Duration::from_millis(300));

    let started = Instant::now();
    supervisor.join_all();
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "join_all must force-terminate instead of waiting out the child"
    );
    assert_eq!(supervisor.tracked_children(), 0);

    // Second join in a row is safe.
    supervisor.join_all();
}

#[test]
fn test_spawn_failure_leaves_handle_for_join_sweep() {
    init_logging();
    let supervisor = ProcessSupervisor::new();

    supervisor
        .launch(&launch_entrypoint(&["/nonexistent/modgate-worker"]))
        .expect("launch enqueues even for a program that will fail to spawn");
    supervisor.run().expect("worker starts");

    // The spawn fails on the worker; the handle stays registered (Failed)
    // until the join sweep reclaims it.
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(supervisor.tracked_children(), 1);

    supervisor.join_all();
    assert_eq!(supervisor.tracked_children(), 0);
}

#[test]
fn test_launch_after_join_all_is_rejected() {
    init_logging();
    let supervisor = ProcessSupervisor::new();
    supervisor.join_all();

    assert!(
        supervisor
            .launch(&launch_entrypoint(&["/bin/sh", "-c", "exit 0"]))
            .is_err()
    );
    // The registered-but-unsubmittable handle is reclaimed by a later sweep.
    supervisor.join_all();
    assert_eq!(supervisor.tracked_children(), 0);
}
