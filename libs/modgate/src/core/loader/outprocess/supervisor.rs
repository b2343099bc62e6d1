// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Child-process lifecycle for launch-mode workers.
//!
//! The supervisor is an explicitly owned object: the host constructs one at
//! startup and passes it by reference to every launch and join call. It owns
//! the only shared mutable resource in this loader (the tracked-child set)
//! and a single background worker thread that services spawn requests for
//! all launches.
//!
//! Launching is decoupled from running: [`ProcessSupervisor::launch`] only
//! validates, registers a handle, and enqueues a spawn request;
//! [`ProcessSupervisor::run`] starts the worker that actually spawns and
//! reaps children; [`ProcessSupervisor::join_all`] is the sole cleanup
//! authority and must be invoked once at host shutdown.

use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::core::error::{ModgateError, Result};
use super::entrypoint::{ActivationMode, OutprocessEntrypoint};

/// How long the worker waits for a spawn request before sweeping for exited
/// children again.
const SPAWN_LOOP_TICK: Duration = Duration::from_millis(50);

/// One queued spawn. `handle_id` ties the request back to the Pending handle
/// registered before submission.
#[derive(Debug, Clone)]
struct SpawnRequest {
    handle_id: u64,
    argv: Vec<String>,
}

/// Per-child lifecycle: `Pending → Spawned → exited (removed)` on the happy
/// path, or `Pending → Failed` when the spawn itself fails. Pending and
/// Failed handles stay registered until the join-all sweep reclaims them.
#[derive(Debug)]
enum ChildState {
    Pending,
    Spawned(Child),
    Failed,
}

#[derive(Debug)]
struct TrackedChild {
    id: u64,
    state: ChildState,
}

struct SupervisorShared {
    /// Tracked-child set, created lazily on the first launch request and
    /// destroyed only by `join_all`. `None` means "no set exists".
    children: Mutex<Option<Vec<TrackedChild>>>,
    shutdown: AtomicBool,
}

/// Owns the spawned-child set and the worker thread that drives it.
pub struct ProcessSupervisor {
    shared: Arc<SupervisorShared>,
    requests_tx: Mutex<Option<Sender<SpawnRequest>>>,
    requests_rx: Mutex<Option<Receiver<SpawnRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_handle_id: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(SupervisorShared {
                children: Mutex::new(None),
                shutdown: AtomicBool::new(false),
            }),
            requests_tx: Mutex::new(Some(requests_tx)),
            requests_rx: Mutex::new(Some(requests_rx)),
            worker: Mutex::new(None),
            next_handle_id: AtomicU64::new(1),
        }
    }

    /// Register and enqueue a launch for a `Launch`-mode entrypoint.
    ///
    /// Four strictly ordered steps: ensure the tracked-child set exists,
    /// create the handle, register it, submit the spawn request. Any failure
    /// short-circuits with `Err` and no child started. A handle registered
    /// before a failing submission stays in the set; reclaiming it belongs
    /// to `join_all`, the sole cleanup authority.
    ///
    /// Never blocks on process exit; the actual spawn happens on the worker
    /// started by [`ProcessSupervisor::run`].
    pub fn launch(&self, entrypoint: &OutprocessEntrypoint) -> Result<()> {
        if entrypoint.activation_mode != ActivationMode::Launch {
            return Err(ModgateError::NotSupported(
                "Only Launch-mode entrypoints are spawned by the supervisor".to_string(),
            ));
        }

        // Parser invariant: Launch implies a program name. Checked anyway so
        // a hand-built entrypoint cannot enqueue an unspawnable request.
        let program = entrypoint.program().ok_or_else(|| {
            ModgateError::Supervisor("Launch arguments are missing a program name".to_string())
        })?;

        let handle_id = {
            let mut children = self.shared.children.lock();
            // The set must exist before any handle is appended; created on
            // first use, it persists for the host's lifetime.
            let set = children.get_or_insert_with(Vec::new);
            let handle_id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
            // Registered before submission, so a join sweep can always find
            // this handle even if submission fails below.
            set.push(TrackedChild {
                id: handle_id,
                state: ChildState::Pending,
            });
            handle_id
        };

        let requests_tx = self.requests_tx.lock();
        let requests_tx = requests_tx.as_ref().ok_or_else(|| {
            ModgateError::Supervisor("Supervisor is shut down; launch rejected".to_string())
        })?;
        requests_tx
            .send(SpawnRequest {
                handle_id,
                argv: entrypoint.launch_arguments.clone(),
            })
            .map_err(|_| {
                ModgateError::Supervisor(format!(
                    "Spawn request for '{}' could not be submitted",
                    program
                ))
            })?;

        tracing::debug!(
            "[{}] Queued spawn request for '{}' (handle {})",
            entrypoint.control_id,
            program,
            handle_id
        );

        Ok(())
    }

    /// Start the background worker that spawns and reaps children.
    ///
    /// Created lazily on the first call; later calls are no-ops while the
    /// worker lives. Thread-creation failure is reported to the caller and
    /// already-enqueued spawn requests are not retried.
    pub fn run(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(ModgateError::Supervisor(
                "Supervisor is shut down; worker not started".to_string(),
            ));
        }

        let requests_rx = self.requests_rx.lock().take().ok_or_else(|| {
            ModgateError::Supervisor("Supervisor worker already ran and was joined".to_string())
        })?;

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("modgate-supervisor".to_string())
            .spawn(move || spawn_loop(&shared, &requests_rx))
            .map_err(|e| {
                ModgateError::Supervisor(format!("Failed to create supervisor worker: {}", e))
            })?;

        *worker = Some(handle);
        Ok(())
    }

    /// Block until every tracked child has exited or been force-terminated,
    /// then destroy the tracked-child set.
    ///
    /// Stops the worker first, so the sweep never runs concurrently with the
    /// spawn loop. Idempotent: with no set or an empty set this is a no-op,
    /// and calling it twice in a row is safe. After `join_all` the
    /// supervisor rejects further launches.
    pub fn join_all(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        // Closing the request channel wakes a worker blocked on recv.
        self.requests_tx.lock().take();

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::warn!("[supervisor] Worker thread panicked");
            }
        }

        let Some(set) = self.shared.children.lock().take() else {
            return;
        };

        for tracked in set {
            match tracked.state {
                ChildState::Spawned(mut child) => match child.try_wait() {
                    Ok(Some(status)) => {
                        tracing::info!("[supervisor] Child {} exited: {}", tracked.id, status);
                    }
                    _ => {
                        tracing::info!(
                            "[supervisor] Terminating child {} (pid={})",
                            tracked.id,
                            child.id()
                        );
                        let _ = child.kill();
                        let _ = child.wait();
                    }
                },
                ChildState::Pending => {
                    tracing::debug!(
                        "[supervisor] Reclaiming handle {} that never spawned",
                        tracked.id
                    );
                }
                ChildState::Failed => {
                    tracing::debug!(
                        "[supervisor] Reclaiming handle {} whose spawn failed",
                        tracked.id
                    );
                }
            }
        }
    }

    /// Number of currently tracked handles, in any state. Zero when no set
    /// exists.
    pub fn tracked_children(&self) -> usize {
        self.shared
            .children
            .lock()
            .as_ref()
            .map_or(0, Vec::len)
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        // join_all is the sanctioned path; this is the backstop that keeps a
        // dropped supervisor from leaking live children or a running worker.
        self.join_all();
    }
}

/// Worker loop: service spawn requests and reap exited children until
/// shutdown or until every request sender is gone.
fn spawn_loop(shared: &SupervisorShared, requests: &Receiver<SpawnRequest>) {
    tracing::debug!("[supervisor] Spawn loop started");
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        match requests.recv_timeout(SPAWN_LOOP_TICK) {
            Ok(request) => spawn_child(shared, request),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        reap_exited(shared);
    }
    tracing::debug!("[supervisor] Spawn loop stopped");
}

/// Spawn one queued child and flip its registered handle to Spawned, or to
/// Failed when the OS spawn fails.
fn spawn_child(shared: &SupervisorShared, request: SpawnRequest) {
    let program = &request.argv[0];
    let spawned = Command::new(program)
        .args(&request.argv[1..])
        .stdin(Stdio::null())
        .spawn();

    let mut children = shared.children.lock();
    let Some(set) = children.as_mut() else {
        // Set already destroyed; nothing to record. Kill a child that won
        // the race so it cannot outlive its handle.
        if let Ok(mut child) = spawned {
            let _ = child.kill();
            let _ = child.wait();
        }
        return;
    };
    let Some(tracked) = set.iter_mut().find(|c| c.id == request.handle_id) else {
        if let Ok(mut child) = spawned {
            let _ = child.kill();
            let _ = child.wait();
        }
        return;
    };

    match spawned {
        Ok(child) => {
            tracing::info!(
                "[supervisor] Spawned '{}' (handle {}, pid={})",
                program,
                tracked.id,
                child.id()
            );
            tracked.state = ChildState::Spawned(child);
        }
        Err(e) => {
            tracing::warn!(
                "[supervisor] Failed to spawn '{}' (handle {}): {}",
                program,
                tracked.id,
                e
            );
            tracked.state = ChildState::Failed;
        }
    }
}

/// Remove handles whose child has been reaped. Pending and Failed handles
/// are left for the join-all sweep.
fn reap_exited(shared: &SupervisorShared) {
    let mut children = shared.children.lock();
    let Some(set) = children.as_mut() else {
        return;
    };
    set.retain_mut(|tracked| match &mut tracked.state {
        ChildState::Spawned(child) => match child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!("[supervisor] Child {} exited: {}", tracked.id, status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("[supervisor] Failed to poll child {}: {}", tracked.id, e);
                false
            }
        },
        ChildState::Pending | ChildState::Failed => true,
    });
}
