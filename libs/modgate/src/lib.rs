// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Module-hosting gateway core.
//!
//! A gateway hosts modules described declaratively (JSON) and activated
//! through pluggable loaders. This crate carries the loader seam, meaning the
//! [`ModuleLoader`](core::loader::ModuleLoader) trait and the
//! [`LoaderRegistry`](core::loader::LoaderRegistry) the host configures once,
//! plus the one loader variant that crosses a process boundary: the
//! out-of-process loader, which parses worker entrypoints, derives the
//! `ipc://` addresses both sides agree on without a handshake, and drives the
//! spawn/track/join lifecycle of real child processes.
//!
//! In-process loader variants (dynamic library, language runtime) are dispatch
//! tags behind the same trait; the wire protocol spoken over the IPC channels
//! and the worker-side SDK live outside this crate.

// Re-export for callers that hand us raw JSON values
pub use serde_json;

pub mod core;

pub use core::error::{ModgateError, Result};
pub use core::loader::{
    LoaderDescriptor, LoaderKind, LoaderRegistry, ModuleApi, ModuleHandle, ModuleLoader,
};
pub use core::loader::outprocess::{
    ActivationMode, OutprocessEntrypoint, OutprocessLoader, OutprocessModuleConfig,
    ProcessSupervisor,
};
