// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Out-of-process module loader.
//!
//! The only loader variant that crosses a process boundary. It parses a
//! declarative entrypoint, derives the `ipc://` addresses and serialized
//! arguments the worker needs, and (for launch-mode entrypoints) hands the
//! spawn to the [`ProcessSupervisor`].
//!
//! Loading is decoupled from spawning: [`ModuleLoader::load`] only validates
//! and produces a handle; the orchestration layer drives
//! [`ProcessSupervisor::launch`] separately once the handle exists.

pub mod config;
pub mod entrypoint;
pub mod supervisor;

pub use config::{IPC_URI_SCHEME, MESSAGE_ID_TOKEN_LEN, OutprocessModuleConfig};
pub use entrypoint::{ActivationMode, DEFAULT_REMOTE_MESSAGE_WAIT_MS, OutprocessEntrypoint};
pub use supervisor::ProcessSupervisor;

use std::any::Any;
use std::sync::OnceLock;

use serde_json::Value;

use crate::core::error::{ModgateError, Result};
use crate::core::loader::{
    LoaderConfiguration, LoaderDescriptor, LoaderEntrypoint, LoaderKind, MODULE_API_VERSION,
    ModuleApi, ModuleConfiguration, ModuleHandle, ModuleLoader,
};

/// Loader name the host configuration layer selects this loader by.
pub const OUTPROCESS_LOADER_NAME: &str = "outprocess";

/// Capability table for out-of-process modules. Every slot is empty: the
/// real invocation surface belongs to the remote module runtime reached over
/// the IPC channels, not to this loader.
static OUTPROCESS_MODULE_API: ModuleApi = ModuleApi {
    version: MODULE_API_VERSION,
    create: None,
    start: None,
    receive: None,
    destroy: None,
};

/// Stateless loader implementation for [`LoaderKind::OutProcess`].
///
/// Carries no supervisor: the [`ProcessSupervisor`] is owned by the host and
/// passed to launch/join call sites explicitly.
pub struct OutprocessLoader;

static OUTPROCESS_LOADER: OnceLock<OutprocessLoader> = OnceLock::new();

impl OutprocessLoader {
    /// Process-wide loader instance: initialized once, never torn down,
    /// read-only thereafter.
    pub fn get() -> &'static OutprocessLoader {
        OUTPROCESS_LOADER.get_or_init(|| OutprocessLoader)
    }

    fn downcast_entrypoint<'a>(
        entrypoint: &'a dyn LoaderEntrypoint,
    ) -> Result<&'a OutprocessEntrypoint> {
        entrypoint
            .as_any()
            .downcast_ref::<OutprocessEntrypoint>()
            .ok_or_else(|| {
                ModgateError::Configuration(
                    "Entrypoint was not produced by the outprocess loader".to_string(),
                )
            })
    }
}

impl LoaderEntrypoint for OutprocessEntrypoint {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ModuleConfiguration for OutprocessModuleConfig {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ModuleLoader for OutprocessLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::OutProcess
    }

    fn name(&self) -> &'static str {
        OUTPROCESS_LOADER_NAME
    }

    fn parse_entrypoint(&self, json: &Value) -> Result<Box<dyn LoaderEntrypoint>> {
        Ok(Box::new(OutprocessEntrypoint::from_json(json)?))
    }

    /// The out-of-process loader accepts no loader-level configuration.
    fn parse_configuration(&self, _json: &Value) -> Result<Option<Box<dyn LoaderConfiguration>>> {
        Ok(None)
    }

    fn load(
        &self,
        descriptor: &LoaderDescriptor,
        entrypoint: &dyn LoaderEntrypoint,
    ) -> Result<ModuleHandle> {
        if descriptor.kind != LoaderKind::OutProcess {
            return Err(ModgateError::NotSupported(format!(
                "Loader kind '{}' is not handled by the outprocess loader",
                descriptor.kind
            )));
        }
        let entrypoint = Self::downcast_entrypoint(entrypoint)?;
        if entrypoint.control_id.is_empty() {
            return Err(ModgateError::Configuration(
                "Entrypoint control id is empty".to_string(),
            ));
        }

        tracing::debug!(
            "[{}] Loaded outprocess module handle (mode={:?})",
            entrypoint.control_id,
            entrypoint.activation_mode
        );

        Ok(ModuleHandle::new(
            LoaderKind::OutProcess,
            &OUTPROCESS_MODULE_API,
        ))
    }

    fn unload(&self, handle: ModuleHandle) {
        tracing::debug!("[outprocess] Unloaded module handle");
        drop(handle);
    }

    fn get_api(&self, handle: &ModuleHandle) -> Option<&'static ModuleApi> {
        Some(handle.api())
    }

    fn build_module_configuration(
        &self,
        entrypoint: &dyn LoaderEntrypoint,
        serialized_args: &str,
    ) -> Result<Box<dyn ModuleConfiguration>> {
        let entrypoint = Self::downcast_entrypoint(entrypoint)?;
        Ok(Box::new(OutprocessModuleConfig::build(
            entrypoint,
            serialized_args,
        )?))
    }
}
