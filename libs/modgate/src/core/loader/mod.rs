// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Abstract loader interface and dispatch.
//!
//! The gateway activates modules through loaders. Each loader kind
//! (dynamic library, language runtime, out-of-process) is one implementing
//! type behind the [`ModuleLoader`] trait; the host selects an implementation
//! from the [`LoaderRegistry`] once at configuration time and then drives the
//! parse → load → get_api → unload lifecycle through the trait, without
//! knowing which kind it is talking to.

pub mod outprocess;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::core::error::{ModgateError, Result};

/// Loader kind tag used for dispatch.
///
/// Only [`LoaderKind::OutProcess`] has an implementation in this crate; the
/// in-process kinds exist as dispatch tags so the registry and descriptors
/// cover the whole loader family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    DynamicLibrary,
    LanguageRuntime,
    OutProcess,
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            LoaderKind::DynamicLibrary => "dynamic-library",
            LoaderKind::LanguageRuntime => "language-runtime",
            LoaderKind::OutProcess => "outprocess",
        };
        write!(f, "{}", tag)
    }
}

/// What the generic host knows about a configured loader: its kind tag and
/// its display name. Passed back into the loader on each `load` so the
/// loader can reject a descriptor routed to the wrong implementation.
#[derive(Debug, Clone)]
pub struct LoaderDescriptor {
    pub kind: LoaderKind,
    pub name: String,
}

impl LoaderDescriptor {
    pub fn new(kind: LoaderKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Type-erased entrypoint produced by [`ModuleLoader::parse_entrypoint`].
///
/// Each loader owns its concrete entrypoint type; the host carries it
/// opaquely and hands it back to the same loader, which downcasts.
pub trait LoaderEntrypoint: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Type-erased loader-level configuration. Loader kinds that accept no
/// configuration (the out-of-process loader does not) return `None` from
/// [`ModuleLoader::parse_configuration`].
pub trait LoaderConfiguration: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Type-erased module configuration produced by
/// [`ModuleLoader::build_module_configuration`] and consumed by the module
/// runtime the host wires the loaded module into.
pub trait ModuleConfiguration: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Current module API version. Incremented on breaking changes to the
/// capability table layout.
pub const MODULE_API_VERSION: u32 = 1;

/// Fixed capability table the host retrieves through [`ModuleLoader::get_api`].
///
/// Slots are optional: a loader whose invocation surface lives elsewhere
/// (the out-of-process loader delegates it to the remote module runtime)
/// publishes a table with every slot empty.
#[derive(Debug)]
pub struct ModuleApi {
    /// Must equal [`MODULE_API_VERSION`].
    pub version: u32,
    pub create: Option<fn(&Value) -> Result<()>>,
    pub start: Option<fn() -> Result<()>>,
    pub receive: Option<fn(&[u8]) -> Result<()>>,
    pub destroy: Option<fn()>,
}

/// Opaque per-load handle returned by [`ModuleLoader::load`].
///
/// Carries no mutable state beyond identifying the loader instance that
/// produced it; its lifetime is unrelated to entrypoints, module
/// configurations, or spawned processes.
#[derive(Debug)]
pub struct ModuleHandle {
    loader_kind: LoaderKind,
    api: &'static ModuleApi,
}

impl ModuleHandle {
    pub(crate) fn new(loader_kind: LoaderKind, api: &'static ModuleApi) -> Self {
        Self { loader_kind, api }
    }

    pub fn loader_kind(&self) -> LoaderKind {
        self.loader_kind
    }

    pub fn api(&self) -> &'static ModuleApi {
        self.api
    }
}

/// Polymorphic loader interface, one implementing type per loader kind.
pub trait ModuleLoader: Send + Sync {
    /// Kind tag this loader answers to.
    fn kind(&self) -> LoaderKind;

    /// Stable loader name, discoverable by the host configuration layer.
    fn name(&self) -> &'static str;

    /// Parse a declarative JSON entrypoint into this loader's typed record.
    fn parse_entrypoint(&self, json: &Value) -> Result<Box<dyn LoaderEntrypoint>>;

    /// Parse loader-level configuration. `Ok(None)` means this loader kind
    /// accepts no configuration.
    fn parse_configuration(&self, json: &Value) -> Result<Option<Box<dyn LoaderConfiguration>>>;

    /// Validate the descriptor/entrypoint pair and produce a module handle.
    fn load(
        &self,
        descriptor: &LoaderDescriptor,
        entrypoint: &dyn LoaderEntrypoint,
    ) -> Result<ModuleHandle>;

    /// Release a handle produced by [`ModuleLoader::load`].
    fn unload(&self, handle: ModuleHandle);

    /// Retrieve the fixed capability table for a live handle.
    fn get_api(&self, handle: &ModuleHandle) -> Option<&'static ModuleApi>;

    /// Derive the configuration the module runtime needs from an entrypoint
    /// plus the caller's opaque serialized arguments.
    fn build_module_configuration(
        &self,
        entrypoint: &dyn LoaderEntrypoint,
        serialized_args: &str,
    ) -> Result<Box<dyn ModuleConfiguration>>;
}

/// Loader lookup table, populated once while the host is configured.
///
/// One loader per kind; name lookup serves configuration files that refer to
/// loaders by their string name.
pub struct LoaderRegistry {
    loaders: HashMap<LoaderKind, Arc<dyn ModuleLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    pub fn register(&mut self, loader: Arc<dyn ModuleLoader>) -> Result<()> {
        let kind = loader.kind();

        if self.loaders.contains_key(&kind) {
            return Err(ModgateError::Configuration(format!(
                "Loader kind '{}' is already registered",
                kind
            )));
        }

        self.loaders.insert(kind, loader);

        Ok(())
    }

    pub fn get(&self, kind: LoaderKind) -> Option<&Arc<dyn ModuleLoader>> {
        self.loaders.get(&kind)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Arc<dyn ModuleLoader>> {
        self.loaders.values().find(|loader| loader.name() == name)
    }

    pub fn contains(&self, kind: LoaderKind) -> bool {
        self.loaders.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
