// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod error;
pub mod loader;

pub use error::*;
pub use loader::*;
