// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModgateError {
    #[error("Invalid entrypoint: {0}")]
    Entrypoint(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Process supervisor error: {0}")]
    Supervisor(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ModgateError>;
