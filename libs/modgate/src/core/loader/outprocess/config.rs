// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Module configuration derived from an entrypoint.
//!
//! The record handed to the out-of-process module runtime: two `ipc://`
//! channel addresses plus the caller's serialized arguments. Both sides
//! derive the same addresses from the entrypoint, so no handshake is needed
//! before the broker runtime connects them.

use serde::{Deserialize, Serialize};

use crate::core::error::{ModgateError, Result};
use super::entrypoint::OutprocessEntrypoint;

/// Address scheme understood by the broker runtime. Never validated or
/// resolved here.
pub const IPC_URI_SCHEME: &str = "ipc://";

/// Length of a generated message-channel identifier.
pub const MESSAGE_ID_TOKEN_LEN: u16 = 36;

/// Configuration consumed by the out-of-process module runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutprocessModuleConfig {
    /// `ipc://<control_id>`
    pub control_uri: String,
    /// `ipc://<message_id>`, where the identifier is either the entrypoint's
    /// or a freshly generated unique token.
    pub message_uri: String,
    /// Owned copy of the caller-supplied configuration blob. Opaque: copied
    /// verbatim, never inspected.
    pub serialized_args: String,
}

impl OutprocessModuleConfig {
    /// Derive the module configuration from a parsed entrypoint plus the
    /// caller's opaque serialized arguments.
    pub fn build(entrypoint: &OutprocessEntrypoint, serialized_args: &str) -> Result<Self> {
        if entrypoint.control_id.is_empty() {
            return Err(ModgateError::Configuration(
                "Entrypoint control id is empty".to_string(),
            ));
        }

        let message_id = match &entrypoint.message_id {
            Some(id) => id.clone(),
            None => generate_message_token(),
        };

        let control_uri = format!("{}{}", IPC_URI_SCHEME, entrypoint.control_id);
        let message_uri = format!("{}{}", IPC_URI_SCHEME, message_id);

        tracing::debug!(
            "[{}] Built module configuration: control='{}', message='{}'",
            entrypoint.control_id,
            control_uri,
            message_uri
        );

        Ok(Self {
            control_uri,
            message_uri,
            serialized_args: serialized_args.to_string(),
        })
    }
}

/// Generate a unique message-channel identifier for entrypoints that do not
/// pin one. Collision-resistant across hosts, not just this process.
fn generate_message_token() -> String {
    cuid2::CuidConstructor::new()
        .with_length(MESSAGE_ID_TOKEN_LEN)
        .create_id()
}
