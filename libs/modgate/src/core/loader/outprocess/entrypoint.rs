// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Declarative entrypoint for out-of-process workers.
//!
//! # Example Entrypoint
//!
//! ```json
//! {
//!   "activation.type": "launch",
//!   "control.id": "camera-worker-control",
//!   "message.id": "camera-worker-messages",
//!   "timeout": 2000,
//!   "launch": { "args": ["worker", "--control", "camera-worker-control"] }
//! }
//! ```
//!
//! Field keys are flat dotted strings, not nested objects; the schema is
//! shared with the broker runtime and kept as-is.

use serde_json::Value;

use crate::core::error::{ModgateError, Result};

/// Wait applied by the module runtime to remote message operations when the
/// entrypoint does not carry a positive `timeout`.
pub const DEFAULT_REMOTE_MESSAGE_WAIT_MS: u64 = 1000;

/// How the worker process comes to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationMode {
    /// Something else starts the worker; this loader only addresses it.
    None,
    /// This loader spawns the worker through the process supervisor.
    Launch,
}

impl ActivationMode {
    /// Map the `activation.type` JSON tag. Anything outside the two known
    /// tags is rejected at parse time.
    fn from_json_tag(tag: &str) -> Result<Self> {
        match tag {
            "none" => Ok(ActivationMode::None),
            "launch" => Ok(ActivationMode::Launch),
            other => Err(ModgateError::Entrypoint(format!(
                "Unknown activation.type '{}'",
                other
            ))),
        }
    }
}

/// Parsed, validated description of how to activate an out-of-process worker.
///
/// Invariant: `activation_mode == Launch` implies a non-empty
/// `launch_arguments` (program name at least); `None` never spawns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutprocessEntrypoint {
    pub activation_mode: ActivationMode,
    /// Identifier the control-channel address is derived from.
    pub control_id: String,
    /// Identifier the message-channel address is derived from. When absent,
    /// a fresh unique identifier is generated at configuration-build time,
    /// not here.
    pub message_id: Option<String>,
    /// Program path plus argv for `Launch` mode; empty for `None`.
    pub launch_arguments: Vec<String>,
    pub remote_message_wait_ms: u64,
}

impl OutprocessEntrypoint {
    /// Parse a declarative JSON entrypoint.
    ///
    /// Pure validation and extraction: no side effects, and in particular no
    /// contact with the process supervisor.
    pub fn from_json(json: &Value) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            ModgateError::Entrypoint("Entrypoint is not a JSON object".to_string())
        })?;

        let mode_tag = object
            .get("activation.type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ModgateError::Entrypoint("Missing 'activation.type' string".to_string())
            })?;
        let activation_mode = ActivationMode::from_json_tag(mode_tag)?;

        let control_id = object
            .get("control.id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ModgateError::Entrypoint("Missing or empty 'control.id'".to_string())
            })?
            .to_string();

        // A launch object is validated whenever present, even in None mode;
        // a malformed description aborts the whole parse.
        let launch_arguments = match object.get("launch") {
            Some(launch) => validate_launch_arguments(launch)?,
            None => Vec::new(),
        };

        if activation_mode == ActivationMode::Launch && launch_arguments.is_empty() {
            return Err(ModgateError::Entrypoint(
                "Launch activation requires a 'launch' object with at least a program name"
                    .to_string(),
            ));
        }

        let message_id = object
            .get("message.id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let remote_message_wait_ms = match object.get("timeout").and_then(Value::as_f64) {
            Some(timeout) if timeout > 0.0 => timeout as u64,
            _ => DEFAULT_REMOTE_MESSAGE_WAIT_MS,
        };

        tracing::debug!(
            "[{}] Parsed outprocess entrypoint: mode={:?}, timeout={}ms",
            control_id,
            activation_mode,
            remote_message_wait_ms
        );

        Ok(Self {
            activation_mode,
            control_id,
            message_id,
            launch_arguments,
            remote_message_wait_ms,
        })
    }

    /// Program path, the first launch argument.
    pub fn program(&self) -> Option<&str> {
        self.launch_arguments.first().map(String::as_str)
    }
}

/// Extract the argument list from a `launch` object: `args` must be a
/// non-empty array whose every element is a string.
pub(crate) fn validate_launch_arguments(launch: &Value) -> Result<Vec<String>> {
    let object = launch.as_object().ok_or_else(|| {
        ModgateError::Entrypoint("'launch' is not a JSON object".to_string())
    })?;

    let args = object
        .get("args")
        .and_then(Value::as_array)
        .ok_or_else(|| ModgateError::Entrypoint("'launch.args' is not an array".to_string()))?;

    if args.is_empty() {
        return Err(ModgateError::Entrypoint(
            "'launch.args' must contain at least a program name".to_string(),
        ));
    }

    args.iter()
        .map(|arg| {
            arg.as_str().map(str::to_string).ok_or_else(|| {
                ModgateError::Entrypoint(format!("Launch argument {} is not a string", arg))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_none_entrypoint_with_defaults() {
        let json = json!({ "activation.type": "none", "control.id": "a url" });

        let entrypoint = OutprocessEntrypoint::from_json(&json).unwrap();

        assert_eq!(entrypoint.activation_mode, ActivationMode::None);
        assert_eq!(entrypoint.control_id, "a url");
        assert_eq!(entrypoint.message_id, None);
        assert!(entrypoint.launch_arguments.is_empty());
        assert_eq!(
            entrypoint.remote_message_wait_ms,
            DEFAULT_REMOTE_MESSAGE_WAIT_MS
        );
    }

    #[test]
    fn test_parse_launch_entrypoint() {
        let json = json!({
            "activation.type": "launch",
            "control.id": "control_id",
            "message.id": "message_id",
            "timeout": 2000,
            "launch": { "args": ["worker", "--control", "control_id"] }
        });

        let entrypoint = OutprocessEntrypoint::from_json(&json).unwrap();

        assert_eq!(entrypoint.activation_mode, ActivationMode::Launch);
        assert_eq!(entrypoint.message_id.as_deref(), Some("message_id"));
        assert_eq!(entrypoint.program(), Some("worker"));
        assert_eq!(entrypoint.launch_arguments.len(), 3);
        assert_eq!(entrypoint.remote_message_wait_ms, 2000);
    }

    #[test]
    fn test_parse_rejects_non_object_input() {
        for json in [json!(["activation.type"]), json!("none"), json!(42), json!(null)] {
            assert!(matches!(
                OutprocessEntrypoint::from_json(&json),
                Err(ModgateError::Entrypoint(_))
            ));
        }
    }

    #[test]
    fn test_parse_rejects_missing_activation_type() {
        let json = json!({ "control.id": "a url" });
        assert!(OutprocessEntrypoint::from_json(&json).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_activation_type() {
        let json = json!({ "activation.type": "forked", "control.id": "a url" });
        let err = OutprocessEntrypoint::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("forked"));
    }

    #[test]
    fn test_parse_rejects_missing_or_empty_control_id() {
        let missing = json!({ "activation.type": "none" });
        assert!(OutprocessEntrypoint::from_json(&missing).is_err());

        let empty = json!({ "activation.type": "none", "control.id": "" });
        assert!(OutprocessEntrypoint::from_json(&empty).is_err());
    }

    #[test]
    fn test_parse_rejects_launch_mode_without_launch_object() {
        let json = json!({ "activation.type": "launch", "control.id": "a url" });
        assert!(OutprocessEntrypoint::from_json(&json).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_launch_object_even_in_none_mode() {
        let json = json!({
            "activation.type": "none",
            "control.id": "a url",
            "launch": { "args": [] }
        });
        assert!(OutprocessEntrypoint::from_json(&json).is_err());
    }

    #[test]
    fn test_non_positive_timeout_falls_back_to_default() {
        for timeout in [json!(0), json!(-5), json!("soon")] {
            let json = json!({
                "activation.type": "none",
                "control.id": "a url",
                "timeout": timeout
            });
            let entrypoint = OutprocessEntrypoint::from_json(&json).unwrap();
            assert_eq!(
                entrypoint.remote_message_wait_ms,
                DEFAULT_REMOTE_MESSAGE_WAIT_MS
            );
        }
    }

    #[test]
    fn test_validate_launch_arguments_rejects_non_string_elements() {
        let launch = json!({ "args": ["worker", 7] });
        assert!(validate_launch_arguments(&launch).is_err());

        let not_object = json!(["worker"]);
        assert!(validate_launch_arguments(&not_object).is_err());

        let missing_args = json!({ "path": "worker" });
        assert!(validate_launch_arguments(&missing_args).is_err());
    }

    #[test]
    fn test_validate_launch_arguments_accepts_program_and_args() {
        let launch = json!({ "args": ["worker"] });
        assert_eq!(validate_launch_arguments(&launch).unwrap(), vec!["worker"]);
    }
}
