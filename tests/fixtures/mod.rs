//! Job payloads shared by the integration tests.

#![allow(dead_code)]

/// Inline JSON as accepted by `queuectl enqueue` and `POST /api/v1/jobs`.
pub const ECHO_JOB: &str = r#"{"id": "echo-1", "command": "echo hello"}"#;

pub const SCHEDULED_JOB: &str =
    r#"{"id": "nightly", "command": "true", "run_at": "2031-06-01T02:00:00Z"}"#;

pub const MISSING_COMMAND: &str = r#"{"id": "broken"}"#;

pub const MISSING_ID: &str = r#"{"command": "echo orphan"}"#;

pub const CUSTOM_POLICY_JOB: &str = r#"{
    "id": "flaky",
    "command": "exit 1",
    "max_retries": 5,
    "timeout_seconds": 30,
    "backoff_base": 3
}"#;
