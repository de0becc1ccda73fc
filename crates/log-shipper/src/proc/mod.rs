// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process identity stamped onto every log record.
//!
//! Host and user are resolved once per [`ProcessContext`]; process and
//! thread identifiers are read at record construction time.

pub mod hostname;

use std::env;

/// Host and user identity of the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessContext {
    /// Machine name reported as `Computer`.
    pub host: String,
    /// Account the process runs as.
    pub user: String,
}

impl ProcessContext {
    /// Detects host and user from the environment.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            host: hostname::get_hostname(),
            user: get_username(),
        }
    }
}

/// Get the name of the user running this process
///
/// Checks `USERNAME` (Windows) then `USER` (Unix), falling back to "unknown".
#[must_use]
pub fn get_username() -> String {
    ["USERNAME", "USER"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .map(|user| user.trim().to_string())
        .find(|user| !user.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Current process id.
#[must_use]
pub fn process_id() -> u32 {
    std::process::id()
}

/// Identifier of the calling thread.
///
/// Named threads report their name; anonymous threads report the numeric part
/// of the std `ThreadId` (`ThreadId(7)` becomes `7`).
#[must_use]
pub fn thread_id() -> String {
    let current = std::thread::current();
    if let Some(name) = current.name() {
        return name.to_string();
    }
    let raw = format!("{:?}", current.id());
    raw.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_prefers_username_var() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("USERNAME", "svc-provision");
            jail.set_env("USER", "root");
            assert_eq!(get_username(), "svc-provision");
            Ok(())
        });
    }

    #[test]
    fn test_username_unknown_when_unset() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            assert_eq!(get_username(), "unknown");
            Ok(())
        });
    }

    #[test]
    fn test_thread_id_uses_thread_name() {
        let handle = std::thread::Builder::new()
            .name("installer-worker".to_string())
            .spawn(thread_id)
            .unwrap();
        assert_eq!(handle.join().unwrap(), "installer-worker");
    }

    #[test]
    fn test_thread_id_numeric_for_unnamed_thread() {
        let id = std::thread::spawn(thread_id).join().unwrap();
        assert!(id.parse::<u64>().is_ok(), "unexpected thread id {id}");
    }

    #[test]
    fn test_process_id_matches_std() {
        assert_eq!(process_id(), std::process::id());
    }
}
