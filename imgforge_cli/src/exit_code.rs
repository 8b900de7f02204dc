// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Spec §6 defines exactly four process exit codes for a CLI driver: `0` ok,
//! `1` configuration error, `2` runtime error, `3` cancelled. Grounded on the
//! teacher's `ExitCode` enum (`as_i32`/`from_error`/`Display`), trimmed to the
//! fixed vocabulary this spec names rather than the teacher's full BSD
//! `sysexits.h` table.

use std::fmt;

use imgforge_domain::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Ok = 0,
    ConfigurationError = 1,
    RuntimeError = 2,
    Cancelled = 3,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a top-level `DomainError` to the exit code the CLI process
    /// should terminate with.
    pub fn from_domain_error(error: &DomainError) -> Self {
        match error {
            DomainError::Configuration(_) => ExitCode::ConfigurationError,
            DomainError::Cancelled => ExitCode::Cancelled,
            _ => ExitCode::RuntimeError,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Ok => "ok",
            ExitCode::ConfigurationError => "configuration error",
            ExitCode::RuntimeError => "runtime error",
            ExitCode::Cancelled => "cancelled",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Ok)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

/// Maps a top-level `DomainError` to a process exit code.
///
/// Thin wrapper kept alongside [`ExitCode::from_domain_error`] so callers can
/// go straight from an error to an `i32` without naming the enum.
pub fn map_error_to_exit_code(error: &DomainError) -> ExitCode {
    ExitCode::from_domain_error(error)
}

/// Maps the outcome of running the application to a process exit code.
pub fn result_to_exit_code(result: Result<(), DomainError>) -> std::process::ExitCode {
    match result {
        Ok(()) => ExitCode::Ok.into(),
        Err(e) => ExitCode::from_domain_error(&e).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_match_spec() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::ConfigurationError.as_i32(), 1);
        assert_eq!(ExitCode::RuntimeError.as_i32(), 2);
        assert_eq!(ExitCode::Cancelled.as_i32(), 3);
    }

    #[test]
    fn maps_configuration_errors() {
        let err = DomainError::configuration("bad count");
        assert_eq!(ExitCode::from_domain_error(&err), ExitCode::ConfigurationError);
    }

    #[test]
    fn maps_cancellation() {
        assert_eq!(ExitCode::from_domain_error(&DomainError::Cancelled), ExitCode::Cancelled);
    }

    #[test]
    fn maps_other_errors_to_runtime() {
        let err = DomainError::Internal("boom".into());
        assert_eq!(ExitCode::from_domain_error(&err), ExitCode::RuntimeError);
    }
}
