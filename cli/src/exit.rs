// Copyright (c) 2026 Chimera Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Exit-code policy: 0 success, 1 partial or total failure,
//! 2 invalid arguments, 3 authorization denied.

use chimera_core::application::UseCaseError;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_ARGS: i32 = 2;
pub const EXIT_DENIED: i32 = 3;

/// Error with a pre-assigned exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: String) -> Self {
        Self { code, message }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Map a failed command to its exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli) = err.downcast_ref::<CliError>() {
        return cli.code;
    }
    match err.downcast_ref::<UseCaseError>() {
        Some(UseCaseError::Validation(_)) => EXIT_INVALID_ARGS,
        Some(UseCaseError::AuthorizationDenied(_)) => EXIT_DENIED,
        None => EXIT_FAILURE,
    }
}
