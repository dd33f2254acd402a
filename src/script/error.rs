// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Script error types.

/// Errors raised while parsing an instruction line.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("malformed instruction {0:?}")]
    Malformed(String),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("{command} expects {expected} argument(s), found {found}")]
    Arity {
        command: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid variable {0:?}")]
    InvalidVariable(String),

    #[error("invalid site {0:?}")]
    InvalidSite(String),

    #[error("invalid value {0:?}")]
    InvalidValue(String),
}
