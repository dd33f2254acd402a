// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction error types.

use crate::site::{SiteError, SiteId, VarId};

/// Errors that indicate a malformed instruction stream.
///
/// These fail the offending instruction loudly. Contention never surfaces
/// here: a request that cannot proceed yet is buffered and retried, and a
/// transaction that must die is aborted and reported as an event.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("transaction {name} already exists")]
    DuplicateTransaction { name: String },

    #[error("unknown transaction {name}")]
    UnknownTransaction { name: String },

    #[error("transaction {name} already committed")]
    TransactionFinished { name: String },

    #[error("unknown variable {var}")]
    UnknownVariable { var: VarId },

    #[error("unknown site {site}")]
    UnknownSite { site: SiteId },

    #[error(transparent)]
    Site(#[from] SiteError),
}
