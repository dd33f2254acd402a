// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Site error types.

use super::SiteId;

/// Errors that can occur when changing a site's availability.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("{0} is already down")]
    AlreadyDown(SiteId),

    #[error("{0} is already up")]
    AlreadyUp(SiteId),
}
