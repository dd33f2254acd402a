// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The replicated storage roster.
//!
//! Data is partitioned across a fixed set of sites by a static rule: odd
//! variables live at a single id-derived site, even variables are replicated
//! everywhere. Each site keeps a committed version history per variable it
//! stores, an up/down flag, and a per-variable readable flag that gates reads
//! after the site recovers from a failure.
//!
//! Nothing here is durable or networked. Failure and recovery are in-memory
//! transitions driven by explicit instructions, and a down site keeps its
//! state so validation and later recovery can reason about it.

mod error;
mod replication;
mod site;

pub use error::SiteError;
pub use replication::{
    ReplicationMap, SiteId, Value, VarId, DEFAULT_SITE_COUNT, DEFAULT_VARIABLE_COUNT,
};
pub use site::{Site, Version};
