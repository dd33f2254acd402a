// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! RubidiumDB: the concurrency-control and recovery core of a replicated
//! database, driven by an instruction script.
//!
//! The crate consumes transaction operations (begin, read, write, end) and
//! site transitions (fail, recover) one instruction per logical tick, and
//! produces an execution equivalent to a serializable schedule. Read-write
//! transactions use strict two-phase locking with FIFO lock queues;
//! read-only transactions read from a committed-value view captured at
//! start; deadlocks are detected eagerly on the wait-for graph and resolved
//! by aborting the youngest cycle member. Variables are partitioned and
//! replicated across sites under the available-copies discipline: a
//! transaction that wrote to a site which later failed aborts at commit, and
//! recovered replicas stay unreadable until freshly written.
//!
//! Everything is in-memory and deterministic: no network, no wall clock, no
//! persistence. The [`txn::TransactionManager`] owns all run state and is
//! constructed per run, so tests can drive it directly.

pub mod script;
pub mod site;
pub mod time;
pub mod txn;

pub use script::{Instruction, ScriptError};
pub use site::{
    ReplicationMap, Site, SiteError, SiteId, Value, VarId, Version, DEFAULT_SITE_COUNT,
    DEFAULT_VARIABLE_COUNT,
};
pub use time::{LogicalClock, Tick};
pub use txn::{
    AbortReason, DumpSnapshot, Event, LockGrant, LockMode, LockState, LockTable, Transaction,
    TransactionManager, TxnError, TxnId, TxnKind, TxnState, WaitForGraph,
};
