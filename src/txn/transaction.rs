// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction types and state management.

use std::collections::BTreeMap;
use std::fmt;

use crate::site::{SiteId, Value, VarId};
use crate::time::Tick;

/// Unique transaction identifier, stable for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u32);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// The two transaction kinds.
///
/// The kinds share almost all state; they diverge only in read handling and
/// lock participation, so the split is a tag rather than a type hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnKind {
    /// Reads from a committed-value view captured at start; never locks.
    ReadOnly,
    /// Locks under strict two-phase locking; writes are buffered to commit.
    ReadWrite,
}

/// Transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    /// An operation is buffered awaiting a lock grant or a readable copy.
    Blocked,
    Committed,
    Aborted,
}

/// Why an aborted transaction died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Chosen as the youngest member of a wait-for cycle.
    Deadlock,
    /// A site it wrote to failed before it could commit.
    SiteFailure,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Deadlock => write!(f, "deadlock victim"),
            AbortReason::SiteFailure => write!(f, "site failure"),
        }
    }
}

/// Per-transaction state.
///
/// Writes are buffered in `pending_writes` until commit. `sites_written`
/// remembers the first tick each site was touched by a write so commit
/// validation can check the site stayed up from that point on. A finished
/// transaction keeps its record for reporting but takes no further part in
/// locking or deadlock detection.
#[derive(Debug)]
pub struct Transaction {
    pub(crate) id: TxnId,
    pub(crate) name: String,
    pub(crate) kind: TxnKind,
    pub(crate) start: Tick,
    pub(crate) state: TxnState,
    pub(crate) abort_reason: Option<AbortReason>,
    pub(crate) pending_writes: BTreeMap<VarId, Value>,
    pub(crate) sites_written: BTreeMap<SiteId, Tick>,
    /// Committed-value view captured at start; populated for read-only
    /// transactions only.
    pub(crate) snapshot: BTreeMap<VarId, Value>,
    /// Last value observed or written per variable, kept for reporting.
    pub(crate) final_values: BTreeMap<VarId, Value>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, name: String, kind: TxnKind, start: Tick) -> Self {
        Self {
            id,
            name,
            kind,
            start,
            state: TxnState::Active,
            abort_reason: None,
            pending_writes: BTreeMap::new(),
            sites_written: BTreeMap::new(),
            snapshot: BTreeMap::new(),
            final_values: BTreeMap::new(),
        }
    }

    /// Returns the transaction id.
    #[inline]
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Returns the name the script knows this transaction by.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the transaction kind.
    #[inline]
    pub fn kind(&self) -> TxnKind {
        self.kind
    }

    /// Returns the start tick.
    #[inline]
    pub fn start(&self) -> Tick {
        self.start
    }

    /// Returns the current status.
    #[inline]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Returns why the transaction aborted, if it did.
    #[inline]
    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason
    }

    /// Returns true if the transaction reads from its start-time view.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.kind == TxnKind::ReadOnly
    }

    /// Returns true if the transaction has reached a terminal state.
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, TxnState::Committed | TxnState::Aborted)
    }

    /// The last value this transaction observed or wrote per variable.
    #[inline]
    pub fn final_values(&self) -> &BTreeMap<VarId, Value> {
        &self.final_values
    }

    /// Writes buffered for commit.
    #[inline]
    pub fn pending_writes(&self) -> &BTreeMap<VarId, Value> {
        &self.pending_writes
    }
}
