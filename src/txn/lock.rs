// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Queue-based lock table with strict two-phase locking rules.
//!
//! Each variable has a FIFO queue of lock entries, at most one per
//! transaction. Granted entries form a compatible set (any number of readers,
//! or one writer); everything behind an incompatible entry waits. Locks are
//! only released at transaction end, and releasing promotes whatever the
//! queue order now allows.

use std::collections::{BTreeMap, BTreeSet};

use crate::site::VarId;

use super::TxnId;

/// Lock modes for read/write access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared lock for reads (multiple readers allowed).
    Read,
    /// Exclusive lock for writes (single writer, no readers).
    Write,
}

impl LockMode {
    /// Returns true if two locks in these modes cannot be held concurrently
    /// by different transactions.
    #[inline]
    pub fn conflicts_with(self, other: LockMode) -> bool {
        self == LockMode::Write || other == LockMode::Write
    }
}

/// Whether a lock entry holds its lock or is queued for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Granted,
    Waiting,
}

/// One entry in a variable's queue.
#[derive(Debug, Clone)]
struct LockEntry {
    txn: TxnId,
    mode: LockMode,
    state: LockState,
    /// A reader queued for an upgrade keeps its read grant while waiting.
    holds_read: bool,
}

impl LockEntry {
    /// The mode this entry currently holds, if any.
    fn held_mode(&self) -> Option<LockMode> {
        match self.state {
            LockState::Granted => Some(self.mode),
            LockState::Waiting if self.holds_read => Some(LockMode::Read),
            LockState::Waiting => None,
        }
    }
}

/// Outcome of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockGrant {
    /// The lock is held; the operation may proceed.
    Granted,
    /// The request is queued behind `blocking`.
    Waiting {
        /// The transaction most immediately in the way, for wait-for edges
        /// and trace output.
        blocking: TxnId,
    },
}

/// The per-variable lock queues.
#[derive(Debug, Default)]
pub struct LockTable {
    queues: BTreeMap<VarId, Vec<LockEntry>>,
}

impl LockTable {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a read lock for `txn` on `var`.
    ///
    /// A transaction already holding any lock on the variable is served by
    /// that lock: a write grant satisfies a read request. A fresh request is
    /// granted only when every queued entry is a granted read, so a queued
    /// writer is never overtaken.
    pub fn request_read(&mut self, txn: TxnId, var: VarId) -> LockGrant {
        let queue = self.queues.entry(var).or_default();
        if let Some(pos) = queue.iter().position(|e| e.txn == txn) {
            if queue[pos].held_mode().is_some() {
                return LockGrant::Granted;
            }
            return Self::still_waiting(queue, pos);
        }

        let compatible = queue
            .iter()
            .all(|e| e.state == LockState::Granted && e.mode == LockMode::Read);
        if compatible {
            queue.push(LockEntry {
                txn,
                mode: LockMode::Read,
                state: LockState::Granted,
                holds_read: false,
            });
            return LockGrant::Granted;
        }

        let blocking = queue[queue.len() - 1].txn;
        queue.push(LockEntry {
            txn,
            mode: LockMode::Read,
            state: LockState::Waiting,
            holds_read: false,
        });
        LockGrant::Waiting { blocking }
    }

    /// Requests a write lock for `txn` on `var`.
    ///
    /// A granted read is upgraded: in place when `txn` is alone on the
    /// variable, otherwise by re-queuing at the tail as a waiting write that
    /// keeps its read grant. A waiting request that asked for a read is
    /// strengthened to a write without losing its queue position.
    pub fn request_write(&mut self, txn: TxnId, var: VarId) -> LockGrant {
        let queue = self.queues.entry(var).or_default();
        if let Some(pos) = queue.iter().position(|e| e.txn == txn) {
            match (queue[pos].mode, queue[pos].state) {
                (LockMode::Write, LockState::Granted) => return LockGrant::Granted,
                (LockMode::Write, LockState::Waiting) => return Self::still_waiting(queue, pos),
                (LockMode::Read, LockState::Waiting) => {
                    queue[pos].mode = LockMode::Write;
                    return Self::still_waiting(queue, pos);
                }
                (LockMode::Read, LockState::Granted) => {
                    queue.remove(pos);
                    return match queue.last() {
                        None => {
                            queue.push(LockEntry {
                                txn,
                                mode: LockMode::Write,
                                state: LockState::Granted,
                                holds_read: false,
                            });
                            LockGrant::Granted
                        }
                        Some(last) => {
                            let blocking = last.txn;
                            queue.push(LockEntry {
                                txn,
                                mode: LockMode::Write,
                                state: LockState::Waiting,
                                holds_read: true,
                            });
                            LockGrant::Waiting { blocking }
                        }
                    };
                }
            }
        }

        if queue.is_empty() {
            queue.push(LockEntry {
                txn,
                mode: LockMode::Write,
                state: LockState::Granted,
                holds_read: false,
            });
            return LockGrant::Granted;
        }

        let blocking = queue[queue.len() - 1].txn;
        queue.push(LockEntry {
            txn,
            mode: LockMode::Write,
            state: LockState::Waiting,
            holds_read: false,
        });
        LockGrant::Waiting { blocking }
    }

    /// Removes `txn`'s entry on `var` and promotes whatever the queue now
    /// allows, returning the transactions whose requests became granted.
    pub fn release(&mut self, txn: TxnId, var: VarId) -> Vec<TxnId> {
        let Some(queue) = self.queues.get_mut(&var) else {
            return Vec::new();
        };
        let before = queue.len();
        queue.retain(|e| e.txn != txn);
        if queue.len() == before {
            return Vec::new();
        }
        let granted = Self::promote(queue);
        if queue.is_empty() {
            self.queues.remove(&var);
        }
        granted
    }

    /// Releases every lock `txn` holds or waits for, returning the set of
    /// transactions unblocked by the releases. Called at commit and abort.
    pub fn release_all(&mut self, txn: TxnId) -> BTreeSet<TxnId> {
        let vars: Vec<VarId> = self
            .queues
            .iter()
            .filter(|(_, queue)| queue.iter().any(|e| e.txn == txn))
            .map(|(&var, _)| var)
            .collect();
        vars.into_iter()
            .flat_map(|var| self.release(txn, var))
            .collect()
    }

    /// Returns the locks `txn` currently holds, including the read side of a
    /// pending upgrade.
    pub fn locks_held(&self, txn: TxnId) -> Vec<(VarId, LockMode)> {
        self.queues
            .iter()
            .filter_map(|(&var, queue)| {
                queue
                    .iter()
                    .find(|e| e.txn == txn)
                    .and_then(LockEntry::held_mode)
                    .map(|mode| (var, mode))
            })
            .collect()
    }

    /// Returns the wait-for relation implied by the queues.
    ///
    /// A waiting entry depends on every conflicting lock currently held by
    /// another transaction and, because the queues are FIFO, on every
    /// conflicting request queued ahead of it.
    pub fn wait_for_edges(&self) -> BTreeSet<(TxnId, TxnId)> {
        let mut edges = BTreeSet::new();
        for queue in self.queues.values() {
            for (pos, entry) in queue.iter().enumerate() {
                if entry.state != LockState::Waiting {
                    continue;
                }
                for (ahead, other) in queue.iter().enumerate() {
                    if other.txn == entry.txn {
                        continue;
                    }
                    let holds_conflict = other
                        .held_mode()
                        .is_some_and(|m| entry.mode.conflicts_with(m));
                    let queued_conflict = ahead < pos
                        && other.state == LockState::Waiting
                        && entry.mode.conflicts_with(other.mode);
                    if holds_conflict || queued_conflict {
                        edges.insert((entry.txn, other.txn));
                    }
                }
            }
        }
        edges
    }

    /// Reports a still-waiting entry, naming its nearest obstacle.
    fn still_waiting(queue: &mut [LockEntry], pos: usize) -> LockGrant {
        match Self::blocker_of(queue, pos) {
            Some(blocking) => LockGrant::Waiting { blocking },
            // Every obstacle is gone; promotion simply hasn't run since.
            None => {
                queue[pos].state = LockState::Granted;
                queue[pos].holds_read = false;
                LockGrant::Granted
            }
        }
    }

    /// The transaction most immediately blocking the entry at `pos`: the
    /// nearest conflicting entry queued ahead, else any conflicting holder.
    fn blocker_of(queue: &[LockEntry], pos: usize) -> Option<TxnId> {
        let entry = &queue[pos];
        for other in queue[..pos].iter().rev() {
            if other.txn == entry.txn {
                continue;
            }
            let holds = other
                .held_mode()
                .is_some_and(|m| entry.mode.conflicts_with(m));
            let queued =
                other.state == LockState::Waiting && entry.mode.conflicts_with(other.mode);
            if holds || queued {
                return Some(other.txn);
            }
        }
        queue
            .iter()
            .find(|other| {
                other.txn != entry.txn
                    && other
                        .held_mode()
                        .is_some_and(|m| entry.mode.conflicts_with(m))
            })
            .map(|other| other.txn)
    }

    /// Grants every waiting entry the queue order now allows, in FIFO order.
    fn promote(queue: &mut Vec<LockEntry>) -> Vec<TxnId> {
        let mut granted = Vec::new();
        for pos in 0..queue.len() {
            if queue[pos].state != LockState::Waiting {
                continue;
            }
            if Self::eligible(queue, pos) {
                queue[pos].state = LockState::Granted;
                queue[pos].holds_read = false;
                granted.push(queue[pos].txn);
            }
        }
        granted
    }

    /// A waiting entry is eligible when no other transaction holds a
    /// conflicting lock and no conflicting request sits ahead of it.
    fn eligible(queue: &[LockEntry], pos: usize) -> bool {
        let entry = &queue[pos];
        for (ahead, other) in queue.iter().enumerate() {
            if other.txn == entry.txn {
                continue;
            }
            if let Some(held) = other.held_mode() {
                if entry.mode.conflicts_with(held) {
                    return false;
                }
            }
            if ahead < pos
                && other.state == LockState::Waiting
                && entry.mode.conflicts_with(other.mode)
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: VarId = VarId(4);
    const Y: VarId = VarId(5);

    #[test]
    fn test_acquire_free_lock() {
        let mut table = LockTable::new();
        assert_eq!(table.request_write(TxnId(1), X), LockGrant::Granted);
        assert_eq!(table.locks_held(TxnId(1)), vec![(X, LockMode::Write)]);
    }

    #[test]
    fn test_shared_readers_coexist() {
        let mut table = LockTable::new();
        assert_eq!(table.request_read(TxnId(1), X), LockGrant::Granted);
        assert_eq!(table.request_read(TxnId(2), X), LockGrant::Granted);
        assert_eq!(table.request_read(TxnId(3), X), LockGrant::Granted);
        assert!(table.wait_for_edges().is_empty());
    }

    #[test]
    fn test_writer_waits_behind_all_holders() {
        let mut table = LockTable::new();
        table.request_read(TxnId(1), X);
        table.request_read(TxnId(2), X);
        assert_eq!(
            table.request_write(TxnId(3), X),
            LockGrant::Waiting {
                blocking: TxnId(2)
            }
        );
        let edges = table.wait_for_edges();
        assert!(edges.contains(&(TxnId(3), TxnId(1))));
        assert!(edges.contains(&(TxnId(3), TxnId(2))));
    }

    #[test]
    fn test_reader_does_not_overtake_queued_writer() {
        let mut table = LockTable::new();
        table.request_read(TxnId(1), X);
        table.request_write(TxnId(2), X);
        assert!(matches!(
            table.request_read(TxnId(3), X),
            LockGrant::Waiting { .. }
        ));
        // The queued read depends on the queued write ahead of it.
        assert!(table.wait_for_edges().contains(&(TxnId(3), TxnId(2))));
    }

    #[test]
    fn test_reacquire_is_idempotent() {
        let mut table = LockTable::new();
        assert_eq!(table.request_write(TxnId(1), X), LockGrant::Granted);
        assert_eq!(table.request_write(TxnId(1), X), LockGrant::Granted);
        // A weaker request is served by the stronger lock.
        assert_eq!(table.request_read(TxnId(1), X), LockGrant::Granted);
        assert_eq!(table.locks_held(TxnId(1)), vec![(X, LockMode::Write)]);
    }

    #[test]
    fn test_upgrade_in_place_when_alone() {
        let mut table = LockTable::new();
        table.request_read(TxnId(1), X);
        assert_eq!(table.request_write(TxnId(1), X), LockGrant::Granted);
        assert_eq!(table.locks_held(TxnId(1)), vec![(X, LockMode::Write)]);
    }

    #[test]
    fn test_upgrade_waits_behind_other_reader() {
        let mut table = LockTable::new();
        table.request_read(TxnId(1), X);
        table.request_read(TxnId(2), X);
        assert_eq!(
            table.request_write(TxnId(1), X),
            LockGrant::Waiting {
                blocking: TxnId(2)
            }
        );
        // The read grant survives while the upgrade waits.
        assert_eq!(table.locks_held(TxnId(1)), vec![(X, LockMode::Read)]);

        let unblocked = table.release_all(TxnId(2));
        assert!(unblocked.contains(&TxnId(1)));
        assert_eq!(table.locks_held(TxnId(1)), vec![(X, LockMode::Write)]);
    }

    #[test]
    fn test_release_promotes_fifo() {
        let mut table = LockTable::new();
        table.request_write(TxnId(1), X);
        table.request_write(TxnId(2), X);
        table.request_read(TxnId(3), X);

        let unblocked = table.release_all(TxnId(1));
        assert!(unblocked.contains(&TxnId(2)));
        assert!(!unblocked.contains(&TxnId(3)));
        assert_eq!(table.locks_held(TxnId(2)), vec![(X, LockMode::Write)]);

        let unblocked = table.release_all(TxnId(2));
        assert!(unblocked.contains(&TxnId(3)));
        assert_eq!(table.locks_held(TxnId(3)), vec![(X, LockMode::Read)]);
    }

    #[test]
    fn test_release_promotes_read_run() {
        let mut table = LockTable::new();
        table.request_write(TxnId(1), X);
        table.request_read(TxnId(2), X);
        table.request_read(TxnId(3), X);

        let unblocked = table.release_all(TxnId(1));
        assert!(unblocked.contains(&TxnId(2)));
        assert!(unblocked.contains(&TxnId(3)));
    }

    #[test]
    fn test_release_all_spans_variables() {
        let mut table = LockTable::new();
        table.request_write(TxnId(1), X);
        table.request_write(TxnId(1), Y);
        table.request_read(TxnId(2), X);
        table.request_read(TxnId(3), Y);

        let unblocked = table.release_all(TxnId(1));
        assert!(unblocked.contains(&TxnId(2)));
        assert!(unblocked.contains(&TxnId(3)));
        assert!(table.locks_held(TxnId(1)).is_empty());
    }

    #[test]
    fn test_finished_transaction_leaves_no_edges() {
        let mut table = LockTable::new();
        table.request_write(TxnId(1), X);
        table.request_write(TxnId(2), X);
        table.release_all(TxnId(2));
        assert!(table.wait_for_edges().is_empty());
    }

    #[test]
    fn test_upgrade_vs_queued_writer_forms_cycle_edges() {
        let mut table = LockTable::new();
        table.request_read(TxnId(1), X);
        table.request_write(TxnId(2), X);
        table.request_write(TxnId(1), X);

        let edges = table.wait_for_edges();
        // T2 needs T1's held read gone; T1's upgrade is queued behind T2.
        assert!(edges.contains(&(TxnId(2), TxnId(1))));
        assert!(edges.contains(&(TxnId(1), TxnId(2))));
    }
}
