// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Wait-for graph and deadlock victim selection.
//!
//! The graph is rebuilt from the live lock queues on every detection pass,
//! keyed by transaction id, so edges of committed or aborted transactions
//! can never go stale. A cycle is resolved by aborting its youngest member:
//! the transaction with the largest start tick, ties broken by the larger
//! id so runs are deterministic. One victim is chosen per pass; the caller
//! re-detects after each abort since removing one transaction can leave
//! another cycle standing.

use std::collections::{BTreeMap, BTreeSet};

use crate::time::Tick;

use super::TxnId;

/// Directed graph where an edge `a -> b` means `a` is blocked on a lock
/// held or queued by `b`.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: BTreeMap<TxnId, BTreeSet<TxnId>>,
}

/// Depth-first search marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl WaitForGraph {
    /// Builds a graph from `(waiter, holder)` pairs.
    pub fn from_edges(edges: impl IntoIterator<Item = (TxnId, TxnId)>) -> Self {
        let mut graph = Self::default();
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    /// Adds an edge from `from` to `to`. Self-edges are ignored.
    pub fn add_edge(&mut self, from: TxnId, to: TxnId) {
        if from != to {
            self.edges.entry(from).or_default().insert(to);
        }
    }

    /// Returns true if the graph has no edges at all.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Finds a cycle, returning its members in walk order, or `None` if the
    /// graph is acyclic. Nodes are visited in id order, so the same graph
    /// always yields the same cycle.
    pub fn find_cycle(&self) -> Option<Vec<TxnId>> {
        let mut marks = BTreeMap::new();
        let mut trail = Vec::new();
        for &node in self.edges.keys() {
            if !marks.contains_key(&node) {
                if let Some(cycle) = self.visit(node, &mut marks, &mut trail) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit(
        &self,
        node: TxnId,
        marks: &mut BTreeMap<TxnId, Mark>,
        trail: &mut Vec<TxnId>,
    ) -> Option<Vec<TxnId>> {
        marks.insert(node, Mark::InProgress);
        trail.push(node);
        if let Some(successors) = self.edges.get(&node) {
            for &next in successors {
                match marks.get(&next) {
                    Some(Mark::InProgress) => {
                        // `next` is on the trail; the cycle is the suffix
                        // starting at its first occurrence.
                        let start = trail.iter().position(|&t| t == next).unwrap_or(0);
                        return Some(trail[start..].to_vec());
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(cycle) = self.visit(next, marks, trail) {
                            return Some(cycle);
                        }
                    }
                }
            }
        }
        trail.pop();
        marks.insert(node, Mark::Done);
        None
    }
}

/// Picks the cycle member to abort: the one with the largest start tick,
/// ties broken by the larger transaction id.
pub fn youngest_member<F>(cycle: &[TxnId], start_of: F) -> Option<TxnId>
where
    F: Fn(TxnId) -> Tick,
{
    cycle.iter().copied().max_by_key(|&txn| (start_of(txn), txn))
}
