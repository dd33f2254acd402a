// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Instruction-driven transaction manager.
//!
//! The manager owns every piece of run state: the logical clock, the site
//! roster, the lock table, the transaction arena, and the buffer of blocked
//! instructions. The external driver hands it one instruction at a time;
//! each call returns the events the instruction produced so a reporting
//! layer can print a trace. The manager itself never prints.
//!
//! After each instruction the manager eagerly resolves deadlocks (one
//! youngest victim per pass, repeated until the wait-for graph is acyclic)
//! and re-drives the instruction buffer to a fixpoint, so blocking latency
//! is bounded by a single instruction.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::script::Instruction;
use crate::site::{ReplicationMap, Site, SiteId, Value, VarId};
use crate::time::{LogicalClock, Tick};

use super::deadlock::{youngest_member, WaitForGraph};
use super::error::TxnError;
use super::lock::{LockGrant, LockMode, LockTable};
use super::transaction::{AbortReason, Transaction, TxnId, TxnKind, TxnState};

/// Newest committed value per variable at every site, down sites included.
pub type DumpSnapshot = BTreeMap<SiteId, BTreeMap<VarId, Value>>;

/// Externally visible outcome of processing an instruction.
///
/// One instruction can produce several events: a commit releases locks,
/// which retries buffered instructions of other transactions, and a
/// deadlock abort does the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A read completed. `site` names the serving replica; it is `None`
    /// when the value came from a start-time view or the transaction's own
    /// pending write.
    ReadServed {
        txn: TxnId,
        var: VarId,
        value: Value,
        site: Option<SiteId>,
    },
    /// A write lock was granted and the value buffered for commit.
    WriteBuffered {
        txn: TxnId,
        var: VarId,
        value: Value,
    },
    /// The instruction could not proceed and was buffered for retry.
    Waiting { txn: TxnId },
    /// The transaction committed.
    Committed { txn: TxnId },
    /// The transaction aborted for the given reason.
    Aborted { txn: TxnId, reason: AbortReason },
    /// A site went down.
    SiteDown { site: SiteId },
    /// A site came back up.
    SiteUp { site: SiteId },
    /// A roster-wide snapshot was requested.
    Dump { snapshot: DumpSnapshot },
}

/// A blocked instruction awaiting retry.
#[derive(Debug, Clone)]
enum BufferedOp {
    Read(VarId),
    Write(VarId, Value),
    End,
}

#[derive(Debug, Clone)]
struct Buffered {
    txn: TxnId,
    op: BufferedOp,
}

/// The concurrency-control and recovery engine.
///
/// Construct one per run. Tests can feed it instructions directly; nothing
/// here is process-global.
#[derive(Debug)]
pub struct TransactionManager {
    clock: LogicalClock,
    replication: ReplicationMap,
    sites: BTreeMap<SiteId, Site>,
    locks: LockTable,
    txns: BTreeMap<TxnId, Transaction>,
    names: BTreeMap<String, TxnId>,
    next_txn: u32,
    buffer: Vec<Buffered>,
}

impl TransactionManager {
    /// Creates a manager over the default roster.
    pub fn new() -> Self {
        Self::with_replication(ReplicationMap::default())
    }

    /// Creates a manager over an explicit roster.
    pub fn with_replication(replication: ReplicationMap) -> Self {
        let sites: BTreeMap<SiteId, Site> = replication
            .site_ids()
            .map(|id| {
                let initial = replication
                    .variables_at(id)
                    .into_iter()
                    .map(|v| (v, replication.initial_value(v)));
                (id, Site::new(id, initial))
            })
            .collect();
        Self {
            clock: LogicalClock::new(),
            replication,
            sites,
            locks: LockTable::new(),
            txns: BTreeMap::new(),
            names: BTreeMap::new(),
            next_txn: 1,
            buffer: Vec::new(),
        }
    }

    /// Processes one instruction and returns the events it produced.
    ///
    /// The clock advances once per call, after deadlock resolution and
    /// buffered-instruction retries have settled.
    pub fn execute(&mut self, instruction: &Instruction) -> Result<Vec<Event>, TxnError> {
        let mut events = Vec::new();
        match instruction {
            Instruction::Begin { txn } => self.begin(txn, TxnKind::ReadWrite)?,
            Instruction::BeginRo { txn } => self.begin(txn, TxnKind::ReadOnly)?,
            Instruction::Read { txn, var } => self.read(txn, *var, &mut events)?,
            Instruction::Write { txn, var, value } => {
                self.write(txn, *var, *value, &mut events)?
            }
            Instruction::End { txn } => self.end(txn, &mut events)?,
            Instruction::Fail { site } => self.fail(*site, &mut events)?,
            Instruction::Recover { site } => self.recover(*site, &mut events)?,
            Instruction::Dump => events.push(Event::Dump {
                snapshot: self.dump(),
            }),
        }
        self.settle(&mut events);
        self.clock.advance();
        Ok(events)
    }

    /// Returns the newest committed value of every variable at every site.
    pub fn dump(&self) -> DumpSnapshot {
        self.sites
            .iter()
            .map(|(&id, site)| (id, site.committed_values().collect()))
            .collect()
    }

    /// Looks up a transaction by script name.
    pub fn transaction(&self, name: &str) -> Option<&Transaction> {
        self.names.get(name).and_then(|id| self.txns.get(id))
    }

    /// Looks up a transaction by id.
    pub fn transaction_by_id(&self, id: TxnId) -> Option<&Transaction> {
        self.txns.get(&id)
    }

    /// Returns the locks a transaction currently holds.
    pub fn locks_held(&self, id: TxnId) -> Vec<(VarId, LockMode)> {
        self.locks.locks_held(id)
    }

    /// Looks up a site.
    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.sites.get(&id)
    }

    /// Returns the current tick.
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    fn begin(&mut self, name: &str, kind: TxnKind) -> Result<(), TxnError> {
        if self.names.contains_key(name) {
            return Err(TxnError::DuplicateTransaction {
                name: name.to_string(),
            });
        }
        let id = TxnId(self.next_txn);
        self.next_txn += 1;
        let start = self.clock.now();
        let mut txn = Transaction::new(id, name.to_string(), kind, start);
        if kind == TxnKind::ReadOnly {
            // Capture the committed-value view this transaction will read
            // from for its whole lifetime.
            for var in self.replication.var_ids() {
                txn.snapshot.insert(var, self.committed_value_at(var, start));
            }
        }
        debug!(txn = %txn.name, ?kind, %start, "transaction started");
        self.names.insert(name.to_string(), id);
        self.txns.insert(id, txn);
        Ok(())
    }

    fn read(&mut self, name: &str, var: VarId, events: &mut Vec<Event>) -> Result<(), TxnError> {
        let id = self.lookup(name)?;
        if !self.replication.contains(var) {
            return Err(TxnError::UnknownVariable { var });
        }
        match self.state_of(id) {
            TxnState::Aborted => {
                debug!(txn = name, %var, "read for aborted transaction ignored");
                Ok(())
            }
            TxnState::Committed => Err(TxnError::TransactionFinished {
                name: name.to_string(),
            }),
            TxnState::Active | TxnState::Blocked => {
                if self.is_buffered(id) || !self.attempt_read(id, var, events) {
                    self.enqueue(id, BufferedOp::Read(var), events);
                }
                Ok(())
            }
        }
    }

    fn write(
        &mut self,
        name: &str,
        var: VarId,
        value: Value,
        events: &mut Vec<Event>,
    ) -> Result<(), TxnError> {
        let id = self.lookup(name)?;
        if !self.replication.contains(var) {
            return Err(TxnError::UnknownVariable { var });
        }
        match self.state_of(id) {
            TxnState::Aborted => {
                debug!(txn = name, %var, "write for aborted transaction ignored");
                Ok(())
            }
            TxnState::Committed => Err(TxnError::TransactionFinished {
                name: name.to_string(),
            }),
            TxnState::Active | TxnState::Blocked => {
                if self.is_buffered(id) || !self.attempt_write(id, var, value, events) {
                    self.enqueue(id, BufferedOp::Write(var, value), events);
                }
                Ok(())
            }
        }
    }

    fn end(&mut self, name: &str, events: &mut Vec<Event>) -> Result<(), TxnError> {
        let id = self.lookup(name)?;
        match self.state_of(id) {
            TxnState::Aborted => {
                // Deadlock victims die before their end arrives; re-report
                // the outcome so the trace stays complete.
                let reason = self
                    .txns
                    .get(&id)
                    .and_then(|t| t.abort_reason)
                    .unwrap_or(AbortReason::Deadlock);
                events.push(Event::Aborted { txn: id, reason });
                Ok(())
            }
            TxnState::Committed => Err(TxnError::TransactionFinished {
                name: name.to_string(),
            }),
            TxnState::Active | TxnState::Blocked => {
                if self.is_buffered(id) {
                    self.enqueue(id, BufferedOp::End, events);
                } else {
                    self.attempt_end(id, events);
                }
                Ok(())
            }
        }
    }

    fn fail(&mut self, site: SiteId, events: &mut Vec<Event>) -> Result<(), TxnError> {
        let now = self.clock.now();
        let Some(s) = self.sites.get_mut(&site) else {
            return Err(TxnError::UnknownSite { site });
        };
        s.fail(now)?;
        // No transaction aborts here. Whether a lock on data stored at this
        // site is fatal is decided at that transaction's commit.
        info!(%site, %now, "site failed");
        events.push(Event::SiteDown { site });
        Ok(())
    }

    fn recover(&mut self, site: SiteId, events: &mut Vec<Event>) -> Result<(), TxnError> {
        let now = self.clock.now();
        let Some(s) = self.sites.get_mut(&site) else {
            return Err(TxnError::UnknownSite { site });
        };
        s.recover(now, &self.replication)?;
        info!(%site, %now, "site recovered");
        events.push(Event::SiteUp { site });
        Ok(())
    }

    /// Tries to complete a read. Returns false if it must (stay) buffered.
    fn attempt_read(&mut self, id: TxnId, var: VarId, events: &mut Vec<Event>) -> bool {
        let Some(txn) = self.txns.get_mut(&id) else {
            return true;
        };
        if txn.is_read_only() {
            let value = txn
                .snapshot
                .get(&var)
                .copied()
                .unwrap_or_else(|| self.replication.initial_value(var));
            txn.final_values.insert(var, value);
            events.push(Event::ReadServed {
                txn: id,
                var,
                value,
                site: None,
            });
            return true;
        }
        match self.locks.request_read(id, var) {
            LockGrant::Waiting { .. } => false,
            LockGrant::Granted => {
                if let Some(&value) = txn.pending_writes.get(&var) {
                    txn.final_values.insert(var, value);
                    events.push(Event::ReadServed {
                        txn: id,
                        var,
                        value,
                        site: None,
                    });
                    return true;
                }
                // The lock alone is not enough: the serving replica must be
                // up and hold a fresh copy. Replicas agree on committed
                // values, so the lowest qualifying site is as good as any.
                let served = self.replication.sites_for(var).into_iter().find_map(|s| {
                    self.sites
                        .get(&s)
                        .and_then(|site| site.readable_value(var).map(|v| (s, v)))
                });
                match served {
                    Some((site, value)) => {
                        txn.final_values.insert(var, value);
                        events.push(Event::ReadServed {
                            txn: id,
                            var,
                            value,
                            site: Some(site),
                        });
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Tries to complete a write. Returns false if it must (stay) buffered.
    fn attempt_write(
        &mut self,
        id: TxnId,
        var: VarId,
        value: Value,
        events: &mut Vec<Event>,
    ) -> bool {
        match self.locks.request_write(id, var) {
            LockGrant::Waiting { .. } => false,
            LockGrant::Granted => {
                let now = self.clock.now();
                let Some(txn) = self.txns.get_mut(&id) else {
                    return true;
                };
                txn.pending_writes.insert(var, value);
                txn.final_values.insert(var, value);
                for s in self.replication.sites_for(var) {
                    if self.sites.get(&s).is_some_and(Site::is_up) {
                        txn.sites_written.entry(s).or_insert(now);
                    }
                }
                events.push(Event::WriteBuffered {
                    txn: id,
                    var,
                    value,
                });
                true
            }
        }
    }

    /// Completes an end: commit when every written site stayed up since the
    /// transaction first wrote there, abort otherwise.
    fn attempt_end(&mut self, id: TxnId, events: &mut Vec<Event>) -> bool {
        let now = self.clock.now();
        let Some(txn) = self.txns.get_mut(&id) else {
            return true;
        };
        if txn.is_read_only() {
            txn.state = TxnState::Committed;
            events.push(Event::Committed { txn: id });
            return true;
        }
        let invalid = txn.sites_written.iter().any(|(site_id, first)| {
            self.sites.get(site_id).map_or(true, |site| {
                !site.is_up() || site.last_fail().is_some_and(|f| f >= *first)
            })
        });
        if invalid {
            self.abort_txn(id, AbortReason::SiteFailure, events);
            return true;
        }
        for (&var, &value) in &txn.pending_writes {
            for site_id in self.replication.sites_for(var) {
                if let Some(site) = self.sites.get_mut(&site_id) {
                    if site.is_up() {
                        site.commit_write(var, value, now);
                    }
                }
            }
        }
        txn.state = TxnState::Committed;
        debug!(txn = %txn.name, %now, "transaction committed");
        events.push(Event::Committed { txn: id });
        let unblocked = self.locks.release_all(id);
        if !unblocked.is_empty() {
            debug!(?unblocked, "commit released locks, retrying waiters");
        }
        true
    }

    /// Aborts a transaction: pending writes are discarded, its buffered
    /// instructions dropped, and its locks released.
    fn abort_txn(&mut self, id: TxnId, reason: AbortReason, events: &mut Vec<Event>) {
        let Some(txn) = self.txns.get_mut(&id) else {
            return;
        };
        if txn.is_finished() {
            return;
        }
        txn.pending_writes.clear();
        txn.state = TxnState::Aborted;
        txn.abort_reason = Some(reason);
        info!(txn = %txn.name, %reason, "transaction aborted");
        self.buffer.retain(|b| b.txn != id);
        let unblocked = self.locks.release_all(id);
        if !unblocked.is_empty() {
            debug!(?unblocked, "abort released locks, retrying waiters");
        }
        events.push(Event::Aborted { txn: id, reason });
    }

    /// Alternates deadlock resolution and buffered-instruction retries
    /// until neither makes progress.
    fn settle(&mut self, events: &mut Vec<Event>) {
        loop {
            let aborted = self.resolve_deadlocks(events);
            let progressed = self.drive_buffer(events);
            if !aborted && !progressed {
                break;
            }
        }
    }

    /// Aborts the youngest member of each wait-for cycle until none remains.
    fn resolve_deadlocks(&mut self, events: &mut Vec<Event>) -> bool {
        let mut any = false;
        loop {
            let graph = WaitForGraph::from_edges(self.locks.wait_for_edges());
            let Some(cycle) = graph.find_cycle() else {
                break;
            };
            let Some(victim) = youngest_member(&cycle, |txn| {
                self.txns.get(&txn).map(|t| t.start).unwrap_or(Tick::ZERO)
            }) else {
                break;
            };
            info!(%victim, ?cycle, "wait-for cycle detected");
            self.abort_txn(victim, AbortReason::Deadlock, events);
            any = true;
        }
        any
    }

    /// Retries buffered instructions in arrival order until a full pass
    /// completes none, keeping per-transaction program order.
    fn drive_buffer(&mut self, events: &mut Vec<Event>) -> bool {
        let mut progressed = false;
        loop {
            let mut advanced = false;
            let pending = std::mem::take(&mut self.buffer);
            let mut kept: Vec<Buffered> = Vec::with_capacity(pending.len());
            for item in pending {
                let state = self.txns.get(&item.txn).map(|t| t.state);
                if !matches!(state, Some(TxnState::Active) | Some(TxnState::Blocked)) {
                    // The transaction died; its queued work is void.
                    continue;
                }
                if kept.iter().any(|k| k.txn == item.txn) {
                    // An earlier instruction of the same transaction is
                    // still blocked; preserve program order.
                    kept.push(item);
                    continue;
                }
                let done = match item.op {
                    BufferedOp::Read(var) => self.attempt_read(item.txn, var, events),
                    BufferedOp::Write(var, value) => {
                        self.attempt_write(item.txn, var, value, events)
                    }
                    BufferedOp::End => self.attempt_end(item.txn, events),
                };
                if done {
                    advanced = true;
                } else {
                    kept.push(item);
                }
            }
            kept.extend(std::mem::take(&mut self.buffer));
            self.buffer = kept;
            if advanced {
                progressed = true;
            } else {
                break;
            }
        }
        let buffer = &self.buffer;
        for txn in self.txns.values_mut() {
            if txn.state == TxnState::Blocked && buffer.iter().all(|b| b.txn != txn.id) {
                txn.state = TxnState::Active;
            }
        }
        progressed
    }

    fn enqueue(&mut self, id: TxnId, op: BufferedOp, events: &mut Vec<Event>) {
        self.buffer.push(Buffered { txn: id, op });
        if let Some(txn) = self.txns.get_mut(&id) {
            txn.state = TxnState::Blocked;
        }
        events.push(Event::Waiting { txn: id });
    }

    fn lookup(&self, name: &str) -> Result<TxnId, TxnError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| TxnError::UnknownTransaction {
                name: name.to_string(),
            })
    }

    fn state_of(&self, id: TxnId) -> TxnState {
        self.txns
            .get(&id)
            .map(|t| t.state)
            .unwrap_or(TxnState::Aborted)
    }

    fn is_buffered(&self, id: TxnId) -> bool {
        self.buffer.iter().any(|b| b.txn == id)
    }

    /// The newest value of `var` committed at or before `at`, across every
    /// site storing it.
    fn committed_value_at(&self, var: VarId, at: Tick) -> Value {
        self.replication
            .sites_for(var)
            .into_iter()
            .filter_map(|s| self.sites.get(&s).and_then(|site| site.version_at(var, at)))
            .max_by_key(|v| v.tick)
            .map(|v| v.value)
            .unwrap_or_else(|| self.replication.initial_value(var))
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
