// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction engine: strict two-phase locking, snapshot read-only
//! transactions, and cycle-based deadlock resolution over replicated sites.
//!
//! # Key Concepts
//!
//! ## Strict Two-Phase Locking
//!
//! Read-write transactions take per-variable read/write locks and hold every
//! lock until they end. A request that cannot be granted queues FIFO behind
//! the conflicting holders; the blocked instruction is buffered and retried
//! when a release unblocks it.
//!
//! ## Snapshot Read-Only Transactions
//!
//! A read-only transaction captures, at its start tick, the most recently
//! committed value of every variable, and reads from that view for its whole
//! lifetime. It takes no locks, never blocks, and never deadlocks.
//!
//! ## Deadlock Detection
//!
//! Blocking is modeled, not threaded, so deadlocks are cycles in the
//! wait-for graph implied by the lock queues. After every instruction that
//! leaves a request waiting, the graph is rebuilt and searched; each cycle is
//! broken by aborting its youngest member until the graph is acyclic.
//!
//! ## Available Copies
//!
//! Writes go to every up replica at commit time. A transaction that wrote to
//! a site which failed afterwards must abort at its end instead of
//! committing, and a recovered replica serves no reads of a replicated
//! variable until a fresh commit rewrites it.
//!
//! # Example
//!
//! ```
//! use rubidiumdb::script::Instruction;
//! use rubidiumdb::txn::TransactionManager;
//!
//! let mut mgr = TransactionManager::new();
//! for line in ["begin(T1)", "W(T1,x2,42)", "end(T1)"] {
//!     let instruction = Instruction::parse(line).unwrap().unwrap();
//!     mgr.execute(&instruction).unwrap();
//! }
//! let committed = mgr.transaction("T1").unwrap();
//! assert!(matches!(
//!     mgr.dump().values().next().map(|vals| vals[&rubidiumdb::site::VarId(2)]),
//!     Some(42)
//! ));
//! assert_eq!(committed.state(), rubidiumdb::txn::TxnState::Committed);
//! ```

mod deadlock;
mod error;
mod lock;
mod manager;
mod transaction;

pub use deadlock::{youngest_member, WaitForGraph};
pub use error::TxnError;
pub use lock::{LockGrant, LockMode, LockState, LockTable};
pub use manager::{DumpSnapshot, Event, TransactionManager};
pub use transaction::{AbortReason, Transaction, TxnId, TxnKind, TxnState};
