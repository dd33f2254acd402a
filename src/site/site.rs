// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! One storage site: availability state and committed version histories.

use std::collections::BTreeMap;

use crate::time::Tick;

use super::error::SiteError;
use super::replication::{ReplicationMap, SiteId, Value, VarId};

/// One committed version of a variable at a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Tick at which this value was committed.
    pub tick: Tick,
    /// The committed value.
    pub value: Value,
}

/// One stored copy of a variable: its version history plus the flag that
/// gates reads after a recovery.
#[derive(Debug, Clone)]
struct VarCopy {
    readable: bool,
    versions: Vec<Version>,
}

/// A storage site.
///
/// A site starts up, holding the initial version of every variable it
/// stores. Failure and recovery flip the availability flag and are recorded
/// by tick so commit validation can tell whether a site stayed up across a
/// transaction's lifetime. The version histories themselves survive failure:
/// a down site is unusable, not erased.
#[derive(Debug, Clone)]
pub struct Site {
    id: SiteId,
    up: bool,
    last_fail: Option<Tick>,
    last_recover: Option<Tick>,
    variables: BTreeMap<VarId, VarCopy>,
}

impl Site {
    /// Creates a site storing the given variables, each committed with its
    /// initial value at [`Tick::ZERO`].
    pub fn new(id: SiteId, initial: impl IntoIterator<Item = (VarId, Value)>) -> Self {
        let variables = initial
            .into_iter()
            .map(|(var, value)| {
                let copy = VarCopy {
                    readable: true,
                    versions: vec![Version {
                        tick: Tick::ZERO,
                        value,
                    }],
                };
                (var, copy)
            })
            .collect();
        Self {
            id,
            up: true,
            last_fail: None,
            last_recover: None,
            variables,
        }
    }

    /// Returns this site's id.
    #[inline]
    pub fn id(&self) -> SiteId {
        self.id
    }

    /// Returns true if the site is currently up.
    #[inline]
    pub fn is_up(&self) -> bool {
        self.up
    }

    /// Returns the tick of the most recent failure, if any.
    #[inline]
    pub fn last_fail(&self) -> Option<Tick> {
        self.last_fail
    }

    /// Returns the tick of the most recent recovery, if any.
    #[inline]
    pub fn last_recover(&self) -> Option<Tick> {
        self.last_recover
    }

    /// Takes the site down at `tick`.
    ///
    /// Committed state is retained; the site simply stops serving until it
    /// recovers.
    pub fn fail(&mut self, tick: Tick) -> Result<(), SiteError> {
        if !self.up {
            return Err(SiteError::AlreadyDown(self.id));
        }
        self.up = false;
        self.last_fail = Some(tick);
        Ok(())
    }

    /// Brings the site back up at `tick`.
    ///
    /// Replicated variables become unreadable here until a fresh commit
    /// writes them: their newest value may live at another site. A variable
    /// stored only at this site has no fresher copy elsewhere, so it is
    /// readable immediately.
    pub fn recover(&mut self, tick: Tick, replication: &ReplicationMap) -> Result<(), SiteError> {
        if self.up {
            return Err(SiteError::AlreadyUp(self.id));
        }
        self.up = true;
        self.last_recover = Some(tick);
        for (&var, copy) in &mut self.variables {
            copy.readable = !replication.is_replicated(var);
        }
        Ok(())
    }

    /// Installs a committed value for `var`, stamped with the commit tick,
    /// and makes the copy readable again.
    pub fn commit_write(&mut self, var: VarId, value: Value, tick: Tick) {
        if let Some(copy) = self.variables.get_mut(&var) {
            copy.versions.push(Version { tick, value });
            copy.readable = true;
        }
    }

    /// Returns true if a locked read may be served from this copy.
    #[inline]
    pub fn is_readable(&self, var: VarId) -> bool {
        self.up && self.variables.get(&var).is_some_and(|c| c.readable)
    }

    /// Returns the newest committed value of `var` if the site is up and the
    /// copy is readable.
    pub fn readable_value(&self, var: VarId) -> Option<Value> {
        if !self.up {
            return None;
        }
        let copy = self.variables.get(&var)?;
        if !copy.readable {
            return None;
        }
        copy.versions.last().map(|v| v.value)
    }

    /// Returns the newest version of `var` committed at or before `at`,
    /// regardless of availability.
    pub fn version_at(&self, var: VarId, at: Tick) -> Option<&Version> {
        let copy = self.variables.get(&var)?;
        copy.versions.iter().rev().find(|v| v.tick <= at)
    }

    /// Iterates over the newest committed value of every stored variable.
    pub fn committed_values(&self) -> impl Iterator<Item = (VarId, Value)> + '_ {
        self.variables
            .iter()
            .filter_map(|(&var, copy)| copy.versions.last().map(|v| (var, v.value)))
    }
}
