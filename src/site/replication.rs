// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Identifiers and the static data distribution rule.

use std::fmt;

/// Number of sites in the default roster.
pub const DEFAULT_SITE_COUNT: u16 = 10;

/// Number of variables in the default roster.
pub const DEFAULT_VARIABLE_COUNT: u16 = 20;

/// Identifies one storage site. Site ids run from 1 to the roster size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiteId(pub u16);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site {}", self.0)
    }
}

/// Identifies one variable. Variable ids run from 1 to the roster size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u16);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// The value of a variable.
pub type Value = i64;

/// The static rule mapping each variable to the sites that store it.
///
/// Even-numbered variables are replicated at every site. Odd-numbered
/// variables live at exactly one site, derived from the variable id. The rule
/// never changes at runtime; site failure makes a copy unavailable, not
/// unassigned.
#[derive(Debug, Clone)]
pub struct ReplicationMap {
    site_count: u16,
    variable_count: u16,
}

impl ReplicationMap {
    /// Creates a map over a roster of `site_count` sites and
    /// `variable_count` variables.
    pub fn new(site_count: u16, variable_count: u16) -> Self {
        debug_assert!(site_count > 0 && variable_count > 0);
        Self {
            site_count,
            variable_count,
        }
    }

    /// Returns true if `var` is part of the roster.
    #[inline]
    pub fn contains(&self, var: VarId) -> bool {
        var.0 >= 1 && var.0 <= self.variable_count
    }

    /// Returns true if `site` is part of the roster.
    #[inline]
    pub fn contains_site(&self, site: SiteId) -> bool {
        site.0 >= 1 && site.0 <= self.site_count
    }

    /// Returns true if `var` is stored at every site.
    #[inline]
    pub fn is_replicated(&self, var: VarId) -> bool {
        var.0 % 2 == 0
    }

    /// Returns the single site storing an unreplicated variable.
    #[inline]
    pub fn home_site(&self, var: VarId) -> SiteId {
        SiteId(1 + var.0 % self.site_count)
    }

    /// Returns the sites storing `var`, in ascending site order.
    pub fn sites_for(&self, var: VarId) -> Vec<SiteId> {
        if self.is_replicated(var) {
            self.site_ids().collect()
        } else {
            vec![self.home_site(var)]
        }
    }

    /// Returns the variables stored at `site`, in ascending variable order.
    pub fn variables_at(&self, site: SiteId) -> Vec<VarId> {
        self.var_ids()
            .filter(|&v| self.is_replicated(v) || self.home_site(v) == site)
            .collect()
    }

    /// Iterates over every site id in the roster.
    pub fn site_ids(&self) -> impl Iterator<Item = SiteId> {
        (1..=self.site_count).map(SiteId)
    }

    /// Iterates over every variable id in the roster.
    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (1..=self.variable_count).map(VarId)
    }

    /// Returns the value every copy of `var` holds at creation.
    #[inline]
    pub fn initial_value(&self, var: VarId) -> Value {
        10 * Value::from(var.0)
    }
}

impl Default for ReplicationMap {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_COUNT, DEFAULT_VARIABLE_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_variables_live_at_one_site() {
        let map = ReplicationMap::default();
        assert_eq!(map.sites_for(VarId(1)), vec![SiteId(2)]);
        assert_eq!(map.sites_for(VarId(9)), vec![SiteId(10)]);
        assert_eq!(map.sites_for(VarId(11)), vec![SiteId(2)]);
        assert!(!map.is_replicated(VarId(3)));
    }

    #[test]
    fn test_even_variables_live_everywhere() {
        let map = ReplicationMap::default();
        let sites = map.sites_for(VarId(8));
        assert_eq!(sites.len(), 10);
        assert_eq!(sites[0], SiteId(1));
        assert_eq!(sites[9], SiteId(10));
        assert!(map.is_replicated(VarId(8)));
    }

    #[test]
    fn test_variables_at_site() {
        let map = ReplicationMap::default();
        let at_two = map.variables_at(SiteId(2));
        // All ten even variables plus x1 and x11.
        assert_eq!(at_two.len(), 12);
        assert!(at_two.contains(&VarId(1)));
        assert!(at_two.contains(&VarId(11)));
        assert!(at_two.contains(&VarId(20)));
        assert!(!at_two.contains(&VarId(3)));
    }

    #[test]
    fn test_roster_bounds() {
        let map = ReplicationMap::default();
        assert!(map.contains(VarId(1)));
        assert!(map.contains(VarId(20)));
        assert!(!map.contains(VarId(0)));
        assert!(!map.contains(VarId(21)));
        assert!(map.contains_site(SiteId(10)));
        assert!(!map.contains_site(SiteId(11)));
    }

    #[test]
    fn test_initial_values() {
        let map = ReplicationMap::default();
        assert_eq!(map.initial_value(VarId(1)), 10);
        assert_eq!(map.initial_value(VarId(20)), 200);
    }

    #[test]
    fn test_small_roster() {
        let map = ReplicationMap::new(3, 4);
        assert_eq!(map.sites_for(VarId(1)), vec![SiteId(2)]);
        assert_eq!(map.sites_for(VarId(3)), vec![SiteId(1)]);
        assert_eq!(map.sites_for(VarId(2)).len(), 3);
    }
}
