use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::permission::{normalize_permission, PermissionSet};

/// Alias map letting one permission stand in for others during a check.
///
/// `{moderate: [read, write]}` means a holder of `moderate` also passes checks
/// for `read` and `write`. The reverse never holds: holding `read` does not
/// satisfy a check for `moderate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionChain(BTreeMap<String, BTreeSet<String>>);

impl PermissionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, alias: &str, implied: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert(alias, implied);
        self
    }

    /// Adds implied permissions to `alias`, merging with any already declared.
    pub fn insert<I, S>(&mut self, alias: &str, implied: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.0.entry(normalize_permission(alias)).or_default();
        entry.extend(
            implied
                .into_iter()
                .map(|name| normalize_permission(name.as_ref()))
                .filter(|name| !name.is_empty()),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }

    pub fn implied_by(&self, alias: &str) -> Option<&BTreeSet<String>> {
        self.0.get(alias)
    }

    pub fn expand(&self, requested: &PermissionSet) -> PermissionSet {
        expand(requested, self)
    }
}

/// Widens `requested` with every alias whose implied set contains one of
/// the requested names. The result is always a superset of `requested`.
pub fn expand(requested: &PermissionSet, chain: &PermissionChain) -> PermissionSet {
    let mut expanded = requested.clone();
    if chain.is_empty() {
        return expanded;
    }

    for permission in requested {
        for (alias, implied) in chain.aliases() {
            if implied.contains(permission) {
                expanded.insert(alias.clone());
            }
        }
    }

    expanded
}
