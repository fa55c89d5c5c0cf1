//! Resource registration: which resource types are permissable and which
//! permission names each of them accepts.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::MemberConfig;
use crate::models::permission::normalize_permission;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRegistry {
    types: BTreeMap<String, BTreeSet<String>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every resource type declared by `members`; a type's accepted
    /// permissions are the union over all members that declare it.
    pub fn from_members<'a>(members: impl IntoIterator<Item = &'a MemberConfig>) -> Self {
        let mut registry = Self::new();
        for member in members {
            for resource_type in member.resource_types() {
                if let Some(methods) = member.permissable_methods(resource_type) {
                    registry.register(resource_type, methods);
                }
            }
        }
        registry
    }

    pub fn register<I, S>(&mut self, resource_type: &str, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.types
            .entry(resource_type.to_string())
            .or_default()
            .extend(permissions.into_iter().map(|p| normalize_permission(p.as_ref())));
    }

    pub fn is_permissable(&self, resource_type: &str) -> bool {
        self.types.contains_key(resource_type)
    }

    pub fn permissable_methods(&self, resource_type: &str) -> Option<&BTreeSet<String>> {
        self.types.get(resource_type)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
