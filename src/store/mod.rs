//! Grant store seam: the queryable set of grant rows the engine reads and mutates.

mod sqlite;

pub use sqlite::SqliteGrantStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::authz::identity::MemberIdentity;
use crate::errors::PermissableResult;
use crate::models::permission::{IntoPermissions, PermissionSet};
use crate::models::{EntityId, EntityRef, Grant, NewGrant};

/// Composable filter over grants. Unset criteria match everything; a
/// criterion set to an empty list matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantQuery {
    pub member_type: Option<String>,
    pub member_ids: Option<Vec<EntityId>>,
    pub resources: Option<Vec<EntityRef>>,
    pub resource_types: Option<Vec<String>>,
    pub permissions: Option<PermissionSet>,
}

impl GrantQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_member(mut self, identity: &MemberIdentity) -> Self {
        self.member_type = Some(identity.member_type.clone());
        self.member_ids = Some(identity.member_ids.clone());
        self
    }

    pub fn for_resource(self, resource: &EntityRef) -> Self {
        self.for_resources(std::slice::from_ref(resource))
    }

    /// Matches grants on any of `resources`; ids and types pair up positionally.
    pub fn for_resources(mut self, resources: &[EntityRef]) -> Self {
        self.resources = Some(resources.to_vec());
        self
    }

    pub fn for_resource_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_permission_to(mut self, permissions: impl IntoPermissions) -> Self {
        self.permissions = Some(permissions.into_permissions());
        self
    }

    /// True when some criterion is an empty list, so no row can match.
    pub fn is_unsatisfiable(&self) -> bool {
        self.member_ids.as_ref().is_some_and(Vec::is_empty)
            || self.resources.as_ref().is_some_and(Vec::is_empty)
            || self.resource_types.as_ref().is_some_and(Vec::is_empty)
            || self.permissions.as_ref().is_some_and(PermissionSet::is_empty)
    }
}

#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn find(&self, query: &GrantQuery) -> PermissableResult<Vec<Grant>>;

    async fn exists(&self, query: &GrantQuery) -> PermissableResult<bool>;

    /// Inserts every grant in one transaction and returns the rows created.
    /// Rows that already exist with the same five-tuple are skipped.
    async fn insert_all(&self, grants: Vec<NewGrant>) -> PermissableResult<Vec<Grant>>;

    /// Rewrites the permission of every grant in `ids` in one transaction.
    async fn update_permission(&self, ids: &[Uuid], permission: &str) -> PermissableResult<u64>;

    async fn delete(&self, query: &GrantQuery) -> PermissableResult<u64>;

    async fn delete_for_member(&self, member: &EntityRef) -> PermissableResult<u64> {
        let identity = MemberIdentity::direct(member);
        self.delete(&GrantQuery::new().for_member(&identity)).await
    }

    async fn delete_for_resource(&self, resource: &EntityRef) -> PermissableResult<u64> {
        self.delete(&GrantQuery::new().for_resource(resource)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_criteria_are_unsatisfiable() {
        assert!(!GrantQuery::new().is_unsatisfiable());
        let nobody = MemberIdentity::new("User", Vec::<EntityId>::new());
        assert!(GrantQuery::new().for_member(&nobody).is_unsatisfiable());
        assert!(GrantQuery::new().for_resources(&[]).is_unsatisfiable());
        assert!(GrantQuery::new().with_permission_to(Vec::<String>::new()).is_unsatisfiable());
    }

    #[test]
    fn builder_sets_criteria() {
        let identity = MemberIdentity::direct(&EntityRef::new("User", "u1"));
        let query = GrantQuery::new()
            .for_member(&identity)
            .for_resource(&EntityRef::new("Document", "d1"))
            .with_permission_to("READ");

        assert_eq!(query.member_type.as_deref(), Some("User"));
        assert_eq!(query.resources.as_ref().map(Vec::len), Some(1));
        assert!(query.permissions.as_ref().is_some_and(|p| p.contains("read")));
    }
}
