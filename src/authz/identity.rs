use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::MemberConfig;
use crate::errors::{PermissableError, PermissableResult};
use crate::models::{EntityId, EntityRef, Grant};

/// Who actually holds grants for a member within one resource scope.
///
/// For a member with no association in that scope this is the member itself;
/// otherwise it is the associated entities (e.g. the user's roles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberIdentity {
    pub member_ids: Vec<EntityId>,
    pub member_type: String,
}

impl MemberIdentity {
    pub fn direct(member: &EntityRef) -> Self {
        Self {
            member_ids: vec![member.id.clone()],
            member_type: member.type_name.clone(),
        }
    }

    pub fn new(member_type: impl Into<String>, member_ids: impl IntoIterator<Item = EntityId>) -> Self {
        let mut ids: Vec<EntityId> = Vec::new();
        for id in member_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Self {
            member_ids: ids,
            member_type: member_type.into(),
        }
    }

    /// An identity with no ids holds nothing and is granted nothing.
    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    pub fn holds(&self, grant: &Grant) -> bool {
        grant.member_type == self.member_type && self.member_ids.contains(&grant.member_id)
    }

    pub fn members(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.member_ids
            .iter()
            .map(|id| EntityRef::new(self.member_type.clone(), id.clone()))
    }
}

/// Result of following an association from a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Association {
    One(EntityRef),
    Many(Vec<EntityRef>),
}

impl Association {
    pub fn into_refs(self) -> Vec<EntityRef> {
        match self {
            Association::One(entity) => vec![entity],
            Association::Many(entities) => entities,
        }
    }
}

/// Host-provided accessor for a named association, e.g. a user's roles.
#[async_trait]
pub trait AssociationResolver: Send + Sync {
    /// Type tag of the associated entities; grants are recorded under it.
    fn associated_type(&self) -> &str;

    async fn resolve(&self, member: &EntityRef) -> PermissableResult<Association>;
}

/// Association resolvers of one member type, keyed by association name.
pub type AssociationTable = HashMap<String, Arc<dyn AssociationResolver>>;

/// Computes and memoizes a member's identity per resource scope.
///
/// The first resolution of a scope is kept for the lifetime of the resolver;
/// later changes to the association are not observed.
pub struct IdentityResolver {
    member: EntityRef,
    config: Arc<MemberConfig>,
    associations: Arc<AssociationTable>,
    resolved: HashMap<String, MemberIdentity>,
}

impl IdentityResolver {
    pub fn new(member: EntityRef, config: Arc<MemberConfig>, associations: Arc<AssociationTable>) -> Self {
        Self {
            member,
            config,
            associations,
            resolved: HashMap::new(),
        }
    }

    pub fn member(&self) -> &EntityRef {
        &self.member
    }

    pub fn is_resolved(&self, scope: &str) -> bool {
        self.resolved.contains_key(scope)
    }

    pub async fn resolve(&mut self, scope: &str) -> PermissableResult<MemberIdentity> {
        if let Some(identity) = self.resolved.get(scope) {
            return Ok(identity.clone());
        }

        let identity = match self.config.association_for(scope) {
            None => MemberIdentity::direct(&self.member),
            Some(name) => self.resolve_through(scope, name).await?,
        };

        tracing::debug!(
            member = %self.member,
            scope = %scope,
            member_type = %identity.member_type,
            holders = identity.member_ids.len(),
            "resolved member identity"
        );

        self.resolved.insert(scope.to_string(), identity.clone());
        Ok(identity)
    }

    async fn resolve_through(&self, scope: &str, name: &str) -> PermissableResult<MemberIdentity> {
        let resolver = self.associations.get(name).ok_or_else(|| {
            PermissableError::configuration(format!(
                "{} has no association `{}` (used for {})",
                self.member.type_name, name, scope
            ))
        })?;

        let associated_type = resolver.associated_type().to_string();
        let mut ids = Vec::new();
        for entity in resolver.resolve(&self.member).await?.into_refs() {
            if entity.type_name != associated_type {
                tracing::warn!(
                    member = %self.member,
                    association = %name,
                    entity = %entity,
                    expected = %associated_type,
                    "skipping associated entity of unexpected type"
                );
                continue;
            }
            ids.push(entity.id);
        }

        Ok(MemberIdentity::new(associated_type, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermissionOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Roles {
        roles: Vec<EntityRef>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssociationResolver for Roles {
        fn associated_type(&self) -> &str {
            "Role"
        }

        async fn resolve(&self, _member: &EntityRef) -> PermissableResult<Association> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Association::Many(self.roles.clone()))
        }
    }

    fn user_config() -> Arc<MemberConfig> {
        Arc::new(
            MemberConfig::builder("User")
                .has_permissions_for(["Document"], PermissionOptions::to(["read"]))
                .has_permissions_for(["Post"], PermissionOptions::to(["read"]).through("roles"))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn member_without_association_resolves_to_itself() {
        let user = EntityRef::new("User", "u1");
        let mut resolver = IdentityResolver::new(user.clone(), user_config(), Arc::new(AssociationTable::new()));

        let identity = resolver.resolve("Document").await.unwrap();
        assert_eq!(identity, MemberIdentity::direct(&user));
    }

    #[tokio::test]
    async fn association_yields_every_role_and_is_memoized() {
        let roles = Arc::new(Roles {
            roles: vec![EntityRef::new("Role", "r1"), EntityRef::new("Role", "r2"), EntityRef::new("Role", "r1")],
            calls: AtomicUsize::new(0),
        });
        let mut table = AssociationTable::new();
        table.insert("roles".to_string(), roles.clone() as Arc<dyn AssociationResolver>);

        let mut resolver = IdentityResolver::new(EntityRef::new("User", "u1"), user_config(), Arc::new(table));

        let identity = resolver.resolve("Post").await.unwrap();
        assert_eq!(identity.member_type, "Role");
        assert_eq!(identity.member_ids, vec![EntityId::from("r1"), EntityId::from("r2")]);

        resolver.resolve("Post").await.unwrap();
        assert_eq!(roles.calls.load(Ordering::SeqCst), 1);
        assert!(resolver.is_resolved("Post"));
    }

    #[tokio::test]
    async fn missing_association_is_a_configuration_error() {
        let mut resolver = IdentityResolver::new(
            EntityRef::new("User", "u1"),
            user_config(),
            Arc::new(AssociationTable::new()),
        );

        let err = resolver.resolve("Post").await.unwrap_err();
        assert!(matches!(err, PermissableError::Configuration(_)));
    }

    #[test]
    fn identity_holds_only_its_own_grants() {
        let identity = MemberIdentity::new("Role", [EntityId::from("r1")]);
        let grant = Grant {
            id: uuid::Uuid::new_v4(),
            member_id: "r1".into(),
            member_type: "Role".into(),
            resource_id: "p1".into(),
            resource_type: "Post".into(),
            permission_name: "read".into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert!(identity.holds(&grant));

        let other = MemberIdentity::new("User", [EntityId::from("r1")]);
        assert!(!other.holds(&grant));
    }
}
