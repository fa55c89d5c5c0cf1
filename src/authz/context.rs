use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::app::MemberRegistration;
use crate::authz::cache::PermissionCache;
use crate::authz::evaluator::{CheckRequest, Decision};
use crate::authz::identity::{IdentityResolver, MemberIdentity};
use crate::config::{GrantMode, MemberConfig};
use crate::errors::{PermissableError, PermissableResult};
use crate::models::permission::{IntoPermissions, PermissionSet};
use crate::models::{EntityRef, Grant, NewGrant, ResourceTarget};
use crate::store::{GrantQuery, GrantStore};

/// Authorization session bound to one member.
///
/// Holds the per-member state: resolved identities per resource scope and,
/// once [`load_permissions`](Self::load_permissions) has run, a snapshot of
/// the member's grants. Neither is refreshed automatically. After grants
/// change, call `load_permissions` again if checks must observe the change.
pub struct AuthorizationContext<S> {
    store: Arc<S>,
    registration: Arc<MemberRegistration>,
    identities: IdentityResolver,
    cache: Option<PermissionCache>,
    cached_types: BTreeSet<String>,
}

impl<S: GrantStore> AuthorizationContext<S> {
    pub(crate) fn new(store: Arc<S>, registration: Arc<MemberRegistration>, member: EntityRef) -> Self {
        let identities = IdentityResolver::new(
            member,
            registration.config.clone(),
            registration.associations.clone(),
        );
        Self {
            store,
            registration,
            identities,
            cache: None,
            cached_types: BTreeSet::new(),
        }
    }

    pub fn member(&self) -> &EntityRef {
        self.identities.member()
    }

    pub fn config(&self) -> &MemberConfig {
        &self.registration.config
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn cache(&self) -> Option<&PermissionCache> {
        self.cache.as_ref()
    }

    /// Grant holders for this member on `resource_type`.
    pub async fn identity_for(&mut self, resource_type: &str) -> PermissableResult<MemberIdentity> {
        self.ensure_permissable(resource_type)?;
        self.identities.resolve(resource_type).await
    }

    /// May this member perform any of `permissions` on `resource`?
    /// The member's permission chain is applied.
    pub async fn can(&mut self, permissions: impl IntoPermissions, resource: &EntityRef) -> PermissableResult<bool> {
        self.can_with_chain(permissions, resource, true).await
    }

    pub async fn can_with_chain(
        &mut self,
        permissions: impl IntoPermissions,
        resource: &EntityRef,
        use_chain: bool,
    ) -> PermissableResult<bool> {
        Ok(self.check(permissions, resource, use_chain).await?.is_allowed())
    }

    pub async fn cannot(&mut self, permissions: impl IntoPermissions, resource: &EntityRef) -> PermissableResult<bool> {
        Ok(!self.can(permissions, resource).await?)
    }

    /// Evaluates a check: override hook, then chain expansion, then grant lookup.
    pub async fn check(
        &mut self,
        permissions: impl IntoPermissions,
        resource: &EntityRef,
        use_chain: bool,
    ) -> PermissableResult<Decision> {
        let requested = permissions.into_permissions();

        if let Some(hook) = self.registration.override_hook.clone() {
            let target = ResourceTarget::from(resource);
            let request = CheckRequest {
                member: self.identities.member(),
                permissions: &requested,
                resource: &target,
            };
            if hook.allows(&request).await {
                tracing::debug!(
                    member = %self.member(),
                    resource = %resource,
                    permissions = ?requested,
                    "override hook allowed"
                );
                return Ok(Decision::Override);
            }
        }

        self.ensure_permissable(&resource.type_name)?;

        if requested.is_empty() {
            return Ok(Decision::Denied);
        }

        let wanted = if use_chain {
            self.registration.config.permission_chain().expand(&requested)
        } else {
            requested
        };

        let identity = self.identities.resolve(&resource.type_name).await?;
        let found = if identity.is_empty() {
            false
        } else {
            match self.cached_view(&resource.type_name) {
                Some(cache) => cache
                    .for_member(&identity)
                    .for_resource(resource)
                    .with_permission_to(&wanted)
                    .exists(),
                None => {
                    let query = GrantQuery::new()
                        .for_member(&identity)
                        .for_resource(resource)
                        .with_permission_to(&wanted);
                    self.store.exists(&query).await?
                }
            }
        };

        let decision = if found { Decision::Granted } else { Decision::Denied };
        tracing::debug!(
            member = %self.member(),
            resource = %resource,
            permissions = ?wanted,
            cached = self.cached_types.contains(&resource.type_name),
            decision = decision.as_str(),
            "permission check"
        );
        Ok(decision)
    }

    /// Grants every permission on every resource instance to the member's
    /// resolved identity and returns the grants created.
    ///
    /// Existing grants are detected against one batch fetched up front; new
    /// rows are inserted in a single transaction. Under [`GrantMode::Replace`]
    /// an existing grant for the same member and resource has its permission
    /// rewritten instead. Type references in `resources` are skipped.
    pub async fn grant(
        &mut self,
        permissions: impl IntoPermissions,
        resources: &[ResourceTarget],
    ) -> PermissableResult<Vec<Grant>> {
        let permissions = permissions.into_permissions();
        if permissions.is_empty() {
            return Ok(Vec::new());
        }

        let mode = self.registration.config.grant_mode();
        if mode == GrantMode::Replace && permissions.len() > 1 {
            return Err(PermissableError::configuration(format!(
                "{} grants in replace mode take exactly one permission, got {}",
                self.member().type_name,
                permissions.len()
            )));
        }

        let by_type = self.instances_by_type(resources)?;
        for resource_type in by_type.keys() {
            for permission in &permissions {
                self.ensure_accepts(resource_type, permission)?;
            }
        }

        let mut inserts: Vec<NewGrant> = Vec::new();
        let mut seen: HashSet<NewGrant> = HashSet::new();
        let mut updates: BTreeMap<String, Vec<Uuid>> = BTreeMap::new();

        for (resource_type, instances) in &by_type {
            let identity = self.identities.resolve(resource_type).await?;
            if identity.is_empty() {
                tracing::debug!(member = %self.member(), resource_type = %resource_type, "no grant holders, nothing to grant");
                continue;
            }

            let existing = self
                .store
                .find(&GrantQuery::new().for_member(&identity).for_resources(instances))
                .await?;
            let mut batch = PermissionCache::new(existing);

            for resource in instances {
                for holder in identity.members() {
                    let holder_identity = MemberIdentity::direct(&holder);
                    match mode {
                        GrantMode::Accumulate => {
                            for permission in &permissions {
                                let present = batch
                                    .for_member(&holder_identity)
                                    .for_resource(resource)
                                    .with_permission_to(permission.as_str())
                                    .exists();
                                let new_grant = NewGrant::new(holder.clone(), resource.clone(), permission);
                                if !present && seen.insert(new_grant.clone()) {
                                    inserts.push(new_grant);
                                }
                            }
                        }
                        GrantMode::Replace => {
                            let Some(permission) = permissions.iter().next() else {
                                continue;
                            };
                            let current = batch.for_member(&holder_identity).for_resource(resource).all();
                            if current.iter().any(|g| &g.permission_name == permission) {
                                continue;
                            }
                            match current.first() {
                                Some(grant) => updates.entry(permission.clone()).or_default().push(grant.id),
                                None => {
                                    let new_grant = NewGrant::new(holder.clone(), resource.clone(), permission);
                                    if seen.insert(new_grant.clone()) {
                                        inserts.push(new_grant);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let created = self.store.insert_all(inserts).await?;
        let mut updated = 0;
        for (permission, ids) in &updates {
            updated += self.store.update_permission(ids, permission).await?;
        }

        tracing::info!(
            member = %self.member(),
            permissions = ?permissions,
            created = created.len(),
            updated,
            "granted permissions"
        );
        Ok(created)
    }

    /// Removes the member's grants for `permissions` on each resource instance.
    pub async fn revoke(
        &mut self,
        permissions: impl IntoPermissions,
        resources: &[ResourceTarget],
    ) -> PermissableResult<u64> {
        let permissions = permissions.into_permissions();
        if permissions.is_empty() {
            return Ok(0);
        }

        let by_type = self.instances_by_type(resources)?;
        let mut removed = 0;
        for (resource_type, instances) in &by_type {
            let identity = self.identities.resolve(resource_type).await?;
            let query = GrantQuery::new()
                .for_member(&identity)
                .for_resources(instances)
                .with_permission_to(&permissions);
            removed += self.store.delete(&query).await?;
        }

        tracing::info!(
            member = %self.member(),
            permissions = ?permissions,
            removed,
            "revoked permissions"
        );
        Ok(removed)
    }

    /// Permissions the member holds on a resource instance, or for a type
    /// reference, the permissions it is configured to hold on that type.
    pub async fn permissions_for(&mut self, resource: &ResourceTarget) -> PermissableResult<PermissionSet> {
        let resource = match resource {
            ResourceTarget::Type(resource_type) => {
                return self
                    .registration
                    .config
                    .permissable_methods(resource_type)
                    .cloned()
                    .ok_or_else(|| PermissableError::unsupported_resource(resource_type.clone()));
            }
            ResourceTarget::Instance(resource) => resource,
        };

        self.ensure_permissable(&resource.type_name)?;
        let identity = self.identities.resolve(&resource.type_name).await?;

        let grants = match self.cached_view(&resource.type_name) {
            Some(cache) => cache.for_member(&identity).for_resource(resource).all(),
            None => {
                self.store
                    .find(&GrantQuery::new().for_member(&identity).for_resource(resource))
                    .await?
            }
        };

        Ok(grants.iter().map(|g| g.permission_name.to_lowercase()).collect())
    }

    pub async fn has_permissions_for(&mut self, resource: &ResourceTarget) -> PermissableResult<bool> {
        Ok(!self.permissions_for(resource).await?.is_empty())
    }

    /// Fetches the member's grants once (all configured resource types, or
    /// only `resource_types`) and answers later checks on those types from
    /// memory. Returns the number of grants loaded.
    pub async fn load_permissions(&mut self, resource_types: Option<&[&str]>) -> PermissableResult<usize> {
        let types: Vec<String> = match resource_types {
            Some(types) => types.iter().map(|t| t.to_string()).collect(),
            None => self.registration.config.resource_types().map(str::to_string).collect(),
        };

        let mut groups: Vec<(MemberIdentity, Vec<String>)> = Vec::new();
        for resource_type in &types {
            self.ensure_permissable(resource_type)?;
            let identity = self.identities.resolve(resource_type).await?;
            match groups.iter_mut().find(|(existing, _)| *existing == identity) {
                Some((_, scoped)) => scoped.push(resource_type.clone()),
                None => groups.push((identity, vec![resource_type.clone()])),
            }
        }

        let mut batch = Vec::new();
        for (identity, scoped) in &groups {
            let query = GrantQuery::new().for_member(identity).for_resource_types(scoped.iter().cloned());
            batch.extend(self.store.find(&query).await?);
        }

        let loaded = batch.len();
        self.cache = Some(PermissionCache::new(batch));
        self.cached_types = types.into_iter().collect();

        tracing::info!(
            member = %self.member(),
            grants = loaded,
            resource_types = ?self.cached_types,
            "loaded permissions cache"
        );
        Ok(loaded)
    }

    fn cached_view(&mut self, resource_type: &str) -> Option<&mut PermissionCache> {
        if self.cached_types.contains(resource_type) {
            self.cache.as_mut()
        } else {
            None
        }
    }

    fn ensure_permissable(&self, resource_type: &str) -> PermissableResult<()> {
        if self.registration.config.is_permissable(resource_type) {
            Ok(())
        } else {
            Err(PermissableError::unsupported_resource(format!(
                "{} has no permissions for {}",
                self.member().type_name,
                resource_type
            )))
        }
    }

    fn ensure_accepts(&self, resource_type: &str, permission: &str) -> PermissableResult<()> {
        let accepted = self
            .registration
            .config
            .permissable_methods(resource_type)
            .is_some_and(|methods| methods.contains(permission));
        if accepted {
            Ok(())
        } else {
            Err(PermissableError::permission_not_defined(resource_type, permission))
        }
    }

    /// Groups resource instances by type, skipping type references.
    fn instances_by_type(&self, resources: &[ResourceTarget]) -> PermissableResult<BTreeMap<String, Vec<EntityRef>>> {
        let mut by_type: BTreeMap<String, Vec<EntityRef>> = BTreeMap::new();
        for target in resources {
            match target {
                ResourceTarget::Type(resource_type) => {
                    tracing::warn!(
                        member = %self.member(),
                        resource_type = %resource_type,
                        "skipping resource type reference, grants need an instance"
                    );
                }
                ResourceTarget::Instance(resource) => {
                    self.ensure_permissable(&resource.type_name)?;
                    let instances = by_type.entry(resource.type_name.clone()).or_default();
                    if !instances.contains(resource) {
                        instances.push(resource.clone());
                    }
                }
            }
        }
        Ok(by_type)
    }
}
