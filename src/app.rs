use std::collections::HashMap;
use std::sync::Arc;

use crate::authz::context::AuthorizationContext;
use crate::authz::evaluator::PermissionOverride;
use crate::authz::identity::{AssociationResolver, AssociationTable};
use crate::config::{MemberConfig, PermissableConfig};
use crate::errors::{PermissableError, PermissableResult};
use crate::models::{Entity, EntityRef, Grant};
use crate::resource::ResourceRegistry;
use crate::store::{GrantQuery, GrantStore};

/// Everything the engine knows about one member type.
pub struct MemberRegistration {
    pub config: Arc<MemberConfig>,
    pub associations: Arc<AssociationTable>,
    pub override_hook: Option<Arc<dyn PermissionOverride>>,
}

/// Entry point: the grant store plus the registered member and resource types.
pub struct Permissable<S> {
    store: Arc<S>,
    members: HashMap<String, Arc<MemberRegistration>>,
    resources: Arc<ResourceRegistry>,
}

impl<S: GrantStore> Permissable<S> {
    pub fn builder(store: S) -> PermissableBuilder<S> {
        PermissableBuilder {
            store,
            configs: Vec::new(),
            associations: HashMap::new(),
            hooks: HashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn member_config(&self, member_type: &str) -> Option<&MemberConfig> {
        self.members.get(member_type).map(|r| r.config.as_ref())
    }

    /// Opens an authorization session for `member`.
    pub fn member(&self, member: impl Entity) -> PermissableResult<AuthorizationContext<S>> {
        let member = member.entity_ref();
        let registration = self.members.get(&member.type_name).ok_or_else(|| {
            PermissableError::configuration(format!("{} is not a registered member type", member.type_name))
        })?;
        Ok(AuthorizationContext::new(self.store.clone(), registration.clone(), member))
    }

    /// All grants recorded on `resource`, whoever holds them.
    pub async fn grants_on(&self, resource: &EntityRef) -> PermissableResult<Vec<Grant>> {
        if !self.resources.is_permissable(&resource.type_name) {
            return Err(PermissableError::unsupported_resource(resource.type_name.clone()));
        }
        self.store.find(&GrantQuery::new().for_resource(resource)).await
    }

    /// Removes the grants owned by a deleted member.
    pub async fn member_deleted(&self, member: &EntityRef) -> PermissableResult<u64> {
        let removed = self.store.delete_for_member(member).await?;
        tracing::info!(member = %member, removed, "removed grants of deleted member");
        Ok(removed)
    }

    /// Removes the grants on a deleted resource.
    pub async fn resource_deleted(&self, resource: &EntityRef) -> PermissableResult<u64> {
        let removed = self.store.delete_for_resource(resource).await?;
        tracing::info!(resource = %resource, removed, "removed grants on deleted resource");
        Ok(removed)
    }
}

pub struct PermissableBuilder<S> {
    store: S,
    configs: Vec<MemberConfig>,
    associations: HashMap<(String, String), Arc<dyn AssociationResolver>>,
    hooks: HashMap<(String, String), Arc<dyn PermissionOverride>>,
}

impl<S: GrantStore> PermissableBuilder<S> {
    pub fn member(mut self, config: MemberConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn config(mut self, config: &PermissableConfig) -> PermissableResult<Self> {
        self.configs.extend(config.member_configs()?);
        Ok(self)
    }

    /// Registers the accessor behind a `through` association of `member_type`.
    pub fn association(
        mut self,
        member_type: &str,
        name: &str,
        resolver: impl AssociationResolver + 'static,
    ) -> Self {
        self.associations
            .insert((member_type.to_string(), name.to_string()), Arc::new(resolver));
        self
    }

    /// Registers the hook named by `allow_permission_with` for `member_type`.
    pub fn override_hook(mut self, member_type: &str, name: &str, hook: impl PermissionOverride + 'static) -> Self {
        self.hooks.insert((member_type.to_string(), name.to_string()), Arc::new(hook));
        self
    }

    pub fn build(mut self) -> PermissableResult<Permissable<S>> {
        let resources = ResourceRegistry::from_members(self.configs.iter());
        let mut members = HashMap::new();

        for config in self.configs {
            let member_type = config.member_type().to_string();
            if members.contains_key(&member_type) {
                return Err(PermissableError::configuration(format!(
                    "{member_type} is registered more than once"
                )));
            }

            let mut associations = AssociationTable::new();
            for name in config.associations() {
                let resolver = self
                    .associations
                    .remove(&(member_type.clone(), name.to_string()))
                    .ok_or_else(|| {
                        PermissableError::configuration(format!(
                            "{member_type} declares association `{name}` but no resolver is registered for it"
                        ))
                    })?;
                associations.insert(name.to_string(), resolver);
            }

            let override_hook = match config.allow_permission_with() {
                Some(name) => Some(
                    self.hooks
                        .remove(&(member_type.clone(), name.to_string()))
                        .ok_or_else(|| {
                            PermissableError::configuration(format!(
                                "{member_type} allows permission with `{name}` but no such hook is registered"
                            ))
                        })?,
                ),
                None => None,
            };

            tracing::debug!(
                member_type = %member_type,
                resource_types = ?config.resource_types().collect::<Vec<_>>(),
                associations = associations.len(),
                override_hook = override_hook.is_some(),
                "registered member type"
            );

            members.insert(
                member_type,
                Arc::new(MemberRegistration {
                    config: Arc::new(config),
                    associations: Arc::new(associations),
                    override_hook,
                }),
            );
        }

        if let Some((member_type, name)) = self.associations.keys().next() {
            return Err(PermissableError::configuration(format!(
                "resolver `{name}` registered for {member_type}, which declares no such association"
            )));
        }

        Ok(Permissable {
            store: Arc::new(self.store),
            members,
            resources: Arc::new(resources),
        })
    }
}
