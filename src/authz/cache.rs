use crate::authz::identity::MemberIdentity;
use crate::models::permission::IntoPermissions;
use crate::models::{EntityRef, Grant};

/// In-memory, filterable snapshot of grants fetched once from the store.
///
/// Filters narrow a transient view and can be chained in any order.
/// `all` and `exists` end the chain and reset the view to the full batch,
/// so the same cache serves many independent queries. The batch itself is
/// never modified.
#[derive(Debug, Clone, Default)]
pub struct PermissionCache {
    batch: Vec<Grant>,
    view: Option<Vec<usize>>,
}

impl PermissionCache {
    pub fn new(batch: Vec<Grant>) -> Self {
        Self { batch, view: None }
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn for_member(&mut self, identity: &MemberIdentity) -> &mut Self {
        self.narrow(|grant| identity.holds(grant))
    }

    pub fn for_resource(&mut self, resource: &EntityRef) -> &mut Self {
        self.narrow(|grant| grant.is_for_resource(resource))
    }

    /// Keeps grants on any of `resources`, pairing each id with its own type.
    pub fn for_resources(&mut self, resources: &[EntityRef]) -> &mut Self {
        let ids: Vec<_> = resources.iter().map(|r| &r.id).collect();
        let types: Vec<_> = resources.iter().map(|r| r.type_name.as_str()).collect();
        self.narrow(|grant| {
            ids.iter()
                .zip(types.iter())
                .any(|(id, type_name)| **id == grant.resource_id && *type_name == grant.resource_type)
        })
    }

    pub fn with_permission_to(&mut self, permissions: impl IntoPermissions) -> &mut Self {
        let permissions = permissions.into_permissions();
        self.narrow(|grant| permissions.contains(&grant.permission_name.to_lowercase()))
    }

    pub fn all(&mut self) -> Vec<Grant> {
        match self.view.take() {
            Some(view) => view.into_iter().map(|idx| self.batch[idx].clone()).collect(),
            None => self.batch.clone(),
        }
    }

    pub fn exists(&mut self) -> bool {
        match self.view.take() {
            Some(view) => !view.is_empty(),
            None => !self.batch.is_empty(),
        }
    }

    fn narrow(&mut self, keep: impl Fn(&Grant) -> bool) -> &mut Self {
        let current = match self.view.take() {
            Some(view) => view,
            None => (0..self.batch.len()).collect(),
        };
        self.view = Some(current.into_iter().filter(|idx| keep(&self.batch[*idx])).collect());
        self
    }
}
