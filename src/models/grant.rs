use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::PermissableError;
use crate::models::entity::{EntityId, EntityRef};
use crate::models::permission::normalize_permission;

/// One stored fact: member M (of type T) may perform a permission on resource R (of type U).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: Uuid,
    pub member_id: EntityId,
    pub member_type: String,
    pub resource_id: EntityId,
    pub resource_type: String,
    pub permission_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Grant {
    pub fn member(&self) -> EntityRef {
        EntityRef::new(self.member_type.clone(), self.member_id.clone())
    }

    pub fn resource(&self) -> EntityRef {
        EntityRef::new(self.resource_type.clone(), self.resource_id.clone())
    }

    pub fn is_for_resource(&self, resource: &EntityRef) -> bool {
        self.resource_id == resource.id && self.resource_type == resource.type_name
    }
}

/// Raw row shape of the `permissions` table.
#[derive(Debug, Clone)]
pub struct DbGrant {
    pub id: String,
    pub member_id: String,
    pub member_type: String,
    pub resource_id: String,
    pub resource_type: String,
    pub permission_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbGrant> for Grant {
    type Error = PermissableError;

    fn try_from(db: DbGrant) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&db.id)
            .map_err(|e| PermissableError::internal(format!("invalid grant id {}: {}", db.id, e)))?;

        Ok(Grant {
            id,
            member_id: EntityId::new(db.member_id),
            member_type: db.member_type,
            resource_id: EntityId::new(db.resource_id),
            resource_type: db.resource_type,
            permission_name: db.permission_name,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

/// A grant waiting to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewGrant {
    pub member: EntityRef,
    pub resource: EntityRef,
    pub permission_name: String,
}

impl NewGrant {
    pub fn new(member: EntityRef, resource: EntityRef, permission_name: impl AsRef<str>) -> Self {
        Self {
            member,
            resource,
            permission_name: normalize_permission(permission_name.as_ref()),
        }
    }
}
