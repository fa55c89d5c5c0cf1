use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a member or resource as stored in the grant table.
///
/// Hosts key their records with integers, uuids or opaque strings; all of
/// them are stored as text so one table can hold every kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for EntityId {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// A concrete member or resource: its id plus the type tag it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub type_name: String,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(type_name: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// Host records that can take part in grants, either as member or resource.
pub trait Entity {
    fn entity_ref(&self) -> EntityRef;
}

impl Entity for EntityRef {
    fn entity_ref(&self) -> EntityRef {
        self.clone()
    }
}

impl<T: Entity + ?Sized> Entity for &T {
    fn entity_ref(&self) -> EntityRef {
        (**self).entity_ref()
    }
}

/// What a grant or listing call is aimed at: one resource, or a whole
/// resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceTarget {
    Instance(EntityRef),
    Type(String),
}

impl ResourceTarget {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self::Type(type_name.into())
    }

    pub fn type_name(&self) -> &str {
        match self {
            ResourceTarget::Instance(resource) => &resource.type_name,
            ResourceTarget::Type(type_name) => type_name,
        }
    }

    pub fn instance(&self) -> Option<&EntityRef> {
        match self {
            ResourceTarget::Instance(resource) => Some(resource),
            ResourceTarget::Type(_) => None,
        }
    }
}

impl From<EntityRef> for ResourceTarget {
    fn from(value: EntityRef) -> Self {
        Self::Instance(value)
    }
}

impl From<&EntityRef> for ResourceTarget {
    fn from(value: &EntityRef) -> Self {
        Self::Instance(value.clone())
    }
}

impl fmt::Display for ResourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceTarget::Instance(resource) => resource.fmt(f),
            ResourceTarget::Type(type_name) => write!(f, "{type_name}:*"),
        }
    }
}
