pub mod entity;
pub mod grant;
pub mod permission;

pub use entity::{Entity, EntityId, EntityRef, ResourceTarget};
pub use grant::{DbGrant, Grant, NewGrant};
pub use permission::{normalize_permission, IntoPermissions, PermissionSet};
