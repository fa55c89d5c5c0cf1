pub mod app;
pub mod authz;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod resource;
pub mod store;
pub mod utils;

// Re-export commonly used items for hosts and tests
pub use app::{Permissable, PermissableBuilder};
pub use authz::{
    Association, AssociationResolver, AuthorizationContext, CheckRequest, Decision, MemberIdentity, PermissionCache,
    PermissionChain, PermissionOverride,
};
pub use config::{GrantMode, MemberConfig, PermissableConfig, PermissionOptions, Settings};
pub use errors::{PermissableError, PermissableResult};
pub use models::{Entity, EntityId, EntityRef, Grant, IntoPermissions, NewGrant, PermissionSet, ResourceTarget};
pub use resource::ResourceRegistry;
pub use store::{GrantQuery, GrantStore, SqliteGrantStore};
