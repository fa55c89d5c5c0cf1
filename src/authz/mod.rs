//! Authorization engine.
//!
//! A check runs in this order:
//! 1. the member type's override hook, if configured, may allow outright
//! 2. the requested permissions are widened through the permission chain
//! 3. the member's identity for the resource's type is resolved, directly
//!    or through an association such as roles
//! 4. grants are looked up in the pre-loaded cache, or the store
//! 5. no matching grant means deny

pub mod cache;
pub mod chain;
pub mod context;
pub mod evaluator;
pub mod identity;

pub use cache::PermissionCache;
pub use chain::{expand, PermissionChain};
pub use context::AuthorizationContext;
pub use evaluator::{CheckRequest, Decision, PermissionOverride};
pub use identity::{Association, AssociationResolver, AssociationTable, IdentityResolver, MemberIdentity};
