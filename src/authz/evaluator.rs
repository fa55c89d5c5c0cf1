use async_trait::async_trait;

use crate::models::permission::PermissionSet;
use crate::models::{EntityRef, ResourceTarget};

/// A single permission check as seen by an override hook.
#[derive(Debug, Clone)]
pub struct CheckRequest<'a> {
    pub member: &'a EntityRef,
    /// Requested permissions, before chain expansion.
    pub permissions: &'a PermissionSet,
    pub resource: &'a ResourceTarget,
}

/// Host hook consulted before stored grants (`allow_permission_with`).
///
/// Returning `true` grants the check outright; returning `false` falls through
/// to the normal grant lookup, it never denies on its own.
#[async_trait]
pub trait PermissionOverride: Send + Sync {
    async fn allows(&self, request: &CheckRequest<'_>) -> bool;
}

/// How a check was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Override hook short-circuit.
    Override,
    /// A matching grant was found.
    Granted,
    /// Default when no grant matches.
    Denied,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Decision::Denied)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Override => "override",
            Decision::Granted => "granted",
            Decision::Denied => "denied",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::permission::IntoPermissions;

    struct SuperAdmins;

    #[async_trait]
    impl PermissionOverride for SuperAdmins {
        async fn allows(&self, request: &CheckRequest<'_>) -> bool {
            request.member.id.as_str() == "admin"
        }
    }

    #[tokio::test]
    async fn override_sees_member_and_request() {
        let hook = SuperAdmins;
        let permissions = "read".into_permissions();
        let resource = ResourceTarget::of_type("Document");

        let admin = EntityRef::new("User", "admin");
        let request = CheckRequest { member: &admin, permissions: &permissions, resource: &resource };
        assert!(hook.allows(&request).await);

        let user = EntityRef::new("User", "u1");
        let request = CheckRequest { member: &user, permissions: &permissions, resource: &resource };
        assert!(!hook.allows(&request).await);
    }

    #[test]
    fn only_denied_is_not_allowed() {
        assert!(Decision::Override.is_allowed());
        assert!(Decision::Granted.is_allowed());
        assert!(!Decision::Denied.is_allowed());
    }
}
