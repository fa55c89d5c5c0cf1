use anyhow::Result;
use async_trait::async_trait;

use permissable::{
    db, CheckRequest, Decision, EntityRef, MemberConfig, Permissable, PermissableError, PermissionOptions,
    PermissionOverride, PermissionSet, ResourceTarget, SqliteGrantStore,
};

struct Admins;

#[async_trait]
impl PermissionOverride for Admins {
    async fn allows(&self, request: &CheckRequest<'_>) -> bool {
        request.member.id.as_str().starts_with("admin")
    }
}

async fn setup() -> Result<Permissable<SqliteGrantStore>> {
    let pool = db::in_memory().await?;
    let user = MemberConfig::builder("User")
        .has_permissions_for(["document"], PermissionOptions::to(["read", "write", "moderate"]))
        .permission_chain("moderate", ["read", "write"])
        .build()?;
    let staff = MemberConfig::builder("Staff")
        .has_permissions_for(["document"], PermissionOptions::to(["read", "write"]))
        .allow_permission_with("is_admin")
        .build()?;

    Ok(Permissable::builder(SqliteGrantStore::new(pool))
        .member(user)
        .member(staff)
        .override_hook("Staff", "is_admin", Admins)
        .build()?)
}

fn doc(id: &str) -> EntityRef {
    EntityRef::new("document", id)
}

#[tokio::test]
async fn document_read_scenario() -> Result<()> {
    let permissable = setup().await?;
    let doc1 = doc("doc1");
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;

    let created = u1.grant("read", &[ResourceTarget::from(&doc1)]).await?;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].member_type, "User");
    assert_eq!(created[0].permission_name, "read");

    assert!(u1.can("read", &doc1).await?);
    assert!(!u1.can("write", &doc1).await?);
    assert!(u1.cannot("write", &doc1).await?);
    assert_eq!(
        u1.permissions_for(&ResourceTarget::from(&doc1)).await?,
        PermissionSet::from(["read".to_string()])
    );
    assert!(u1.has_permissions_for(&ResourceTarget::from(&doc1)).await?);
    Ok(())
}

#[tokio::test]
async fn never_granted_is_denied() -> Result<()> {
    let permissable = setup().await?;
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;
    let mut u2 = permissable.member(EntityRef::new("User", "u2"))?;

    u1.grant(["read", "write"], &[ResourceTarget::from(doc("doc1"))]).await?;

    assert!(!u2.can("read", &doc("doc1")).await?);
    assert!(!u1.can("read", &doc("doc2")).await?);
    assert!(!u1.has_permissions_for(&ResourceTarget::from(doc("doc2"))).await?);
    assert!(!u1.can(Vec::<String>::new(), &doc("doc1")).await?);
    Ok(())
}

#[tokio::test]
async fn grant_is_idempotent() -> Result<()> {
    let permissable = setup().await?;
    let doc1 = doc("doc1");
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;
    let targets = [ResourceTarget::from(&doc1), ResourceTarget::from(&doc1)];

    let first = u1.grant(["read", "READ"], &targets).await?;
    let second = u1.grant("read", &targets).await?;

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(permissable.grants_on(&doc1).await?.len(), 1);
    assert!(u1.can("read", &doc1).await?);
    Ok(())
}

#[tokio::test]
async fn grant_covers_every_resource_and_permission() -> Result<()> {
    let permissable = setup().await?;
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;
    let targets = [ResourceTarget::from(doc("a")), ResourceTarget::from(doc("b"))];

    let created = u1.grant(["read", "write"], &targets).await?;
    assert_eq!(created.len(), 4);
    for id in ["a", "b"] {
        assert!(u1.can("read", &doc(id)).await?);
        assert!(u1.can("write", &doc(id)).await?);
    }
    Ok(())
}

#[tokio::test]
async fn chain_lets_alias_satisfy_implied_permissions() -> Result<()> {
    let permissable = setup().await?;
    let doc1 = doc("doc1");
    let mut moderator = permissable.member(EntityRef::new("User", "mod"))?;
    let mut reader = permissable.member(EntityRef::new("User", "reader"))?;

    moderator.grant("moderate", &[ResourceTarget::from(&doc1)]).await?;
    reader.grant("read", &[ResourceTarget::from(&doc1)]).await?;

    assert!(moderator.can("read", &doc1).await?);
    assert!(moderator.can("write", &doc1).await?);
    assert!(!reader.can("moderate", &doc1).await?);

    // without the chain only the literal permission counts
    assert!(!moderator.can_with_chain("read", &doc1, false).await?);
    assert!(moderator.can_with_chain("moderate", &doc1, false).await?);
    Ok(())
}

#[tokio::test]
async fn override_hook_short_circuits() -> Result<()> {
    let permissable = setup().await?;
    let doc1 = doc("doc1");
    let mut admin = permissable.member(EntityRef::new("Staff", "admin-1"))?;
    let mut staff = permissable.member(EntityRef::new("Staff", "s1"))?;

    assert_eq!(admin.check("write", &doc1, true).await?, Decision::Override);
    assert!(admin.can("write", &doc1).await?);
    assert!(!staff.can("write", &doc1).await?);

    staff.grant("write", &[ResourceTarget::from(&doc1)]).await?;
    assert_eq!(staff.check("write", &doc1, true).await?, Decision::Granted);
    Ok(())
}

#[tokio::test]
async fn unregistered_resource_type_fails_loudly() -> Result<()> {
    let permissable = setup().await?;
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;
    let folder = EntityRef::new("folder", "f1");

    let err = u1.can("read", &folder).await.unwrap_err();
    assert!(matches!(err, PermissableError::UnsupportedResource(_)));

    let err = u1.grant("read", &[ResourceTarget::from(&folder)]).await.unwrap_err();
    assert!(matches!(err, PermissableError::UnsupportedResource(_)));

    let err = u1.permissions_for(&ResourceTarget::of_type("folder")).await.unwrap_err();
    assert!(matches!(err, PermissableError::UnsupportedResource(_)));
    Ok(())
}

#[tokio::test]
async fn undeclared_permission_cannot_be_granted() -> Result<()> {
    let permissable = setup().await?;
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;

    let err = u1.grant(["read", "delete"], &[ResourceTarget::from(doc("doc1"))]).await.unwrap_err();
    assert!(matches!(err, PermissableError::PermissionNotDefined { ref permission, .. } if permission == "delete"));
    // nothing was written
    assert!(!u1.can("read", &doc("doc1")).await?);
    Ok(())
}

#[tokio::test]
async fn type_references_are_skipped_when_granting() -> Result<()> {
    let permissable = setup().await?;
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;

    let created = u1
        .grant("read", &[ResourceTarget::of_type("document"), ResourceTarget::from(doc("doc1"))])
        .await?;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].resource_id.as_str(), "doc1");

    let only_type = u1.grant("read", &[ResourceTarget::of_type("document")]).await?;
    assert!(only_type.is_empty());
    Ok(())
}

#[tokio::test]
async fn permissions_for_type_lists_configured_permissions() -> Result<()> {
    let permissable = setup().await?;
    let mut staff = permissable.member(EntityRef::new("Staff", "s1"))?;

    let permissions = staff.permissions_for(&ResourceTarget::of_type("document")).await?;
    assert_eq!(permissions, PermissionSet::from(["read".to_string(), "write".to_string()]));
    Ok(())
}

#[tokio::test]
async fn revoke_removes_only_named_permissions() -> Result<()> {
    let permissable = setup().await?;
    let doc1 = doc("doc1");
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;
    let mut u2 = permissable.member(EntityRef::new("User", "u2"))?;

    u1.grant(["read", "write"], &[ResourceTarget::from(&doc1)]).await?;
    u2.grant("write", &[ResourceTarget::from(&doc1)]).await?;

    let removed = u1.revoke("write", &[ResourceTarget::from(&doc1)]).await?;
    assert_eq!(removed, 1);
    assert!(u1.can("read", &doc1).await?);
    assert!(!u1.can("write", &doc1).await?);
    assert!(u2.can("write", &doc1).await?);
    Ok(())
}

#[tokio::test]
async fn unknown_member_type_is_a_configuration_error() -> Result<()> {
    let permissable = setup().await?;
    let err = permissable.member(EntityRef::new("Robot", "r1")).err().unwrap();
    assert!(matches!(err, PermissableError::Configuration(_)));
    Ok(())
}

#[tokio::test]
async fn missing_override_hook_fails_build() -> Result<()> {
    let pool = db::in_memory().await?;
    let staff = MemberConfig::builder("Staff")
        .has_permissions_for(["document"], PermissionOptions::to(["read"]))
        .allow_permission_with("is_admin")
        .build()?;

    let result = Permissable::builder(SqliteGrantStore::new(pool)).member(staff).build();
    assert!(matches!(result, Err(PermissableError::Configuration(_))));
    Ok(())
}

#[tokio::test]
async fn bulk_grant_and_revoke_over_many_resources() -> Result<()> {
    let permissable = setup().await?;
    let mut u1 = permissable.member(EntityRef::new("User", "u1"))?;
    let targets: Vec<ResourceTarget> = (0..1200).map(|i| ResourceTarget::from(doc(&format!("doc{i}")))).collect();

    let created = u1.grant("read", &targets).await?;
    assert_eq!(created.len(), 1200);
    assert!(u1.can("read", &doc("doc0")).await?);
    assert!(u1.can("read", &doc("doc1199")).await?);

    let again = u1.grant(["read", "write"], &targets).await?;
    assert_eq!(again.len(), 1200);
    assert!(again.iter().all(|g| g.permission_name == "write"));

    assert_eq!(u1.revoke(["read", "write"], &targets).await?, 2400);
    assert!(!u1.can("read", &doc("doc600")).await?);
    Ok(())
}
