//! Configuration for members, their resources and the store connection.
//!
//! Member configuration is built once per member type and shared read-only
//! (`Arc<MemberConfig>`) by every authorization context for that type.
//! It can be written in code through [`MemberConfig::builder`] or loaded from
//! a JSON file ([`PermissableConfig`]).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::authz::chain::PermissionChain;
use crate::errors::{PermissableError, PermissableResult};
use crate::models::permission::normalize_permission;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connection settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub config_path: Option<String>,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, PermissableError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| PermissableError::configuration("DATABASE_URL not set"))?;
        let config_path = std::env::var("PERMISSABLE_CONFIG").ok().filter(|p| !p.trim().is_empty());
        let max_connections = std::env::var("PERMISSABLE_MAX_CONNECTIONS")
            .map(|val| val.parse::<u32>())
            .unwrap_or(Ok(DEFAULT_MAX_CONNECTIONS))
            .map_err(|_| PermissableError::configuration("PERMISSABLE_MAX_CONNECTIONS must be a valid integer"))?;

        Ok(Self {
            database_url,
            config_path,
            max_connections,
        })
    }
}

/// How `grant` treats a member/resource pair that already holds a grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantMode {
    /// One grant per member, resource and permission.
    #[default]
    Accumulate,
    /// One grant per member and resource; granting rewrites its permission.
    Replace,
}

/// Options of a single `has_permissions_for` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionOptions {
    to: Vec<String>,
    through: Option<String>,
}

impl PermissionOptions {
    /// Permissions the member may hold on the declared resources. At least one is required.
    pub fn to<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            to: permissions.into_iter().map(|p| p.as_ref().to_string()).collect(),
            through: None,
        }
    }

    /// Record grants against the named association (e.g. `roles`) instead of the member.
    pub fn through(mut self, association: impl Into<String>) -> Self {
        self.through = Some(association.into());
        self
    }
}

/// Immutable per-member-type configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberConfig {
    member_type: String,
    resources: BTreeMap<String, BTreeSet<String>>,
    associations: BTreeMap<String, String>,
    allow_permission_with: Option<String>,
    permission_chain: PermissionChain,
    grant_mode: GrantMode,
}

impl MemberConfig {
    pub fn builder(member_type: impl Into<String>) -> MemberConfigBuilder {
        MemberConfigBuilder {
            config: MemberConfig {
                member_type: member_type.into(),
                resources: BTreeMap::new(),
                associations: BTreeMap::new(),
                allow_permission_with: None,
                permission_chain: PermissionChain::new(),
                grant_mode: GrantMode::default(),
            },
            error: None,
        }
    }

    pub fn member_type(&self) -> &str {
        &self.member_type
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn is_permissable(&self, resource_type: &str) -> bool {
        self.resources.contains_key(resource_type)
    }

    /// Permissions this member type may hold on `resource_type`.
    pub fn permissable_methods(&self, resource_type: &str) -> Option<&BTreeSet<String>> {
        self.resources.get(resource_type)
    }

    /// Association name grants are recorded through for `resource_type`, if any.
    pub fn association_for(&self, resource_type: &str) -> Option<&str> {
        self.associations.get(resource_type).map(String::as_str)
    }

    pub fn associations(&self) -> impl Iterator<Item = &str> {
        let names: BTreeSet<&str> = self.associations.values().map(String::as_str).collect();
        names.into_iter()
    }

    pub fn allow_permission_with(&self) -> Option<&str> {
        self.allow_permission_with.as_deref()
    }

    pub fn permission_chain(&self) -> &PermissionChain {
        &self.permission_chain
    }

    pub fn grant_mode(&self) -> GrantMode {
        self.grant_mode
    }
}

pub struct MemberConfigBuilder {
    config: MemberConfig,
    error: Option<PermissableError>,
}

impl MemberConfigBuilder {
    /// Declares that the member may hold `options.to` on each resource type in `resources`.
    ///
    /// Repeated declarations for the same resource type merge their permissions;
    /// the last `through` wins.
    pub fn has_permissions_for<I, S>(mut self, resources: I, options: PermissionOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.error.is_some() {
            return self;
        }

        let permissions: BTreeSet<String> = options
            .to
            .iter()
            .map(|p| normalize_permission(p))
            .filter(|p| !p.is_empty())
            .collect();
        if permissions.is_empty() {
            self.error = Some(PermissableError::configuration(format!(
                "has_permissions_for on {} is missing the `to` option",
                self.config.member_type
            )));
            return self;
        }

        let mut declared = false;
        for resource in resources {
            let resource = resource.as_ref().trim();
            if resource.is_empty() {
                continue;
            }
            declared = true;
            self.config
                .resources
                .entry(resource.to_string())
                .or_default()
                .extend(permissions.iter().cloned());
            if let Some(through) = &options.through {
                self.config.associations.insert(resource.to_string(), through.clone());
            }
        }

        if !declared {
            self.error = Some(PermissableError::configuration(format!(
                "has_permissions_for on {} names no resources",
                self.config.member_type
            )));
        }
        self
    }

    /// Name of an override hook consulted before stored grants.
    pub fn allow_permission_with(mut self, hook: impl Into<String>) -> Self {
        self.config.allow_permission_with = Some(hook.into());
        self
    }

    pub fn permission_chain<I, S>(mut self, alias: &str, implied: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.permission_chain.insert(alias, implied);
        self
    }

    pub fn grant_mode(mut self, mode: GrantMode) -> Self {
        self.config.grant_mode = mode;
        self
    }

    pub fn build(self) -> PermissableResult<MemberConfig> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.config.member_type.trim().is_empty() {
            return Err(PermissableError::configuration("member type must not be empty"));
        }
        if self.config.resources.is_empty() {
            return Err(PermissableError::configuration(format!(
                "{} declares no permissable resources",
                self.config.member_type
            )));
        }
        Ok(self.config)
    }
}

/// File form of the configuration.
///
/// ```json
/// {
///   "members": [{
///     "member_type": "User",
///     "permissions": [
///       { "resources": ["Document"], "to": ["read", "write", "moderate"] },
///       { "resources": ["Post"], "to": ["read"], "through": "roles" }
///     ],
///     "permission_chain": { "moderate": ["read", "write"] }
///   }]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissableConfig {
    #[serde(default)]
    pub members: Vec<MemberSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberSection {
    pub member_type: String,
    #[serde(default)]
    pub permissions: Vec<PermissionSection>,
    #[serde(default)]
    pub allow_permission_with: Option<String>,
    #[serde(default)]
    pub permission_chain: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub grant_mode: GrantMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionSection {
    pub resources: Vec<String>,
    // Left optional so a missing list is reported as a configuration error
    // by the builder rather than as a parse error.
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub through: Option<String>,
}

impl PermissableConfig {
    pub fn from_json_str(raw: &str) -> PermissableResult<Self> {
        let deserializer = &mut serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(deserializer).map_err(|err| {
            PermissableError::configuration(format!("invalid configuration at `{}`: {}", err.path(), err.inner()))
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> PermissableResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PermissableError::configuration(format!("failed to read {}: {}", path.display(), err))
        })?;
        Self::from_json_str(&raw)
    }

    /// Builds and validates one [`MemberConfig`] per member section.
    pub fn member_configs(&self) -> PermissableResult<Vec<MemberConfig>> {
        self.members.iter().map(MemberSection::build).collect()
    }
}

impl MemberSection {
    pub fn build(&self) -> PermissableResult<MemberConfig> {
        let mut builder = MemberConfig::builder(self.member_type.clone()).grant_mode(self.grant_mode);
        for section in &self.permissions {
            let mut options = PermissionOptions::to(&section.to);
            if let Some(through) = &section.through {
                options = options.through(through.clone());
            }
            builder = builder.has_permissions_for(&section.resources, options);
        }
        if let Some(hook) = &self.allow_permission_with {
            builder = builder.allow_permission_with(hook.clone());
        }
        for (alias, implied) in &self.permission_chain {
            builder = builder.permission_chain(alias, implied);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_merges_declarations() {
        let config = MemberConfig::builder("User")
            .has_permissions_for(["Section", "Category"], PermissionOptions::to(["Read", "write"]))
            .has_permissions_for(["Section"], PermissionOptions::to(["moderate"]).through("roles"))
            .permission_chain("moderate", ["read", "write"])
            .build()
            .unwrap();

        let section = config.permissable_methods("Section").unwrap();
        assert_eq!(section.len(), 3);
        assert!(section.contains("read"));
        assert_eq!(config.association_for("Section"), Some("roles"));
        assert_eq!(config.association_for("Category"), None);
        assert!(!config.is_permissable("Entry"));
        assert!(!config.permission_chain().is_empty());
        assert_eq!(config.grant_mode(), GrantMode::Accumulate);
    }

    #[test]
    fn missing_to_is_rejected() {
        let err = MemberConfig::builder("User")
            .has_permissions_for(["Section"], PermissionOptions::to(Vec::<String>::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, PermissableError::Configuration(msg) if msg.contains("`to`")));
    }

    #[test]
    fn member_without_resources_is_rejected() {
        assert!(MemberConfig::builder("User").build().is_err());
    }

    #[test]
    fn file_config_builds_member_configs() {
        let raw = r#"{
            "members": [{
                "member_type": "User",
                "permissions": [
                    { "resources": ["Document"], "to": ["read", "write", "moderate"] },
                    { "resources": ["Post"], "to": ["read"], "through": "roles" }
                ],
                "allow_permission_with": "is_admin",
                "permission_chain": { "moderate": ["read", "write"] },
                "grant_mode": "replace"
            }]
        }"#;

        let configs = PermissableConfig::from_json_str(raw).unwrap().member_configs().unwrap();
        assert_eq!(configs.len(), 1);
        let user = &configs[0];
        assert_eq!(user.member_type(), "User");
        assert_eq!(user.allow_permission_with(), Some("is_admin"));
        assert_eq!(user.association_for("Post"), Some("roles"));
        assert_eq!(user.grant_mode(), GrantMode::Replace);
        assert_eq!(user.resource_types().collect::<Vec<_>>(), vec!["Document", "Post"]);
    }

    #[test]
    fn file_errors_name_the_failing_path() {
        let raw = r#"{ "members": [{ "member_type": "User", "permissions": [{ "resources": "Document" }] }] }"#;
        let err = PermissableConfig::from_json_str(raw).unwrap_err();
        assert!(matches!(err, PermissableError::Configuration(msg) if msg.contains("members[0].permissions[0].resources")));
    }

    #[test]
    fn file_without_to_reports_configuration_error() {
        let raw = r#"{ "members": [{ "member_type": "User", "permissions": [{ "resources": ["Document"] }] }] }"#;
        let err = PermissableConfig::from_json_str(raw).unwrap().member_configs().unwrap_err();
        assert!(matches!(err, PermissableError::Configuration(_)));
    }
}
