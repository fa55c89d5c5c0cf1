use std::collections::BTreeSet;

/// Lowercased, deduplicated permission names.
pub type PermissionSet = BTreeSet<String>;

/// Permission names are compared case-insensitively; every name is stored
/// and matched in this form.
pub fn normalize_permission(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Anything a caller may pass where one or more permission names are expected.
pub trait IntoPermissions {
    fn into_permissions(self) -> PermissionSet;
}

fn collect<'a>(names: impl IntoIterator<Item = &'a str>) -> PermissionSet {
    names
        .into_iter()
        .map(normalize_permission)
        .filter(|name| !name.is_empty())
        .collect()
}

impl IntoPermissions for &str {
    fn into_permissions(self) -> PermissionSet {
        collect([self])
    }
}

impl IntoPermissions for String {
    fn into_permissions(self) -> PermissionSet {
        collect([self.as_str()])
    }
}

impl IntoPermissions for &String {
    fn into_permissions(self) -> PermissionSet {
        collect([self.as_str()])
    }
}

impl IntoPermissions for &[&str] {
    fn into_permissions(self) -> PermissionSet {
        collect(self.iter().copied())
    }
}

impl<const N: usize> IntoPermissions for [&str; N] {
    fn into_permissions(self) -> PermissionSet {
        collect(self)
    }
}

impl<const N: usize> IntoPermissions for &[&str; N] {
    fn into_permissions(self) -> PermissionSet {
        collect(self.iter().copied())
    }
}

impl IntoPermissions for Vec<&str> {
    fn into_permissions(self) -> PermissionSet {
        collect(self)
    }
}

impl IntoPermissions for Vec<String> {
    fn into_permissions(self) -> PermissionSet {
        collect(self.iter().map(String::as_str))
    }
}

impl IntoPermissions for &[String] {
    fn into_permissions(self) -> PermissionSet {
        collect(self.iter().map(String::as_str))
    }
}

impl IntoPermissions for PermissionSet {
    fn into_permissions(self) -> PermissionSet {
        collect(self.iter().map(String::as_str))
    }
}

impl IntoPermissions for &PermissionSet {
    fn into_permissions(self) -> PermissionSet {
        collect(self.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercased_and_deduplicated() {
        let set = ["Read", "read", " WRITE "].into_permissions();
        assert_eq!(set, PermissionSet::from(["read".to_string(), "write".to_string()]));
    }

    #[test]
    fn blank_names_are_dropped() {
        assert!("  ".into_permissions().is_empty());
    }
}
