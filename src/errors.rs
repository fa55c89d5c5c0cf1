pub type PermissableResult<T> = Result<T, PermissableError>;

#[derive(thiserror::Error, Debug)]
pub enum PermissableError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("resource not permissable: {0}")]
    UnsupportedResource(String),
    #[error("permission `{permission}` is not defined for {resource_type}")]
    PermissionNotDefined {
        resource_type: String,
        permission: String,
    },
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PermissableError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn unsupported_resource(resource_type: impl Into<String>) -> Self {
        Self::UnsupportedResource(resource_type.into())
    }

    pub fn permission_not_defined(resource_type: impl Into<String>, permission: impl Into<String>) -> Self {
        Self::PermissionNotDefined {
            resource_type: resource_type.into(),
            permission: permission.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short machine-readable tag, used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PermissableError::Configuration(_) => "configuration",
            PermissableError::UnsupportedResource(_) => "unsupported_resource",
            PermissableError::PermissionNotDefined { .. } => "permission_not_defined",
            PermissableError::Database(_) => "database",
            PermissableError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for PermissableError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
