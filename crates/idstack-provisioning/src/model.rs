//! Tenant Model

use crate::error::ProvisioningError;
use serde::{Deserialize, Serialize};

/// Longest tenant id that keeps `tenant-{id}-authenticated-role` within the
/// 64 character role-name limit.
pub const MAX_TENANT_ID_LEN: usize = 38;

/// Role claim written to the user's `custom:role` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TenantRole {
    /// Manages users of the tenant
    #[default]
    TenantAdmin,
    /// Regular member of the tenant
    TenantUser,
}

impl TenantRole {
    /// Claim value matched by the identity pool's role mapping
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantAdmin => "TenantAdmin",
            Self::TenantUser => "TenantUser",
        }
    }
}

impl std::fmt::Display for TenantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TenantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TenantAdmin" => Ok(Self::TenantAdmin),
            "TenantUser" => Ok(Self::TenantUser),
            other => Err(format!("unknown tenant role: {other}")),
        }
    }
}

/// User to create in a tenant's user pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDescriptor {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Unset means the caller's default applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<TenantRole>,
}

impl UserDescriptor {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role: None,
        }
    }

    /// Set the role explicitly
    pub fn with_role(mut self, role: TenantRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Fill in `role` if the caller left it unset
    pub fn with_default_role(mut self, role: TenantRole) -> Self {
        self.role.get_or_insert(role);
        self
    }

    /// Role that will be written to the user
    pub fn effective_role(&self) -> TenantRole {
        self.role.unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ProvisioningError> {
        if self.username.trim().is_empty() {
            return Err(ProvisioningError::Validation("username is required".into()));
        }
        if self.email.trim().is_empty() {
            return Err(ProvisioningError::Validation("email is required".into()));
        }
        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(ProvisioningError::Validation(format!(
                "email {:?} is not an address",
                self.email
            ))),
        }
    }
}

/// Input of `provision_tenant`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantProvisioningRequest {
    pub tenant_id: String,
    /// First admin of the tenant; role defaults to `TenantAdmin`
    pub user: UserDescriptor,
}

impl TenantProvisioningRequest {
    pub fn new(tenant_id: impl Into<String>, user: UserDescriptor) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user,
        }
    }

    pub fn validate(&self) -> Result<(), ProvisioningError> {
        validate_tenant_id(&self.tenant_id)?;
        self.user.validate()
    }
}

/// Tenant ids end up in role, policy and pool names
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), ProvisioningError> {
    if tenant_id.is_empty() {
        return Err(ProvisioningError::Validation("tenant id is required".into()));
    }
    if tenant_id.len() > MAX_TENANT_ID_LEN {
        return Err(ProvisioningError::Validation(format!(
            "tenant id longer than {MAX_TENANT_ID_LEN} characters"
        )));
    }
    if let Some(c) = tenant_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "_+=,.@-".contains(*c)))
    {
        return Err(ProvisioningError::Validation(format!(
            "tenant id contains invalid character {c:?}"
        )));
    }
    Ok(())
}

/// Identifiers of a fully provisioned tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantIdentityStack {
    pub tenant_id: String,
    pub user_pool_id: String,
    pub client_id: String,
    pub identity_pool_id: String,
    pub authenticated_role_arn: String,
    pub admin_role_arn: String,
    pub user_role_arn: String,
}
