//! Platform request and resource shapes

use crate::model::TenantRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Custom attribute holding the tenant id
pub const TENANT_ID_ATTRIBUTE: &str = "custom:tenant_id";
/// Custom attribute holding the role claim
pub const ROLE_ATTRIBUTE: &str = "custom:role";

// =============================================================================
// Requests
// =============================================================================

/// User pool configuration. Every tenant pool gets the same one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolSettings {
    pub admin_create_user_only: bool,
    pub invite_email_subject: String,
    pub invite_email_message: String,
    pub unused_account_validity_days: i32,
    pub alias_attributes: Vec<String>,
    pub auto_verified_attributes: Vec<String>,
    pub mfa_enabled: bool,
    pub password_policy: PasswordPolicy,
    pub schema: Vec<SchemaAttribute>,
}

impl UserPoolSettings {
    /// The fixed tenant pool configuration
    pub fn tenant_default() -> Self {
        let bounded = Some(LengthConstraint { min: 1, max: 256 });
        Self {
            admin_create_user_only: true,
            invite_email_subject: "AWS-SaaS-Identity".into(),
            invite_email_message: "Username: {username}<br><br>Password: {####}".into(),
            unused_account_validity_days: 90,
            alias_attributes: vec!["phone_number".into()],
            auto_verified_attributes: vec!["email".into()],
            mfa_enabled: false,
            password_policy: PasswordPolicy::default(),
            schema: vec![
                SchemaAttribute {
                    name: "tenant_id".into(),
                    custom: true,
                    mutable: false,
                    required: false,
                    constraint: bounded,
                },
                SchemaAttribute {
                    name: "email".into(),
                    custom: false,
                    mutable: true,
                    required: true,
                    constraint: None,
                },
                SchemaAttribute {
                    name: "role".into(),
                    custom: true,
                    mutable: true,
                    required: false,
                    constraint: bounded,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub minimum_length: i32,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_numbers: bool,
    pub require_symbols: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            minimum_length: 8,
            require_lowercase: true,
            require_uppercase: true,
            require_numbers: true,
            require_symbols: false,
        }
    }
}

/// User pool schema attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaAttribute {
    pub name: String,
    /// Custom string attribute (`custom:` prefix once created)
    pub custom: bool,
    pub mutable: bool,
    pub required: bool,
    pub constraint: Option<LengthConstraint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthConstraint {
    pub min: u32,
    pub max: u32,
}

/// App client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolClientSettings {
    pub generate_secret: bool,
    pub refresh_token_validity: i32,
    pub read_attributes: Vec<String>,
    pub write_attributes: Vec<String>,
}

impl UserPoolClientSettings {
    /// The fixed tenant client configuration. `custom:tenant_id` is readable
    /// but never writable by the client.
    pub fn tenant_default() -> Self {
        let common = ["email", "family_name", "given_name", "phone_number", "preferred_username"];
        let mut read_attributes: Vec<String> = common.iter().map(|a| a.to_string()).collect();
        read_attributes.push(TENANT_ID_ATTRIBUTE.into());
        read_attributes.push(ROLE_ATTRIBUTE.into());

        let mut write_attributes: Vec<String> = common.iter().map(|a| a.to_string()).collect();
        write_attributes.push(ROLE_ATTRIBUTE.into());

        Self {
            generate_secret: false,
            refresh_token_validity: 0,
            read_attributes,
            write_attributes,
        }
    }
}

/// Identity pool to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdentityPool {
    pub name: String,
    pub allow_unauthenticated_identities: bool,
    pub providers: Vec<IdentityProviderBinding>,
}

/// A user pool client trusted by an identity pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProviderBinding {
    pub provider_name: String,
    pub client_id: String,
    pub server_side_token_check: bool,
}

/// User to create through the admin API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub user_pool_id: String,
    pub username: String,
    pub attributes: Vec<UserAttribute>,
    pub delivery_mediums: Vec<DeliveryMedium>,
    pub force_alias_creation: bool,
}

impl NewUser {
    /// Value of an attribute, if set
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttribute {
    pub name: String,
    pub value: String,
}

impl UserAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Channel for invitations and verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMedium {
    Email,
    Sms,
}

/// Role configuration of an identity pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPoolRoles {
    pub identity_pool_id: String,
    /// Default role for authenticated identities
    pub authenticated_role_arn: String,
    /// `{provider_name}:{client_id}` the mapping applies to
    pub provider_key: String,
    pub rules: Vec<MappingRule>,
    pub ambiguous_resolution: AmbiguousRoleResolution,
}

impl IdentityPoolRoles {
    /// Role a token with the given claim value resolves to, if any
    pub fn resolve(&self, claim: &str, value: &str) -> Option<&str> {
        let mut matches = self
            .rules
            .iter()
            .filter(|r| r.claim == claim && r.value == value)
            .map(|r| r.role_arn.as_str());
        match (matches.next(), &self.ambiguous_resolution) {
            (Some(arn), _) => Some(arn),
            (None, AmbiguousRoleResolution::AuthenticatedRole) => {
                Some(self.authenticated_role_arn.as_str())
            }
            (None, AmbiguousRoleResolution::Deny) => None,
        }
    }
}

/// `claim == value` selects `role_arn`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub claim: String,
    pub value: String,
    pub role_arn: String,
}

impl MappingRule {
    /// Rule matching the `custom:role` claim
    pub fn for_role(role: TenantRole, role_arn: impl Into<String>) -> Self {
        Self {
            claim: ROLE_ATTRIBUTE.into(),
            value: role.as_str().into(),
            role_arn: role_arn.into(),
        }
    }
}

/// What happens when no rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbiguousRoleResolution {
    AuthenticatedRole,
    Deny,
}

// =============================================================================
// Resources
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPool {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPoolClient {
    pub id: String,
    pub name: String,
    pub user_pool_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPool {
    pub id: String,
    pub name: String,
}

/// Managed policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub arn: String,
}

/// Temporary credentials for a federated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCredentials {
    pub access_key_id: String,
    pub secret_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}
