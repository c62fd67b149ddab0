//! Policy Documents
//!
//! IAM-grammar documents and the three templates a tenant stack needs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

/// Federated principal of the identity pool service
pub const IDENTITY_SERVICE_PRINCIPAL: &str = "cognito-identity.amazonaws.com";

/// Immutable permission or trust document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    /// Document with the current policy version
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.into(),
            statements,
        }
    }

    /// Wire form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Single policy statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: OneOrMany,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<OneOrMany>,
    /// operator -> (condition key -> value)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub condition: BTreeMap<String, BTreeMap<String, String>>,
}

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Statement principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub federated: Option<String>,
}

/// A single value or a list, as the policy grammar allows either
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// All values as a slice-like vector
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(v) => vec![v.as_str()],
            Self::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// Trust policy shared by all tenant roles: only authenticated identities of
/// the given identity pool may assume them.
pub fn trust_policy(identity_pool_id: &str) -> PolicyDocument {
    let mut condition = BTreeMap::new();
    condition.insert(
        "StringEquals".to_string(),
        BTreeMap::from([(
            format!("{IDENTITY_SERVICE_PRINCIPAL}:aud"),
            identity_pool_id.to_string(),
        )]),
    );
    condition.insert(
        "ForAnyValue:StringLike".to_string(),
        BTreeMap::from([(
            format!("{IDENTITY_SERVICE_PRINCIPAL}:amr"),
            "authenticated".to_string(),
        )]),
    );

    PolicyDocument::new(vec![Statement {
        sid: None,
        effect: Effect::Allow,
        principal: Some(Principal {
            federated: Some(IDENTITY_SERVICE_PRINCIPAL.into()),
        }),
        action: OneOrMany::One("sts:AssumeRoleWithWebIdentity".into()),
        resource: None,
        condition,
    }])
}

/// User management actions granted to tenant admins
pub const TENANT_ADMIN_ACTIONS: [&str; 7] = [
    "cognito-idp:AdminCreateUser",
    "cognito-idp:AdminDeleteUser",
    "cognito-idp:AdminDisableUser",
    "cognito-idp:AdminEnableUser",
    "cognito-idp:AdminGetUser",
    "cognito-idp:ListUsers",
    "cognito-idp:AdminUpdateUserAttributes",
];

/// Tenant admin permissions, scoped to the tenant's own user pool
pub fn tenant_admin_policy(user_pool_arn: &str) -> PolicyDocument {
    PolicyDocument::new(vec![Statement {
        sid: Some("TenantAdminCognitoAccess".into()),
        effect: Effect::Allow,
        principal: None,
        action: OneOrMany::Many(TENANT_ADMIN_ACTIONS.iter().map(|a| a.to_string()).collect()),
        resource: Some(OneOrMany::Many(vec![user_pool_arn.to_string()])),
        condition: BTreeMap::new(),
    }])
}

/// Tenant user permissions: storage under the tenant's prefix.
///
/// `_user_pool_arn` is accepted for symmetry with the admin template and is
/// not part of the granted scope.
pub fn tenant_user_policy(_user_pool_arn: &str, tenant_id: &str, bucket: &str) -> PolicyDocument {
    PolicyDocument::new(vec![Statement {
        sid: Some("S3".into()),
        effect: Effect::Allow,
        principal: None,
        action: OneOrMany::Many(vec!["s3:*".into()]),
        resource: Some(OneOrMany::Many(vec![format!("arn:aws:s3:::{bucket}/{tenant_id}/*")])),
        condition: BTreeMap::new(),
    }])
}
