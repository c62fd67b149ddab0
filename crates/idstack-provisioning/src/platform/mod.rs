//! Identity Platform
//!
//! The remote resource-management API the provisioner drives. One trait
//! method per remote call; every call is request/response.

use crate::error::PlatformResult;
use crate::policy::PolicyDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod types;
#[cfg(feature = "aws")]
pub mod aws;

pub use memory::InMemoryPlatform;
pub use types::*;
#[cfg(feature = "aws")]
pub use aws::AwsPlatform;

/// Remote operations of the identity platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    CreateUserPool,
    DeleteUserPool,
    CreateUserPoolClient,
    DeleteUserPoolClient,
    CreateIdentityPool,
    DeleteIdentityPool,
    AdminCreateUser,
    AdminDeleteUser,
    CreatePolicy,
    DeletePolicy,
    CreateRole,
    DeleteRole,
    AttachRolePolicy,
    SetIdentityPoolRoles,
    GetId,
    GetCredentialsForIdentity,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUserPool => "CreateUserPool",
            Self::DeleteUserPool => "DeleteUserPool",
            Self::CreateUserPoolClient => "CreateUserPoolClient",
            Self::DeleteUserPoolClient => "DeleteUserPoolClient",
            Self::CreateIdentityPool => "CreateIdentityPool",
            Self::DeleteIdentityPool => "DeleteIdentityPool",
            Self::AdminCreateUser => "AdminCreateUser",
            Self::AdminDeleteUser => "AdminDeleteUser",
            Self::CreatePolicy => "CreatePolicy",
            Self::DeletePolicy => "DeletePolicy",
            Self::CreateRole => "CreateRole",
            Self::DeleteRole => "DeleteRole",
            Self::AttachRolePolicy => "AttachRolePolicy",
            Self::SetIdentityPoolRoles => "SetIdentityPoolRoles",
            Self::GetId => "GetId",
            Self::GetCredentialsForIdentity => "GetCredentialsForIdentity",
        }
    }

    /// Whether the call removes a resource
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::DeleteUserPool
                | Self::DeleteUserPoolClient
                | Self::DeleteIdentityPool
                | Self::AdminDeleteUser
                | Self::DeletePolicy
                | Self::DeleteRole
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity platform backend
#[async_trait]
pub trait IdentityPlatform: Send + Sync {
    async fn create_user_pool(&self, name: &str, settings: &UserPoolSettings) -> PlatformResult<UserPool>;

    async fn delete_user_pool(&self, user_pool_id: &str) -> PlatformResult<()>;

    async fn create_user_pool_client(
        &self,
        user_pool_id: &str,
        name: &str,
        settings: &UserPoolClientSettings,
    ) -> PlatformResult<UserPoolClient>;

    async fn delete_user_pool_client(&self, user_pool_id: &str, client_id: &str) -> PlatformResult<()>;

    async fn create_identity_pool(&self, pool: &NewIdentityPool) -> PlatformResult<IdentityPool>;

    async fn delete_identity_pool(&self, identity_pool_id: &str) -> PlatformResult<()>;

    async fn admin_create_user(&self, user: &NewUser) -> PlatformResult<()>;

    async fn admin_delete_user(&self, user_pool_id: &str, username: &str) -> PlatformResult<()>;

    async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        description: &str,
    ) -> PlatformResult<Policy>;

    async fn delete_policy(&self, policy_arn: &str) -> PlatformResult<()>;

    async fn create_role(&self, name: &str, assume_role_policy: &PolicyDocument) -> PlatformResult<Role>;

    async fn delete_role(&self, role_name: &str) -> PlatformResult<()>;

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> PlatformResult<()>;

    async fn set_identity_pool_roles(&self, roles: &IdentityPoolRoles) -> PlatformResult<()>;

    /// Resolve (or create) the identity id of a logged-in user
    async fn get_id(
        &self,
        identity_pool_id: &str,
        account_id: &str,
        provider: &str,
        token: &str,
    ) -> PlatformResult<String>;

    /// Exchange a provider token for temporary credentials
    async fn get_credentials_for_identity(
        &self,
        identity_id: &str,
        provider: &str,
        token: &str,
    ) -> PlatformResult<IdentityCredentials>;
}
