//! Resource Client
//!
//! Uniform layer over the identity platform. Each creation makes exactly one
//! remote call, logs an `{action, ...ids}` record and hands back the created
//! resource together with the compensation that removes it. Attachments and
//! role mappings have no inverse and never carry one.

use crate::compensation::Compensation;
use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::model::{TenantRole, UserDescriptor};
use crate::platform::{
    AmbiguousRoleResolution, DeliveryMedium, IdentityCredentials, IdentityPlatform, IdentityPool,
    IdentityPoolRoles, IdentityProviderBinding, MappingRule, NewIdentityPool, NewUser, Policy, Role,
    UserAttribute, UserPool, UserPoolClient, UserPoolClientSettings, UserPoolSettings, ROLE_ATTRIBUTE,
    TENANT_ID_ATTRIBUTE,
};
use crate::policy::PolicyDocument;
use crate::saga::Compensator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A created (or mutated) resource and, if it can be undone, how
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHandle<T> {
    pub resource: T,
    pub compensation: Option<Compensation>,
}

impl<T> ResourceHandle<T> {
    fn reversible(resource: T, compensation: Compensation) -> Self {
        Self {
            resource,
            compensation: Some(compensation),
        }
    }

    fn irreversible(resource: T) -> Self {
        Self {
            resource,
            compensation: None,
        }
    }

    /// Split into the resource and its compensation
    pub fn into_parts(self) -> (T, Option<Compensation>) {
        (self.resource, self.compensation)
    }
}

/// User created in a tenant pool, echoing what was requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: TenantRole,
    pub user_pool_id: String,
}

/// A policy attached to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicyAttachment {
    pub policy_arn: String,
    pub role_name: String,
}

/// Inputs of the identity pool role mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRoleMapping {
    pub user_pool_id: String,
    pub identity_pool_id: String,
    pub client_id: String,
    pub authenticated_role_arn: String,
    pub admin_role_arn: String,
    pub user_role_arn: String,
}

/// Resource client over an identity platform backend
pub struct ResourceClient<P> {
    platform: Arc<P>,
    config: PlatformConfig,
}

impl<P: IdentityPlatform> ResourceClient<P> {
    pub fn new(platform: Arc<P>, config: PlatformConfig) -> Self {
        Self { platform, config }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Create a tenant user pool with the fixed tenant configuration
    pub async fn create_user_pool(&self, name: &str) -> PlatformResult<ResourceHandle<UserPool>> {
        let pool = self
            .platform
            .create_user_pool(name, &UserPoolSettings::tenant_default())
            .await?;

        tracing::info!(action = "createUserPool", id = %pool.id, name = %pool.name);

        let undo = Compensation::DeleteUserPool {
            user_pool_id: pool.id.clone(),
        };
        Ok(ResourceHandle::reversible(pool, undo))
    }

    /// Create the app client of a user pool
    pub async fn create_user_pool_client(
        &self,
        name: &str,
        user_pool_id: &str,
    ) -> PlatformResult<ResourceHandle<UserPoolClient>> {
        let client = self
            .platform
            .create_user_pool_client(user_pool_id, name, &UserPoolClientSettings::tenant_default())
            .await?;

        tracing::info!(
            action = "createUserPoolClient",
            id = %client.id,
            name = %client.name,
            user_pool_id = %client.user_pool_id
        );

        let undo = Compensation::DeleteUserPoolClient {
            user_pool_id: client.user_pool_id.clone(),
            client_id: client.id.clone(),
        };
        Ok(ResourceHandle::reversible(client, undo))
    }

    /// Create an identity pool trusting one user pool client. Unauthenticated
    /// identities are not allowed.
    pub async fn create_identity_pool(
        &self,
        client_id: &str,
        user_pool_id: &str,
        name: &str,
    ) -> PlatformResult<ResourceHandle<IdentityPool>> {
        let request = NewIdentityPool {
            name: name.to_string(),
            allow_unauthenticated_identities: false,
            providers: vec![IdentityProviderBinding {
                provider_name: self.config.identity_provider_name(user_pool_id),
                client_id: client_id.to_string(),
                server_side_token_check: true,
            }],
        };
        let pool = self.platform.create_identity_pool(&request).await?;

        tracing::info!(action = "createIdentityPool", id = %pool.id, name = %pool.name);

        let undo = Compensation::DeleteIdentityPool {
            identity_pool_id: pool.id.clone(),
        };
        Ok(ResourceHandle::reversible(pool, undo))
    }

    /// Create a user in a tenant pool. The invitation goes out by email.
    pub async fn create_tenant_user(
        &self,
        user: &UserDescriptor,
        user_pool_id: &str,
        tenant_id: &str,
    ) -> PlatformResult<ResourceHandle<TenantUser>> {
        let role = user.effective_role();
        let request = NewUser {
            user_pool_id: user_pool_id.to_string(),
            username: user.username.clone(),
            attributes: vec![
                UserAttribute::new("email", &user.email),
                UserAttribute::new(TENANT_ID_ATTRIBUTE, tenant_id),
                UserAttribute::new("given_name", &user.first_name),
                UserAttribute::new("family_name", &user.last_name),
                UserAttribute::new(ROLE_ATTRIBUTE, role.as_str()),
            ],
            delivery_mediums: vec![DeliveryMedium::Email],
            force_alias_creation: true,
        };
        self.platform.admin_create_user(&request).await?;

        let created = TenantUser {
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role,
            user_pool_id: user_pool_id.to_string(),
        };

        tracing::info!(
            action = "adminCreateUser",
            username = %created.username,
            email = %created.email,
            first_name = %created.first_name,
            last_name = %created.last_name,
            role = %created.role,
            user_pool_id = %created.user_pool_id
        );

        let undo = Compensation::DeleteUser {
            user_pool_id: created.user_pool_id.clone(),
            username: created.username.clone(),
        };
        Ok(ResourceHandle::reversible(created, undo))
    }

    /// Create a managed policy
    pub async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        description: Option<&str>,
    ) -> PlatformResult<ResourceHandle<Policy>> {
        let policy = self
            .platform
            .create_policy(name, document, description.unwrap_or_default())
            .await?;

        tracing::info!(action = "createPolicy", id = %policy.id, name = %policy.name, arn = %policy.arn);

        let undo = Compensation::DeletePolicy {
            policy_arn: policy.arn.clone(),
        };
        Ok(ResourceHandle::reversible(policy, undo))
    }

    /// Create a role assumable under `trust_policy`
    pub async fn create_role(
        &self,
        name: &str,
        trust_policy: &PolicyDocument,
    ) -> PlatformResult<ResourceHandle<Role>> {
        let role = self.platform.create_role(name, trust_policy).await?;

        tracing::info!(action = "createRole", id = %role.id, name = %role.name, arn = %role.arn);

        let undo = Compensation::DeleteRole {
            role_name: name.to_string(),
        };
        Ok(ResourceHandle::reversible(role, undo))
    }

    /// Attach a managed policy to a role. Not undone on rollback.
    pub async fn attach_policy_to_role(
        &self,
        policy_arn: &str,
        role_name: &str,
    ) -> PlatformResult<ResourceHandle<RolePolicyAttachment>> {
        self.platform.attach_role_policy(role_name, policy_arn).await?;

        tracing::info!(action = "attachRolePolicy", policy_arn = %policy_arn, role_name = %role_name);

        Ok(ResourceHandle::irreversible(RolePolicyAttachment {
            policy_arn: policy_arn.to_string(),
            role_name: role_name.to_string(),
        }))
    }

    /// Install the rules-based role mapping on the identity pool: the
    /// `custom:role` claim selects the admin or user role, anything else is
    /// denied. Not undone on rollback.
    pub async fn set_role_mapping(
        &self,
        mapping: &TenantRoleMapping,
    ) -> PlatformResult<ResourceHandle<TenantRoleMapping>> {
        let roles = IdentityPoolRoles {
            identity_pool_id: mapping.identity_pool_id.clone(),
            authenticated_role_arn: mapping.authenticated_role_arn.clone(),
            provider_key: format!(
                "{}:{}",
                self.config.identity_provider_name(&mapping.user_pool_id),
                mapping.client_id
            ),
            rules: vec![
                MappingRule::for_role(TenantRole::TenantAdmin, &mapping.admin_role_arn),
                MappingRule::for_role(TenantRole::TenantUser, &mapping.user_role_arn),
            ],
            ambiguous_resolution: AmbiguousRoleResolution::Deny,
        };
        self.platform.set_identity_pool_roles(&roles).await?;

        tracing::info!(
            action = "setIdentityPoolRoles",
            user_pool_id = %mapping.user_pool_id,
            identity_pool_id = %mapping.identity_pool_id,
            client_id = %mapping.client_id,
            authenticated_role_arn = %mapping.authenticated_role_arn,
            user_role_arn = %mapping.user_role_arn,
            admin_role_arn = %mapping.admin_role_arn
        );

        Ok(ResourceHandle::irreversible(mapping.clone()))
    }

    /// Identity id of a user logged in through `provider`
    pub async fn identity_id(
        &self,
        identity_pool_id: &str,
        provider: &str,
        token: &str,
    ) -> PlatformResult<String> {
        self.platform
            .get_id(identity_pool_id, &self.config.account_id, provider, token)
            .await
    }

    /// Temporary credentials for an identity
    pub async fn credentials_for_identity(
        &self,
        identity_id: &str,
        provider: &str,
        token: &str,
    ) -> PlatformResult<IdentityCredentials> {
        self.platform
            .get_credentials_for_identity(identity_id, provider, token)
            .await
    }

    /// Run one compensation. The rollback record is emitted before the
    /// reversal is attempted.
    pub async fn compensate(&self, compensation: &Compensation) -> PlatformResult<()> {
        let action = compensation.action();
        match compensation {
            Compensation::DeleteUserPool { user_pool_id } => {
                tracing::info!(action, user_pool_id = %user_pool_id);
                self.platform.delete_user_pool(user_pool_id).await
            }
            Compensation::DeleteUserPoolClient { user_pool_id, client_id } => {
                tracing::info!(action, user_pool_id = %user_pool_id, client_id = %client_id);
                self.platform.delete_user_pool_client(user_pool_id, client_id).await
            }
            Compensation::DeleteIdentityPool { identity_pool_id } => {
                tracing::info!(action, identity_pool_id = %identity_pool_id);
                self.platform.delete_identity_pool(identity_pool_id).await
            }
            Compensation::DeleteUser { user_pool_id, username } => {
                tracing::info!(action, user_pool_id = %user_pool_id, username = %username);
                self.platform.admin_delete_user(user_pool_id, username).await
            }
            Compensation::DeletePolicy { policy_arn } => {
                tracing::info!(action, policy_arn = %policy_arn);
                self.platform.delete_policy(policy_arn).await
            }
            Compensation::DeleteRole { role_name } => {
                tracing::info!(action, role_name = %role_name);
                self.platform.delete_role(role_name).await
            }
        }
    }
}

#[async_trait]
impl<P: IdentityPlatform> Compensator for ResourceClient<P> {
    async fn compensate(&self, compensation: &Compensation) -> Result<(), PlatformError> {
        ResourceClient::compensate(self, compensation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{InMemoryPlatform, Operation};
    use crate::policy::{tenant_admin_policy, trust_policy};

    fn client() -> (Arc<InMemoryPlatform>, ResourceClient<InMemoryPlatform>) {
        let config = PlatformConfig::new("eu-west-1", "123456789012").unwrap();
        let platform = Arc::new(InMemoryPlatform::new(config.clone()));
        (platform.clone(), ResourceClient::new(platform, config))
    }

    #[tokio::test]
    async fn test_user_pool_handle_carries_delete() {
        let (platform, client) = client();
        let handle = client.create_user_pool("acme").await.unwrap();

        assert_eq!(handle.resource.name, "acme");
        assert_eq!(
            handle.compensation,
            Some(Compensation::DeleteUserPool { user_pool_id: handle.resource.id.clone() })
        );
        assert_eq!(
            platform.user_pool_settings(&handle.resource.id),
            Some(UserPoolSettings::tenant_default())
        );
    }

    #[tokio::test]
    async fn test_compensation_reverses_creation() {
        let (platform, client) = client();
        let pool = client.create_user_pool("acme").await.unwrap();
        let app = client.create_user_pool_client("acme", &pool.resource.id).await.unwrap();
        let role = client.create_role("r", &trust_policy("x")).await.unwrap();
        assert_eq!(platform.resource_count(), 3);

        for handle_undo in [role.compensation, app.compensation, pool.compensation] {
            client.compensate(&handle_undo.unwrap()).await.unwrap();
        }
        assert_eq!(platform.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_tenant_user_attributes() {
        let (platform, client) = client();
        let pool = client.create_user_pool("acme").await.unwrap().resource;
        let user = UserDescriptor::new("alice", "a@acme.io", "Alice", "A");

        let handle = client.create_tenant_user(&user, &pool.id, "acme").await.unwrap();
        assert_eq!(handle.resource.role, TenantRole::TenantAdmin);
        assert_eq!(handle.resource.user_pool_id, pool.id);

        let stored = platform.user(&pool.id, "alice").unwrap();
        assert_eq!(stored.attribute(TENANT_ID_ATTRIBUTE), Some("acme"));
        assert_eq!(stored.attribute(ROLE_ATTRIBUTE), Some("TenantAdmin"));
        assert_eq!(stored.attribute("given_name"), Some("Alice"));
        assert_eq!(stored.attribute("family_name"), Some("A"));
        assert_eq!(stored.delivery_mediums, vec![DeliveryMedium::Email]);
    }

    #[tokio::test]
    async fn test_identity_pool_binds_regional_provider() {
        let (platform, client) = client();
        let pool = client.create_user_pool("acme").await.unwrap().resource;
        let app = client.create_user_pool_client("acme", &pool.id).await.unwrap().resource;

        let idp = client.create_identity_pool(&app.id, &pool.id, "acme").await.unwrap();
        let identity_pool = platform.identity_pool(&idp.resource.id).unwrap();

        assert!(!identity_pool.allow_unauthenticated_identities);
        assert_eq!(
            identity_pool.providers[0].provider_name,
            format!("cognito-idp.eu-west-1.amazonaws.com/{}", pool.id)
        );
        assert!(identity_pool.providers[0].server_side_token_check);
    }

    #[tokio::test]
    async fn test_attach_has_no_compensation() {
        let (_, client) = client();
        let policy = client
            .create_policy("p", &tenant_admin_policy("arn:x"), None)
            .await
            .unwrap();
        client.create_role("r", &trust_policy("x")).await.unwrap();

        let attached = client.attach_policy_to_role(&policy.resource.arn, "r").await.unwrap();
        assert!(attached.compensation.is_none());
        assert_eq!(attached.resource.role_name, "r");
    }

    #[tokio::test]
    async fn test_platform_error_passes_through() {
        let (platform, client) = client();
        platform.fail_next(Operation::CreatePolicy, "AccessDenied", "not allowed");

        let err = client
            .create_policy("p", &tenant_admin_policy("arn:x"), Some("admin"))
            .await
            .unwrap_err();
        assert_eq!(err, PlatformError::new(Operation::CreatePolicy, "AccessDenied", "not allowed"));
    }

    #[tokio::test]
    async fn test_identity_exchange() {
        let (_, client) = client();
        let pool = client.create_user_pool("acme").await.unwrap().resource;
        let app = client.create_user_pool_client("acme", &pool.id).await.unwrap().resource;
        let idp = client.create_identity_pool(&app.id, &pool.id, "acme").await.unwrap().resource;
        let provider = client.config().identity_provider_name(&pool.id);

        let identity = client.identity_id(&idp.id, &provider, "jwt").await.unwrap();
        assert_eq!(client.identity_id(&idp.id, &provider, "jwt").await.unwrap(), identity);

        let creds = client.credentials_for_identity(&identity, &provider, "jwt").await.unwrap();
        assert!(creds.access_key_id.starts_with("ASIA"));
        assert!(creds.expiration.is_some());

        assert!(client.credentials_for_identity(&identity, &provider, "other").await.is_err());
    }
}
