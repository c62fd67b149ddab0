//! AWS identity platform
//!
//! Backs [`IdentityPlatform`] with Cognito user pools, Cognito identity pools
//! and IAM through the official SDK clients. Credentials come from the
//! default provider chain.

use super::{
    AmbiguousRoleResolution, DeliveryMedium, IdentityCredentials, IdentityPlatform, IdentityPool,
    IdentityPoolRoles, NewIdentityPool, NewUser, Operation, Policy, Role, UserPool, UserPoolClient,
    UserPoolClientSettings, UserPoolSettings,
};
use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::policy::PolicyDocument;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cognitoidentity::types as identity;
use aws_sdk_cognitoidentityprovider::types as idp;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};

/// Identity platform on AWS
#[derive(Debug, Clone)]
pub struct AwsPlatform {
    user_pools: aws_sdk_cognitoidentityprovider::Client,
    identity_pools: aws_sdk_cognitoidentity::Client,
    iam: aws_sdk_iam::Client,
}

impl AwsPlatform {
    /// Load SDK configuration for the configured region and build the clients
    pub async fn connect(config: &PlatformConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        tracing::info!(region = %config.region, account_id = %config.account_id, "AWS identity platform initialized");

        Self::from_sdk_config(&sdk_config)
    }

    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        Self {
            user_pools: aws_sdk_cognitoidentityprovider::Client::new(sdk_config),
            identity_pools: aws_sdk_cognitoidentity::Client::new(sdk_config),
            iam: aws_sdk_iam::Client::new(sdk_config),
        }
    }
}

/// Map an SDK failure, keeping the service's own error code
fn platform_error<E, R>(operation: Operation, err: SdkError<E, R>) -> PlatformError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.as_service_error() {
        Some(service) => PlatformError::new(
            operation,
            service.code().unwrap_or("Unknown"),
            service.message().unwrap_or_default(),
        ),
        None => PlatformError::new(operation, "Transport", DisplayErrorContext(&err).to_string()),
    }
}

fn invalid_request(operation: Operation, err: impl std::fmt::Display) -> PlatformError {
    PlatformError::new(operation, "InvalidRequest", err.to_string())
}

fn incomplete(operation: Operation, field: &str) -> PlatformError {
    PlatformError::new(operation, "IncompleteResponse", format!("response is missing {field}"))
}

fn policy_json(operation: Operation, document: &PolicyDocument) -> PlatformResult<String> {
    document.to_json().map_err(|e| invalid_request(operation, e))
}

fn schema_attribute(attribute: &super::SchemaAttribute) -> idp::SchemaAttributeType {
    let constraints = attribute.constraint.map(|c| {
        idp::StringAttributeConstraintsType::builder()
            .min_length(c.min.to_string())
            .max_length(c.max.to_string())
            .build()
    });
    idp::SchemaAttributeType::builder()
        .name(&attribute.name)
        .attribute_data_type(idp::AttributeDataType::String)
        .mutable(attribute.mutable)
        .required(attribute.required)
        .set_string_attribute_constraints(constraints)
        .build()
}

#[async_trait]
impl IdentityPlatform for AwsPlatform {
    async fn create_user_pool(&self, name: &str, settings: &UserPoolSettings) -> PlatformResult<UserPool> {
        const OP: Operation = Operation::CreateUserPool;

        let invite = idp::MessageTemplateType::builder()
            .email_subject(&settings.invite_email_subject)
            .email_message(&settings.invite_email_message)
            .build();
        let admin_create = idp::AdminCreateUserConfigType::builder()
            .allow_admin_create_user_only(settings.admin_create_user_only)
            .invite_message_template(invite)
            .build();
        let password = &settings.password_policy;
        let password_policy = idp::PasswordPolicyType::builder()
            .minimum_length(password.minimum_length)
            .require_lowercase(password.require_lowercase)
            .require_uppercase(password.require_uppercase)
            .require_numbers(password.require_numbers)
            .require_symbols(password.require_symbols)
            .temporary_password_validity_days(settings.unused_account_validity_days)
            .build();
        let mfa = if settings.mfa_enabled {
            idp::UserPoolMfaType::On
        } else {
            idp::UserPoolMfaType::Off
        };

        let output = self
            .user_pools
            .create_user_pool()
            .pool_name(name)
            .admin_create_user_config(admin_create)
            .policies(idp::UserPoolPolicyType::builder().password_policy(password_policy).build())
            .set_alias_attributes(Some(
                settings
                    .alias_attributes
                    .iter()
                    .map(|a| idp::AliasAttributeType::from(a.as_str()))
                    .collect(),
            ))
            .set_auto_verified_attributes(Some(
                settings
                    .auto_verified_attributes
                    .iter()
                    .map(|a| idp::VerifiedAttributeType::from(a.as_str()))
                    .collect(),
            ))
            .mfa_configuration(mfa)
            .set_schema(Some(settings.schema.iter().map(schema_attribute).collect()))
            .send()
            .await
            .map_err(|e| platform_error(OP, e))?;

        let pool = output.user_pool().ok_or_else(|| incomplete(OP, "UserPool"))?;
        Ok(UserPool {
            id: pool.id().ok_or_else(|| incomplete(OP, "UserPool.Id"))?.to_string(),
            name: pool.name().unwrap_or(name).to_string(),
        })
    }

    async fn delete_user_pool(&self, user_pool_id: &str) -> PlatformResult<()> {
        self.user_pools
            .delete_user_pool()
            .user_pool_id(user_pool_id)
            .send()
            .await
            .map_err(|e| platform_error(Operation::DeleteUserPool, e))?;
        Ok(())
    }

    async fn create_user_pool_client(
        &self,
        user_pool_id: &str,
        name: &str,
        settings: &UserPoolClientSettings,
    ) -> PlatformResult<UserPoolClient> {
        const OP: Operation = Operation::CreateUserPoolClient;

        let output = self
            .user_pools
            .create_user_pool_client()
            .user_pool_id(user_pool_id)
            .client_name(name)
            .generate_secret(settings.generate_secret)
            .refresh_token_validity(settings.refresh_token_validity)
            .set_read_attributes(Some(settings.read_attributes.clone()))
            .set_write_attributes(Some(settings.write_attributes.clone()))
            .send()
            .await
            .map_err(|e| platform_error(OP, e))?;

        let client = output
            .user_pool_client()
            .ok_or_else(|| incomplete(OP, "UserPoolClient"))?;
        Ok(UserPoolClient {
            id: client
                .client_id()
                .ok_or_else(|| incomplete(OP, "UserPoolClient.ClientId"))?
                .to_string(),
            name: client.client_name().unwrap_or(name).to_string(),
            user_pool_id: client.user_pool_id().unwrap_or(user_pool_id).to_string(),
        })
    }

    async fn delete_user_pool_client(&self, user_pool_id: &str, client_id: &str) -> PlatformResult<()> {
        self.user_pools
            .delete_user_pool_client()
            .user_pool_id(user_pool_id)
            .client_id(client_id)
            .send()
            .await
            .map_err(|e| platform_error(Operation::DeleteUserPoolClient, e))?;
        Ok(())
    }

    async fn create_identity_pool(&self, pool: &NewIdentityPool) -> PlatformResult<IdentityPool> {
        let providers = pool
            .providers
            .iter()
            .map(|p| {
                identity::CognitoIdentityProvider::builder()
                    .provider_name(&p.provider_name)
                    .client_id(&p.client_id)
                    .server_side_token_check(p.server_side_token_check)
                    .build()
            })
            .collect();

        let output = self
            .identity_pools
            .create_identity_pool()
            .identity_pool_name(&pool.name)
            .allow_unauthenticated_identities(pool.allow_unauthenticated_identities)
            .set_cognito_identity_providers(Some(providers))
            .send()
            .await
            .map_err(|e| platform_error(Operation::CreateIdentityPool, e))?;

        Ok(IdentityPool {
            id: output.identity_pool_id().to_string(),
            name: output.identity_pool_name().to_string(),
        })
    }

    async fn delete_identity_pool(&self, identity_pool_id: &str) -> PlatformResult<()> {
        self.identity_pools
            .delete_identity_pool()
            .identity_pool_id(identity_pool_id)
            .send()
            .await
            .map_err(|e| platform_error(Operation::DeleteIdentityPool, e))?;
        Ok(())
    }

    async fn admin_create_user(&self, user: &NewUser) -> PlatformResult<()> {
        const OP: Operation = Operation::AdminCreateUser;

        let attributes = user
            .attributes
            .iter()
            .map(|a| {
                idp::AttributeType::builder()
                    .name(&a.name)
                    .value(&a.value)
                    .build()
                    .map_err(|e| invalid_request(OP, e))
            })
            .collect::<PlatformResult<Vec<_>>>()?;
        let mediums = user
            .delivery_mediums
            .iter()
            .map(|m| match m {
                DeliveryMedium::Email => idp::DeliveryMediumType::Email,
                DeliveryMedium::Sms => idp::DeliveryMediumType::Sms,
            })
            .collect();

        self.user_pools
            .admin_create_user()
            .user_pool_id(&user.user_pool_id)
            .username(&user.username)
            .set_user_attributes(Some(attributes))
            .set_desired_delivery_mediums(Some(mediums))
            .force_alias_creation(user.force_alias_creation)
            .send()
            .await
            .map_err(|e| platform_error(OP, e))?;
        Ok(())
    }

    async fn admin_delete_user(&self, user_pool_id: &str, username: &str) -> PlatformResult<()> {
        self.user_pools
            .admin_delete_user()
            .user_pool_id(user_pool_id)
            .username(username)
            .send()
            .await
            .map_err(|e| platform_error(Operation::AdminDeleteUser, e))?;
        Ok(())
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        description: &str,
    ) -> PlatformResult<Policy> {
        const OP: Operation = Operation::CreatePolicy;

        let mut request = self
            .iam
            .create_policy()
            .policy_name(name)
            .policy_document(policy_json(OP, document)?);
        if !description.is_empty() {
            request = request.description(description);
        }
        let output = request.send().await.map_err(|e| platform_error(OP, e))?;

        let policy = output.policy().ok_or_else(|| incomplete(OP, "Policy"))?;
        Ok(Policy {
            id: policy.policy_id().unwrap_or_default().to_string(),
            name: policy.policy_name().unwrap_or(name).to_string(),
            arn: policy.arn().ok_or_else(|| incomplete(OP, "Policy.Arn"))?.to_string(),
        })
    }

    async fn delete_policy(&self, policy_arn: &str) -> PlatformResult<()> {
        self.iam
            .delete_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| platform_error(Operation::DeletePolicy, e))?;
        Ok(())
    }

    async fn create_role(&self, name: &str, assume_role_policy: &PolicyDocument) -> PlatformResult<Role> {
        const OP: Operation = Operation::CreateRole;

        let output = self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(policy_json(OP, assume_role_policy)?)
            .send()
            .await
            .map_err(|e| platform_error(OP, e))?;

        let role = output.role().ok_or_else(|| incomplete(OP, "Role"))?;
        Ok(Role {
            id: role.role_id().to_string(),
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
        })
    }

    async fn delete_role(&self, role_name: &str) -> PlatformResult<()> {
        self.iam
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| platform_error(Operation::DeleteRole, e))?;
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> PlatformResult<()> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| platform_error(Operation::AttachRolePolicy, e))?;
        Ok(())
    }

    async fn set_identity_pool_roles(&self, roles: &IdentityPoolRoles) -> PlatformResult<()> {
        const OP: Operation = Operation::SetIdentityPoolRoles;

        let rules = roles
            .rules
            .iter()
            .map(|r| {
                identity::MappingRule::builder()
                    .claim(&r.claim)
                    .match_type(identity::MappingRuleMatchType::Equals)
                    .value(&r.value)
                    .role_arn(&r.role_arn)
                    .build()
                    .map_err(|e| invalid_request(OP, e))
            })
            .collect::<PlatformResult<Vec<_>>>()?;
        let rules = identity::RulesConfigurationType::builder()
            .set_rules(Some(rules))
            .build()
            .map_err(|e| invalid_request(OP, e))?;
        let resolution = match roles.ambiguous_resolution {
            AmbiguousRoleResolution::AuthenticatedRole => identity::AmbiguousRoleResolutionType::AuthenticatedRole,
            AmbiguousRoleResolution::Deny => identity::AmbiguousRoleResolutionType::Deny,
        };
        let mapping = identity::RoleMapping::builder()
            .r#type(identity::RoleMappingType::Rules)
            .ambiguous_role_resolution(resolution)
            .rules_configuration(rules)
            .build()
            .map_err(|e| invalid_request(OP, e))?;

        self.identity_pools
            .set_identity_pool_roles()
            .identity_pool_id(&roles.identity_pool_id)
            .roles("authenticated", &roles.authenticated_role_arn)
            .role_mappings(&roles.provider_key, mapping)
            .send()
            .await
            .map_err(|e| platform_error(OP, e))?;
        Ok(())
    }

    async fn get_id(
        &self,
        identity_pool_id: &str,
        account_id: &str,
        provider: &str,
        token: &str,
    ) -> PlatformResult<String> {
        const OP: Operation = Operation::GetId;

        let output = self
            .identity_pools
            .get_id()
            .account_id(account_id)
            .identity_pool_id(identity_pool_id)
            .logins(provider, token)
            .send()
            .await
            .map_err(|e| platform_error(OP, e))?;

        output
            .identity_id()
            .map(str::to_string)
            .ok_or_else(|| incomplete(OP, "IdentityId"))
    }

    async fn get_credentials_for_identity(
        &self,
        identity_id: &str,
        provider: &str,
        token: &str,
    ) -> PlatformResult<IdentityCredentials> {
        const OP: Operation = Operation::GetCredentialsForIdentity;

        let output = self
            .identity_pools
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .logins(provider, token)
            .send()
            .await
            .map_err(|e| platform_error(OP, e))?;

        let credentials = output.credentials().ok_or_else(|| incomplete(OP, "Credentials"))?;
        let expiration = credentials
            .expiration()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));

        Ok(IdentityCredentials {
            access_key_id: credentials.access_key_id().unwrap_or_default().to_string(),
            secret_key: credentials.secret_key().unwrap_or_default().to_string(),
            session_token: credentials.session_token().unwrap_or_default().to_string(),
            expiration,
        })
    }
}
