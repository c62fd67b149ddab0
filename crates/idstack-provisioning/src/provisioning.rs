//! Tenant Provisioning
//!
//! `provision_tenant` builds the complete identity stack of a tenant as a
//! saga: every reversible creation registers its undo, and a failure at any
//! step tears down what was created so far, newest first.
//!
//! `add_tenant_user` is the single-call variant for an existing tenant. It
//! keeps no undo log; failures propagate as they are.

use crate::compensation::Compensation;
use crate::config::ProvisioningSettings;
use crate::error::{PlatformError, PlatformResult, ProvisioningError};
use crate::model::{TenantIdentityStack, TenantProvisioningRequest, TenantRole, UserDescriptor};
use crate::platform::{IdentityPlatform, IdentityPool, Operation, Policy, Role, UserPool, UserPoolClient};
use crate::policy::{tenant_admin_policy, tenant_user_policy, trust_policy, PolicyDocument};
use crate::resources::{ResourceClient, ResourceHandle, TenantRoleMapping, TenantUser};
use crate::saga::{Saga, SagaExecution, SagaFailure, SagaStep};
use async_trait::async_trait;
use std::sync::Arc;

/// Saga type recorded on tenant executions
pub const TENANT_SAGA: &str = "tenant_provisioning";

/// Steps of tenant provisioning, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantStep {
    CreateUserPool,
    CreateUserPoolClient,
    CreateIdentityPool,
    /// Local only: builds the trust policy shared by all three roles
    DeriveTrustPolicy,
    CreateAdminUser,
    CreateAdminPolicy,
    CreateUserPolicy,
    CreateAuthenticatedRole,
    CreateAdminRole,
    CreateUserRole,
    AttachAdminPolicy,
    AttachUserPolicy,
    SetRoleMapping,
}

/// Every tenant step, in execution order
pub const TENANT_STEPS: [TenantStep; 13] = [
    TenantStep::CreateUserPool,
    TenantStep::CreateUserPoolClient,
    TenantStep::CreateIdentityPool,
    TenantStep::DeriveTrustPolicy,
    TenantStep::CreateAdminUser,
    TenantStep::CreateAdminPolicy,
    TenantStep::CreateUserPolicy,
    TenantStep::CreateAuthenticatedRole,
    TenantStep::CreateAdminRole,
    TenantStep::CreateUserRole,
    TenantStep::AttachAdminPolicy,
    TenantStep::AttachUserPolicy,
    TenantStep::SetRoleMapping,
];

impl TenantStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateUserPool => "createUserPool",
            Self::CreateUserPoolClient => "createUserPoolClient",
            Self::CreateIdentityPool => "createIdentityPool",
            Self::DeriveTrustPolicy => "deriveTrustPolicy",
            Self::CreateAdminUser => "createAdminUser",
            Self::CreateAdminPolicy => "createAdminPolicy",
            Self::CreateUserPolicy => "createUserPolicy",
            Self::CreateAuthenticatedRole => "createAuthenticatedRole",
            Self::CreateAdminRole => "createAdminRole",
            Self::CreateUserRole => "createUserRole",
            Self::AttachAdminPolicy => "attachAdminPolicy",
            Self::AttachUserPolicy => "attachUserPolicy",
            Self::SetRoleMapping => "setRoleMapping",
        }
    }

    /// 1-based position in [`TENANT_STEPS`]
    pub fn index(&self) -> usize {
        TENANT_STEPS.iter().position(|s| s == self).map_or(0, |i| i + 1)
    }

    /// Whether the step creates something that rollback removes
    pub fn reversible(&self) -> bool {
        !matches!(
            self,
            Self::DeriveTrustPolicy | Self::AttachAdminPolicy | Self::AttachUserPolicy | Self::SetRoleMapping
        )
    }

    /// Platform call the step makes. The trust policy step makes none and
    /// reports as the role creation it feeds.
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateUserPool => Operation::CreateUserPool,
            Self::CreateUserPoolClient => Operation::CreateUserPoolClient,
            Self::CreateIdentityPool => Operation::CreateIdentityPool,
            Self::DeriveTrustPolicy => Operation::CreateRole,
            Self::CreateAdminUser => Operation::AdminCreateUser,
            Self::CreateAdminPolicy | Self::CreateUserPolicy => Operation::CreatePolicy,
            Self::CreateAuthenticatedRole | Self::CreateAdminRole | Self::CreateUserRole => {
                Operation::CreateRole
            }
            Self::AttachAdminPolicy | Self::AttachUserPolicy => Operation::AttachRolePolicy,
            Self::SetRoleMapping => Operation::SetIdentityPoolRoles,
        }
    }
}

impl std::fmt::Display for TenantStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outputs accumulated while a tenant is provisioned
struct TenantState {
    request: TenantProvisioningRequest,
    user_pool: Option<UserPool>,
    user_pool_client: Option<UserPoolClient>,
    identity_pool: Option<IdentityPool>,
    trust_policy: Option<PolicyDocument>,
    admin_policy: Option<Policy>,
    user_policy: Option<Policy>,
    authenticated_role: Option<Role>,
    admin_role: Option<Role>,
    user_role: Option<Role>,
    stack: Option<TenantIdentityStack>,
}

impl TenantState {
    fn new(request: TenantProvisioningRequest) -> Self {
        Self {
            request,
            user_pool: None,
            user_pool_client: None,
            identity_pool: None,
            trust_policy: None,
            admin_policy: None,
            user_policy: None,
            authenticated_role: None,
            admin_role: None,
            user_role: None,
            stack: None,
        }
    }

    fn tenant_id(&self) -> &str {
        &self.request.tenant_id
    }
}

fn missing(step: TenantStep, what: &str) -> PlatformError {
    PlatformError::new(
        step.operation(),
        "MissingDependency",
        format!("{step} needs the {what} of an earlier step"),
    )
}

fn require<'a, T>(value: &'a Option<T>, step: TenantStep, what: &str) -> Result<&'a T, PlatformError> {
    value.as_ref().ok_or_else(|| missing(step, what))
}

/// Policy and role names derived from the tenant id
fn tenant_resource_name(tenant_id: &str, suffix: &str) -> String {
    format!("tenant-{tenant_id}-{suffix}")
}

/// A tenant step bound to the resource client it drives
struct BoundStep<P> {
    step: TenantStep,
    client: Arc<ResourceClient<P>>,
    settings: Arc<ProvisioningSettings>,
}

impl<P: IdentityPlatform> BoundStep<P> {
    async fn create_role(
        &self,
        state: &TenantState,
        suffix: &str,
    ) -> Result<ResourceHandle<Role>, PlatformError> {
        let trust = require(&state.trust_policy, self.step, "trust policy")?;
        self.client
            .create_role(&tenant_resource_name(state.tenant_id(), suffix), trust)
            .await
    }

    async fn attach(&self, policy: &Option<Policy>, role: &Option<Role>) -> Result<(), PlatformError> {
        let policy = require(policy, self.step, "policy")?;
        let role = require(role, self.step, "role")?;
        self.client.attach_policy_to_role(&policy.arn, &role.name).await?;
        Ok(())
    }
}

#[async_trait]
impl<P: IdentityPlatform + 'static> SagaStep<TenantState> for BoundStep<P> {
    fn name(&self) -> &str {
        self.step.name()
    }

    fn reversible(&self) -> bool {
        self.step.reversible()
    }

    async fn execute(&self, state: &mut TenantState) -> Result<Option<Compensation>, PlatformError> {
        let client = &self.client;
        let step = self.step;

        let undo = match step {
            TenantStep::CreateUserPool => {
                let (pool, undo) = client.create_user_pool(state.tenant_id()).await?.into_parts();
                state.user_pool = Some(pool);
                undo
            }
            TenantStep::CreateUserPoolClient => {
                let pool = require(&state.user_pool, step, "user pool")?;
                let (app, undo) = client
                    .create_user_pool_client(state.tenant_id(), &pool.id)
                    .await?
                    .into_parts();
                state.user_pool_client = Some(app);
                undo
            }
            TenantStep::CreateIdentityPool => {
                let pool = require(&state.user_pool, step, "user pool")?;
                let app = require(&state.user_pool_client, step, "user pool client")?;
                let (identity_pool, undo) = client
                    .create_identity_pool(&app.id, &pool.id, state.tenant_id())
                    .await?
                    .into_parts();
                state.identity_pool = Some(identity_pool);
                undo
            }
            TenantStep::DeriveTrustPolicy => {
                let identity_pool = require(&state.identity_pool, step, "identity pool")?;
                state.trust_policy = Some(trust_policy(&identity_pool.id));
                None
            }
            TenantStep::CreateAdminUser => {
                let pool = require(&state.user_pool, step, "user pool")?;
                let admin = state
                    .request
                    .user
                    .clone()
                    .with_default_role(TenantRole::TenantAdmin);
                client
                    .create_tenant_user(&admin, &pool.id, state.tenant_id())
                    .await?
                    .compensation
            }
            TenantStep::CreateAdminPolicy => {
                let pool = require(&state.user_pool, step, "user pool")?;
                let document = tenant_admin_policy(&client.config().user_pool_arn(&pool.id));
                let (policy, undo) = client
                    .create_policy(&tenant_resource_name(state.tenant_id(), "admin-policy"), &document, None)
                    .await?
                    .into_parts();
                state.admin_policy = Some(policy);
                undo
            }
            TenantStep::CreateUserPolicy => {
                let pool = require(&state.user_pool, step, "user pool")?;
                let document = tenant_user_policy(
                    &client.config().user_pool_arn(&pool.id),
                    state.tenant_id(),
                    &self.settings.storage_bucket,
                );
                let (policy, undo) = client
                    .create_policy(&tenant_resource_name(state.tenant_id(), "user-policy"), &document, None)
                    .await?
                    .into_parts();
                state.user_policy = Some(policy);
                undo
            }
            TenantStep::CreateAuthenticatedRole => {
                let (role, undo) = self.create_role(state, "authenticated-role").await?.into_parts();
                state.authenticated_role = Some(role);
                undo
            }
            TenantStep::CreateAdminRole => {
                let (role, undo) = self.create_role(state, "admin-role").await?.into_parts();
                state.admin_role = Some(role);
                undo
            }
            TenantStep::CreateUserRole => {
                let (role, undo) = self.create_role(state, "user-role").await?.into_parts();
                state.user_role = Some(role);
                undo
            }
            TenantStep::AttachAdminPolicy => {
                self.attach(&state.admin_policy, &state.admin_role).await?;
                None
            }
            TenantStep::AttachUserPolicy => {
                self.attach(&state.user_policy, &state.user_role).await?;
                None
            }
            TenantStep::SetRoleMapping => {
                let stack = TenantIdentityStack {
                    tenant_id: state.tenant_id().to_string(),
                    user_pool_id: require(&state.user_pool, step, "user pool")?.id.clone(),
                    client_id: require(&state.user_pool_client, step, "user pool client")?.id.clone(),
                    identity_pool_id: require(&state.identity_pool, step, "identity pool")?.id.clone(),
                    authenticated_role_arn: require(&state.authenticated_role, step, "authenticated role")?
                        .arn
                        .clone(),
                    admin_role_arn: require(&state.admin_role, step, "admin role")?.arn.clone(),
                    user_role_arn: require(&state.user_role, step, "user role")?.arn.clone(),
                };
                client
                    .set_role_mapping(&TenantRoleMapping {
                        user_pool_id: stack.user_pool_id.clone(),
                        identity_pool_id: stack.identity_pool_id.clone(),
                        client_id: stack.client_id.clone(),
                        authenticated_role_arn: stack.authenticated_role_arn.clone(),
                        admin_role_arn: stack.admin_role_arn.clone(),
                        user_role_arn: stack.user_role_arn.clone(),
                    })
                    .await?;
                state.stack = Some(stack);
                None
            }
        };
        Ok(undo)
    }
}

/// Provisions tenant identity stacks on one platform
pub struct TenantProvisioner<P> {
    client: Arc<ResourceClient<P>>,
    settings: Arc<ProvisioningSettings>,
    saga: Saga<TenantState>,
}

impl<P: IdentityPlatform + 'static> TenantProvisioner<P> {
    pub fn new(client: ResourceClient<P>, settings: ProvisioningSettings) -> Self {
        let client = Arc::new(client);
        let settings = Arc::new(settings);
        let saga = TENANT_STEPS.iter().fold(Saga::new(TENANT_SAGA), |saga, step| {
            saga.step(BoundStep {
                step: *step,
                client: client.clone(),
                settings: settings.clone(),
            })
        });

        Self {
            client,
            settings,
            saga,
        }
    }

    pub fn client(&self) -> &ResourceClient<P> {
        &self.client
    }

    pub fn settings(&self) -> &ProvisioningSettings {
        &self.settings
    }

    /// Create the full identity stack of a tenant.
    ///
    /// On failure everything created so far is removed, newest first, and
    /// the step's error is returned. If a removal fails as well the result
    /// is [`ProvisioningError::RollbackFailed`], carrying both errors.
    pub async fn provision_tenant(
        &self,
        request: TenantProvisioningRequest,
    ) -> Result<TenantIdentityStack, ProvisioningError> {
        self.provision_tenant_traced(request)
            .await
            .map(|(stack, _)| stack)
            .map_err(|failure| failure.error)
    }

    /// Like [`provision_tenant`](Self::provision_tenant), also returning the
    /// execution trace. A request that fails validation comes back with a
    /// trace where no step ran.
    pub async fn provision_tenant_traced(
        &self,
        request: TenantProvisioningRequest,
    ) -> Result<(TenantIdentityStack, SagaExecution), SagaFailure> {
        if let Err(error) = request.validate() {
            tracing::warn!(tenant_id = %request.tenant_id, error = %error, "rejected provisioning request");
            return Err(SagaFailure {
                error,
                execution: SagaExecution::new(TENANT_SAGA, self.saga.step_names()),
            });
        }

        let tenant_id = request.tenant_id.clone();
        tracing::info!(tenant_id = %tenant_id, steps = self.saga.len(), "provisioning tenant");

        let mut state = TenantState::new(request);
        let execution = match self.saga.run(&mut state, self.client.as_ref()).await {
            Ok(execution) => execution,
            Err(failure) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    execution_id = %failure.execution.id,
                    rolled_back = failure.error.rolled_back(),
                    error = %failure.error,
                    "tenant provisioning failed"
                );
                return Err(failure);
            }
        };

        let Some(stack) = state.stack else {
            return Err(SagaFailure {
                error: missing(TenantStep::SetRoleMapping, "identity stack").into(),
                execution,
            });
        };

        tracing::info!(
            tenant_id = %tenant_id,
            execution_id = %execution.id,
            user_pool_id = %stack.user_pool_id,
            identity_pool_id = %stack.identity_pool_id,
            "tenant provisioned"
        );
        Ok((stack, execution))
    }

    /// Add a user to an existing tenant pool. The role defaults to
    /// `TenantUser`. Nothing is undone on failure.
    pub async fn add_tenant_user(
        &self,
        tenant_id: &str,
        user_pool_id: &str,
        user: UserDescriptor,
    ) -> PlatformResult<ResourceHandle<TenantUser>> {
        let user = user.with_default_role(TenantRole::TenantUser);
        self.client.create_tenant_user(&user, user_pool_id, tenant_id).await
    }
}
