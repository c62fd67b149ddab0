//! In-memory identity platform
//!
//! Deterministic stand-in for the remote platform: sequential ids, the same
//! uniqueness and existence rules as the real service, a journal of every
//! call, and per-operation fault injection. Backs the test suite and the
//! CLI's dry-run mode.

use super::{
    IdentityCredentials, IdentityPlatform, IdentityPool, IdentityPoolRoles, NewIdentityPool, NewUser,
    Operation, Policy, Role, UserPool, UserPoolClient, UserPoolClientSettings, UserPoolSettings,
};
use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::policy::PolicyDocument;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// One recorded platform call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformCall {
    pub operation: Operation,
    /// Main identifier the call addressed (name, id or ARN)
    pub target: String,
}

struct StoredUserPool {
    pool: UserPool,
    settings: UserPoolSettings,
    users: HashMap<String, NewUser>,
}

struct StoredIdentityPool {
    request: NewIdentityPool,
    roles: Option<IdentityPoolRoles>,
}

struct StoredPolicy {
    policy: Policy,
    document: PolicyDocument,
    attachments: u32,
}

struct StoredRole {
    role: Role,
    trust: PolicyDocument,
    attached: Vec<String>,
}

struct Fault {
    operation: Operation,
    /// Fails the call whose per-operation count equals this (1-based)
    nth: u32,
    error: PlatformError,
}

/// In-memory identity platform
pub struct InMemoryPlatform {
    config: PlatformConfig,
    user_pools: DashMap<String, StoredUserPool>,
    clients: DashMap<String, UserPoolClient>,
    identity_pools: DashMap<String, StoredIdentityPool>,
    policies: DashMap<String, StoredPolicy>,
    roles: DashMap<String, StoredRole>,
    identities: DashMap<(String, String, String), String>,
    sequence: AtomicU64,
    journal: Mutex<Vec<PlatformCall>>,
    counts: Mutex<HashMap<Operation, u32>>,
    faults: Mutex<Vec<Fault>>,
    strict_dependencies: bool,
}

impl InMemoryPlatform {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            user_pools: DashMap::new(),
            clients: DashMap::new(),
            identity_pools: DashMap::new(),
            policies: DashMap::new(),
            roles: DashMap::new(),
            identities: DashMap::new(),
            sequence: AtomicU64::new(0),
            journal: Mutex::new(Vec::new()),
            counts: Mutex::new(HashMap::new()),
            faults: Mutex::new(Vec::new()),
            strict_dependencies: false,
        }
    }

    /// Refuse to delete roles that still have policies attached, and
    /// policies that are still attached, like the real IAM service does.
    pub fn with_strict_dependencies(mut self) -> Self {
        self.strict_dependencies = true;
        self
    }

    /// Fail the next call of `operation`
    pub fn fail_next(&self, operation: Operation, code: &str, message: &str) {
        let nth = self.counts.lock().get(&operation).copied().unwrap_or(0) + 1;
        self.fail_nth(operation, nth, code, message);
    }

    /// Fail the `nth` call (1-based, counted from platform creation) of `operation`
    pub fn fail_nth(&self, operation: Operation, nth: u32, code: &str, message: &str) {
        self.faults.lock().push(Fault {
            operation,
            nth,
            error: PlatformError::new(operation, code, message),
        });
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.journal.lock().clone()
    }

    /// Operations made so far, in order
    pub fn operations(&self) -> Vec<Operation> {
        self.journal.lock().iter().map(|c| c.operation).collect()
    }

    /// Number of live resources of any kind
    pub fn resource_count(&self) -> usize {
        let users: usize = self.user_pools.iter().map(|p| p.users.len()).sum();
        self.user_pools.len()
            + users
            + self.clients.len()
            + self.identity_pools.len()
            + self.policies.len()
            + self.roles.len()
    }

    pub fn user_pool(&self, user_pool_id: &str) -> Option<UserPool> {
        self.user_pools.get(user_pool_id).map(|p| p.pool.clone())
    }

    pub fn user_pool_settings(&self, user_pool_id: &str) -> Option<UserPoolSettings> {
        self.user_pools.get(user_pool_id).map(|p| p.settings.clone())
    }

    pub fn user(&self, user_pool_id: &str, username: &str) -> Option<NewUser> {
        self.user_pools
            .get(user_pool_id)
            .and_then(|p| p.users.get(username).cloned())
    }

    pub fn identity_pool(&self, identity_pool_id: &str) -> Option<NewIdentityPool> {
        self.identity_pools.get(identity_pool_id).map(|p| p.request.clone())
    }

    pub fn identity_pool_roles(&self, identity_pool_id: &str) -> Option<IdentityPoolRoles> {
        self.identity_pools
            .get(identity_pool_id)
            .and_then(|p| p.roles.clone())
    }

    pub fn policy_document(&self, policy_arn: &str) -> Option<PolicyDocument> {
        self.policies.get(policy_arn).map(|p| p.document.clone())
    }

    pub fn role(&self, role_name: &str) -> Option<Role> {
        self.roles.get(role_name).map(|r| r.role.clone())
    }

    pub fn role_trust_policy(&self, role_name: &str) -> Option<PolicyDocument> {
        self.roles.get(role_name).map(|r| r.trust.clone())
    }

    pub fn role_attachments(&self, role_name: &str) -> Vec<String> {
        self.roles
            .get(role_name)
            .map(|r| r.attached.clone())
            .unwrap_or_default()
    }

    /// Record the call and apply any injected fault
    fn enter(&self, operation: Operation, target: &str) -> PlatformResult<()> {
        tracing::trace!(operation = %operation, resource = %target, "platform call");
        self.journal.lock().push(PlatformCall {
            operation,
            target: target.to_string(),
        });

        let count = {
            let mut counts = self.counts.lock();
            let count = counts.entry(operation).or_insert(0);
            *count += 1;
            *count
        };

        let mut faults = self.faults.lock();
        if let Some(pos) = faults
            .iter()
            .position(|f| f.operation == operation && f.nth == count)
        {
            let fault = faults.remove(pos);
            tracing::debug!(operation = %operation, code = %fault.error.code, "injected fault");
            return Err(fault.error);
        }
        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn iam_arn(&self, kind: &str, name: &str) -> String {
        format!("arn:aws:iam::{}:{}/{}", self.config.account_id, kind, name)
    }
}

fn not_found(operation: Operation, what: &str, id: &str) -> PlatformError {
    let code = match operation {
        Operation::CreatePolicy
        | Operation::DeletePolicy
        | Operation::CreateRole
        | Operation::DeleteRole
        | Operation::AttachRolePolicy => "NoSuchEntity",
        Operation::AdminDeleteUser => "UserNotFoundException",
        _ => "ResourceNotFoundException",
    };
    PlatformError::new(operation, code, format!("{what} {id} does not exist"))
}

#[async_trait]
impl IdentityPlatform for InMemoryPlatform {
    async fn create_user_pool(&self, name: &str, settings: &UserPoolSettings) -> PlatformResult<UserPool> {
        self.enter(Operation::CreateUserPool, name)?;
        let pool = UserPool {
            id: format!("{}_{:09}", self.config.region, self.next_id()),
            name: name.to_string(),
        };
        self.user_pools.insert(
            pool.id.clone(),
            StoredUserPool {
                pool: pool.clone(),
                settings: settings.clone(),
                users: HashMap::new(),
            },
        );
        Ok(pool)
    }

    async fn delete_user_pool(&self, user_pool_id: &str) -> PlatformResult<()> {
        self.enter(Operation::DeleteUserPool, user_pool_id)?;
        self.user_pools
            .remove(user_pool_id)
            .ok_or_else(|| not_found(Operation::DeleteUserPool, "user pool", user_pool_id))?;
        self.clients.retain(|_, c| c.user_pool_id != user_pool_id);
        Ok(())
    }

    async fn create_user_pool_client(
        &self,
        user_pool_id: &str,
        name: &str,
        _settings: &UserPoolClientSettings,
    ) -> PlatformResult<UserPoolClient> {
        self.enter(Operation::CreateUserPoolClient, name)?;
        if !self.user_pools.contains_key(user_pool_id) {
            return Err(not_found(Operation::CreateUserPoolClient, "user pool", user_pool_id));
        }
        let client = UserPoolClient {
            id: format!("client{:020}", self.next_id()),
            name: name.to_string(),
            user_pool_id: user_pool_id.to_string(),
        };
        self.clients.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    async fn delete_user_pool_client(&self, user_pool_id: &str, client_id: &str) -> PlatformResult<()> {
        self.enter(Operation::DeleteUserPoolClient, client_id)?;
        self.clients
            .remove_if(client_id, |_, c| c.user_pool_id == user_pool_id)
            .map(|_| ())
            .ok_or_else(|| not_found(Operation::DeleteUserPoolClient, "client", client_id))
    }

    async fn create_identity_pool(&self, pool: &NewIdentityPool) -> PlatformResult<IdentityPool> {
        self.enter(Operation::CreateIdentityPool, &pool.name)?;
        for provider in &pool.providers {
            if !self.clients.contains_key(&provider.client_id) {
                return Err(not_found(Operation::CreateIdentityPool, "client", &provider.client_id));
            }
        }
        let created = IdentityPool {
            id: format!(
                "{}:00000000-0000-0000-0000-{:012}",
                self.config.region,
                self.next_id()
            ),
            name: pool.name.clone(),
        };
        self.identity_pools.insert(
            created.id.clone(),
            StoredIdentityPool {
                request: pool.clone(),
                roles: None,
            },
        );
        Ok(created)
    }

    async fn delete_identity_pool(&self, identity_pool_id: &str) -> PlatformResult<()> {
        self.enter(Operation::DeleteIdentityPool, identity_pool_id)?;
        self.identity_pools
            .remove(identity_pool_id)
            .map(|_| ())
            .ok_or_else(|| not_found(Operation::DeleteIdentityPool, "identity pool", identity_pool_id))
    }

    async fn admin_create_user(&self, user: &NewUser) -> PlatformResult<()> {
        self.enter(Operation::AdminCreateUser, &user.username)?;
        let mut pool = self
            .user_pools
            .get_mut(&user.user_pool_id)
            .ok_or_else(|| not_found(Operation::AdminCreateUser, "user pool", &user.user_pool_id))?;

        for attribute in &user.attributes {
            if let Some(custom) = attribute.name.strip_prefix("custom:") {
                if !pool.settings.schema.iter().any(|a| a.custom && a.name == custom) {
                    return Err(PlatformError::new(
                        Operation::AdminCreateUser,
                        "InvalidParameterException",
                        format!("attribute {} is not in the pool schema", attribute.name),
                    ));
                }
            }
        }
        if pool.users.contains_key(&user.username) {
            return Err(PlatformError::new(
                Operation::AdminCreateUser,
                "UsernameExistsException",
                format!("user {} already exists", user.username),
            ));
        }
        pool.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn admin_delete_user(&self, user_pool_id: &str, username: &str) -> PlatformResult<()> {
        self.enter(Operation::AdminDeleteUser, username)?;
        let mut pool = self
            .user_pools
            .get_mut(user_pool_id)
            .ok_or_else(|| not_found(Operation::AdminDeleteUser, "user pool", user_pool_id))?;
        pool.users
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| not_found(Operation::AdminDeleteUser, "user", username))
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        _description: &str,
    ) -> PlatformResult<Policy> {
        self.enter(Operation::CreatePolicy, name)?;
        let arn = self.iam_arn("policy", name);
        if self.policies.contains_key(&arn) {
            return Err(PlatformError::new(
                Operation::CreatePolicy,
                "EntityAlreadyExists",
                format!("a policy called {name} already exists"),
            ));
        }
        let policy = Policy {
            id: format!("ANPA{:017}", self.next_id()),
            name: name.to_string(),
            arn: arn.clone(),
        };
        self.policies.insert(
            arn,
            StoredPolicy {
                policy: policy.clone(),
                document: document.clone(),
                attachments: 0,
            },
        );
        Ok(policy)
    }

    async fn delete_policy(&self, policy_arn: &str) -> PlatformResult<()> {
        self.enter(Operation::DeletePolicy, policy_arn)?;
        if self.strict_dependencies {
            if let Some(policy) = self.policies.get(policy_arn) {
                if policy.attachments > 0 {
                    return Err(PlatformError::new(
                        Operation::DeletePolicy,
                        "DeleteConflict",
                        format!("policy {} is attached to {} roles", policy.policy.name, policy.attachments),
                    ));
                }
            }
        }
        self.policies
            .remove(policy_arn)
            .map(|_| ())
            .ok_or_else(|| not_found(Operation::DeletePolicy, "policy", policy_arn))
    }

    async fn create_role(&self, name: &str, assume_role_policy: &PolicyDocument) -> PlatformResult<Role> {
        self.enter(Operation::CreateRole, name)?;
        if self.roles.contains_key(name) {
            return Err(PlatformError::new(
                Operation::CreateRole,
                "EntityAlreadyExists",
                format!("role with name {name} already exists"),
            ));
        }
        let role = Role {
            id: format!("AROA{:017}", self.next_id()),
            name: name.to_string(),
            arn: self.iam_arn("role", name),
        };
        self.roles.insert(
            name.to_string(),
            StoredRole {
                role: role.clone(),
                trust: assume_role_policy.clone(),
                attached: Vec::new(),
            },
        );
        Ok(role)
    }

    async fn delete_role(&self, role_name: &str) -> PlatformResult<()> {
        self.enter(Operation::DeleteRole, role_name)?;
        if self.strict_dependencies {
            if let Some(role) = self.roles.get(role_name) {
                if !role.attached.is_empty() {
                    return Err(PlatformError::new(
                        Operation::DeleteRole,
                        "DeleteConflict",
                        format!("role {role_name} has attached policies"),
                    ));
                }
            }
        }
        let (_, removed) = self
            .roles
            .remove(role_name)
            .ok_or_else(|| not_found(Operation::DeleteRole, "role", role_name))?;
        for arn in &removed.attached {
            if let Some(mut policy) = self.policies.get_mut(arn) {
                policy.attachments = policy.attachments.saturating_sub(1);
            }
        }
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> PlatformResult<()> {
        self.enter(Operation::AttachRolePolicy, role_name)?;
        if !self.policies.contains_key(policy_arn) {
            return Err(not_found(Operation::AttachRolePolicy, "policy", policy_arn));
        }
        let mut role = self
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found(Operation::AttachRolePolicy, "role", role_name))?;
        if !role.attached.iter().any(|a| a == policy_arn) {
            role.attached.push(policy_arn.to_string());
            drop(role);
            if let Some(mut policy) = self.policies.get_mut(policy_arn) {
                policy.attachments += 1;
            }
        }
        Ok(())
    }

    async fn set_identity_pool_roles(&self, roles: &IdentityPoolRoles) -> PlatformResult<()> {
        self.enter(Operation::SetIdentityPoolRoles, &roles.identity_pool_id)?;
        let mut pool = self.identity_pools.get_mut(&roles.identity_pool_id).ok_or_else(|| {
            not_found(Operation::SetIdentityPoolRoles, "identity pool", &roles.identity_pool_id)
        })?;
        pool.roles = Some(roles.clone());
        Ok(())
    }

    async fn get_id(
        &self,
        identity_pool_id: &str,
        account_id: &str,
        provider: &str,
        token: &str,
    ) -> PlatformResult<String> {
        self.enter(Operation::GetId, identity_pool_id)?;
        if account_id != self.config.account_id {
            return Err(PlatformError::new(
                Operation::GetId,
                "NotAuthorizedException",
                format!("account {account_id} does not own {identity_pool_id}"),
            ));
        }
        let pool = self
            .identity_pools
            .get(identity_pool_id)
            .ok_or_else(|| not_found(Operation::GetId, "identity pool", identity_pool_id))?;
        if token.is_empty() || !pool.request.providers.iter().any(|p| p.provider_name == provider) {
            return Err(PlatformError::new(
                Operation::GetId,
                "NotAuthorizedException",
                format!("invalid login token for {provider}"),
            ));
        }
        drop(pool);

        let key = (identity_pool_id.to_string(), provider.to_string(), token.to_string());
        let id = self
            .identities
            .entry(key)
            .or_insert_with(|| format!("{}:identity-{:012}", self.config.region, self.next_id()))
            .value()
            .clone();
        Ok(id)
    }

    async fn get_credentials_for_identity(
        &self,
        identity_id: &str,
        provider: &str,
        token: &str,
    ) -> PlatformResult<IdentityCredentials> {
        self.enter(Operation::GetCredentialsForIdentity, identity_id)?;
        let known = self
            .identities
            .iter()
            .any(|e| e.value() == identity_id && e.key().1 == provider && e.key().2 == token);
        if !known {
            return Err(PlatformError::new(
                Operation::GetCredentialsForIdentity,
                "NotAuthorizedException",
                format!("no login for {identity_id}"),
            ));
        }
        let n = self.next_id();
        Ok(IdentityCredentials {
            access_key_id: format!("ASIA{n:016}"),
            secret_key: format!("secret-{n}"),
            session_token: format!("session-{n}"),
            expiration: Some(Utc::now() + Duration::hours(1)),
        })
    }
}
