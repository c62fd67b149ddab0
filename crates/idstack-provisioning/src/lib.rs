//! Tenant Identity Stack Provisioning
//!
//! Provisions a per-tenant identity stack on a federated identity platform:
//! - User pool (the tenant's directory) and its app client
//! - Federated identity pool bound to that user pool
//! - Admin and user permission policies
//! - Authenticated, admin and user roles sharing one trust policy
//! - Rules-based role mapping on the identity pool
//!
//! Every creation registers a compensation. A failure part-way through
//! unwinds everything already created, newest first.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            TENANT PROVISIONER                           │
//! │                                                                         │
//! │ ┌─────────────┐   step 1..N   ┌──────────┐   push   ┌──────────┐        │
//! │ │ Saga<State> │ ────────────▶ │ Resource │ ───────▶ │   Undo   │        │
//! │ │  step list  │               │  Client  │          │   Log    │        │
//! │ └──────┬──────┘               └────┬─────┘          └────┬─────┘        │
//! │        │  failure                  │                     │              │
//! │        └────────── unwind (LIFO) ◀─┼─────────────────────┘              │
//! │                                    ▼                                    │
//! │ ┌─────────────────────────────────────────────────────────────┐         │
//! │ │                      IdentityPlatform                       │         │
//! │ │  ┌──────────┐   ┌──────────────┐   ┌───────────────────┐    │         │
//! │ │  │ InMemory │   │  AWS (feat)  │   │  other backends   │    │         │
//! │ │  └──────────┘   └──────────────┘   └───────────────────┘    │         │
//! │ └─────────────────────────────────────────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod compensation;
pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod policy;
pub mod provisioning;
pub mod resources;
pub mod saga;

pub use compensation::{Compensation, CompensationEntry, CompensationLog};
pub use config::{ConfigError, PlatformConfig, ProvisioningSettings};
pub use error::{PlatformError, PlatformResult, ProvisioningError};
pub use model::{TenantIdentityStack, TenantProvisioningRequest, TenantRole, UserDescriptor};
pub use platform::{IdentityPlatform, InMemoryPlatform, Operation};
#[cfg(feature = "aws")]
pub use platform::AwsPlatform;
pub use policy::PolicyDocument;
pub use provisioning::{TenantProvisioner, TenantStep, TENANT_STEPS};
pub use resources::{ResourceClient, ResourceHandle, RolePolicyAttachment, TenantRoleMapping, TenantUser};
pub use saga::{Compensator, Saga, SagaExecution, SagaFailure, SagaStatus, SagaStep, StepRecord, StepStatus};
