//! Provisioning commands

use crate::{output::OutputFormat, UserArgs};
use anyhow::{Context, Result};
use colored::Colorize;
use idstack_provisioning::{
    IdentityPlatform, SagaStatus, StepStatus, TenantProvisioner, TenantProvisioningRequest, UserDescriptor,
};
use serde::Serialize;
use std::fs;

/// Build the request from a JSON/YAML file or from flags
pub fn request(file: Option<&str>, tenant_id: Option<String>, user: UserArgs) -> Result<TenantProvisioningRequest> {
    if let Some(path) = file {
        let content = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        // YAML is a superset of JSON
        return serde_yaml::from_str(&content).with_context(|| format!("parsing {path}"));
    }
    let tenant_id = tenant_id.context("--tenant-id is required without --file")?;
    Ok(TenantProvisioningRequest::new(tenant_id, descriptor(user)?))
}

pub fn descriptor(user: UserArgs) -> Result<UserDescriptor> {
    let descriptor = UserDescriptor::new(
        user.username.context("--username is required")?,
        user.email.context("--email is required")?,
        user.first_name.context("--first-name is required")?,
        user.last_name.context("--last-name is required")?,
    );
    Ok(match user.role {
        Some(role) => descriptor.with_role(role),
        None => descriptor,
    })
}

#[derive(Serialize)]
struct TraceRow {
    step: usize,
    name: String,
    status: StepStatus,
    error: Option<String>,
}

pub async fn provision<P: IdentityPlatform + 'static>(
    provisioner: &TenantProvisioner<P>,
    request: TenantProvisioningRequest,
    trace: bool,
    format: OutputFormat,
) -> Result<()> {
    let tenant_id = request.tenant_id.clone();
    match provisioner.provision_tenant_traced(request).await {
        Ok((stack, execution)) => {
            format.print(&stack)?;
            if trace {
                print_trace(&execution.steps, format)?;
            }
            eprintln!("{} tenant {} provisioned", "✓".green(), tenant_id);
            Ok(())
        }
        Err(failure) => {
            if trace {
                print_trace(&failure.execution.steps, format)?;
            }
            if failure.execution.status == SagaStatus::RollbackFailed {
                eprintln!(
                    "{} rollback incomplete for tenant {}; resources may remain",
                    "!".yellow(),
                    tenant_id
                );
            }
            Err(failure.error).with_context(|| format!("provisioning tenant {tenant_id}"))
        }
    }
}

fn print_trace(steps: &[idstack_provisioning::saga::StepRecord], format: OutputFormat) -> Result<()> {
    let rows: Vec<TraceRow> = steps
        .iter()
        .map(|s| TraceRow {
            step: s.index,
            name: s.name.clone(),
            status: s.status,
            error: s.error.clone(),
        })
        .collect();
    match format {
        OutputFormat::Table => {
            for row in rows {
                let status = format!("{:?}", row.status);
                let status = match row.status {
                    StepStatus::Completed | StepStatus::Compensated => status.green(),
                    StepStatus::Failed | StepStatus::CompensationFailed => status.red(),
                    _ => status.normal(),
                };
                println!("{:>2}  {:<24} {}", row.step, row.name, status);
            }
            Ok(())
        }
        other => other.print(&rows),
    }
}

pub async fn add_user<P: IdentityPlatform + 'static>(
    provisioner: &TenantProvisioner<P>,
    tenant_id: &str,
    user_pool_id: &str,
    user: UserArgs,
    format: OutputFormat,
) -> Result<()> {
    let handle = provisioner
        .add_tenant_user(tenant_id, user_pool_id, descriptor(user)?)
        .await?;
    format.print(&handle.resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use idstack_provisioning::TenantRole;

    fn alice() -> UserArgs {
        UserArgs {
            username: Some("alice".into()),
            email: Some("a@acme.io".into()),
            first_name: Some("Alice".into()),
            last_name: Some("A".into()),
            role: None,
        }
    }

    #[test]
    fn test_request_from_flags() {
        let request = request(None, Some("acme".into()), alice()).unwrap();
        assert_eq!(request.tenant_id, "acme");
        assert_eq!(request.user.username, "alice");
        assert_eq!(request.user.role, None);
    }

    #[test]
    fn test_missing_flag_is_named() {
        let user = UserArgs {
            email: None,
            ..alice()
        };
        let err = request(None, Some("acme".into()), user).unwrap_err();
        assert!(err.to_string().contains("--email"));
    }

    #[test]
    fn test_request_from_yaml_file() {
        let path = std::env::temp_dir().join(format!("idstack-request-{}.yaml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            "tenantId: acme\nuser:\n  username: bob\n  email: b@acme.io\n  firstName: Bob\n  lastName: B\n  role: TenantUser\n",
        )
        .unwrap();

        let request = request(path.to_str(), None, UserArgs::default()).unwrap();
        assert_eq!(request.tenant_id, "acme");
        assert_eq!(request.user.role, Some(TenantRole::TenantUser));
        let _ = fs::remove_file(path);
    }
}
