//! CLI Commands

pub mod config;
pub mod identity;
pub mod provision;

use crate::output::OutputFormat;
use crate::{config::Config, Commands};
use anyhow::{bail, Context as _, Result};
use idstack_provisioning::{
    IdentityPlatform, InMemoryPlatform, PlatformConfig, ProvisioningSettings, ResourceClient, TenantProvisioner,
};
use std::sync::Arc;

/// Values given on the command line or in the environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub bucket: Option<String>,
    pub format: Option<OutputFormat>,
}

/// Resolved settings of one invocation
#[derive(Debug, Clone)]
pub struct Context {
    pub platform: PlatformConfig,
    pub settings: ProvisioningSettings,
    pub format: OutputFormat,
}

impl Context {
    /// Command line wins over the profile file
    pub fn resolve(overrides: Overrides, profile: &Config) -> Result<Self> {
        let region = overrides
            .region
            .or_else(|| profile.region.clone())
            .context("region is not set (use --region, IDSTACK_REGION or `config set region`)")?;
        let account_id = overrides
            .account_id
            .or_else(|| profile.account_id.clone())
            .context("account id is not set (use --account-id, IDSTACK_ACCOUNT_ID or `config set account_id`)")?;
        let platform = PlatformConfig::new(region, account_id)?;

        let settings = match overrides.bucket.or_else(|| profile.bucket.clone()) {
            Some(bucket) => ProvisioningSettings::with_bucket(bucket),
            None => ProvisioningSettings::default(),
        };

        let format = match (overrides.format, profile.default_format.as_deref()) {
            (Some(format), _) => format,
            (None, Some(name)) => name
                .parse()
                .map_err(|e| anyhow::anyhow!("default_format: {e}"))?,
            (None, None) => OutputFormat::Table,
        };

        Ok(Self {
            platform,
            settings,
            format,
        })
    }

    pub fn provisioner<P: IdentityPlatform + 'static>(&self, platform: Arc<P>) -> TenantProvisioner<P> {
        let client = ResourceClient::new(platform, self.platform.clone());
        TenantProvisioner::new(client, self.settings.clone())
    }
}

/// Run a platform command against the real platform, or in memory for `--dry-run`
pub async fn dispatch(command: Commands, ctx: Context, dry_run: bool) -> Result<()> {
    if dry_run {
        tracing::info!(region = %ctx.platform.region, "dry run against in-memory platform");
        let platform = Arc::new(InMemoryPlatform::new(ctx.platform.clone()));
        return run(command, &ctx, platform).await;
    }
    connect_and_run(command, ctx).await
}

#[cfg(feature = "aws")]
async fn connect_and_run(command: Commands, ctx: Context) -> Result<()> {
    let platform = Arc::new(idstack_provisioning::AwsPlatform::connect(&ctx.platform).await);
    run(command, &ctx, platform).await
}

#[cfg(not(feature = "aws"))]
async fn connect_and_run(_command: Commands, _ctx: Context) -> Result<()> {
    bail!("this build has no platform backend; rebuild with `--features aws` or pass --dry-run")
}

async fn run<P: IdentityPlatform + 'static>(command: Commands, ctx: &Context, platform: Arc<P>) -> Result<()> {
    let provisioner = ctx.provisioner(platform);
    match command {
        Commands::Provision {
            file,
            tenant_id,
            user,
            trace,
        } => {
            let request = provision::request(file.as_deref(), tenant_id, user)?;
            provision::provision(&provisioner, request, trace, ctx.format).await
        }
        Commands::AddUser {
            tenant_id,
            user_pool_id,
            user,
        } => provision::add_user(&provisioner, &tenant_id, &user_pool_id, user, ctx.format).await,
        Commands::Identity { action } => identity::handle(action, provisioner.client(), ctx.format).await,
        Commands::Config { .. } => bail!("config commands do not use the platform"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_profile() {
        let profile = Config {
            region: Some("us-east-1".into()),
            account_id: Some("123456789012".into()),
            bucket: Some("profile-bucket".into()),
            default_format: Some("yaml".into()),
        };
        let overrides = Overrides {
            region: Some("eu-west-1".into()),
            ..Default::default()
        };

        let ctx = Context::resolve(overrides, &profile).unwrap();
        assert_eq!(ctx.platform.region, "eu-west-1");
        assert_eq!(ctx.platform.account_id, "123456789012");
        assert_eq!(ctx.settings.storage_bucket, "profile-bucket");
        assert_eq!(ctx.format, OutputFormat::Yaml);
    }

    #[test]
    fn test_missing_account_is_an_error() {
        let overrides = Overrides {
            region: Some("eu-west-1".into()),
            ..Default::default()
        };
        let err = Context::resolve(overrides, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("account id"));
    }

    #[test]
    fn test_defaults() {
        let overrides = Overrides {
            region: Some("eu-west-1".into()),
            account_id: Some("123456789012".into()),
            ..Default::default()
        };
        let ctx = Context::resolve(overrides, &Config::default()).unwrap();
        assert_eq!(ctx.settings, ProvisioningSettings::default());
        assert_eq!(ctx.format, OutputFormat::Table);
    }
}
