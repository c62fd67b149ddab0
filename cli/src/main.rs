//! idstack CLI
//!
//! Provisions tenant identity stacks from the command line.
//!
//! # Usage
//!
//! ```bash
//! idstack provision --tenant-id acme --username alice --email a@acme.io \
//!     --first-name Alice --last-name A
//! idstack provision -f tenant.yaml --format json
//! idstack add-user --tenant-id acme --user-pool-id eu-west-1_abc --username bob ...
//! idstack identity id --identity-pool-id eu-west-1:... --user-pool-id eu-west-1_abc --token $JWT
//! idstack --dry-run provision -f tenant.yaml
//! idstack config set region eu-west-1
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use idstack_provisioning::TenantRole;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "idstack")]
#[command(version)]
#[command(about = "Tenant identity stack provisioning", long_about = None)]
struct Cli {
    /// Platform region
    #[arg(long, env = "IDSTACK_REGION")]
    region: Option<String>,

    /// 12-digit account id
    #[arg(long, env = "IDSTACK_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Bucket scoped by the tenant user policy
    #[arg(long, env = "IDSTACK_BUCKET")]
    bucket: Option<String>,

    /// Output format
    #[arg(long, short)]
    format: Option<output::OutputFormat>,

    /// Profile name from config file
    #[arg(long, short)]
    profile: Option<String>,

    /// Log record format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Run against an in-memory platform instead of the real one
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the identity stack of a new tenant
    Provision {
        /// Read the request (JSON or YAML) from a file
        #[arg(short, long, conflicts_with_all = ["tenant_id", "username"])]
        file: Option<String>,
        #[arg(long)]
        tenant_id: Option<String>,
        #[command(flatten)]
        user: UserArgs,
        /// Also print the step-by-step execution trace
        #[arg(long)]
        trace: bool,
    },
    /// Add a user to an existing tenant
    AddUser {
        #[arg(long)]
        tenant_id: String,
        #[arg(long)]
        user_pool_id: String,
        #[command(flatten)]
        user: UserArgs,
    },
    /// Exchange a user pool token for a federated identity
    Identity {
        #[command(subcommand)]
        action: IdentityCommands,
    },
    /// Configure CLI
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
struct UserArgs {
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    first_name: Option<String>,
    #[arg(long)]
    last_name: Option<String>,
    /// TenantAdmin or TenantUser
    #[arg(long)]
    role: Option<TenantRole>,
}

#[derive(Subcommand)]
enum IdentityCommands {
    /// Resolve the identity id of a logged-in user
    Id {
        #[arg(long)]
        identity_pool_id: String,
        #[arg(long)]
        user_pool_id: String,
        #[arg(long, env = "IDSTACK_TOKEN")]
        token: String,
    },
    /// Get temporary credentials for an identity
    Credentials {
        #[arg(long)]
        identity_id: String,
        #[arg(long)]
        user_pool_id: String,
        #[arg(long, env = "IDSTACK_TOKEN")]
        token: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set configuration value
    Set { key: String, value: String },
    /// Get configuration value
    Get { key: String },
    /// List all configuration
    List,
    /// Initialize configuration
    Init,
}

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    ));

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.command {
        Commands::Config { action } => commands::config::handle(action, cli.profile.as_deref()),
        command => {
            let profile = config::Config::load(cli.profile.as_deref()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "config not readable, using defaults");
                config::Config::default()
            });
            let overrides = commands::Overrides {
                region: cli.region,
                account_id: cli.account_id,
                bucket: cli.bucket,
                format: cli.format,
            };
            match commands::Context::resolve(overrides, &profile) {
                Ok(ctx) => commands::dispatch(command, ctx, cli.dry_run).await,
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red(), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_flags() {
        let cli = Cli::try_parse_from([
            "idstack",
            "--region",
            "eu-west-1",
            "provision",
            "--tenant-id",
            "acme",
            "--username",
            "alice",
            "--email",
            "a@acme.io",
            "--first-name",
            "Alice",
            "--last-name",
            "A",
            "--role",
            "TenantAdmin",
        ])
        .unwrap();

        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cli.log_format, LogFormat::Text);
        match cli.command {
            Commands::Provision { tenant_id, user, file, trace } => {
                assert_eq!(tenant_id.as_deref(), Some("acme"));
                assert_eq!(user.role, Some(TenantRole::TenantAdmin));
                assert!(file.is_none());
                assert!(!trace);
            }
            _ => panic!("expected provision"),
        }
    }

    #[test]
    fn test_file_conflicts_with_flags() {
        let parsed = Cli::try_parse_from(["idstack", "provision", "-f", "t.yaml", "--tenant-id", "acme"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let parsed = Cli::try_parse_from([
            "idstack",
            "add-user",
            "--tenant-id",
            "acme",
            "--user-pool-id",
            "p",
            "--role",
            "Owner",
        ]);
        assert!(parsed.is_err());
    }
}
