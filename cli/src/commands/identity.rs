//! Identity commands

use crate::{output::OutputFormat, IdentityCommands};
use anyhow::Result;
use idstack_provisioning::{IdentityPlatform, ResourceClient};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityId<'a> {
    identity_pool_id: &'a str,
    identity_id: String,
}

pub async fn handle<P: IdentityPlatform>(
    action: IdentityCommands,
    client: &ResourceClient<P>,
    format: OutputFormat,
) -> Result<()> {
    match action {
        IdentityCommands::Id {
            identity_pool_id,
            user_pool_id,
            token,
        } => {
            let provider = client.config().identity_provider_name(&user_pool_id);
            let identity_id = client.identity_id(&identity_pool_id, &provider, &token).await?;
            format.print(&IdentityId {
                identity_pool_id: &identity_pool_id,
                identity_id,
            })?;
        }
        IdentityCommands::Credentials {
            identity_id,
            user_pool_id,
            token,
        } => {
            let provider = client.config().identity_provider_name(&user_pool_id);
            let credentials = client.credentials_for_identity(&identity_id, &provider, &token).await?;
            format.print(&credentials)?;
        }
    }
    Ok(())
}
