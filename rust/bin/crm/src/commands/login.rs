//! Login / logout and session inspection commands.

use std::path::Path;

use anyhow::Result;
use crm_client::Credentials;

use super::connect;

/// Login to the current context's server. Selects the context's
/// organization afterwards when one is configured.
pub async fn login(email: &str, password: &str, config_path: &Path) -> Result<()> {
    let (ctx, crm) = connect(config_path)?;

    let state = crm
        .login(&Credentials::new(email, password))
        .await
        .map_err(|e| anyhow::anyhow!("Login failed: {}", e))?;

    if !ctx.org.is_empty() {
        crm.session().select_org(&ctx.org)?;
    }

    let name = match state.user {
        Some(user) => user.display_name(),
        None => crm.profile().await.map(|p| p.display_name()).unwrap_or_else(|_| email.to_string()),
    };
    println!("Logged in as {}.", name);
    println!("Session saved for context \"{}\".", ctx.name);
    Ok(())
}

pub fn logout(config_path: &Path) -> Result<()> {
    let (ctx, crm) = connect(config_path)?;
    crm.logout()?;
    println!("Logged out from context \"{}\".", ctx.name);
    Ok(())
}

/// Print the signed-in profile, refreshing it from the backend.
pub async fn whoami(json_output: bool, config_path: &Path) -> Result<()> {
    let (_, crm) = connect(config_path)?;
    if !crm.session().is_authenticated() {
        anyhow::bail!("Not logged in. Run `crm login`.");
    }

    let profile = crm.profile().await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }
    println!("Name:   {}", profile.display_name());
    println!("Email:  {}", profile.email.as_deref().unwrap_or("-"));
    println!("Role:   {}", profile.role.as_deref().unwrap_or("-"));
    println!("Org:    {}", crm.session().org_id().as_deref().unwrap_or("-"));
    Ok(())
}

/// Switch the tenant for later requests. Without an id, list the
/// organizations the user belongs to.
pub async fn org_use(id: Option<&str>, config_path: &Path) -> Result<()> {
    let (_, crm) = connect(config_path)?;

    let Some(id) = id else {
        let current = crm.session().org_id().unwrap_or_default();
        println!("{:2} {:8} {}", "", "ID", "NAME");
        for org in crm.organizations().await? {
            let org_id = org.id.map(|i| i.to_string()).unwrap_or_default();
            let marker = if org_id == current { "*" } else { " " };
            println!("{:2} {:8} {}", marker, org_id, org.name.as_deref().unwrap_or("-"));
        }
        return Ok(());
    };

    crm.session().select_org(id)?;
    println!("Using organization {}.", id);
    Ok(())
}
