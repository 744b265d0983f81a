//! Context management commands.

use std::path::Path;

use anyhow::Result;

use crate::config::{CliConfig, Context};

/// Register a new context. The first context becomes current.
pub fn create(name: &str, server: &str, org: Option<&str>, config_path: &Path) -> Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("Context name cannot be empty.");
    }
    let mut config = CliConfig::load(config_path)?;
    if config.contexts.iter().any(|c| c.name == name) {
        anyhow::bail!("Context \"{}\" already exists. Use `crm context set` to change it.", name);
    }

    config.upsert_context(Context {
        name: name.to_string(),
        server: server.to_string(),
        org: org.unwrap_or_default().to_string(),
    });
    if config.current_context.is_empty() {
        config.current_context = name.to_string();
    }
    config.save(config_path)?;

    println!("Context \"{}\" created.", name);
    println!("  Server: {}", server);
    Ok(())
}

pub fn list(config_path: &Path) -> Result<()> {
    let config = CliConfig::load(config_path)?;

    if config.contexts.is_empty() {
        println!("No contexts configured.");
        println!("Run: crm context create <name> --server <url>");
        return Ok(());
    }

    println!("{:2} {:20} {:40} {:8}", "", "NAME", "SERVER", "ORG");
    for ctx in &config.contexts {
        let marker = if ctx.name == config.current_context { "*" } else { " " };
        let server = if ctx.server.is_empty() { "-" } else { &ctx.server };
        let org = if ctx.org.is_empty() { "-" } else { &ctx.org };
        println!("{:2} {:20} {:40} {:8}", marker, ctx.name, server, org);
    }
    Ok(())
}

pub fn use_context(name: &str, config_path: &Path) -> Result<()> {
    let mut config = CliConfig::load(config_path)?;

    if !config.contexts.iter().any(|c| c.name == name) {
        anyhow::bail!("Context \"{}\" not found. Run `crm context list` to see available contexts.", name);
    }

    config.current_context = name.to_string();
    config.save(config_path)?;
    println!("Switched to context \"{}\".", name);
    Ok(())
}

pub fn set(name: &str, server: Option<&str>, org: Option<&str>, config_path: &Path) -> Result<()> {
    let mut config = CliConfig::load(config_path)?;

    let ctx = config
        .get_mut(name)
        .ok_or_else(|| anyhow::anyhow!("Context \"{}\" not found.", name))?;
    if let Some(s) = server {
        ctx.server = s.to_string();
    }
    if let Some(o) = org {
        ctx.org = o.to_string();
    }

    config.save(config_path)?;
    println!("Context \"{}\" updated.", name);
    Ok(())
}

/// Delete a context together with its stored session.
pub fn delete(name: &str, config_path: &Path) -> Result<()> {
    let mut config = CliConfig::load(config_path)?;

    if !config.remove_context(name) {
        anyhow::bail!("Context \"{}\" not found.", name);
    }
    config.save(config_path)?;

    let session = CliConfig::session_path(config_path, name);
    if session.exists() {
        std::fs::remove_file(&session)?;
    }
    println!("Context \"{}\" deleted.", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        create("local", "http://localhost:8000/api/", None, &path).unwrap();
        create("prod", "https://crm.example.com/api/", Some("3"), &path).unwrap();
        assert!(create("local", "http://x/", None, &path).is_err());

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.current_context, "local");
        assert_eq!(config.contexts.len(), 2);

        use_context("prod", &path).unwrap();
        set("prod", None, Some("4"), &path).unwrap();
        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.current().unwrap().org, "4");
        assert!(use_context("nope", &path).is_err());

        let session = CliConfig::session_path(&path, "prod");
        std::fs::create_dir_all(session.parent().unwrap()).unwrap();
        std::fs::write(&session, "access_token = \"x\"\n").unwrap();

        delete("prod", &path).unwrap();
        assert!(!session.exists());
        let config = CliConfig::load(&path).unwrap();
        assert!(config.current_context.is_empty());
        assert_eq!(config.contexts.len(), 1);
    }
}
