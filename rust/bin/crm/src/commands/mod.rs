pub mod context;
pub mod login;
pub mod resource;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use crm_client::{ApiError, ClientConfig, Crm, FileStorage, LoginRedirect};
use tracing::{debug, info};

use crate::config::{CliConfig, Context};

/// Tells the user to sign in again once the session has expired.
struct CliRedirect {
    context: String,
}

impl LoginRedirect for CliRedirect {
    fn redirect_to_login(&self, reason: &str) {
        info!(context = %self.context, reason, "session cleared, login required");
        eprintln!("Session expired ({}).", reason);
        eprintln!("Run `crm login` to sign in to context \"{}\" again.", self.context);
    }
}

/// Open a client for the current context, over its persisted session.
pub fn connect(config_path: &Path) -> Result<(Context, Crm)> {
    let config = CliConfig::load(config_path)?;
    let ctx = config
        .current()
        .ok_or_else(|| anyhow::anyhow!("No current context. Run `crm use context <name>`."))?
        .clone();

    if ctx.server.is_empty() {
        anyhow::bail!(
            "No server URL set for context \"{}\". Run `crm context set {} --server <url>`.",
            ctx.name,
            ctx.name
        );
    }

    let client_config = ClientConfig::from_env()?.with_base_url(ctx.server.clone());
    client_config.validate()?;

    let session_path = CliConfig::session_path(config_path, &ctx.name);
    debug!(context = %ctx.name, server = %ctx.server, session = %session_path.display(), "connecting");
    let storage = Arc::new(FileStorage::open(session_path)?);
    let redirect = Arc::new(CliRedirect {
        context: ctx.name.clone(),
    });
    let crm = Crm::with_redirect(client_config, storage, redirect)?;
    Ok((ctx, crm))
}

/// Render a failure for the terminal: the error chain, then one line per
/// field error.
pub fn report(err: &anyhow::Error) -> String {
    let mut out = format!("Error: {}", err);
    for cause in err.chain().skip(1) {
        out.push_str(&format!("\n  caused by: {}", cause));
    }
    if let Some(fields) = err.downcast_ref::<ApiError>().and_then(ApiError::field_errors) {
        for (field, messages) in fields {
            out.push_str(&format!("\n  {}: {}", field, messages.join(" ")));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_field_errors() {
        let api = ApiError::from_response(400, r#"{"errors": {"email": ["Enter a valid email address."], "title": ["Required."]}}"#);
        let text = report(&anyhow::Error::new(api));
        assert!(text.starts_with("Error: HTTP 400"));
        assert!(text.contains("\n  email: Enter a valid email address."));
        assert!(text.contains("\n  title: Required."));
    }

    #[test]
    fn connect_requires_current_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let Err(err) = connect(&path) else {
            panic!("connect should fail without a current context");
        };
        assert!(err.to_string().contains("No current context"));
    }

    #[test]
    fn connect_requires_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = CliConfig::default();
        config.current_context = "local".into();
        config.upsert_context(Context { name: "local".into(), ..Default::default() });
        config.save(&path).unwrap();

        let Err(err) = connect(&path) else {
            panic!("connect should fail without a server URL");
        };
        assert!(err.to_string().contains("No server URL"));
    }
}
