//! Client-side context management.
//!
//! Reads/writes `~/.crm/config.toml`. Each context keeps its session in
//! `~/.crm/sessions/<name>.toml`, next to the config file.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// A single context: one backend, optionally pinned to a tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Context name (e.g. "staging").
    pub name: String,

    /// API base URL (e.g. "http://localhost:8000/api/").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,

    /// Organization to select after login.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org: String,
}

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Name of the currently active context.
    #[serde(rename = "current-context", default)]
    pub current_context: String,

    #[serde(default)]
    pub contexts: Vec<Context>,
}

impl CliConfig {
    /// Default config file path: ~/.crm/config.toml.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    /// Session file of context `name`, kept beside the config file.
    pub fn session_path(config_path: &Path, name: &str) -> PathBuf {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("sessions")
            .join(format!("{}.toml", name))
    }

    /// Read the context list. No file yet means no contexts configured.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Write the context list, creating the config directory on first use.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))
    }

    /// The context commands run against.
    pub fn current(&self) -> Option<&Context> {
        self.contexts.iter().find(|c| c.name == self.current_context)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Context> {
        self.contexts.iter_mut().find(|c| c.name == name)
    }

    /// Register `ctx`, replacing any context with the same name.
    pub fn upsert_context(&mut self, ctx: Context) {
        match self.get_mut(&ctx.name) {
            Some(slot) => *slot = ctx,
            None => self.contexts.push(ctx),
        }
    }

    /// Forget context `name`. Unsets the current context when it was the
    /// one removed. False if no such context exists.
    pub fn remove_context(&mut self, name: &str) -> bool {
        let Some(pos) = self.contexts.iter().position(|c| c.name == name) else {
            return false;
        };
        self.contexts.remove(pos);
        if self.current_context == name {
            self.current_context.clear();
        }
        true
    }
}

/// `~/.crm`, or `./.crm` when no home directory is known.
fn dirs_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".crm")
}
