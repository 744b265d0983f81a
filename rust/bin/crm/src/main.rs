//! `crm`: command-line front end for the CRM API.
//!
//! Manages contexts and sessions, and drives every resource service.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::resource::ListArgs;

/// CRM CLI tool.
#[derive(Parser, Debug)]
#[command(name = "crm", about = "CRM command-line client")]
struct Cli {
    /// Path to client config file (default: ~/.crm/config.toml).
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Output format: table or json.
    #[arg(long = "output", short = 'o', global = true, default_value = "table")]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage contexts.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Switch the current context.
    Use {
        #[command(subcommand)]
        what: UseWhat,
    },

    /// Sign in to the current context's server.
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Password (not recommended; prefer the interactive prompt).
        #[arg(long)]
        password: Option<String>,
    },

    /// Clear the current context's session.
    Logout,

    /// Show the signed-in profile.
    Whoami,

    /// Organization (tenant) selection.
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },

    /// Get one record or list records.
    Get {
        /// Resource type (e.g. leads, accounts, contacts).
        resource: String,
        /// Optional record ID for single get.
        id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        ordering: Option<String>,
        /// Extra filter, repeatable: --filter status=open.
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Create a record.
    Create {
        resource: String,
        /// JSON body.
        #[arg(long = "json")]
        json_body: Option<String>,
        /// Read JSON from file.
        #[arg(short = 'f', long = "file")]
        file: Option<String>,
    },

    /// Replace a record (PUT).
    Update {
        resource: String,
        id: String,
        #[arg(long = "json")]
        json_body: String,
    },

    /// Update some fields of a record (PATCH).
    Patch {
        resource: String,
        id: String,
        #[arg(long = "json")]
        json_body: String,
    },

    /// Delete a record.
    Delete {
        resource: String,
        id: String,
        /// Skip confirmation.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },

    /// Comment on a record.
    Comment {
        resource: String,
        id: String,
        text: String,
    },

    /// Attach a file to a record.
    Attach {
        resource: String,
        id: String,
        file: PathBuf,
    },

    /// Search across resources.
    Search { query: String },

    /// Show context and session status.
    Status,

    /// Show version.
    Version,
}

#[derive(Subcommand, Debug)]
enum ContextAction {
    /// Create a new context.
    Create {
        name: String,
        /// API base URL, e.g. http://localhost:8000/api/.
        #[arg(long)]
        server: String,
        /// Organization to select after login.
        #[arg(long)]
        org: Option<String>,
    },
    /// List all contexts.
    List,
    /// Set properties on a context.
    Set {
        name: String,
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        org: Option<String>,
    },
    /// Delete a context and its session.
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum UseWhat {
    /// Switch to a context.
    Context { name: String },
}

#[derive(Subcommand, Debug)]
enum OrgAction {
    /// Select an organization, or list them when no id is given.
    Use { id: Option<String> },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::debug!(error = ?err, "command failed");
        eprintln!("{}", commands::report(&err));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(config::CliConfig::default_path);
    let json_output = cli.output == "json";

    match cli.command {
        Commands::Context { action } => match action {
            ContextAction::Create { name, server, org } => {
                commands::context::create(&name, &server, org.as_deref(), &config_path)?;
            }
            ContextAction::List => {
                commands::context::list(&config_path)?;
            }
            ContextAction::Set { name, server, org } => {
                commands::context::set(&name, server.as_deref(), org.as_deref(), &config_path)?;
            }
            ContextAction::Delete { name } => {
                commands::context::delete(&name, &config_path)?;
            }
        },

        Commands::Use { what } => match what {
            UseWhat::Context { name } => {
                commands::context::use_context(&name, &config_path)?;
            }
        },

        Commands::Login { email, password } => {
            let email = match email {
                Some(e) => e,
                None => {
                    eprint!("Email: ");
                    let mut s = String::new();
                    std::io::stdin().read_line(&mut s)?;
                    s.trim().to_string()
                }
            };
            let password = match password {
                Some(p) => p,
                None => rpassword::prompt_password("Password: ")?,
            };
            if email.is_empty() || password.is_empty() {
                anyhow::bail!("Email and password are required.");
            }
            commands::login::login(&email, &password, &config_path).await?;
        }

        Commands::Logout => {
            commands::login::logout(&config_path)?;
        }

        Commands::Whoami => {
            commands::login::whoami(json_output, &config_path).await?;
        }

        Commands::Org { action } => match action {
            OrgAction::Use { id } => {
                commands::login::org_use(id.as_deref(), &config_path).await?;
            }
        },

        Commands::Get {
            resource,
            id,
            limit,
            offset,
            search,
            ordering,
            filters,
        } => {
            let args = ListArgs {
                limit,
                offset,
                search,
                ordering,
                filters,
            };
            commands::resource::get(&resource, id.as_deref(), &args, json_output, &config_path).await?;
        }

        Commands::Create {
            resource,
            json_body,
            file,
        } => {
            let body = if let Some(path) = file {
                std::fs::read_to_string(&path)?
            } else if let Some(json) = json_body {
                json
            } else {
                anyhow::bail!("Provide --json or -f <file>.");
            };
            commands::resource::create(&resource, &body, &config_path).await?;
        }

        Commands::Update {
            resource,
            id,
            json_body,
        } => {
            commands::resource::update(&resource, &id, &json_body, false, &config_path).await?;
        }

        Commands::Patch {
            resource,
            id,
            json_body,
        } => {
            commands::resource::update(&resource, &id, &json_body, true, &config_path).await?;
        }

        Commands::Delete { resource, id, yes } => {
            if !yes {
                eprint!("Delete {} {}? [y/N]: ", resource, id);
                let mut s = String::new();
                std::io::stdin().read_line(&mut s)?;
                if !s.trim().eq_ignore_ascii_case("y") {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            commands::resource::delete(&resource, &id, &config_path).await?;
        }

        Commands::Comment { resource, id, text } => {
            commands::resource::comment(&resource, &id, &text, &config_path).await?;
        }

        Commands::Attach { resource, id, file } => {
            commands::resource::attach(&resource, &id, &file, &config_path).await?;
        }

        Commands::Search { query } => {
            commands::resource::search(&query, json_output, &config_path).await?;
        }

        Commands::Status => {
            commands::resource::status(&config_path).await?;
        }

        Commands::Version => {
            println!("crm cli v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
