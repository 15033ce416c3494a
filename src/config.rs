use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub media_dir: String,
    pub database_url: String,
    pub page_size: u32,
    pub max_page_size: u32,
}

/// What the process should do once configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupAction {
    Serve,
    /// Apply the schema and exit.
    Migrate,
    /// Insert an account, print its bearer token and exit.
    CreateAccount { username: String, staff: bool },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Biodiversity observation record API")]
pub struct Args {
    /// Host to bind to (overrides BIODIVERSITY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BIODIVERSITY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where media payloads are stored (overrides BIODIVERSITY_MEDIA_DIR)
    #[arg(long)]
    pub media_dir: Option<String>,

    /// Database URL (overrides BIODIVERSITY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Create an account with this username, print its token and exit
    #[arg(long, value_name = "USERNAME")]
    pub create_account: Option<String>,

    /// Give the account created by --create-account staff rights
    #[arg(long, requires = "create_account")]
    pub staff: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the startup action.
    pub fn from_env_and_args() -> Result<(Self, StartupAction)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, StartupAction)> {
        // --- Environment fallback ---
        let env_host = env::var("BIODIVERSITY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_number("BIODIVERSITY_PORT", 3000u16)?;
        let env_media =
            env::var("BIODIVERSITY_MEDIA_DIR").unwrap_or_else(|_| "./data/media".into());
        let env_db = env::var("BIODIVERSITY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/biodiversity.db".into());
        let page_size = env_number("BIODIVERSITY_PAGE_SIZE", 20u32)?;
        let max_page_size = env_number("BIODIVERSITY_MAX_PAGE_SIZE", 100u32)?;

        if page_size == 0 || max_page_size == 0 {
            anyhow::bail!("page sizes must be at least 1");
        }

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            media_dir: args.media_dir.unwrap_or(env_media),
            database_url: args.database_url.unwrap_or(env_db),
            page_size: page_size.min(max_page_size),
            max_page_size,
        };

        let action = match (args.create_account, args.migrate) {
            (Some(username), _) => StartupAction::CreateAccount {
                username,
                staff: args.staff,
            },
            (None, true) => StartupAction::Migrate,
            (None, false) => StartupAction::Serve,
        };

        Ok((cfg, action))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read a numeric env var, falling back to `default` when unset.
fn env_number<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
