//! catalogd - JSON APIs over the sakila rental and chinook music databases

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use catalogd_core::CatalogConfig;
use catalogd_server::{run_server, ServeOptions};
use clap::{Parser, Subcommand};

mod tracing_setup;

use tracing_setup::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "catalogd",
    author,
    version,
    about = "DVD rental dashboard and music catalog JSON APIs over SQLite"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(ServeArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Config file (default: ./catalogd.toml when present)
    #[arg(long, short = 'c', value_name = "PATH", env = "CATALOGD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (default: 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    bind: Option<SocketAddr>,

    /// Path to the sakila database file
    #[arg(long, value_name = "PATH", conflicts_with = "no_sakila")]
    sakila_db: Option<PathBuf>,

    /// Path to the chinook database file
    #[arg(long, value_name = "PATH", conflicts_with = "no_chinook")]
    chinook_db: Option<PathBuf>,

    /// Do not mount the rental dashboard API
    #[arg(long)]
    no_sakila: bool,

    /// Do not mount the music catalog API
    #[arg(long)]
    no_chinook: bool,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    cors_permissive: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Create missing database files with the bundled schema
    #[arg(long)]
    init_schema: bool,
}

impl ServeArgs {
    fn apply(&self, config: &mut CatalogConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if self.cors_permissive {
            config.server.cors_permissive = true;
        }
        if let Some(timeout) = self.timeout {
            config.server.timeout_secs = timeout;
        }
        if let Some(path) = &self.sakila_db {
            config.databases.sakila = Some(path.clone());
        }
        if let Some(path) = &self.chinook_db {
            config.databases.chinook = Some(path.clone());
        }
        if self.no_sakila {
            config.databases.sakila = None;
        }
        if self.no_chinook {
            config.databases.chinook = None;
        }
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config =
        CatalogConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    tracing::debug!(?config, "effective configuration");

    let opts = ServeOptions {
        init_schema: args.init_schema,
        ..ServeOptions::from(config)
    };

    run_server(opts).await.context("Server error")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(TracingConfig { debug: cli.debug }).ok();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServeArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Serve(args) => args,
        }
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "catalogd",
            "serve",
            "--bind",
            "0.0.0.0:8080",
            "--sakila-db",
            "/data/sakila.db",
            "--no-chinook",
            "--timeout",
            "5",
        ]);

        let mut config = CatalogConfig::default();
        args.apply(&mut config);

        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.server.timeout_secs, 5);
        assert!(!config.server.cors_permissive);
        assert_eq!(config.databases.sakila, Some(PathBuf::from("/data/sakila.db")));
        assert_eq!(config.databases.chinook, None);
    }

    #[test]
    fn unset_flags_keep_config() {
        let args = parse(&["catalogd", "serve"]);
        let mut config = CatalogConfig::default();
        args.apply(&mut config);
        assert_eq!(config, CatalogConfig::default());
    }

    #[test]
    fn path_and_disable_conflict() {
        let result =
            Cli::try_parse_from(["catalogd", "serve", "--sakila-db", "x.db", "--no-sakila"]);
        assert!(result.is_err());
    }
}
