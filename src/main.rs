use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use pgprovider::config::{self, Config};
use pgprovider::storage::postgres::redacted;
use pgprovider::storage::Statement;
use pgprovider::update::operations_from_json;
use pgprovider::{get_default_provider_registry, ProviderServices};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pgprovider")]
#[command(about = "Typed SQL batching and value mapping for Postgres", long_about = None)]
struct Cli {
    /// Configuration file (default: pgprovider.toml, optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Provider to use, overriding the configuration file
    #[arg(long)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the provider's type mappings
    Types {},
    /// Print the statements a JSON operations file turns into
    Render {
        #[arg(long)]
        file: PathBuf,
    },
    /// Execute a JSON operations file and print per-operation outcomes
    Apply {
        #[arg(long)]
        file: PathBuf,
        /// Database connection string (falls back to env DATABASE_URL)
        #[arg(long)]
        dsn: Option<String>,
    },
    /// Open a connection and run SELECT 1
    Ping {
        /// Database connection string (falls back to env DATABASE_URL)
        #[arg(long)]
        dsn: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::load_config_from_path(path)?
            .ok_or_else(|| anyhow!("{} not found", path.display()))?,
        None => config::load_config()
            .with_context(|| format!("failed to load {}", config::CONFIG_FILE))?
            .unwrap_or_default(),
    };
    if let Some(provider) = cli.provider {
        cfg.settings.provider = provider;
    }
    let registry = get_default_provider_registry();

    match cli.command {
        Commands::Types {} => {
            let services = ProviderServices::from_config(&registry, &cfg, None)?;
            for mapping in services.type_mapper().mappings() {
                println!("{}", mapping);
            }
        }
        Commands::Render { file } => {
            let services = ProviderServices::from_config(&registry, &cfg, None)?;
            let batch = build_batch(&services, &file)?;
            for stmt in batch.statements() {
                println!(
                    "-- operations {}..{}",
                    stmt.operations.start, stmt.operations.end
                );
                println!("{}{}", stmt.statement.sql, services.sql_helper().statement_terminator());
                for (i, param) in stmt.statement.params.iter().enumerate() {
                    println!(
                        "--   {} = {}",
                        services.sql_helper().parameter_placeholder(i + 1),
                        services.sql_helper().literal(param)?
                    );
                }
            }
        }
        Commands::Apply { file, dsn } => {
            let dsn = resolve_dsn(dsn, &cfg)?;
            let services = ProviderServices::from_config(&registry, &cfg, Some(&dsn))?;
            let batch = build_batch(&services, &file)?;
            let mut conn = services.connection()?;
            info!(
                "applying {} operation(s) in {} statement(s) to {}",
                batch.operation_count(),
                batch.round_trips(),
                redacted(&dsn)
            );
            match services.batch_executor().execute(&mut conn, &batch) {
                Ok(result) => {
                    for (i, outcome) in result.outcomes.iter().enumerate() {
                        println!("{}: {}", i, outcome);
                    }
                }
                Err(err) => {
                    for (i, outcome) in err.outcomes.iter().enumerate() {
                        println!("{}: {}", i, outcome);
                    }
                    error!("{}", err);
                    std::process::exit(1);
                }
            }
            conn.close()?;
        }
        Commands::Ping { dsn } => {
            let dsn = resolve_dsn(dsn, &cfg)?;
            let services = ProviderServices::from_config(&registry, &cfg, Some(&dsn))?;
            let mut conn = services.connection()?;
            conn.execute_statement(&Statement::new("SELECT 1"), None)
                .with_context(|| format!("pinging {}", redacted(&dsn)))?;
            conn.close()?;
            info!("{} is reachable", redacted(&dsn));
        }
    }

    Ok(())
}

fn resolve_dsn(dsn: Option<String>, cfg: &Config) -> Result<String> {
    dsn.or_else(|| cfg.connection.dsn.clone())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow!("missing DSN: pass --dsn or set DATABASE_URL"))
}

fn build_batch(services: &ProviderServices, file: &Path) -> Result<pgprovider::update::Batch> {
    let json = fs::read_to_string(file)
        .with_context(|| format!("reading operations from {}", file.display()))?;
    let ops = operations_from_json(&json, services.type_mapper())?;
    let mut builder = services.batch_builder();
    builder.append_all(ops)?;
    Ok(builder.build()?)
}
