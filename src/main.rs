use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rowgen::catalog::{introspect_postgres, CatalogSnapshot};
use rowgen::config::GenConfig;
use rowgen::runtime::{validate_includes, IncludeSpec};
use rowgen::{build_model, connect_first, generate_code, generation_enabled, load_config};
use std::fs;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Source {
    /// Path to the generator config
    #[arg(long, default_value = "rowgen.toml")]
    config: String,
    /// Connection strings to try in order; `$VAR` reads one from the environment
    #[arg(long = "conn")]
    conns: Vec<String>,
    /// Read the catalog from a snapshot written by `introspect` instead of a database
    #[arg(long)]
    catalog: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the data-access client
    Generate {
        #[command(flatten)]
        source: Source,
        /// Path to write the generated code. Prints to stdout if not set.
        #[arg(long)]
        out: Option<String>,
        /// `NAME` or `NAME=regex`; every one must match for generation to run
        #[arg(long = "enable-var")]
        enable_vars: Vec<String>,
        /// `NAME` or `NAME=regex`; generation is skipped if any matches
        #[arg(long = "disable-var")]
        disable_vars: Vec<String>,
    },
    /// Introspect the configured tables and print a catalog snapshot
    Introspect {
        /// Path to the generator config
        #[arg(long, default_value = "rowgen.toml")]
        config: String,
        #[arg(long = "conn")]
        conns: Vec<String>,
        /// Output path for the snapshot TOML
        #[arg(long)]
        out: Option<String>,
    },
    /// Print the include closure of a table
    Closure {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        table: String,
        /// Check an include spec such as `orders{customers}` against the closure
        #[arg(long)]
        check: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rowgen={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

async fn load_catalog(source: &Source, config: &GenConfig) -> Result<CatalogSnapshot> {
    if let Some(path) = &source.catalog {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog snapshot {}", path))?;
        return CatalogSnapshot::from_toml(&text)
            .with_context(|| format!("invalid catalog snapshot {}", path));
    }
    let pool = connect_first(&source.conns).await?;
    introspect_postgres(&pool, &config.table_names()).await
}

fn write_output(out: Option<String>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(&path, text).with_context(|| format!("failed to write {}", path))?;
            tracing::info!("wrote {}", path);
        }
        None => println!("{}", text),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Generate {
            source,
            out,
            enable_vars,
            disable_vars,
        } => {
            if !generation_enabled(&enable_vars, &disable_vars, |v| std::env::var(v).ok())? {
                return Ok(());
            }
            let config = load_config(&source.config)?;
            let catalog = load_catalog(&source, &config).await?;
            let code = generate_code(&config, &catalog)?;
            write_output(out, &code)?;
        }
        Commands::Introspect { config, conns, out } => {
            let config = load_config(&config)?;
            let pool = connect_first(&conns).await?;
            let snapshot = introspect_postgres(&pool, &config.table_names()).await?;
            write_output(out, &toml::to_string_pretty(&snapshot)?)?;
        }
        Commands::Closure {
            source,
            table,
            check,
            json,
        } => {
            let config = load_config(&source.config)?;
            let catalog = load_catalog(&source, &config).await?;
            let (registry, closure) = build_model(&config, &catalog)?;
            if !registry.contains(&table) {
                anyhow::bail!("table '{}' is not configured", table);
            }
            if let Some(text) = check {
                let spec = IncludeSpec::parse(&text)?;
                validate_includes(&closure, &table, &spec)?;
                println!("ok: {}", spec);
                return Ok(());
            }
            let spec = closure.spec(&table);
            if json {
                let reachable: Vec<String> = closure.reachable(&table).into_iter().collect();
                let value = serde_json::json!({
                    "table": table,
                    "includes": spec.to_string(),
                    "reachable": reachable,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", spec);
            }
        }
    }

    Ok(())
}
