use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info};
use mimalloc::MiMalloc;
use std::io::{self, Read};

use polystore::{marshal, params, query, repo};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(author, version, about = "Backend-neutral query translation and persistence tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a JSON query spec is translated for each backend family
    Explain {
        /// Query spec as JSON (use '-' for stdin)
        query: String,

        /// Render a full SELECT statement against this table
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Check that the configured PostgreSQL instance accepts transactions
    Ping,
}

fn read_query(arg: &str) -> io::Result<String> {
    if arg != "-" {
        return Ok(arg.to_owned());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn explain(raw: &str, table: Option<&str>) -> CliResult {
    let spec = marshal::query_spec_from_str(&read_query(raw)?)?;
    debug!("parsed query spec: {spec:?}");

    let clause = query::to_sql(&spec)?;
    let document = query::to_document_query(&spec)?;

    println!("{}", "relational".bold().cyan());
    match table {
        Some(table) => println!(
            "  {}",
            repo::statements::select_fields(table, &spec.projection, &clause)
        ),
        None => println!("  {}", clause.clause),
    }
    for (i, value) in clause.values.iter().enumerate() {
        println!("  {} {value}", format!("${}", i + 1).dimmed());
    }

    println!("{}", "document".bold().cyan());
    println!("  {} {}", "filter".dimmed(), document.filter);
    println!("  {} {}", "sort".dimmed(), document.sort);
    if let Some(projection) = &document.projection {
        println!("  {} {projection}", "projection".dimmed());
    }
    if let Some(limit) = document.limit {
        println!("  {} {limit}", "limit".dimmed());
    }
    if let Some(skip) = document.skip {
        println!("  {} {skip}", "skip".dimmed());
    }

    Ok(())
}

async fn ping() -> CliResult {
    let config = params::configurables();
    let dsn = config
        .sql_dsn
        .as_deref()
        .ok_or(format!("{} is not set", params::ENV_SQL_DSN))?;

    let backend = repo::PgBackend::connect(dsn, config.sql_max_connections).await?;
    let mut tx = repo::Transaction::begin(&backend).await?;
    tx.rollback().await?;

    info!("postgres reachable");
    println!("{}", "ok".green().bold());
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Explain { query, table } => explain(&query, table.as_deref()),
        Commands::Ping => ping().await,
    };

    if let Err(e) = result {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}
