//! pgcursors: stream a query through a server-side cursor
//!
//! # Usage
//!
//! ```bash
//! # Stream a table 500 rows at a time
//! pgcursors "select * from events" --batch-size 500
//!
//! # Show the cursor statements without connecting
//! pgcursors "select * from events where kind = \$1" --bind signup --dry-run
//!
//! # One JSON object per line
//! pgcursors "select * from events" --format json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use pgcursors::prelude::*;
use pgcursors::protocol::{close_sql, declare_sql, fetch_sql};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgcursors")]
#[command(version)]
#[command(about = "Stream PostgreSQL result sets through server-side cursors", long_about = None)]
#[command(after_help = "EXAMPLES:
    pgcursors 'select * from events' --batch-size 500
    pgcursors 'select * from events where kind = $1' --bind signup --format json
    pgcursors 'select * from events' --dry-run")]
struct Cli {
    /// The SQL query to stream
    query: Option<String>,

    /// Don't connect, just show the cursor statements
    #[arg(short, long)]
    dry_run: bool,

    /// Parameter bindings ($1, $2, etc.)
    #[arg(short, long, value_delimiter = ',')]
    bind: Vec<String>,

    /// Rows per fetch (overrides the config file)
    #[arg(long, allow_negative_numbers = true)]
    batch_size: Option<i64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Database connection URL
    #[arg(long, env = "PGCURSORS_DATABASE_URL")]
    database_url: Option<String>,

    /// Config file (defaults to ./pgcursors.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved cursor configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Some(Commands::Config) => show_config(&cli),
        None => match &cli.query {
            Some(query) => stream_query(query, &cli).await,
            None => {
                println!("{}", "pgcursors: server-side cursor streaming".cyan().bold());
                println!();
                println!("Usage: pgcursors <QUERY> [OPTIONS]");
                println!();
                println!("Try: pgcursors --help");
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pgcursors=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<CursorConfig> {
    let mut config = match &cli.config {
        Some(path) => CursorConfig::load(path)?,
        None => CursorConfig::discover()?,
    };
    if let Some(size) = cli.batch_size {
        config.batch_size = size;
    }
    config.validate()?;
    Ok(config)
}

fn show_config(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    println!("{}", "Cursor configuration:".green().bold());
    println!("  {} {}", "batch_size:".dimmed(), config.batch_size.to_string().cyan());
    println!("  {} {}", "name_prefix:".dimmed(), config.name_prefix.cyan());
    println!(
        "  {} {}",
        "name_suffix_len:".dimmed(),
        config.name_suffix_len.to_string().cyan()
    );
    Ok(())
}

/// Try number, then bool, otherwise bind as text.
fn parse_binding(raw: &str) -> SqlValue {
    if let Ok(n) = raw.parse::<i64>() {
        SqlValue::Int(n)
    } else if let Ok(f) = raw.parse::<f64>() {
        SqlValue::Float(f)
    } else if raw == "true" {
        SqlValue::Bool(true)
    } else if raw == "false" {
        SqlValue::Bool(false)
    } else if raw.eq_ignore_ascii_case("null") {
        SqlValue::Null
    } else {
        SqlValue::String(raw.to_string())
    }
}

async fn stream_query(query: &str, cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let statement = cli
        .bind
        .iter()
        .fold(Statement::new(query), |stmt, raw| stmt.bind(parse_binding(raw)));
    let session = statement.cursor().with_config(config)?;

    if cli.verbose {
        println!("{} {}", "Cursor:".dimmed(), session.cursor_name().as_str().yellow());
    }

    if cli.dry_run || cli.database_url.is_none() {
        show_statements(&session)?;
        if cli.database_url.is_none() && !cli.dry_run {
            println!();
            println!(
                "{}",
                "⚠ No database URL. Use --database-url or set PGCURSORS_DATABASE_URL".yellow()
            );
        }
        return Ok(());
    }

    let Some(db_url) = cli.database_url.as_deref() else {
        return Ok(());
    };
    if cli.verbose {
        println!("{} {}", "Connecting to:".dimmed(), db_url);
    }
    let mut conn = PgCursorConnection::connect(db_url).await?;

    let mut printer = Printer::new(cli.format.clone());
    session
        .each_batch(&mut conn, session.config().batch_size, async |_conn, rows: Vec<Row>| {
            printer.print_batch(&rows)?;
            Ok::<_, anyhow::Error>(())
        })
        .await?;
    printer.finish();

    conn.close().await?;
    Ok(())
}

fn show_statements(session: &CursorSession<RowMapper>) -> anyhow::Result<()> {
    let name = session.cursor_name();
    let size = pgcursors::config::validate_batch_size(session.config().batch_size)?;

    println!("{}", "Cursor statements:".green().bold());
    println!("  {}", "begin".white());
    println!("  {}", declare_sql(name, session.statement().sql()).white());
    println!("  {} {}", fetch_sql(name, size).white(), "(repeated)".dimmed());
    println!("  {}", close_sql(name).white());
    println!("  {}", "commit".white());

    if !session.statement().bindings().is_empty() {
        println!();
        println!("{}", "Bindings:".cyan());
        for (i, b) in session.statement().bindings().iter().enumerate() {
            println!("  ${} = {}", i + 1, b.to_string().yellow());
        }
    }
    Ok(())
}

/// Prints batches as they arrive. Table widths come from the first batch.
struct Printer {
    format: OutputFormat,
    widths: Option<Vec<usize>>,
    rows: usize,
}

impl Printer {
    fn new(format: OutputFormat) -> Self {
        Self {
            format,
            widths: None,
            rows: 0,
        }
    }

    fn print_batch(&mut self, rows: &[Row]) -> anyhow::Result<()> {
        self.rows += rows.len();
        match self.format {
            OutputFormat::Json => {
                for row in rows {
                    println!("{}", serde_json::to_string(&row.to_json())?);
                }
            }
            OutputFormat::Table => {
                let Some(first) = rows.first() else {
                    return Ok(());
                };
                let widths = self.widths.get_or_insert_with(|| {
                    let mut widths: Vec<usize> = first.columns().iter().map(|c| c.len()).collect();
                    for row in rows {
                        for (w, v) in widths.iter_mut().zip(row.values()) {
                            *w = (*w).max(v.to_string().len());
                        }
                    }

                    let header: Vec<String> = first
                        .columns()
                        .iter()
                        .zip(&widths)
                        .map(|(c, w)| format!("{:width$}", c, width = *w))
                        .collect();
                    println!("{}", header.join(" │ ").white().bold());
                    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
                    println!("{}", sep.join("─┼─").dimmed());
                    widths
                });

                for row in rows {
                    let cells: Vec<String> = row
                        .values()
                        .iter()
                        .zip(widths.iter())
                        .map(|(v, w)| format!("{:width$}", v.to_string(), width = *w))
                        .collect();
                    println!("{}", cells.join(" │ "));
                }
            }
        }
        Ok(())
    }

    fn finish(&self) {
        if let OutputFormat::Table = self.format {
            if self.rows == 0 {
                println!("{}", "(no results)".dimmed());
            } else {
                println!();
                println!("{} row(s) streamed", self.rows.to_string().cyan());
            }
        }
    }
}
