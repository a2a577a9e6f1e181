use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use quickmodel_core::{Record, SqlValue, Value, coerce};
use quickmodel_sqlite::{Database, DatabaseConfig, ResultSet};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quickmodel")]
#[command(about = "Inspect and query QuickModel SQLite databases")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Database file path.
    #[arg(long, conflicts_with = "config")]
    db: Option<PathBuf>,
    /// YAML configuration naming the database.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List user tables.
    Tables,
    /// Print the stored DDL of one table or view, or of every table.
    Schema(SchemaArgs),
    /// Show the stored application schema version.
    Version,
    /// Select rows from a table or view as JSON.
    Query(QueryArgs),
    /// Execute one raw SQL statement.
    Exec(ExecArgs),
}

#[derive(Debug, Args)]
struct SchemaArgs {
    /// Table or view name.
    name: Option<String>,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Table or view name.
    table: String,
    /// JSON filter, e.g. '{"age": {"gte": 18}}'.
    #[arg(long)]
    filter: Option<String>,
    /// Comma-separated ordering keys; prefix with '-' for descending.
    #[arg(long, allow_hyphen_values = true)]
    order: Option<String>,
    #[arg(long)]
    limit: Option<u64>,
    #[arg(long)]
    offset: Option<u64>,
    /// Print only the number of matching rows.
    #[arg(long)]
    count: bool,
}

#[derive(Debug, Args)]
struct ExecArgs {
    /// SQL statement with `?` placeholders.
    sql: String,
    /// Positional parameters as JSON scalars (strings need quotes).
    #[arg(long = "param")]
    params: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = open(&cli.source).and_then(|db| match cli.command {
        Command::Tables => run_tables(&db),
        Command::Schema(args) => run_schema(&db, args),
        Command::Version => run_version(&db),
        Command::Query(args) => run_query(&db, args),
        Command::Exec(args) => run_exec(&db, args),
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Attaches to the database without touching its schema.
fn open(source: &SourceArgs) -> Result<Database, String> {
    let path = match (&source.db, &source.config) {
        (Some(path), _) => path.clone(),
        (None, Some(config)) => DatabaseConfig::load(config)
            .map_err(|e| format!("Failed to load config '{}': {e}", config.display()))?
            .database_path(),
        (None, None) => return Err("either --db or --config is required".to_string()),
    };
    if !path.exists() {
        return Err(format!("Database '{}' does not exist", path.display()));
    }
    info!(path = %path.display(), "Attaching database");
    let conn = rusqlite::Connection::open(&path)
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))?;
    Database::attach(conn).map_err(|e| format!("Failed to attach database: {e}"))
}

fn run_tables(db: &Database) -> Result<(), String> {
    for name in db.table_names().map_err(|e| e.to_string())? {
        println!("{name}");
    }
    Ok(())
}

fn run_schema(db: &Database, args: SchemaArgs) -> Result<(), String> {
    let names = match args.name {
        Some(name) => vec![name],
        None => db.table_names().map_err(|e| e.to_string())?,
    };
    for name in names {
        let sql = db
            .object_sql(&name)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("No table or view named '{name}'"))?;
        println!("{sql};");
    }
    Ok(())
}

fn run_version(db: &Database) -> Result<(), String> {
    match db.version_record().map_err(|e| e.to_string())? {
        Some(record) => println!(
            "{}",
            serde_json::to_string_pretty(&record).map_err(|e| e.to_string())?
        ),
        None => println!("unversioned"),
    }
    Ok(())
}

fn run_query(db: &Database, args: QueryArgs) -> Result<(), String> {
    let model = db.table(&args.table).map_err(|e| e.to_string())?;
    let mut query = model.query();
    if let Some(filter) = &args.filter {
        let json: serde_json::Value =
            serde_json::from_str(filter).map_err(|e| format!("Invalid filter JSON: {e}"))?;
        query = query.filter_json(&json).map_err(|e| e.to_string())?;
    }
    if let Some(order) = &args.order {
        query = query.order(order).map_err(|e| e.to_string())?;
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = args.offset {
        query = query.offset(offset);
    }

    if args.count {
        println!("{}", query.count().map_err(|e| e.to_string())?);
        return Ok(());
    }
    let rows: Vec<serde_json::Value> = query
        .all()
        .map_err(|e| e.to_string())?
        .iter()
        .map(record_json)
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())?
    );
    Ok(())
}

fn run_exec(db: &Database, args: ExecArgs) -> Result<(), String> {
    let params = args
        .params
        .iter()
        .map(|raw| parse_param(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let result = db
        .execute_sql(&args.sql, &params)
        .map_err(|e| format!("Statement failed: {e}"))?;
    print_result(&result)
}

fn parse_param(raw: &str) -> Result<SqlValue, String> {
    let json: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("Invalid parameter '{raw}': {e}"))?;
    Ok(coerce::encode(&Value::from_json(&json), None))
}

fn print_result(result: &ResultSet) -> Result<(), String> {
    if result.columns.is_empty() {
        println!("Rows affected: {}", result.rows_affected);
        if result.insert_id > 0 {
            println!("Last insert id: {}", result.insert_id);
        }
        return Ok(());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&result.to_json()).map_err(|e| e.to_string())?
    );
    Ok(())
}

fn record_json(record: &Record) -> serde_json::Value {
    record
        .values()
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect::<serde_json::Map<_, _>>()
        .into()
}
