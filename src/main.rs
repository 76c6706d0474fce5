//! Purpose: `tabula` CLI entry point.
//! Role: Binary crate root; parses args, opens the database, runs one command.
//! Invariants: Command output is one JSON object per line on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Diagnostics go through `tracing` on stderr, filtered by `RUST_LOG`.
#![allow(clippy::result_large_err)]
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tabula::api::{
    Backend, DEFAULT_QUERY_LIMIT, Database, DatabaseOptions, Durability, Error, ErrorKind, Table,
    to_exit_code,
};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod ingest;
mod schema;

use schema::{SCHEMA_FILE_NAME, load_schema};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;
    let result = match cli.command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "tabula", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        command => Session::open(&cli.global).and_then(|session| {
            let outcome = command_dispatch::dispatch_command(command, &session);
            let closed = session.db.close();
            let outcome = outcome?;
            closed?;
            Ok(outcome)
        }),
    };

    result
        .map_err(add_io_hint)
        .map_err(add_corrupt_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "tabula",
    version,
    about = "Tabular key-value store with secondary indexes and a small SQL subset",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Rows are JSON objects. A schema file names each table's columns and indexes.

Mental model:
  - `insert` stores rows (write)
  - `scan` and `match` read by primary key or by index
  - `query` runs `SELECT * FROM <table> [WHERE ...] [LIMIT n]`
"#,
    after_help = r#"EXAMPLES
  $ tabula --dir ./db --schema orders.json insert orders '{"orderId":100,"status":"SHIPPED"}'
  $ tabula --dir ./db match orders by_status SHIPPED
  $ tabula --dir ./db query "SELECT * FROM orders WHERE orderId=100"

SCHEMA
  {"tables":[{"name":"orders","columns":["orderId","status"],
              "indexes":{"by_status":["status"],"status_by_id":["status","orderId"]}}]}
  Without --schema, <dir>/schema.json is used when present."#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct GlobalArgs {
    #[arg(
        long,
        global = true,
        help = "Database directory (log-structured files); in-memory when omitted",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "JSON schema file declaring tables, columns and indexes",
        value_hint = ValueHint::FilePath
    )]
    schema: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_QUERY_LIMIT,
        help = "Row cap for queries, scans and matches without an explicit limit"
    )]
    default_limit: usize,
    #[arg(
        long,
        global = true,
        default_value = "fast",
        value_enum,
        help = "Log backend write durability: fast|flush"
    )]
    durability: DurabilityArg,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DurabilityArg {
    Fast,
    Flush,
}

impl From<DurabilityArg> for Durability {
    fn from(value: DurabilityArg) -> Self {
        match value {
            DurabilityArg::Fast => Durability::Fast,
            DurabilityArg::Flush => Durability::Flush,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, ValueEnum)]
enum ErrorPolicyCli {
    Stop,
    Skip,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "List registered tables with their columns and indexes")]
    Tables,
    #[command(arg_required_else_help = true, about = "Describe one table")]
    Desc {
        #[arg(help = "Table name")]
        table: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Insert rows (JSON objects); reads JSON lines from stdin when no rows are given",
        after_help = r#"EXAMPLES
  $ tabula --dir ./db insert orders '{"orderId":100}' '{"orderId":101}'
  $ cat orders.jsonl | tabula --dir ./db insert orders --errors skip"#
    )]
    Insert {
        #[arg(help = "Table name")]
        table: String,
        #[arg(help = "Rows as inline JSON objects")]
        rows: Vec<String>,
        #[arg(
            long,
            default_value = "stop",
            value_enum,
            help = "Malformed stdin lines: stop|skip"
        )]
        errors: ErrorPolicyCli,
    },
    #[command(arg_required_else_help = true, about = "Stream rows in primary-key order")]
    Scan {
        #[arg(help = "Table name")]
        table: String,
        #[arg(short = 'n', long, help = "Maximum rows to emit")]
        limit: Option<usize>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Stream rows whose index value starts with VALUE",
        after_help = r#"EXAMPLES
  $ tabula --dir ./db match orders status_by_date 'SHIPPED#202009'
  $ tabula --dir ./db match orders by_status SHIPPED --exact"#
    )]
    Match {
        #[arg(help = "Table name")]
        table: String,
        #[arg(help = "Index name")]
        index: String,
        #[arg(help = "Index value or value prefix")]
        value: String,
        #[arg(short = 'n', long, help = "Maximum rows to emit")]
        limit: Option<usize>,
        #[arg(long, help = "Match the whole index value instead of a prefix")]
        exact: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Run SELECT * FROM <table> [WHERE ...] [LIMIT n]",
        after_help = r#"EXAMPLES
  $ tabula --dir ./db query "SELECT * FROM orders WHERE (status='PENDING' OR status='SHIPPED') AND orderDate=20200902"
  $ tabula --dir ./db query "select * from orders limit 1""#
    )]
    Query {
        #[arg(help = "SQL text")]
        sql: String,
    },
    #[command(arg_required_else_help = true, about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Open database plus the typed handles of the tables registered from the schema.
struct Session {
    db: Database,
    tables: BTreeMap<String, Arc<Table<Value>>>,
    default_limit: usize,
}

impl Session {
    fn open(args: &GlobalArgs) -> Result<Self, Error> {
        let options = DatabaseOptions::new()
            .with_default_limit(args.default_limit)
            .with_durability(args.durability.into());
        let backend = match &args.dir {
            Some(dir) => Backend::Log { dir: dir.clone() },
            None => Backend::Memory,
        };
        let db = Database::open(backend, options)?;

        let mut tables = BTreeMap::new();
        if let Some(path) = schema_path(args) {
            let schema = load_schema(&path)?;
            for table in &schema.tables {
                let handle = db.create_table(table.to_def()?)?;
                tables.insert(table.name.clone(), handle);
            }
        }
        Ok(Self {
            db,
            tables,
            default_limit: args.default_limit,
        })
    }

    fn table(&self, name: &str) -> Result<&Arc<Table<Value>>, Error> {
        self.tables.get(name).ok_or_else(|| {
            Error::new(ErrorKind::UnknownTable)
                .with_message(format!("no table named `{name}`"))
                .with_table(name)
                .with_hint("Declare the table in the schema file (see `tabula --help`).")
        })
    }
}

fn schema_path(args: &GlobalArgs) -> Option<PathBuf> {
    if let Some(path) = &args.schema {
        return Some(path.clone());
    }
    let fallback = args.dir.as_deref()?.join(SCHEMA_FILE_NAME);
    fallback.is_file().then_some(fallback)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Writes one compact JSON line to stdout.
fn emit_json(out: &mut impl Write, value: &Value) -> Result<(), Error> {
    serde_json::to_writer(&mut *out, value)
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write output")
                .with_source(err)
        })?;
    writeln!(out).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write output")
            .with_source(err)
    })
}

/// SGR parameters for stderr labels.
const HEADLINE_STYLE: &str = "1;31";
const DETAIL_STYLE: &str = "33";

fn styled(text: &str, sgr: &str, enabled: bool) -> String {
    if enabled {
        format!("\u{1b}[{sgr}m{text}\u{1b}[0m")
    } else {
        text.to_owned()
    }
}

/// Terminals get readable text; pipes and files get one JSON object.
fn emit_error(err: &Error, color_mode: ColorMode) {
    let stderr = io::stderr();
    let rendered = if stderr.is_terminal() {
        error_text(err, color_mode.use_color(true))
    } else {
        serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
            r#"{"error":{"kind":"Internal","message":"error could not be encoded"}}"#.to_string()
        })
    };
    let _ = writeln!(stderr.lock(), "{rendered}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::DuplicateTable => "table already exists".to_string(),
        ErrorKind::UnknownTable => "unknown table".to_string(),
        ErrorKind::UnknownIndex => "unknown index".to_string(),
        ErrorKind::QuerySyntax => "query syntax error".to_string(),
        ErrorKind::PartialWrite => "partial write".to_string(),
        ErrorKind::Codec => "row encoding error".to_string(),
        ErrorKind::Closed => "database is closed".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(index) = err.index() {
        inner.insert("index".to_string(), json!(index));
    }
    if let Some(position) = err.position() {
        inner.insert("position".to_string(), json!(position));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let label = |name: &str| styled(&format!("{name}:"), DETAIL_STYLE, use_color);
    let mut lines = vec![format!(
        "{} {}",
        styled("error:", HEADLINE_STYLE, use_color),
        error_message(err)
    )];

    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", label("hint")));
    }
    if let Some(table) = err.table() {
        match err.index() {
            Some(index) => lines.push(format!("{} {table} (index: {index})", label("table"))),
            None => lines.push(format!("{} {table}", label("table"))),
        }
    }
    if let Some(position) = err.position() {
        lines.push(format!("{} {position}", label("position")));
    }
    if let Some(path) = err.path() {
        lines.push(format!("{} {}", label("path"), display_path(path)));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("{} {cause}", label("caused by")));
    }

    lines.join("\n")
}

fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

fn add_io_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Io || err.hint().is_some() {
        return err;
    }
    err.with_hint("Check that the directory exists, is writable, and is not in use by another tabula process.")
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("A store file failed validation; restore it from a backup or move it aside.")
}

/// First non-empty line of clap's rendering, without its `error:` prefix.
fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").map_or(line, str::trim).to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `tabula --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "tabula") else {
        return "Try `tabula --help`.".to_string();
    };
    let subcommand = tokens
        .iter()
        .skip(pos + 1)
        .find(|token| !token.starts_with('-') && !token.starts_with('<') && !token.starts_with('['));
    match subcommand {
        Some(name) => format!("Try `tabula {name} --help`."),
        None => "Try `tabula --help`.".to_string(),
    }
}
