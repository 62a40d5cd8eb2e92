//! crmql CLI - Run JSON queries against CRM data
//!
//! Usage:
//!   crmql query --file <query.json> [--fixture <data.json>] [--output <format>]
//!   crmql validate --query '<json>'
//!   crmql explain --file <query.json>
//!   crmql schema [entity]
//!
//! Examples:
//!   crmql query --query '{"$version":"1.0","from":"persons","limit":5}' --fixture crm.json
//!   crmql query --file deals.json --output markdown --max-output-bytes 20000
//!   crmql query --file deals.json --cursor eyJ2IjoxLC4uLn0

use clap::{Args, Parser, Subcommand, ValueEnum};
use crmql::client::FixtureClient;
use crmql::config::Settings;
use crmql::cursor::{self, CursorPayload, ResumeState};
use crmql::executor::{CancelHandle, LogProgress, QueryExecutor, QueryResult};
use crmql::output::{
    self, insert_cursor_in_toon_truncation, OutputFormat, EXIT_ERROR, EXIT_SUCCESS,
    EXIT_TRUNCATED, EXIT_USAGE,
};
use crmql::planner::plan_query;
use crmql::query::{parse_query_file, parse_query_str, ParseResult, Query, QueryError};
use crmql::schema;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "crmql")]
#[command(about = "crmql - A client-side query engine for CRM data")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct QueryInput {
    /// Path to a JSON query file
    #[arg(short, long, conflicts_with = "query")]
    file: Option<PathBuf>,

    /// Inline JSON query (reads stdin when neither --file nor --query is given)
    #[arg(short, long)]
    query: Option<String>,

    /// Override the query's $version
    #[arg(long = "query-version")]
    query_version: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a query
    Query {
        #[command(flatten)]
        input: QueryInput,

        /// JSON fixture to serve records from
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Output format
        #[arg(short, long)]
        output: Option<FormatArg>,

        /// Truncate rendered output to this many bytes
        #[arg(long)]
        max_output_bytes: Option<usize>,

        /// Resume from a cursor returned by a previous run
        #[arg(long)]
        cursor: Option<String>,

        /// Settings file (defaults to $CRMQL_CONFIG, ./crmql.toml, then the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum records fetched before failing
        #[arg(long)]
        max_records: Option<usize>,

        /// Wall-clock timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Simultaneous remote calls
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the execution plan instead of running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a query without executing it
    Validate {
        #[command(flatten)]
        input: QueryInput,
    },

    /// Show the execution plan for a query
    Explain {
        #[command(flatten)]
        input: QueryInput,
    },

    /// List entities, or describe one entity
    Schema {
        /// Entity to describe
        entity: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Toon,
    Markdown,
    Jsonl,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Toon => OutputFormat::Toon,
            FormatArg::Markdown => OutputFormat::Markdown,
            FormatArg::Jsonl => OutputFormat::Jsonl,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

struct QueryOptions {
    fixture: Option<PathBuf>,
    output: Option<FormatArg>,
    max_output_bytes: Option<usize>,
    cursor: Option<String>,
    config: Option<PathBuf>,
    max_records: Option<usize>,
    timeout: Option<u64>,
    concurrency: Option<usize>,
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match cli.command {
        Commands::Query {
            input,
            fixture,
            output,
            max_output_bytes,
            cursor,
            config,
            max_records,
            timeout,
            concurrency,
            dry_run,
        } => cmd_query(
            input,
            QueryOptions {
                fixture,
                output,
                max_output_bytes,
                cursor,
                config,
                max_records,
                timeout,
                concurrency,
                dry_run,
            },
        ),
        Commands::Validate { input } => cmd_validate(input),
        Commands::Explain { input } => cmd_explain(input),
        Commands::Schema { entity } => cmd_schema(entity),
    };
    ExitCode::from(code)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn report_error(e: &QueryError) -> u8 {
    eprintln!("Error ({}): {}", e.kind(), e);
    if e.is_usage_error() {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn read_query(input: &QueryInput) -> Result<ParseResult, QueryError> {
    let version = input.query_version.as_deref();
    match (&input.file, &input.query) {
        (Some(path), _) => parse_query_file(path, version),
        (None, Some(text)) => parse_query_str(text, version),
        (None, None) => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| QueryError::parse(format!("Failed to read query from stdin: {}", e)))?;
            parse_query_str(&text, version)
        }
    }
}

fn parse_with_warnings(input: &QueryInput) -> Result<Query, QueryError> {
    let parsed = read_query(input)?;
    for warning in &parsed.warnings {
        eprintln!("Warning: {}", warning);
    }
    Ok(parsed.query)
}

fn cmd_validate(input: QueryInput) -> u8 {
    match parse_with_warnings(&input).and_then(|query| plan_query(&query)) {
        Ok(plan) => {
            println!(
                "OK: query on '{}' is valid ({} step(s))",
                plan.query.from,
                plan.steps.len()
            );
            EXIT_SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn cmd_explain(input: QueryInput) -> u8 {
    match parse_with_warnings(&input).and_then(|query| plan_query(&query)) {
        Ok(plan) => {
            print!("{}", plan.explain());
            EXIT_SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn cmd_schema(entity: Option<String>) -> u8 {
    let Some(name) = entity else {
        println!("Entities:");
        for name in schema::get_supported_entities() {
            println!("  - {}", name);
        }
        println!();
        println!("Expansions:");
        for name in schema::get_supported_expansions() {
            println!("  - {}", name);
        }
        return EXIT_SUCCESS;
    };

    let Some(entity) = schema::get_entity_schema(&name) else {
        eprintln!(
            "Unknown entity '{}'. Supported entities: {}",
            name,
            schema::get_supported_entities().join(", ")
        );
        return EXIT_USAGE;
    };

    println!("Entity: {}", entity.name);
    if let schema::EntityFetch::RequiresParent {
        filter_field,
        name_field,
    } = &entity.fetch
    {
        println!("  Requires parent: '{}' or '{}' in where", filter_field, name_field);
    }
    println!("  Fields: {}", entity.filterable_fields.join(", "));
    if !entity.computed_fields.is_empty() {
        println!("  Computed: {}", entity.computed_fields.join(", "));
    }
    if !entity.relationships.is_empty() {
        println!("  Relationships:");
        for (rel_name, rel) in &entity.relationships {
            println!(
                "    - {} -> {} via {}{}",
                rel_name,
                rel.target_entity,
                rel.method_or_service(),
                if rel.requires_n_plus_1 { " (N+1)" } else { "" }
            );
        }
    }
    let expansions: Vec<&str> = schema::get_supported_expansions()
        .into_iter()
        .filter(|e| {
            schema::get_expansion(e).is_some_and(|def| def.id_fields.contains_key(entity.name))
        })
        .collect();
    if !expansions.is_empty() {
        println!("  Expansions: {}", expansions.join(", "));
    }
    EXIT_SUCCESS
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings, String> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
    .map_err(|e| e.to_string())
}

fn cmd_query(input: QueryInput, options: QueryOptions) -> u8 {
    let settings = match load_settings(options.config.as_ref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_USAGE;
        }
    };

    let query = match parse_with_warnings(&input) {
        Ok(q) => q,
        Err(e) => return report_error(&e),
    };
    let plan = match plan_query(&query) {
        Ok(p) => p,
        Err(e) => return report_error(&e),
    };
    if options.dry_run {
        print!("{}", plan.explain());
        return EXIT_SUCCESS;
    }

    let format: OutputFormat = options
        .output
        .map(Into::into)
        .unwrap_or(settings.output.format);

    let resume = match &options.cursor {
        Some(token) => match cursor::decode(token, &query, format.as_str()) {
            Ok(payload) => Some(payload.resume_state),
            Err(e) => return report_error(&QueryError::from(e)),
        },
        None => None,
    };

    let configured = options
        .fixture
        .clone()
        .map(Ok)
        .or_else(|| settings.fixture_path().transpose());
    let fixture = match configured {
        Some(Ok(path)) => path,
        Some(Err(e)) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_USAGE;
        }
        None => {
            eprintln!("No data source configured; pass --fixture or set [source].fixture");
            return EXIT_USAGE;
        }
    };
    let client = match FixtureClient::from_file(&fixture) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };

    let mut config = settings.executor_config();
    if let Some(n) = options.max_records {
        config.max_records = n;
    }
    if let Some(seconds) = options.timeout {
        config.timeout = std::time::Duration::from_secs(seconds);
    }
    if let Some(n) = options.concurrency {
        config.concurrency = n.max(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return EXIT_ERROR;
        }
    };

    let cancel = CancelHandle::new();
    let executor = QueryExecutor::new(Arc::new(client), config)
        .with_progress(Arc::new(LogProgress))
        .with_cancel(cancel.clone())
        .with_format(format);

    let outcome = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
        executor.execute_resumed(&plan, resume.clone()).await
    });

    let result = match outcome {
        Ok(r) => r,
        Err(e) => return report_error(&e),
    };

    let max_bytes = options.max_output_bytes.or(settings.output.max_bytes);
    let delivered = resume.as_ref().map_or(0, ResumeState::delivered);
    write_output(&query, &result, format, max_bytes, delivered)
}

/// Render, bound and print a result; returns the exit code.
fn write_output(
    query: &Query,
    result: &QueryResult,
    format: OutputFormat,
    max_bytes: Option<usize>,
    delivered: usize,
) -> u8 {
    let rendered = output::render(result, format);
    let total = result.len();

    let Some(max_bytes) = max_bytes.filter(|max| rendered.len() > *max) else {
        print!("{}", rendered);
        if let Some(page) = &result.pagination {
            eprintln!("{}", cursor::emit_cursor_line(&page.cursor, &page.mode));
        }
        return EXIT_SUCCESS;
    };

    let issue = |shown: usize| -> Option<String> {
        let state = ResumeState::FullFetch {
            skip: delivered + shown,
            total: Some(delivered + total),
        };
        let hash = cursor::hash_query(query, format.as_str()).ok()?;
        cursor::encode(&CursorPayload::new(hash, state)).ok()
    };

    // Leave room for the cursor line that TOON carries inline.
    let reserve = match (format, issue(total)) {
        (OutputFormat::Toon, Some(token)) => token.len() + "\n  cursor: ".len() + 8,
        _ => 0,
    };
    let truncation = output::truncate(
        &rendered,
        format,
        max_bytes.saturating_sub(reserve),
        Some(total),
    );
    if !truncation.truncated {
        print!("{}", truncation.content);
        return EXIT_SUCCESS;
    }

    let shown = truncation.rows_shown.unwrap_or(0);
    let token = (shown < total).then(|| issue(shown)).flatten();
    let content = match (&token, format) {
        (Some(token), OutputFormat::Toon) => {
            insert_cursor_in_toon_truncation(&truncation.content, token)
        }
        _ => truncation.content,
    };
    print!("{}", content);
    if let Some(token) = &token {
        eprintln!("{}", cursor::emit_cursor_line(token, "full-fetch"));
    }
    log::info!("output truncated to {} of {} row(s)", shown, total);
    EXIT_TRUNCATED
}
