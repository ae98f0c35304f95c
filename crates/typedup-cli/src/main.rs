//! typedup CLI - typing and deduplication SQL for replicated streams.

mod snapshot;

use clap::{Parser, Subcommand};
use snapshot::SnapshotIntrospector;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use typedup::generator::OVERWRITE_SUFFIX;
use typedup::{
    evaluate_existing, CatalogParser, Config, ExistingTableSchema, GeneratedSql, StreamConfig,
    TypedupError, TyperDeduper,
};

#[derive(Parser)]
#[command(name = "typedup")]
#[command(about = "Generate typing and deduplication SQL for replicated streams")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "typedup.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "warn")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the DDL creating (or replacing) a stream's final table
    Create {
        /// Stream as namespace.name
        #[arg(long)]
        stream: String,

        /// Table name suffix, for building a shadow table
        #[arg(long, default_value = "")]
        suffix: String,
    },

    /// Print the SQL typing newly loaded raw records into the final table
    Update {
        /// Stream as namespace.name
        #[arg(long)]
        stream: String,
    },

    /// Print the SQL rebuilding a final table from all raw records
    SoftReset {
        /// Stream as namespace.name
        #[arg(long)]
        stream: String,
    },

    /// Print the SQL swapping a shadow table into the final position
    Overwrite {
        /// Stream as namespace.name
        #[arg(long)]
        stream: String,

        /// Suffix of the shadow table
        #[arg(long, default_value = OVERWRITE_SUFFIX)]
        suffix: String,
    },

    /// Compare a stream against an existing table snapshot
    Diff {
        /// Stream as namespace.name
        #[arg(long)]
        stream: String,

        /// JSON file mapping column name to type
        #[arg(long)]
        existing: PathBuf,
    },

    /// Plan every stream against a snapshot of the destination
    Plan {
        /// JSON file mapping namespace.name to {column: type}
        #[arg(long)]
        snapshot: PathBuf,
    },

    /// Validate the configuration and stream schemas
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, TypedupError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(TypedupError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let parser = CatalogParser::from_config(&config)?;
    let planner = TyperDeduper::from_config(&config)?;
    let generator = planner.generator();
    let find = |label: &str| -> Result<StreamConfig, TypedupError> {
        let definition = config.find_stream(label)?;
        parser.parse_stream(config.namespace_of(definition), definition)
    };

    match cli.command {
        Commands::Create { stream, suffix } => {
            let sql = generator.create_table(&find(&stream)?, &suffix)?;
            print_sql(&sql, cli.output_json)?;
        }

        Commands::Update { stream } => {
            let sql = planner.typing_and_deduping(&find(&stream)?)?;
            print_sql(&sql, cli.output_json)?;
        }

        Commands::SoftReset { stream } => {
            let sql = generator.soft_reset(&find(&stream)?)?;
            print_sql(&sql, cli.output_json)?;
        }

        Commands::Overwrite { stream, suffix } => {
            let stream = find(&stream)?;
            let sql = generator.overwrite_final_table(&stream.id, &suffix)?;
            print_sql(&sql, cli.output_json)?;
        }

        Commands::Diff { stream, existing } => {
            let stream = find(&stream)?;
            let content = std::fs::read_to_string(&existing)?;
            let schema: ExistingTableSchema = serde_json::from_str(&content)?;
            let introspector =
                SnapshotIntrospector::default().with_table(&stream.id.final_display(), schema);

            let verdict = evaluate_existing(
                &introspector,
                generator,
                &stream,
                config.destination.strict_columns,
            )
            .await?
            .ok_or_else(|| {
                TypedupError::introspection(stream.id.final_display(), "table not found")
            })?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                println!("{}: {}", stream.id.final_display(), verdict);
            }
            if !verdict.is_compatible() {
                return Ok(ExitCode::from(1));
            }
        }

        Commands::Plan { snapshot } => {
            let introspector = SnapshotIntrospector::load(&snapshot)?;
            let streams = parser.parse_catalog(&config)?;
            let plans = planner.prepare_with(&introspector, &streams).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                for (plan, stream) in plans.iter().zip(&streams) {
                    println!("-- {}: {:?}", plan.table, plan.action);
                    if !plan.sql.is_empty() {
                        println!("{}", plan.sql);
                    }
                    let update = planner.typing_and_deduping(stream)?;
                    println!("{}", update);
                    let commit = planner.commit_final_table(stream)?;
                    if !commit.is_empty() {
                        println!("{}", commit);
                    }
                }
            }
        }

        Commands::Validate => {
            let streams = parser.parse_catalog(&config)?;
            if cli.output_json {
                let names: Vec<String> = streams.iter().map(|s| s.id.final_display()).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "valid": true,
                        "streams": names,
                    }))?
                );
            } else {
                println!("Configuration is valid ({} streams)", streams.len());
                for stream in &streams {
                    println!(
                        "  {} -> {} ({} columns)",
                        stream.id,
                        stream.id.final_display(),
                        stream.columns.len()
                    );
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_sql(sql: &GeneratedSql, output_json: bool) -> Result<(), TypedupError> {
    if output_json {
        println!("{}", serde_json::to_string_pretty(sql)?);
    } else {
        print!("{}", sql);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    // stdout carries SQL and JSON output only
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
