//! # prism — The Lens of PRISM
//!
//! Offline inspection of search queries against a static stream catalog.
//!
//! - `prism apply` — print queries with an execution state applied.
//! - `prism expand` — print queries with stream categories expanded.
//! - `prism streams` — list the streams a permission check must cover.
//! - `prism plan` — print the backend request of every search type.
//! - `prism extract` — turn a raw backend response into a typed result.

mod config;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tabled::{Table, Tabled};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::Config;
use prism_core::{BoxError, ExecutionState, Query};
use prism_engine::{PlannedQuery, RawResponse, SearchPlanner, StrategyRegistry};

/// Plan and inspect log searches without a backend.
#[derive(Parser)]
#[command(name = "prism", version, about, long_about = None)]
struct Cli {
    /// Configuration file (backend layout, categories, permissions).
    #[arg(long, global = true, default_value = "prism.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective queries after applying an execution state.
    Apply {
        /// Query JSON (one object or an array).
        #[arg(long)]
        query: PathBuf,
        /// Execution state JSON.
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Print queries with stream categories expanded into permitted streams.
    Expand {
        #[arg(long)]
        query: PathBuf,
    },

    /// List every stream id the queries touch.
    Streams {
        #[arg(long)]
        query: PathBuf,
    },

    /// Print the backend request body of every search type.
    Plan {
        #[arg(long)]
        query: PathBuf,
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Extract a typed result from a raw backend response.
    Extract {
        #[arg(long)]
        query: PathBuf,
        #[arg(long)]
        state: Option<PathBuf>,
        /// Id of the search type the response belongs to.
        #[arg(long)]
        search_type: String,
        /// Raw backend response JSON.
        #[arg(long)]
        response: PathBuf,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryFile {
    Many(Vec<Query>),
    One(Query),
}

#[derive(Tabled)]
struct StreamRow {
    query: String,
    stream: String,
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "prism=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), BoxError> {
    let config = Config::load(&cli.config)?;
    let resolve = |categories: &BTreeSet<String>| config.resolve_categories(categories);
    let permitted = |stream: &str| config.is_permitted(stream);

    match cli.command {
        Commands::Apply { query, state } => {
            let state = load_state(state.as_deref())?;
            let applied: Vec<Query> = load_queries(&query)?
                .iter()
                .map(|q| q.apply_execution_state(&state))
                .collect();
            print_json(&applied)?;
        }

        Commands::Expand { query } => {
            let expanded = load_queries(&query)?
                .iter()
                .map(|q| q.replace_stream_category_filters(resolve, permitted))
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&expanded)?;
        }

        Commands::Streams { query } => {
            let rows: Vec<StreamRow> = load_queries(&query)?
                .iter()
                .flat_map(|q| {
                    q.stream_ids_for_permissions_check()
                        .into_iter()
                        .map(|stream| StreamRow {
                            query: q.id().to_string(),
                            stream,
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            println!("{}", Table::new(rows));
        }

        Commands::Plan { query, state } => {
            let planned = plan(&config, &query, state.as_deref(), resolve, permitted)?;
            let bodies: serde_json::Map<String, serde_json::Value> = planned
                .iter()
                .flat_map(|p| {
                    p.requests.iter().map(|r| {
                        (format!("{}/{}", r.query_id, r.search_type_id), r.body())
                    })
                })
                .collect();
            print_json(&bodies)?;
        }

        Commands::Extract {
            query,
            state,
            search_type,
            response,
        } => {
            let planned = plan(&config, &query, state.as_deref(), resolve, permitted)?;
            let owner = planned
                .iter()
                .find(|p| p.query.search_type(&search_type).is_some())
                .ok_or_else(|| format!("no query contains search type '{}'", search_type))?;
            let raw = RawResponse::from_json(read_json(&response)?)?;
            let result = planner(&config).extract(owner, &search_type, &raw)?;
            print_json(&result)?;
        }
    }
    Ok(())
}

fn planner(config: &Config) -> SearchPlanner {
    SearchPlanner::new(StrategyRegistry::with_defaults(), config.backend.clone())
}

fn plan<R, P>(
    config: &Config,
    query: &Path,
    state: Option<&Path>,
    resolve: R,
    permitted: P,
) -> Result<Vec<PlannedQuery>, BoxError>
where
    R: Fn(&BTreeSet<String>) -> Result<Vec<String>, BoxError>,
    P: Fn(&str) -> Result<bool, BoxError>,
{
    let queries = load_queries(query)?;
    let state = load_state(state)?;
    Ok(planner(config).plan(&queries, &state, resolve, permitted, chrono::Utc::now())?)
}

fn read_json(path: &Path) -> Result<serde_json::Value, BoxError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

fn load_queries(path: &Path) -> Result<Vec<Query>, BoxError> {
    let queries = match serde_json::from_value::<QueryFile>(read_json(path)?)? {
        QueryFile::Many(queries) => queries,
        QueryFile::One(query) => vec![query],
    };
    tracing::info!("Loaded {} query(ies) from {}", queries.len(), path.display());
    Ok(queries)
}

fn load_state(path: Option<&Path>) -> Result<ExecutionState, BoxError> {
    match path {
        Some(path) => Ok(serde_json::from_value(read_json(path)?)?),
        None => Ok(ExecutionState::empty()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
