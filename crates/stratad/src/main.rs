use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strata_config::load_workspace_config;
use strata_slice::{SliceRequest, SliceService, to_compact_v2};
use strata_store::{SqliteSymbolStore, SymbolStore};
use tracing_subscriber::EnvFilter;

const DB_FILE_NAME: &str = "graph.sqlite";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LogFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum WireFormat {
    #[default]
    Full,
    CompactV2,
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "full" => Ok(Self::Full),
            "compact-v2" => Ok(Self::CompactV2),
            other => Err(format!(
                "invalid wire format '{other}', expected one of: full, compact-v2"
            )),
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about = "STRATA slice daemon")]
struct Cli {
    #[arg(long, default_value = ".", help = "Workspace root holding .strata")]
    workspace: PathBuf,

    #[arg(
        long,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one slice request from a JSON file and print the slice.
    Slice {
        #[arg(long, help = "Path to a SliceRequest JSON file")]
        request: PathBuf,

        #[arg(
            long,
            default_value = "full",
            value_parser = parse_wire_format,
            help = "Wire format: full or compact-v2"
        )]
        wire: WireFormat,

        #[arg(long, help = "Pretty-print the response JSON")]
        pretty: bool,
    },
    /// Print store counts and slice-cache statistics for one repo.
    Status {
        #[arg(long, help = "Repo id to inspect")]
        repo: String,
    },
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_wire_format(value: &str) -> Result<WireFormat, String> {
    value.parse()
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
    }
}

fn db_path(workspace: &Path) -> PathBuf {
    strata_config::strata_dir(workspace).join(DB_FILE_NAME)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Slice {
            request,
            wire,
            pretty,
        } => run_slice(&cli.workspace, &request, wire, pretty).await,
        Command::Status { repo } => run_status(&cli.workspace, &repo),
    }
}

async fn run_slice(
    workspace: &Path,
    request_path: &Path,
    wire: WireFormat,
    pretty: bool,
) -> Result<()> {
    let config = load_workspace_config(workspace).context("load workspace config")?;
    let store = SqliteSymbolStore::open(db_path(workspace)).context("open symbol store")?;
    let service = SliceService::new(Arc::new(store), config);

    let raw = fs::read_to_string(request_path)
        .with_context(|| format!("read request file {}", request_path.display()))?;
    let request: SliceRequest = serde_json::from_str(&raw).context("parse slice request")?;

    let repo_id = request.repo_id.clone();
    let slice = match service.build_slice(request).await {
        Ok(slice) => slice,
        Err(error) => {
            tracing::error!(code = error.code(), repo_id, "slice build failed");
            let payload = serde_json::json!({
                "error": error.code(),
                "message": error.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            std::process::exit(1);
        }
    };

    let rendered = match (wire, pretty) {
        (WireFormat::Full, true) => serde_json::to_string_pretty(&*slice)?,
        (WireFormat::Full, false) => serde_json::to_string(&*slice)?,
        (WireFormat::CompactV2, true) => serde_json::to_string_pretty(&to_compact_v2(&slice))?,
        (WireFormat::CompactV2, false) => serde_json::to_string(&to_compact_v2(&slice))?,
    };
    println!("{rendered}");
    Ok(())
}

fn run_status(workspace: &Path, repo_id: &str) -> Result<()> {
    let store = SqliteSymbolStore::open(db_path(workspace)).context("open symbol store")?;
    let counts = store.repo_counts(repo_id).context("count repo rows")?;
    let version = store.latest_version(repo_id).context("read version ledger")?;

    let payload = serde_json::json!({
        "repoId": repo_id,
        "version": version.map(|v| v.version_id),
        "symbols": counts.symbols,
        "edges": counts.edges,
        "files": counts.files,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
