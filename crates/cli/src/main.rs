#![forbid(unsafe_code)]

//! Administrative front end for a graph store directory: bootstrap projects, apply
//! delta files and inspect versions. Every command prints one JSON document.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gw_core::cancel::CancelToken;
use gw_core::graph::{ApplyRequest, EntityType, NeighborDirection};
use gw_storage::{
    CreateProjectRequest, CreateVersionRequest, ImportEntityRequest, ListEntitiesRequest,
    NeighborsRequest, SqliteStore, StoreConfig,
};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_ENV: &str = "GRAPHWRITE_LOG";

#[derive(Debug, Parser)]
#[command(name = "graphwrite")]
#[command(about = "Versioned narrative graph store")]
#[command(version)]
struct Cli {
    /// Store directory; overrides GRAPHWRITE_STORAGE_DIR.
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a project together with its root working-set version.
    InitProject {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    CreateVersion {
        project: String,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        working_set: bool,
    },
    /// Apply a JSON delta batch; `--parent` overrides the file's parent_version_id.
    Apply {
        file: PathBuf,
        #[arg(long)]
        parent: Option<String>,
    },
    SetWorkingSet {
        project: String,
        version: String,
    },
    WorkingSet {
        project: String,
    },
    Versions {
        project: String,
    },
    Entities {
        version: String,
        #[arg(long = "type", value_parser = parse_entity_type)]
        entity_type: Option<EntityType>,
    },
    Neighbors {
        version: String,
        logical_id: String,
        #[arg(long)]
        relationship_type: Option<String>,
        #[arg(long, value_enum, default_value_t = Direction::Both)]
        direction: Direction,
    },
    Import {
        target_version: String,
        source_project: String,
        logical_id: String,
    },
    History {
        logical_id: String,
    },
    Shared,
    Diff {
        from: String,
        to: String,
    },
    Validate {
        version: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl From<Direction> for NeighborDirection {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Outgoing => Self::Outgoing,
            Direction::Incoming => Self::Incoming,
            Direction::Both => Self::Both,
        }
    }
}

fn parse_entity_type(raw: &str) -> Result<EntityType, String> {
    raw.parse::<EntityType>().map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = StoreConfig::from_env().context("reading store configuration")?;
    if let Some(dir) = cli.storage_dir.as_ref() {
        config = config.with_storage_dir(dir);
    }
    let mut store = SqliteStore::open_with_config(config).context("opening graph store")?;

    tracing::debug!(command = ?cli.command, "running command");
    let output = run(&mut store, cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run(store: &mut SqliteStore, command: Command) -> Result<Value> {
    let output = match command {
        Command::InitProject {
            id,
            name,
            theme,
            genre,
            description,
        } => {
            let (project, root) = store.create_project_with_root(CreateProjectRequest {
                id,
                name,
                theme,
                genre,
                description,
            })?;
            json!({ "project": project, "root_version": root })
        }
        Command::CreateVersion {
            project,
            parent,
            name,
            description,
            working_set,
        } => serde_json::to_value(store.create_version(CreateVersionRequest {
            project_id: project,
            parent_version_id: parent,
            name,
            description,
            is_working_set: working_set,
        })?)?,
        Command::Apply { file, parent } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let mut request: ApplyRequest = serde_json::from_str(&raw)
                .with_context(|| format!("parsing delta batch {}", file.display()))?;
            if let Some(parent) = parent {
                request.parent_version_id = parent;
            }
            serde_json::to_value(store.apply(request)?)?
        }
        Command::SetWorkingSet { project, version } => {
            serde_json::to_value(store.set_working_set(&project, &version)?)?
        }
        Command::WorkingSet { project } => serde_json::to_value(store.get_working_set(&project)?)?,
        Command::Versions { project } => serde_json::to_value(store.list_versions(&project)?)?,
        Command::Entities {
            version,
            entity_type,
        } => {
            let mut request = ListEntitiesRequest::new(version);
            request.entity_type = entity_type;
            serde_json::to_value(store.list_entities(request)?)?
        }
        Command::Neighbors {
            version,
            logical_id,
            relationship_type,
            direction,
        } => {
            let mut request = NeighborsRequest::new(version, logical_id).direction(direction.into());
            if let Some(relationship_type) = relationship_type {
                request = request.relationship_type(relationship_type);
            }
            serde_json::to_value(store.get_neighbors_in_version(request)?)?
        }
        Command::Import {
            target_version,
            source_project,
            logical_id,
        } => serde_json::to_value(store.import_entity(ImportEntityRequest {
            target_version_id: target_version,
            source_project_id: source_project,
            logical_id,
        })?)?,
        Command::History { logical_id } => serde_json::to_value(store.entity_history(&logical_id)?)?,
        Command::Shared => serde_json::to_value(store.list_shared_entities()?)?,
        Command::Diff { from, to } => {
            serde_json::to_value(store.diff_versions(&from, &to, &CancelToken::default())?)?
        }
        Command::Validate { version } => serde_json::to_value(store.validate_version(&version)?)?,
    };
    Ok(output)
}
