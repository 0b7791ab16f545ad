//! Album Catalog CLI
//!
//! Runs catalog operations against an in-memory store and prints each result
//! as the HTTP status and JSON body a web front end would send.

use std::path::{Path, PathBuf};

use album_catalog::{
    AlbumQuery, AlbumStore, CatalogConfig, CatalogError, Direction, SchemaRegistry,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "album-catalog")]
#[command(about = "Query and extend a contract-checked album catalog")]
struct Cli {
    /// Extra config file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Contract file or directory (defaults to the built-in contracts)
    #[arg(long)]
    contracts: Option<PathBuf>,

    /// JSON file with the albums to start with
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Check returned albums against the response contracts
    #[arg(long)]
    validate_responses: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every album
    List,

    /// Get an album by id
    Get {
        id: String,
    },

    /// Find the first album where any given field matches
    Find {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        price: Option<f64>,
    },

    /// Add an album from a JSON object
    Create {
        payload: String,
    },

    /// Check a JSON payload against a contract without touching the store
    Validate {
        operation: String,
        direction: Direction,
        payload: String,
    },

    /// Show the loaded contracts
    Contracts,

    /// Run a JSON array of steps against one store
    Replay {
        file: PathBuf,
    },
}

/// One step of a replay file
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    List,
    Get { id: String },
    Find { query: AlbumQuery },
    Create { payload: Value },
    Validate { operation: String, direction: Direction, payload: Value },
}

/// What the HTTP layer would answer
#[derive(Debug)]
struct Reply {
    status: u16,
    body: Value,
}

impl Reply {
    fn from_result<T: Serialize>(
        result: album_catalog::Result<T>,
        ok_status: u16,
    ) -> anyhow::Result<Self> {
        match result {
            Ok(value) => Ok(Reply {
                status: ok_status,
                body: serde_json::to_value(value)?,
            }),
            Err(e) => Ok(Reply::from_error(&e)),
        }
    }

    fn from_error(error: &CatalogError) -> Self {
        let status = error.http_status();
        let mut body = json!({ "message": error.to_string() });
        if !error.violations().is_empty() {
            body["violations"] = json!(error.violations());
        }
        Reply { status, body }
    }

    fn print(&self) -> anyhow::Result<()> {
        println!("HTTP {}", self.status);
        println!("{}", serde_json::to_string_pretty(&self.body)?);
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match CatalogConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli, mut config: CatalogConfig) -> anyhow::Result<()> {
    if let Some(contracts) = cli.contracts {
        config.contracts.source = Some(contracts);
    }
    if let Some(seed) = cli.seed {
        config.store.seed = Some(seed);
    }
    if cli.validate_responses {
        config.store.validate_responses = true;
    }

    let source = config.contract_source();
    let registry = SchemaRegistry::load(source.clone())
        .with_context(|| format!("loading contracts from {:?}", source))?
        .install()?;

    let seed = config.seed_payloads().context("reading seed albums")?;
    let store = AlbumStore::seeded(registry, config.store_options(), seed)
        .context("seeding album store")?;

    match cli.command {
        Commands::List => Reply::from_result(store.list(), 200)?.print(),
        Commands::Get { id } => Reply::from_result(store.get_by_id(&id), 200)?.print(),
        Commands::Find { id, title, artist, price } => {
            let query = AlbumQuery { id, title, artist, price };
            Reply::from_result(store.get_by_any_field(&query), 200)?.print()
        }
        Commands::Create { payload } => {
            let payload: Value = serde_json::from_str(&payload).context("parsing album JSON")?;
            Reply::from_result(store.create(&payload), 201)?.print()
        }
        Commands::Validate { operation, direction, payload } => {
            let payload: Value = serde_json::from_str(&payload).context("parsing payload JSON")?;
            validate(store.registry(), &operation, direction, &payload).print()
        }
        Commands::Contracts => show_contracts(store.registry()),
        Commands::Replay { file } => replay(&store, &file),
    }
}

fn validate(
    registry: &SchemaRegistry,
    operation: &str,
    direction: Direction,
    payload: &Value,
) -> Reply {
    match registry.validate(operation, direction, payload) {
        Ok(violations) => Reply {
            status: if violations.is_empty() { 200 } else { 400 },
            body: json!({ "valid": violations.is_empty(), "violations": violations }),
        },
        Err(e) => Reply::from_error(&e),
    }
}

fn show_contracts(registry: &SchemaRegistry) -> anyhow::Result<()> {
    println!("Contracts {} from {}", registry.version(), registry.origin());
    println!("  checksum: {}", registry.checksum());
    println!("  loaded:   {}", registry.loaded_at().to_rfc3339());
    println!();

    for contract in registry.contracts() {
        let mode = if contract.strict { "strict" } else { "open" };
        println!("{} ({})", contract.key(), mode);
        if let Some(description) = &contract.description {
            println!("  {}", description);
        }
        for field in &contract.fields {
            let marker = if field.required { "*" } else { " " };
            println!("  {} {}: {}", marker, field.name, field.field_type);
        }
    }
    Ok(())
}

fn replay(store: &AlbumStore, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading replay file {}", file.display()))?;
    let steps: Vec<Step> = serde_json::from_str(&content).context("parsing replay steps")?;
    info!(steps = steps.len(), "Replaying");

    for (index, step) in steps.into_iter().enumerate() {
        println!("# step {}: {:?}", index + 1, step);
        run_step(store, step)?.print()?;
    }
    Ok(())
}

fn run_step(store: &AlbumStore, step: Step) -> anyhow::Result<Reply> {
    let reply = match step {
        Step::List => Reply::from_result(store.list(), 200)?,
        Step::Get { id } => Reply::from_result(store.get_by_id(&id), 200)?,
        Step::Find { query } => Reply::from_result(store.get_by_any_field(&query), 200)?,
        Step::Create { payload } => Reply::from_result(store.create(&payload), 201)?,
        Step::Validate { operation, direction, payload } => {
            validate(store.registry(), &operation, direction, &payload)
        }
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use album_catalog::{Album, StoreOptions};
    use std::sync::Arc;

    fn store() -> AlbumStore {
        let registry = Arc::new(SchemaRegistry::builtin().unwrap());
        AlbumStore::with_albums(
            registry,
            StoreOptions::default(),
            vec![Album::new("1", "Clouds", "NF", 56.99)],
        )
    }

    fn jeru() -> Value {
        json!({ "id": "2", "title": "Jeru", "artist": "Gerry Mulligan", "price": 17.99 })
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        let err = store().create(&json!({ "title": "Bad" })).unwrap_err();
        let reply = Reply::from_error(&err);

        assert_eq!(reply.status, 400);
        assert_eq!(reply.body["violations"].as_array().unwrap().len(), 3);
        assert_eq!(reply.body["violations"][0]["field"], "id");
        assert_eq!(reply.body["violations"][0]["reason"], "missing");
    }

    #[test]
    fn test_missing_album_is_not_found() {
        let reply = Reply::from_result(store().get_by_id("9"), 200).unwrap();
        assert_eq!(reply.status, 404);
        assert!(reply.body.get("violations").is_none());
    }

    #[test]
    fn test_unknown_operation_is_server_error() {
        let registry = SchemaRegistry::builtin().unwrap();
        let reply = validate(&registry, "delete", Direction::Request, &json!({}));
        assert_eq!(reply.status, 500);
        assert!(reply.body["message"].as_str().unwrap().contains("delete"));
    }

    #[test]
    fn test_success_statuses() {
        let store = store();
        let payload = jeru();

        let created = Reply::from_result(store.create(&payload), 201).unwrap();
        assert_eq!(created.status, 201);
        assert_eq!(created.body, payload);

        let listed = Reply::from_result(store.list(), 200).unwrap();
        assert_eq!(listed.status, 200);
        assert_eq!(listed.body.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_validate_command() {
        let registry = SchemaRegistry::builtin().unwrap();
        let ok = validate(&registry, "get_by_id", Direction::Request, &json!({ "id": "1" }));
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body["valid"], true);

        let bad = validate(&registry, "get_by_id", Direction::Request, &json!({ "id": 1 }));
        assert_eq!(bad.status, 400);
        assert_eq!(bad.body["valid"], false);
    }

    #[test]
    fn test_replay_steps_share_one_store() {
        let steps: Vec<Step> = serde_json::from_value(json!([
            { "op": "create", "payload": jeru() },
            { "op": "list" },
            { "op": "find", "query": { "artist": "Gerry Mulligan" } },
            { "op": "get", "id": "9" }
        ]))
        .unwrap();

        let store = store();
        let replies: Vec<Reply> = steps
            .into_iter()
            .map(|step| run_step(&store, step).unwrap())
            .collect();

        let statuses: Vec<u16> = replies.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![201, 200, 200, 404]);
        assert_eq!(replies[1].body.as_array().unwrap().len(), 2);
        assert_eq!(replies[2].body["id"], "2");
    }

    #[test]
    fn test_replay_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let steps = json!([{ "op": "create", "payload": jeru() }, { "op": "list" }]);
        std::io::Write::write_all(&mut file, steps.to_string().as_bytes()).unwrap();

        let store = store();
        replay(&store, file.path()).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_negative_price_reaches_the_contract() {
        let cli = Cli::try_parse_from(["album-catalog", "find", "--price", "-1"]).unwrap();
        let Commands::Find { price, .. } = cli.command else {
            panic!("Expected find");
        };
        assert_eq!(price, Some(-1.0));

        let query = AlbumQuery {
            price,
            ..Default::default()
        };
        let err = store().get_by_any_field(&query).unwrap_err();
        assert_eq!(Reply::from_error(&err).status, 400);
    }
}
