//! Schema Registry
//!
//! Loads contract documents once per process and answers "is this payload
//! valid for this operation" queries. After loading the registry is
//! read-only and can be shared freely.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use include_dir::{include_dir, Dir};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::error::{CatalogError, Result};
use crate::schema::{Contract, ContractDocument, Direction};
use crate::validation::Violation;
use crate::version::ContractVersion;

/// Contract documents shipped with the crate
static BUILTIN_CONTRACTS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/contracts");

/// JSON Schema every contract document must satisfy
const META_SCHEMA: &str = include_str!("meta/contract-document.schema.json");

static GLOBAL: OnceLock<Arc<SchemaRegistry>> = OnceLock::new();

/// Where contract documents come from
#[derive(Debug, Clone)]
pub enum ContractSource {
    /// Inline JSON document
    Json(String),
    /// Inline TOML document
    Toml(String),
    /// A single `.json` or `.toml` file
    File(PathBuf),
    /// Every `.json` and `.toml` file below a directory, merged
    Directory(PathBuf),
    /// The album contracts embedded at compile time
    Builtin,
}

impl ContractSource {
    /// File or directory source, depending on what `path` is
    pub fn path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            ContractSource::Directory(path)
        } else {
            ContractSource::File(path)
        }
    }

    fn describe(&self) -> String {
        match self {
            ContractSource::Json(_) => "inline JSON".to_string(),
            ContractSource::Toml(_) => "inline TOML".to_string(),
            ContractSource::File(path) | ContractSource::Directory(path) => {
                path.display().to_string()
            }
            ContractSource::Builtin => "built-in contracts".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(DocumentFormat::Json),
            "toml" => Some(DocumentFormat::Toml),
            _ => None,
        }
    }

    fn parse(&self, text: &str) -> std::result::Result<Value, String> {
        match self {
            DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            DocumentFormat::Toml => {
                let value: toml::Value = toml::from_str(text).map_err(|e| e.to_string())?;
                serde_json::to_value(value).map_err(|e| e.to_string())
            }
        }
    }
}

/// A parsed, not yet checked, document and where it came from
struct RawDocument {
    origin: String,
    value: Value,
}

/// The contract registry
#[derive(Debug)]
pub struct SchemaRegistry {
    contracts: BTreeMap<(String, Direction), Contract>,
    version: ContractVersion,
    checksum: Checksum,
    origin: String,
    loaded_at: DateTime<Utc>,
}

impl SchemaRegistry {
    /// Load and check contract documents.
    ///
    /// Fails with [`CatalogError::SchemaLoad`] listing every problem found
    /// when any document is unreadable, malformed or inconsistent.
    pub fn load(source: ContractSource) -> Result<Self> {
        let origin = source.describe();
        let documents = read_documents(&source, &origin)?;
        if documents.is_empty() {
            return Err(CatalogError::load(origin, "no contract documents found"));
        }
        Self::from_documents(origin, documents)
    }

    /// Load the contracts embedded in the crate
    pub fn builtin() -> Result<Self> {
        Self::load(ContractSource::Builtin)
    }

    fn from_documents(origin: String, documents: Vec<RawDocument>) -> Result<Self> {
        let meta: Value = serde_json::from_str(META_SCHEMA)?;
        let meta = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&meta)
            .map_err(|e| CatalogError::load("contract meta-schema", e.to_string()))?;

        let mut issues = Vec::new();
        let mut contracts = BTreeMap::new();
        let mut version: Option<ContractVersion> = None;

        for doc in &documents {
            if let Err(errors) = meta.validate(&doc.value) {
                issues.extend(errors.map(|e| {
                    format!("{}: {} (at '{}')", doc.origin, e, e.instance_path)
                }));
                continue;
            }

            let document: ContractDocument = match serde_json::from_value(doc.value.clone()) {
                Ok(document) => document,
                Err(e) => {
                    issues.push(format!("{}: {}", doc.origin, e));
                    continue;
                }
            };

            match ContractVersion::parse(&document.version) {
                Ok(v) => {
                    let clash = version
                        .as_ref()
                        .filter(|current| !current.is_compatible_with(&v))
                        .map(|current| current.to_string());
                    match clash {
                        Some(current) => issues.push(format!(
                            "{}: version {} cannot be merged with {}",
                            doc.origin, v, current
                        )),
                        None if version.as_ref().map_or(true, |current| *current < v) => {
                            version = Some(v)
                        }
                        None => {}
                    }
                }
                Err(e) => issues.push(format!(
                    "{}: invalid version '{}': {}",
                    doc.origin, document.version, e
                )),
            }

            match document.compile() {
                Ok(compiled) => {
                    for contract in compiled {
                        let key = (contract.operation.clone(), contract.direction);
                        if contracts.contains_key(&key) {
                            issues.push(format!(
                                "{}: contract {} is declared more than once",
                                doc.origin,
                                contract.key()
                            ));
                        } else {
                            contracts.insert(key, contract);
                        }
                    }
                }
                Err(doc_issues) => issues.extend(
                    doc_issues
                        .into_iter()
                        .map(|issue| format!("{}: {}", doc.origin, issue)),
                ),
            }
        }

        let version = match version {
            Some(version) if issues.is_empty() => version,
            _ => return Err(CatalogError::SchemaLoad { origin, issues }),
        };

        let checksum = Checksum::from_json_values(documents.iter().map(|doc| &doc.value));
        info!(
            origin = %origin,
            version = %version,
            contracts = contracts.len(),
            checksum = checksum.short(),
            "Loaded contracts"
        );

        Ok(Self {
            contracts,
            version,
            checksum,
            origin,
            loaded_at: Utc::now(),
        })
    }

    /// Make this registry the process-wide one. Allowed exactly once.
    pub fn install(self) -> Result<Arc<SchemaRegistry>> {
        let registry = Arc::new(self);
        GLOBAL
            .set(Arc::clone(&registry))
            .map_err(|_| CatalogError::AlreadyInstalled)?;
        info!(origin = %registry.origin, "Installed process-wide schema registry");
        Ok(registry)
    }

    /// The process-wide registry, if one was installed
    pub fn global() -> Option<Arc<SchemaRegistry>> {
        GLOBAL.get().cloned()
    }

    /// Validate a payload against the contract for `(operation, direction)`.
    ///
    /// An empty list means the payload is valid.
    pub fn validate(
        &self,
        operation: &str,
        direction: Direction,
        payload: &Value,
    ) -> Result<Vec<Violation>> {
        let contract = self.contract(operation, direction)?;
        let violations = contract.check(payload);
        debug!(
            operation,
            direction = %direction,
            violations = violations.len(),
            "Validated payload"
        );
        Ok(violations)
    }

    /// Get the contract for an operation
    pub fn contract(&self, operation: &str, direction: Direction) -> Result<&Contract> {
        self.contracts
            .get(&(operation.to_string(), direction))
            .ok_or_else(|| {
                let suggestion = self.suggest(operation, direction);
                error!(operation, direction = %direction, "No contract registered for operation");
                CatalogError::UnknownOperation {
                    operation: operation.to_string(),
                    direction,
                    suggestion,
                }
            })
    }

    /// Whether a contract exists for `(operation, direction)`
    pub fn has_contract(&self, operation: &str, direction: Direction) -> bool {
        self.contracts.contains_key(&(operation.to_string(), direction))
    }

    /// All contracts, sorted by operation then direction
    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }

    /// Version of the loaded contract set
    pub fn version(&self) -> &ContractVersion {
        &self.version
    }

    /// Checksum over every loaded document
    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Description of the source the contracts were loaded from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Closest known operation name in the same direction
    fn suggest(&self, operation: &str, direction: Direction) -> Option<String> {
        let matcher = SkimMatcherV2::default();
        self.contracts
            .keys()
            .filter(|(_, d)| *d == direction)
            .filter_map(|(name, _)| matcher.fuzzy_match(name, operation).map(|score| (score, name)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, name)| name.clone())
    }
}

/// Read every document a source names
fn read_documents(source: &ContractSource, origin: &str) -> Result<Vec<RawDocument>> {
    let mut issues = Vec::new();
    let mut documents = Vec::new();
    let mut push = |doc_origin: String, parsed: std::result::Result<Value, String>| match parsed {
        Ok(value) => documents.push(RawDocument {
            origin: doc_origin,
            value,
        }),
        Err(e) => issues.push(format!("{}: {}", doc_origin, e)),
    };

    match source {
        ContractSource::Json(text) => push(origin.to_string(), DocumentFormat::Json.parse(text)),
        ContractSource::Toml(text) => push(origin.to_string(), DocumentFormat::Toml.parse(text)),
        ContractSource::File(path) => match DocumentFormat::from_path(path) {
            Some(format) => push(origin.to_string(), read_file(path, format)),
            None => push(
                origin.to_string(),
                Err("unsupported extension, expected .json or .toml".to_string()),
            ),
        },
        ContractSource::Directory(dir) => {
            for entry in WalkDir::new(dir).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        push(dir.display().to_string(), Err(e.to_string()));
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(format) = DocumentFormat::from_path(entry.path()) {
                    push(entry.path().display().to_string(), read_file(entry.path(), format));
                }
            }
        }
        ContractSource::Builtin => {
            let mut files: Vec<_> = BUILTIN_CONTRACTS.files().collect();
            files.sort_by(|a, b| a.path().cmp(b.path()));
            for file in files {
                let Some(format) = DocumentFormat::from_path(file.path()) else {
                    continue;
                };
                let parsed = file
                    .contents_utf8()
                    .ok_or_else(|| "not valid UTF-8".to_string())
                    .and_then(|text| format.parse(text));
                push(file.path().display().to_string(), parsed);
            }
        }
    }

    if issues.is_empty() {
        Ok(documents)
    } else {
        Err(CatalogError::SchemaLoad {
            origin: origin.to_string(),
            issues,
        })
    }
}

fn read_file(path: &Path, format: DocumentFormat) -> std::result::Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read file: {}", e))?;
    format.parse(&text)
}
