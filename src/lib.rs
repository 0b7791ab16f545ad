//! Album Catalog
//!
//! An in-memory album catalog whose operations are guarded by a declarative
//! contract registry.
//!
//! ## Features
//!
//! - **Contract Registry**: Request and response contracts per operation,
//!   loaded once from JSON or TOML and checked against a meta-schema
//! - **Named Types**: Fields refer to primitives or document-level types
//!   carrying `enum`, `minimum`/`maximum`, `min_length` and `pattern` rules
//! - **Violations as Data**: Validation returns every mismatch; callers map
//!   them to their own responses
//! - **Album Store**: Append-only, insertion-ordered, safe to share between
//!   threads
//!
//! ## Flow
//!
//! ```text
//! caller ──► SchemaRegistry::validate(operation, request, payload)
//!                 │ violations? ──► CatalogError::Validation
//!                 ▼
//!            AlbumStore (list / create / get_by_id / get_by_any_field)
//!                 │ no match? ──► CatalogError::NotFound
//!                 ▼
//!            Album (optionally checked against the response contract)
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod record;
pub mod registry;
pub mod schema;
pub mod store;
pub mod validation;
pub mod version;

pub use checksum::Checksum;
pub use config::CatalogConfig;
pub use error::{CatalogError, Result};
pub use record::{Album, AlbumQuery};
pub use registry::{ContractSource, SchemaRegistry};
pub use schema::{Contract, ContractDocument, Direction, FieldRule, Primitive};
pub use store::{AlbumStore, StoreOptions};
pub use validation::{Violation, ViolationReason};
pub use version::ContractVersion;
