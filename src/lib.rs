//! Schema AST
//!
//! Turns raw JSON Schema documents into a normalized abstract syntax tree
//! that a renderer can walk without knowing about `$ref`, draft quirks or
//! keyword combinations.
//!
//! ## Features
//!
//! - **Reference Resolution**: internal JSON Pointer refs and external refs
//!   over a pluggable fetcher, with cycle, depth and file-count guards
//! - **Schema Cache**: persistent TTL cache with compression and quota eviction
//! - **Normalization**: logic keywords lifted into `And`/`Or`/`Xor`/`Not`
//!   nodes, nested conjunctions and disjunctions flattened
//! - **Discriminators**: `oneOf` branches tagged by a distinguishing property
//! - **Diagnostics**: every recoverable problem is a coded warning, never a panic
//!
//! ## Pipeline
//!
//! ```text
//! raw text ─▶ parser ─▶ normalizer ─┬─▶ resolver ─▶ fetcher
//!                                   │      └──────▶ cache ─▶ store
//!                                   └─▶ discriminator
//! ```

pub mod ast;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod diagnostics;
pub mod discriminator;
pub mod error;
pub mod fetch;
pub mod normalizer;
pub mod parser;
pub mod resolver;

pub use ast::{AstKind, AstNode, Discriminator, NodeMeta, PrimitiveType};
pub use cache::{CacheStats, FileStore, KeyValueStore, MemoryStore, SchemaCache};
pub use checksum::Checksum;
pub use config::EngineConfig;
pub use diagnostics::{DiagnosticCode, Diagnostics, Severity};
pub use error::{FetchError, Result, SchemaError, StoreError};
pub use fetch::{DefaultFetcher, FileFetcher, HttpFetcher, SchemaFetcher};
pub use parser::{parse, ParseOptions, ParseOutput, SchemaMetadata};
pub use resolver::{ExternalRefContext, VisitedRefs};
