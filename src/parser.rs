//! Parse entry point
//!
//! [`parse`] takes raw schema text and returns the normalized AST together
//! with every diagnostic raised on the way. It never fails: invalid input is
//! reported in `errors` and the AST degrades to a placeholder.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::ast::{AstNode, NodeMeta};
use crate::cache::SchemaCache;
use crate::config::ResolverConfig;
use crate::diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics};
use crate::error::{Result, SchemaError};
use crate::fetch::SchemaFetcher;
use crate::normalizer::normalize;
use crate::resolver::location::base_from_id;
use crate::resolver::{ExternalRefContext, VisitedRefs};

/// Top-level keys that mark a JSON object as a schema
const SCHEMA_MARKERS: [&str; 15] = [
    "$schema",
    "$id",
    "type",
    "properties",
    "definitions",
    "$defs",
    "$ref",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "items",
    "enum",
    "const",
    "additionalProperties",
];

type ProgressFn<'a> = Box<dyn FnMut(usize, usize, &str) + 'a>;

/// Capabilities and limits for one parse call
pub struct ParseOptions<'a> {
    pub cache: Option<&'a mut SchemaCache>,
    pub fetcher: Option<&'a dyn SchemaFetcher>,
    pub on_progress: Option<ProgressFn<'a>>,
    pub limits: ResolverConfig,
}

impl Default for ParseOptions<'_> {
    fn default() -> Self {
        Self {
            cache: None,
            fetcher: None,
            on_progress: None,
            limits: ResolverConfig::default(),
        }
    }
}

impl<'a> ParseOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: &'a mut SchemaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_fetcher(mut self, fetcher: &'a dyn SchemaFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_progress(mut self, on_progress: impl FnMut(usize, usize, &str) + 'a) -> Self {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    pub fn with_limits(mut self, limits: ResolverConfig) -> Self {
        self.limits = limits;
        self
    }
}

/// Document-level facts about the parsed schema
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value of `$schema`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    /// Value of `$id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Entries under `definitions` and `$defs`
    pub definition_count: usize,
    /// `$ref` occurrences anywhere in the document
    pub ref_count: usize,
    pub has_external_refs: bool,
}

impl SchemaMetadata {
    pub fn from_schema(schema: &Value) -> Self {
        let text = |key: &str| schema.get(key).and_then(Value::as_str).map(String::from);
        let definition_count = ["definitions", "$defs"]
            .iter()
            .filter_map(|key| schema.get(*key).and_then(Value::as_object))
            .map(|defs| defs.len())
            .sum();

        let mut metadata = Self {
            title: text("title"),
            description: text("description"),
            draft: text("$schema"),
            id: text("$id"),
            definition_count,
            ..Self::default()
        };
        metadata.count_refs(schema);
        metadata
    }

    fn count_refs(&mut self, value: &Value) {
        match value {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                    self.ref_count += 1;
                    if !reference.starts_with('#') {
                        self.has_external_refs = true;
                    }
                }
                map.values().for_each(|child| self.count_refs(child));
            }
            Value::Array(items) => items.iter().for_each(|child| self.count_refs(child)),
            _ => {}
        }
    }
}

/// Result of one [`parse`] call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutput {
    /// The input document, when it was valid JSON
    pub schema: Option<Value>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub diagnostics: Diagnostics,
    pub metadata: SchemaMetadata,
    pub ast: AstNode,
    /// External URLs attempted, in first-seen order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_refs: Vec<String>,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl ParseOutput {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn a rejected input into an error, keeping warnings otherwise
    pub fn into_result(self) -> Result<Self> {
        let first_error = self
            .diagnostics
            .errors()
            .next()
            .map(|e| (e.code, e.message.clone()));
        match first_error {
            None => Ok(self),
            Some((DiagnosticCode::InvalidJson, message)) => Err(SchemaError::InvalidJson(message)),
            Some((_, message)) => Err(SchemaError::NotASchema(message)),
        }
    }

    fn rejected(schema: Option<Value>, error: DiagnosticItem) -> Self {
        debug!(code = %error.code, "{}", error.message);
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(error);
        let metadata = schema.as_ref().map(SchemaMetadata::from_schema).unwrap_or_default();
        Self {
            schema,
            errors: diagnostics.error_messages(),
            warnings: Vec::new(),
            diagnostics,
            metadata,
            ast: AstNode::unknown(NodeMeta::at("#")),
            external_refs: Vec::new(),
            cache_hits: 0,
            cache_misses: 0,
        }
    }
}

/// Parse and normalize `raw`.
///
/// `base_url` locates the document for relative external refs; without one,
/// an absolute `$id` on the root is used.
pub fn parse(raw: &str, base_url: Option<&str>, options: ParseOptions<'_>) -> ParseOutput {
    let schema: Value = match serde_json::from_str(raw) {
        Ok(schema) => schema,
        Err(e) => {
            return ParseOutput::rejected(
                None,
                DiagnosticItem::new(DiagnosticCode::InvalidJson, format!("Invalid JSON: {}", e)),
            )
        }
    };

    if !looks_like_schema(&schema) {
        return ParseOutput::rejected(
            Some(schema),
            DiagnosticItem::new(
                DiagnosticCode::NotASchema,
                "Input does not look like a JSON Schema (no $schema, $id, type, properties or definitions)",
            ),
        );
    }

    let base_url = base_url.map(String::from).or_else(|| {
        schema
            .get("$id")
            .and_then(Value::as_str)
            .and_then(base_from_id)
    });
    let metadata = SchemaMetadata::from_schema(&schema);

    let ParseOptions {
        cache,
        fetcher,
        on_progress,
        limits,
    } = options;
    let mut ctx = ExternalRefContext::new(limits).with_base_url(base_url);
    if let Some(cache) = cache {
        ctx = ctx.with_cache(cache);
    }
    if let Some(fetcher) = fetcher {
        ctx = ctx.with_fetcher(fetcher);
    }
    if let Some(on_progress) = on_progress {
        ctx = ctx.with_progress(on_progress);
    }

    let ast = normalize(&schema, &schema, &VisitedRefs::new(), "#", &mut ctx);

    info!(
        nodes = ast.node_count(),
        warnings = ctx.diagnostics.warning_count(),
        external = ctx.fetched_urls.len(),
        cache_hits = ctx.cache_hits,
        cache_misses = ctx.cache_misses,
        "schema parsed"
    );

    let ExternalRefContext {
        fetched_urls,
        diagnostics,
        cache_hits,
        cache_misses,
        ..
    } = ctx;

    ParseOutput {
        schema: Some(schema),
        errors: diagnostics.error_messages(),
        warnings: diagnostics.warning_messages(),
        diagnostics,
        metadata,
        ast,
        external_refs: fetched_urls.into_iter().collect(),
        cache_hits,
        cache_misses,
    }
}

fn looks_like_schema(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| SCHEMA_MARKERS.iter().any(|key| map.contains_key(*key)))
}
