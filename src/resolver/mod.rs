//! Reference Resolver
//!
//! Inlines `$ref` targets so downstream passes see concrete schema nodes.
//! Resolution is structural: refs nested under `properties`, `items`,
//! `allOf`/`anyOf`/`oneOf`, `not` and `additionalProperties` are resolved
//! too. It never fails; broken pointers, cycles, fetch failures and budget
//! stops all become sentinel `object` nodes plus a warning. A sentinel keeps
//! its own description even when the referencing node carries one.

pub mod context;
pub mod location;
pub mod pointer;

pub use context::{ExternalRefContext, LoadFailure, VisitedRefs};
pub use location::resolve_location;
pub use pointer::{resolve_fragment, split_ref};

use std::ops::Deref;
use std::rc::Rc;

use serde_json::{json, Map, Value};

use crate::diagnostics::DiagnosticCode;

/// Description carried by the sentinel that replaces a cyclic `$ref`
pub const CIRCULAR_REFERENCE: &str = "[Circular reference detected]";

/// Keywords whose values are a single subschema
const SCHEMA_KEYWORDS: [&str; 2] = ["not", "additionalProperties"];

/// Keywords whose values are arrays of subschemas
const SCHEMA_ARRAY_KEYWORDS: [&str; 3] = ["allOf", "anyOf", "oneOf"];

/// Annotations on a referencing node that survive inlining
const OVERLAY_KEYWORDS: [&str; 2] = ["title", "description"];

/// Document that refs inside the current subtree point into
#[derive(Clone)]
enum Document<'r> {
    Root(&'r Value),
    Fetched(Rc<Value>),
}

impl Deref for Document<'_> {
    type Target = Value;

    fn deref(&self) -> &Value {
        match self {
            Self::Root(value) => value,
            Self::Fetched(value) => value,
        }
    }
}

struct Scope<'r> {
    document: Document<'r>,
    /// Location of `document`, used to resolve relative external refs
    base: Option<String>,
}

/// Resolve every `$ref` in `node`, with internal pointers looked up in `root`.
pub fn resolve(
    node: &Value,
    root: &Value,
    visited: &VisitedRefs,
    ctx: &mut ExternalRefContext<'_>,
) -> Value {
    resolve_at(node, root, visited, "#", ctx)
}

/// [`resolve`], with `source_path` naming `node`'s location for diagnostics
pub fn resolve_at(
    node: &Value,
    root: &Value,
    visited: &VisitedRefs,
    source_path: &str,
    ctx: &mut ExternalRefContext<'_>,
) -> Value {
    let scope = Scope {
        document: Document::Root(root),
        base: ctx.base_url.clone(),
    };
    resolve_in(node, &scope, visited, source_path, ctx)
}

/// Sentinel node standing in for a subtree that could not be resolved
pub fn sentinel(description: &str) -> Value {
    json!({ "type": "object", "description": description })
}

fn resolve_in(
    node: &Value,
    scope: &Scope<'_>,
    visited: &VisitedRefs,
    path: &str,
    ctx: &mut ExternalRefContext<'_>,
) -> Value {
    resolve_node(node, scope, visited, path, ctx).value
}

/// Outcome of resolving one node
struct Resolved {
    value: Value,
    /// `value` is a problem sentinel and must keep its own description
    sentinel: bool,
}

impl Resolved {
    fn schema(value: Value) -> Self {
        Self { value, sentinel: false }
    }

    fn sentinel(description: &str) -> Self {
        Self {
            value: sentinel(description),
            sentinel: true,
        }
    }
}

fn resolve_node(
    node: &Value,
    scope: &Scope<'_>,
    visited: &VisitedRefs,
    path: &str,
    ctx: &mut ExternalRefContext<'_>,
) -> Resolved {
    let Value::Object(map) = node else {
        return Resolved::schema(node.clone());
    };

    if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
        if ctx.expansions >= ctx.max_expansions {
            let message = format!(
                "Maximum number of reference expansions ({}) reached; not resolving '{}'",
                ctx.max_expansions, reference
            );
            ctx.warn(DiagnosticCode::ExpansionLimit, message.clone(), path);
            return Resolved::sentinel(&message);
        }
        ctx.expansions += 1;

        let resolved = if reference.starts_with('#') {
            resolve_internal(reference, scope, visited, path, ctx)
        } else {
            resolve_external(reference, scope, visited, path, ctx)
        };
        if resolved.sentinel {
            return resolved;
        }
        return Resolved::schema(overlay(map, resolved.value));
    }

    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let child_path = format!("{}/{}", path, key);
        let resolved = match key.as_str() {
            "properties" => match value {
                Value::Object(props) => Value::Object(
                    props
                        .iter()
                        .map(|(name, prop)| {
                            let prop_path = format!("{}/{}", child_path, name);
                            (name.clone(), resolve_in(prop, scope, visited, &prop_path, ctx))
                        })
                        .collect(),
                ),
                other => other.clone(),
            },
            "items" => match value {
                Value::Array(items) => resolve_array(items, scope, visited, &child_path, ctx),
                other => resolve_in(other, scope, visited, &child_path, ctx),
            },
            k if SCHEMA_ARRAY_KEYWORDS.contains(&k) => match value {
                Value::Array(items) => resolve_array(items, scope, visited, &child_path, ctx),
                other => other.clone(),
            },
            k if SCHEMA_KEYWORDS.contains(&k) => resolve_in(value, scope, visited, &child_path, ctx),
            _ => value.clone(),
        };
        out.insert(key.clone(), resolved);
    }
    Resolved::schema(Value::Object(out))
}

fn resolve_array(
    items: &[Value],
    scope: &Scope<'_>,
    visited: &VisitedRefs,
    path: &str,
    ctx: &mut ExternalRefContext<'_>,
) -> Value {
    Value::Array(
        items
            .iter()
            .enumerate()
            .map(|(i, item)| resolve_in(item, scope, visited, &format!("{}/{}", path, i), ctx))
            .collect(),
    )
}

fn resolve_internal(
    reference: &str,
    scope: &Scope<'_>,
    visited: &VisitedRefs,
    path: &str,
    ctx: &mut ExternalRefContext<'_>,
) -> Resolved {
    let key = match &scope.base {
        Some(base) => format!("{}{}", base, reference),
        None => reference.to_string(),
    };
    if visited.contains(&key) {
        return circular(reference, path, ctx);
    }

    let fragment = &reference[1..];
    match resolve_fragment(&scope.document, fragment) {
        Some(target) => resolve_node(target, scope, &visited.with(key), reference, ctx),
        None => {
            let message = format!("Could not resolve reference '{}'", reference);
            ctx.warn(DiagnosticCode::BrokenPointer, message.clone(), path);
            Resolved::sentinel(&message)
        }
    }
}

fn resolve_external(
    reference: &str,
    scope: &Scope<'_>,
    visited: &VisitedRefs,
    path: &str,
    ctx: &mut ExternalRefContext<'_>,
) -> Resolved {
    let (file, fragment) = split_ref(reference);
    let url = resolve_location(scope.base.as_deref(), file);
    let fragment = fragment.unwrap_or("");
    let key = format!("{}#{}", url, fragment);

    if visited.contains(&key) {
        return circular(reference, path, ctx);
    }
    if ctx.depth >= ctx.max_depth {
        let message = format!(
            "Maximum external reference depth ({}) reached; not resolving '{}'",
            ctx.max_depth, reference
        );
        ctx.warn(DiagnosticCode::DepthLimit, message.clone(), path);
        return Resolved::sentinel(&message);
    }

    let document = match ctx.load_document(&url) {
        Ok(document) => document,
        Err(failure) => {
            ctx.warn(failure.code, failure.message.clone(), path);
            return Resolved::sentinel(&failure.message);
        }
    };

    let Some(target) = resolve_fragment(&document, fragment) else {
        let message = format!("Could not resolve reference '{}' in '{}'", reference, url);
        ctx.warn(DiagnosticCode::BrokenPointer, message.clone(), path);
        return Resolved::sentinel(&message);
    };

    let child_scope = Scope {
        document: Document::Fetched(Rc::clone(&document)),
        base: Some(url),
    };
    ctx.depth += 1;
    let resolved = resolve_node(target, &child_scope, &visited.with(key.clone()), &key, ctx);
    ctx.depth -= 1;
    resolved
}

fn circular(reference: &str, path: &str, ctx: &mut ExternalRefContext<'_>) -> Resolved {
    ctx.warn(
        DiagnosticCode::CircularReference,
        format!("Circular reference detected: '{}'", reference),
        path,
    );
    Resolved::sentinel(CIRCULAR_REFERENCE)
}

/// Keep the referencing node's own title/description on the inlined target
fn overlay(referencing: &Map<String, Value>, resolved: Value) -> Value {
    let Value::Object(mut target) = resolved else {
        return resolved;
    };
    for keyword in OVERLAY_KEYWORDS {
        if let Some(value) = referencing.get(keyword) {
            target.insert(keyword.to_string(), value.clone());
        }
    }
    Value::Object(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::error::FetchError;
    use std::collections::HashMap;

    fn resolve_root(root: &Value) -> (Value, Vec<String>) {
        let mut ctx = ExternalRefContext::default();
        let resolved = resolve(root, root, &VisitedRefs::new(), &mut ctx);
        (resolved, ctx.warnings())
    }

    #[test]
    fn test_node_without_refs_is_unchanged() {
        let root = json!({"type": "object", "properties": {"a": {"type": "string"}}});
        let (resolved, warnings) = resolve_root(&root);
        assert_eq!(resolved, root);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_nested_internal_refs_are_inlined() {
        let root = json!({
            "definitions": {"Name": {"type": "string", "minLength": 1}},
            "type": "object",
            "properties": {
                "first": {"$ref": "#/definitions/Name"},
                "tags": {"type": "array", "items": {"$ref": "#/definitions/Name"}},
                "either": {"anyOf": [{"$ref": "#/definitions/Name"}, {"type": "null"}]}
            }
        });
        let (resolved, warnings) = resolve_root(&root);

        let name = json!({"type": "string", "minLength": 1});
        assert_eq!(resolved["properties"]["first"], name);
        assert_eq!(resolved["properties"]["tags"]["items"], name);
        assert_eq!(resolved["properties"]["either"]["anyOf"][0], name);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_broken_pointer_becomes_sentinel() {
        let root = json!({"properties": {"a": {"$ref": "#/definitions/Missing"}}});
        let (resolved, warnings) = resolve_root(&root);

        let a = &resolved["properties"]["a"];
        assert_eq!(a["type"], "object");
        assert!(a["description"].as_str().unwrap().contains("#/definitions/Missing"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_self_reference_is_caught() {
        let root = json!({
            "$defs": {"Node": {"type": "object", "properties": {"next": {"$ref": "#/$defs/Node"}}}}
        });
        let node = json!({"$ref": "#/$defs/Node"});
        let mut ctx = ExternalRefContext::default();
        let resolved = resolve(&node, &root, &VisitedRefs::new(), &mut ctx);

        assert_eq!(resolved["type"], "object");
        assert_eq!(resolved["properties"]["next"], sentinel(CIRCULAR_REFERENCE));
        assert!(ctx.diagnostics.contains(DiagnosticCode::CircularReference));
    }

    #[test]
    fn test_sibling_refs_to_same_target_are_not_cycles() {
        let root = json!({
            "definitions": {"Point": {"type": "object", "properties": {"x": {"type": "number"}}}},
            "properties": {
                "from": {"$ref": "#/definitions/Point"},
                "to": {"$ref": "#/definitions/Point"}
            }
        });
        let (resolved, warnings) = resolve_root(&root);
        assert_eq!(resolved["properties"]["from"], resolved["properties"]["to"]);
        assert_eq!(resolved["properties"]["to"]["properties"]["x"]["type"], "number");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_referencing_description_overrides_target() {
        let root = json!({
            "definitions": {"Id": {"type": "string", "description": "generic id"}},
            "properties": {"owner": {"$ref": "#/definitions/Id", "description": "owner id"}}
        });
        let (resolved, _) = resolve_root(&root);
        assert_eq!(resolved["properties"]["owner"]["description"], "owner id");
    }

    #[test]
    fn test_sentinel_keeps_problem_description() {
        let root = json!({
            "definitions": {"Alias": {"$ref": "#/definitions/Gone"}},
            "properties": {
                "a": {"$ref": "#/definitions/Missing", "description": "the a field"},
                "b": {"$ref": "#/definitions/Alias", "title": "B", "description": "the b field"},
                "c": {"$ref": "other.json", "description": "the c field"}
            }
        });
        let (resolved, warnings) = resolve_root(&root);

        let props = &resolved["properties"];
        assert!(props["a"]["description"].as_str().unwrap().contains("Could not resolve"));
        assert!(props["b"]["description"].as_str().unwrap().contains("#/definitions/Gone"));
        assert!(props["b"].get("title").is_none());
        assert!(props["c"]["description"].as_str().unwrap().contains("other.json"));
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_expansion_budget_stops_exponential_inlining() {
        // every level references the next one twice
        let mut definitions = Map::new();
        for i in 0..30 {
            let next = format!("#/definitions/L{}", i + 1);
            definitions.insert(format!("L{}", i), json!({"allOf": [{"$ref": next}, {"$ref": next}]}));
        }
        definitions.insert("L30".to_string(), json!({"type": "string"}));
        let root = json!({"definitions": definitions, "$ref": "#/definitions/L0"});

        let limits = ResolverConfig { max_expansions: 100, ..ResolverConfig::default() };
        let mut ctx = ExternalRefContext::new(limits);
        resolve(&root, &root, &VisitedRefs::new(), &mut ctx);

        assert_eq!(ctx.expansions, 100);
        assert!(ctx.diagnostics.contains(DiagnosticCode::ExpansionLimit));
    }

    #[test]
    fn test_external_ref_without_fetcher_warns() {
        let root = json!({"properties": {"a": {"$ref": "other.json#/A"}}});
        let (resolved, warnings) = resolve_root(&root);
        assert_eq!(resolved["properties"]["a"]["type"], "object");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("other.json"));
    }

    #[test]
    fn test_external_ref_with_internal_refs_in_fetched_document() {
        let docs: HashMap<&str, Value> = HashMap::from([(
            "https://example.com/schemas/common.json",
            json!({
                "definitions": {
                    "Address": {"type": "object", "properties": {"zip": {"$ref": "#/definitions/Zip"}}},
                    "Zip": {"type": "string", "pattern": "^[0-9]{5}$"}
                }
            }),
        )]);
        let fetcher = |url: &str| -> Result<String, FetchError> {
            docs.get(url)
                .map(Value::to_string)
                .ok_or_else(|| FetchError::NotFound(url.to_string()))
        };
        let root = json!({"properties": {"home": {"$ref": "common.json#/definitions/Address"}}});
        let mut ctx = ExternalRefContext::default()
            .with_fetcher(&fetcher)
            .with_base_url(Some("https://example.com/schemas/root.json".to_string()));

        let resolved = resolve(&root, &root, &VisitedRefs::new(), &mut ctx);
        assert_eq!(
            resolved["properties"]["home"]["properties"]["zip"],
            json!({"type": "string", "pattern": "^[0-9]{5}$"})
        );
        assert!(ctx.warnings().is_empty());
        assert_eq!(ctx.depth, 0);
        assert_eq!(ctx.fetched_urls.len(), 1);
    }

    #[test]
    fn test_external_cycle_between_documents() {
        let docs: HashMap<&str, Value> = HashMap::from([
            ("a.json", json!({"properties": {"b": {"$ref": "b.json"}}})),
            ("b.json", json!({"properties": {"a": {"$ref": "a.json"}}})),
        ]);
        let fetcher = |url: &str| -> Result<String, FetchError> {
            docs.get(url)
                .map(Value::to_string)
                .ok_or_else(|| FetchError::NotFound(url.to_string()))
        };
        let root = json!({"$ref": "a.json"});
        let mut ctx = ExternalRefContext::new(ResolverConfig { max_depth: 10, max_files: 10, ..ResolverConfig::default() })
            .with_fetcher(&fetcher);

        let resolved = resolve(&root, &root, &VisitedRefs::new(), &mut ctx);
        assert_eq!(resolved["properties"]["b"]["properties"]["a"], sentinel(CIRCULAR_REFERENCE));
        assert!(ctx.diagnostics.contains(DiagnosticCode::CircularReference));
    }
}
