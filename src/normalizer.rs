//! Normalizer
//!
//! Turns a raw schema node into an [`AstNode`]. Every node goes through the
//! same steps:
//!
//! 1. dereference a `$ref`, if present
//! 2. lift `allOf`/`anyOf`/`oneOf`/`not` into logic nodes
//! 3. extract at most one structural node (object, array or primitive)
//! 4. compose: structure and logic together become an `And`
//!
//! Composition is total. A node with neither structure nor logic becomes a
//! `string` primitive, meaning "no discernible contract".

use std::borrow::Cow;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::ast::{
    AdditionalProperties, ArrayConstraint, ArrayNode, AstNode, Constraint, NodeMeta, ObjectNode,
    PrimitiveNode, PrimitiveType,
};
use crate::diagnostics::DiagnosticCode;
use crate::discriminator;
use crate::resolver::{self, ExternalRefContext, VisitedRefs};

/// Normalize `node`, resolving internal refs against `root`.
pub fn normalize(
    node: &Value,
    root: &Value,
    visited: &VisitedRefs,
    source_path: &str,
    ctx: &mut ExternalRefContext<'_>,
) -> AstNode {
    Normalizer::new(root, ctx).normalize(node, visited, source_path)
}

/// One normalization pass over a document
pub struct Normalizer<'n, 'a> {
    root: &'n Value,
    ctx: &'n mut ExternalRefContext<'a>,
}

impl<'n, 'a> Normalizer<'n, 'a> {
    pub fn new(root: &'n Value, ctx: &'n mut ExternalRefContext<'a>) -> Self {
        Self { root, ctx }
    }

    pub fn normalize(&mut self, node: &Value, visited: &VisitedRefs, path: &str) -> AstNode {
        let resolved = self.dereference(node, visited, path);
        self.normalize_resolved(&resolved, visited, path)
    }

    fn dereference<'v>(&mut self, node: &'v Value, visited: &VisitedRefs, path: &str) -> Cow<'v, Value> {
        if node.get("$ref").and_then(Value::as_str).is_some() {
            Cow::Owned(resolver::resolve_at(node, self.root, visited, path, self.ctx))
        } else {
            Cow::Borrowed(node)
        }
    }

    fn normalize_resolved(&mut self, node: &Value, visited: &VisitedRefs, path: &str) -> AstNode {
        match node {
            Value::Object(map) => self.normalize_schema(map, visited, path),
            Value::Bool(true) => AstNode::unknown(NodeMeta::at(path)),
            // `false` admits nothing: the negation of "anything"
            Value::Bool(false) => AstNode::not(
                AstNode::unknown(NodeMeta::default()),
                NodeMeta::at(path).with_description(Some("false schema".to_string())),
            ),
            other => {
                self.ctx.warn(
                    DiagnosticCode::IgnoredKeyword,
                    format!("Expected a schema at '{}', found {}", path, json_type_name(other)),
                    path,
                );
                AstNode::unknown(NodeMeta::at(path))
            }
        }
    }

    fn normalize_schema(&mut self, map: &Map<String, Value>, visited: &VisitedRefs, path: &str) -> AstNode {
        let description = map
            .get("description")
            .and_then(Value::as_str)
            .map(String::from);

        let logic = self.lift_logic(map, visited, path);
        let structure = self.extract_structure(map, visited, path, &description);

        compose(structure, logic, path, description)
            .unwrap_or_else(|description| self.fallback(map, path, description))
    }

    // =========================================================================
    // Step 2: logic
    // =========================================================================

    fn lift_logic(&mut self, map: &Map<String, Value>, visited: &VisitedRefs, path: &str) -> Vec<AstNode> {
        let mut logic = Vec::new();

        if let Some(members) = self.schema_array(map, "allOf", path) {
            let children = self.normalize_members(members, visited, &format!("{}/allOf", path));
            logic.push(AstNode::and(children, NodeMeta::at(format!("{}/allOf", path))));
        }

        if let Some(members) = self.schema_array(map, "anyOf", path) {
            let children = self.normalize_members(members, visited, &format!("{}/anyOf", path));
            logic.push(AstNode::or(children, NodeMeta::at(format!("{}/anyOf", path))));
        }

        if let Some(members) = self.schema_array(map, "oneOf", path) {
            let base = format!("{}/oneOf", path);
            // Each branch is fully inlined, then normalized, before the next one starts.
            // Detection sees the same inlined branches.
            let mut resolved = Vec::with_capacity(members.len());
            let mut children = Vec::with_capacity(members.len());
            for (i, member) in members.iter().enumerate() {
                let branch_path = format!("{}/{}", base, i);
                let branch = resolver::resolve_at(member, self.root, visited, &branch_path, self.ctx);
                children.push(self.normalize_resolved(&branch, visited, &branch_path));
                resolved.push(branch);
            }
            let discriminator = discriminator::detect(&resolved);
            logic.push(AstNode::xor(children, discriminator, NodeMeta::at(base)));
        }

        if let Some(negated) = map.get("not") {
            let not_path = format!("{}/not", path);
            let child = self.normalize(negated, visited, &not_path);
            logic.push(AstNode::not(child, NodeMeta::at(not_path)));
        }

        logic
    }

    /// Non-empty array value of a logic keyword; other shapes are reported
    fn schema_array<'m>(&mut self, map: &'m Map<String, Value>, keyword: &str, path: &str) -> Option<&'m [Value]> {
        match map.get(keyword)? {
            Value::Array(members) if members.is_empty() => None,
            Value::Array(members) => Some(members.as_slice()),
            other => {
                self.ctx.warn(
                    DiagnosticCode::IgnoredKeyword,
                    format!("'{}' must be an array, found {}", keyword, json_type_name(other)),
                    path,
                );
                None
            }
        }
    }

    fn normalize_members(&mut self, members: &[Value], visited: &VisitedRefs, base: &str) -> Vec<AstNode> {
        members
            .iter()
            .enumerate()
            .map(|(i, member)| self.normalize(member, visited, &format!("{}/{}", base, i)))
            .collect()
    }

    // =========================================================================
    // Step 3: structure
    // =========================================================================

    fn extract_structure(
        &mut self,
        map: &Map<String, Value>,
        visited: &VisitedRefs,
        path: &str,
        description: &Option<String>,
    ) -> Option<AstNode> {
        let types = self.declared_types(map, path);
        let meta = NodeMeta::at(path).with_description(description.clone());

        let implies_object = types.contains(&"object")
            || map.contains_key("properties")
            || (types.is_empty() && map.contains_key("additionalProperties"));
        if implies_object {
            return Some(self.build_object(map, visited, path, meta));
        }

        if types.contains(&"array") || map.contains_key("items") {
            return Some(self.build_array(map, visited, path, meta));
        }

        let declared = types
            .iter()
            .filter_map(|t| PrimitiveType::from_json_type(t))
            .fold(None, |chosen, ty| match chosen {
                None | Some(PrimitiveType::Null) => Some(ty),
                Some(existing) => Some(existing),
            });
        if let Some(primitive_type) = declared {
            return Some(self.build_primitive(primitive_type, map, path, meta));
        }

        if map.contains_key("enum") || map.contains_key("const") {
            let primitive_type = infer_literal_type(map);
            return Some(self.build_primitive(primitive_type, map, path, meta));
        }

        None
    }

    fn declared_types<'m>(&mut self, map: &'m Map<String, Value>, path: &str) -> Vec<&'m str> {
        let types: Vec<&str> = match map.get("type") {
            None => Vec::new(),
            Some(Value::String(t)) => vec![t.as_str()],
            Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
            Some(other) => {
                self.ctx.warn(
                    DiagnosticCode::IgnoredKeyword,
                    format!("'type' must be a string or array, found {}", json_type_name(other)),
                    path,
                );
                Vec::new()
            }
        };
        for t in &types {
            if !matches!(*t, "object" | "array") && PrimitiveType::from_json_type(t).is_none() {
                self.ctx.warn(
                    DiagnosticCode::IgnoredKeyword,
                    format!("Unknown type '{}'", t),
                    path,
                );
            }
        }
        types
    }

    fn build_object(&mut self, map: &Map<String, Value>, visited: &VisitedRefs, path: &str, meta: NodeMeta) -> AstNode {
        let mut properties = IndexMap::new();
        if let Some(Value::Object(props)) = map.get("properties") {
            for (name, prop) in props {
                let prop_path = format!("{}/properties/{}", path, name);
                properties.insert(name.clone(), self.normalize(prop, visited, &prop_path));
            }
        }

        let required: IndexSet<String> = map
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();

        let additional_properties = match map.get("additionalProperties") {
            Some(Value::Bool(allowed)) => Some(AdditionalProperties::Allowed(*allowed)),
            Some(schema @ Value::Object(_)) => {
                let ap_path = format!("{}/additionalProperties", path);
                Some(AdditionalProperties::Schema(Box::new(self.normalize(schema, visited, &ap_path))))
            }
            _ => None,
        };

        AstNode::Object(ObjectNode {
            meta,
            properties,
            required,
            additional_properties,
        })
    }

    fn build_array(&mut self, map: &Map<String, Value>, visited: &VisitedRefs, path: &str, meta: NodeMeta) -> AstNode {
        let items_path = format!("{}/items", path);
        let items = match map.get("items") {
            // Tuple form: an element may match any positional schema
            Some(Value::Array(positions)) => match positions.len() {
                0 => AstNode::unknown(NodeMeta::at(items_path)),
                1 => self.normalize(&positions[0], visited, &format!("{}/0", items_path)),
                _ => {
                    let children = self.normalize_members(positions, visited, &items_path);
                    AstNode::or(children, NodeMeta::at(items_path))
                }
            },
            Some(schema) => self.normalize(schema, visited, &items_path),
            None => AstNode::unknown(NodeMeta::at(items_path)),
        };

        let mut constraints = Vec::new();
        if let Some(n) = map.get("minItems").and_then(Value::as_u64) {
            constraints.push(ArrayConstraint::MinItems(n));
        }
        if let Some(n) = map.get("maxItems").and_then(Value::as_u64) {
            constraints.push(ArrayConstraint::MaxItems(n));
        }
        if let Some(unique) = map.get("uniqueItems").and_then(Value::as_bool) {
            constraints.push(ArrayConstraint::UniqueItems(unique));
        }

        AstNode::Array(ArrayNode {
            meta,
            items: Box::new(items),
            constraints,
        })
    }

    fn build_primitive(&mut self, primitive_type: PrimitiveType, map: &Map<String, Value>, path: &str, meta: NodeMeta) -> AstNode {
        let mut node = PrimitiveNode::new(primitive_type, meta);
        node.enum_values = map.get("enum").and_then(Value::as_array).cloned();
        node.const_value = map.get("const").cloned();
        node.default = map.get("default").cloned();
        node.constraints = self.primitive_constraints(map, path);
        AstNode::Primitive(node)
    }

    fn primitive_constraints(&mut self, map: &Map<String, Value>, path: &str) -> Vec<Constraint> {
        let mut constraints = Vec::new();
        let number = |key: &str| map.get(key).and_then(Value::as_f64);
        let count = |key: &str| map.get(key).and_then(Value::as_u64);

        if let Some(n) = number("minimum") {
            constraints.push(Constraint::Minimum(n));
        }
        if let Some(n) = number("maximum") {
            constraints.push(Constraint::Maximum(n));
        }
        if let Some(n) = number("exclusiveMinimum") {
            constraints.push(Constraint::ExclusiveMinimum(n));
        }
        if let Some(n) = number("exclusiveMaximum") {
            constraints.push(Constraint::ExclusiveMaximum(n));
        }
        if let Some(n) = number("multipleOf") {
            constraints.push(Constraint::MultipleOf(n));
        }
        if let Some(n) = count("minLength") {
            constraints.push(Constraint::MinLength(n));
        }
        if let Some(n) = count("maxLength") {
            constraints.push(Constraint::MaxLength(n));
        }
        if let Some(pattern) = map.get("pattern").and_then(Value::as_str) {
            if let Err(e) = regex::Regex::new(pattern) {
                self.ctx.warn(
                    DiagnosticCode::InvalidPattern,
                    format!("Pattern '{}' cannot be compiled: {}", pattern, e),
                    path,
                );
            }
            constraints.push(Constraint::Pattern(pattern.to_string()));
        }
        if let Some(format) = map.get("format").and_then(Value::as_str) {
            constraints.push(Constraint::Format(format.to_string()));
        }
        constraints
    }

    fn fallback(&mut self, map: &Map<String, Value>, path: &str, description: Option<String>) -> AstNode {
        let meta = NodeMeta::at(path).with_description(description);
        self.build_primitive(PrimitiveType::String, map, path, meta)
    }
}

// =============================================================================
// Step 4: composition
// =============================================================================

/// Combine structure and logic. `Err` hands the description back when the
/// node has neither, so the caller can build the fallback.
fn compose(
    structure: Option<AstNode>,
    mut logic: Vec<AstNode>,
    path: &str,
    description: Option<String>,
) -> Result<AstNode, Option<String>> {
    match (structure, logic.len()) {
        (Some(structure), 0) => Ok(structure),
        (Some(structure), _) => {
            let mut children = Vec::with_capacity(logic.len() + 1);
            children.push(structure);
            children.extend(logic);
            Ok(AstNode::and(children, NodeMeta::at(path)))
        }
        (None, 0) => Err(description),
        (None, 1) => {
            let mut node = logic.remove(0);
            if description.is_some() {
                node.meta_mut().description = description;
            }
            Ok(node)
        }
        (None, _) => Ok(AstNode::and(logic, NodeMeta::at(path).with_description(description))),
    }
}

/// Primitive type for a node that only lists literal values
fn infer_literal_type(map: &Map<String, Value>) -> PrimitiveType {
    let literals: Vec<&Value> = map
        .get("const")
        .into_iter()
        .chain(map.get("enum").and_then(Value::as_array).into_iter().flatten())
        .collect();

    let mut kinds = literals
        .iter()
        .filter_map(|v| PrimitiveType::of_value(v))
        .filter(|t| *t != PrimitiveType::Null);

    let Some(first) = kinds.next() else {
        return if literals.iter().any(|v| v.is_null()) {
            PrimitiveType::Null
        } else {
            PrimitiveType::String
        };
    };

    kinds.fold(first, |acc, kind| match (acc, kind) {
        (a, b) if a == b => a,
        (PrimitiveType::Integer, PrimitiveType::Number) | (PrimitiveType::Number, PrimitiveType::Integer) => {
            PrimitiveType::Number
        }
        _ => PrimitiveType::String,
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
