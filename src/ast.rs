//! AST model
//!
//! The explicit tree produced by the normalizer. Logic (`And`/`Or`/`Xor`/`Not`)
//! and structure (`Object`/`Array`/`Primitive`) never share a node: a schema
//! that has both is represented as an `And` over the two.
//!
//! Trees are built once per parse and never mutated afterwards. `And` and
//! `Or` nodes can only be built through [`AstNode::and`] and [`AstNode::or`],
//! which splice directly nested nodes of the same kind.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

// =============================================================================
// Node kinds
// =============================================================================

/// Discriminant of an [`AstNode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AstKind {
    And,
    Or,
    Xor,
    Not,
    Object,
    Array,
    Primitive,
}

impl AstKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
            Self::Object => "object",
            Self::Array => "array",
            Self::Primitive => "primitive",
        }
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor | Self::Not)
    }
}

impl fmt::Display for AstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON primitive type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl PrimitiveType {
    pub fn from_json_type(type_str: &str) -> Option<Self> {
        match type_str {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    /// Type tag of a literal value; `None` for arrays and objects
    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(Self::String),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self::Integer),
            Value::Number(_) => Some(Self::Number),
            Value::Bool(_) => Some(Self::Boolean),
            Value::Null => Some(Self::Null),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

// =============================================================================
// Shared metadata
// =============================================================================

/// Debugging breadcrumbs carried by every node
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    /// JSON Pointer-style location in the source document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodeMeta {
    pub fn at(source_path: impl Into<String>) -> Self {
        Self {
            source_path: Some(source_path.into()),
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

// =============================================================================
// Variants
// =============================================================================

/// Children of an `And` or `Or` node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicNode {
    #[serde(flatten)]
    pub meta: NodeMeta,
    children: Vec<AstNode>,
}

impl LogicNode {
    pub fn children(&self) -> &[AstNode] {
        &self.children
    }
}

/// Exclusive choice between branches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XorNode {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub children: Vec<AstNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Discriminator>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotNode {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub child: Box<AstNode>,
}

/// `additionalProperties` as either a flag or a nested schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<AstNode>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectNode {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub properties: IndexMap<String, AstNode>,
    pub required: IndexSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
}

/// Array-level constraints
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "keyword", content = "value", rename_all = "camelCase")]
pub enum ArrayConstraint {
    MinItems(u64),
    MaxItems(u64),
    UniqueItems(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayNode {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub items: Box<AstNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ArrayConstraint>,
}

/// Typed constraints on primitive values
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "keyword", content = "value", rename_all = "camelCase")]
pub enum Constraint {
    Minimum(f64),
    Maximum(f64),
    ExclusiveMinimum(f64),
    ExclusiveMaximum(f64),
    MultipleOf(f64),
    MinLength(u64),
    MaxLength(u64),
    Pattern(String),
    Format(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimitiveNode {
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(rename = "type")]
    pub primitive_type: PrimitiveType,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl PrimitiveNode {
    pub fn new(primitive_type: PrimitiveType, meta: NodeMeta) -> Self {
        Self {
            meta,
            primitive_type,
            enum_values: None,
            const_value: None,
            default: None,
            constraints: Vec::new(),
        }
    }
}

/// Property path and value mapping that selects one `oneOf` branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discriminator {
    /// Keys from the branch root down to the discriminating property
    pub path: Vec<String>,
    /// Stringified discriminating value -> branch index
    pub mapping: IndexMap<String, usize>,
}

impl Discriminator {
    /// Branch selected by a concrete value, if any
    pub fn branch_for(&self, value: &Value) -> Option<usize> {
        self.mapping.get(&stringify_value(value)).copied()
    }
}

/// Mapping key for a discriminating value: strings verbatim, anything else
/// as compact JSON.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// AST Node
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AstNode {
    And(LogicNode),
    Or(LogicNode),
    Xor(XorNode),
    Not(NotNode),
    Object(ObjectNode),
    Array(ArrayNode),
    Primitive(PrimitiveNode),
}

impl AstNode {
    /// Conjunction; directly nested `And` children are spliced in.
    pub fn and(children: Vec<AstNode>, meta: NodeMeta) -> Self {
        Self::And(LogicNode {
            meta,
            children: splice(AstKind::And, children),
        })
    }

    /// Disjunction; directly nested `Or` children are spliced in.
    pub fn or(children: Vec<AstNode>, meta: NodeMeta) -> Self {
        Self::Or(LogicNode {
            meta,
            children: splice(AstKind::Or, children),
        })
    }

    pub fn xor(children: Vec<AstNode>, discriminator: Option<Discriminator>, meta: NodeMeta) -> Self {
        Self::Xor(XorNode {
            meta,
            children,
            discriminator,
        })
    }

    pub fn not(child: AstNode, meta: NodeMeta) -> Self {
        Self::Not(NotNode {
            meta,
            child: Box::new(child),
        })
    }

    /// Placeholder for a schema with no discernible contract
    pub fn unknown(meta: NodeMeta) -> Self {
        Self::Primitive(PrimitiveNode::new(PrimitiveType::String, meta))
    }

    pub fn kind(&self) -> AstKind {
        match self {
            Self::And(_) => AstKind::And,
            Self::Or(_) => AstKind::Or,
            Self::Xor(_) => AstKind::Xor,
            Self::Not(_) => AstKind::Not,
            Self::Object(_) => AstKind::Object,
            Self::Array(_) => AstKind::Array,
            Self::Primitive(_) => AstKind::Primitive,
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        match self {
            Self::And(n) | Self::Or(n) => &n.meta,
            Self::Xor(n) => &n.meta,
            Self::Not(n) => &n.meta,
            Self::Object(n) => &n.meta,
            Self::Array(n) => &n.meta,
            Self::Primitive(n) => &n.meta,
        }
    }

    pub(crate) fn meta_mut(&mut self) -> &mut NodeMeta {
        match self {
            Self::And(n) | Self::Or(n) => &mut n.meta,
            Self::Xor(n) => &mut n.meta,
            Self::Not(n) => &mut n.meta,
            Self::Object(n) => &mut n.meta,
            Self::Array(n) => &mut n.meta,
            Self::Primitive(n) => &mut n.meta,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.meta().description.as_deref()
    }

    pub fn source_path(&self) -> Option<&str> {
        self.meta().source_path.as_deref()
    }

    /// Direct children in document order
    pub fn children(&self) -> Vec<&AstNode> {
        match self {
            Self::And(n) | Self::Or(n) => n.children.iter().collect(),
            Self::Xor(n) => n.children.iter().collect(),
            Self::Not(n) => vec![n.child.as_ref()],
            Self::Object(n) => {
                let mut out: Vec<&AstNode> = n.properties.values().collect();
                if let Some(AdditionalProperties::Schema(schema)) = &n.additional_properties {
                    out.push(schema.as_ref());
                }
                out
            }
            Self::Array(n) => vec![n.items.as_ref()],
            Self::Primitive(_) => Vec::new(),
        }
    }

    /// Total number of nodes in this subtree
    pub fn node_count(&self) -> usize {
        1 + self.children().into_iter().map(AstNode::node_count).sum::<usize>()
    }

    /// Longest root-to-leaf path, counting nodes
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(AstNode::depth)
            .max()
            .unwrap_or(0)
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            Self::Object(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayNode> {
        match self {
            Self::Array(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveNode> {
        match self {
            Self::Primitive(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_xor(&self) -> Option<&XorNode> {
        match self {
            Self::Xor(n) => Some(n),
            _ => None,
        }
    }
}

fn splice(kind: AstKind, children: Vec<AstNode>) -> Vec<AstNode> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match (kind, child) {
            (AstKind::And, AstNode::And(inner)) | (AstKind::Or, AstNode::Or(inner)) => {
                // inner is already flat
                out.extend(inner.children);
            }
            (_, other) => out.push(other),
        }
    }
    out
}
