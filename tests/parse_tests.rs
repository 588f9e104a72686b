//! Golden Tests for Parsing and Normalization
//!
//! Each fixture is parsed end to end and the resulting AST checked against
//! the shape a renderer should see.

use std::path::Path;

use schema_ast::ast::{AdditionalProperties, ArrayConstraint, Constraint};
use schema_ast::{parse, AstKind, DiagnosticCode, FileFetcher, ParseOptions, PrimitiveType};

fn fixtures_path() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").leak()
}

// =============================================================================
// Internal references
// =============================================================================

#[test]
fn test_order_schema() {
    let output = parse(include_str!("fixtures/order.json"), None, ParseOptions::default());
    assert!(output.is_ok());
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);

    let order = output.ast.as_object().expect("root object");
    assert_eq!(order.meta.description.as_deref(), Some("A customer order"));
    assert_eq!(
        order.required.iter().collect::<Vec<_>>(),
        vec!["id", "items", "payment"]
    );
    assert_eq!(order.additional_properties, Some(AdditionalProperties::Allowed(false)));

    let id = order.properties["id"].as_primitive().unwrap();
    assert_eq!(id.primitive_type, PrimitiveType::String);
    assert_eq!(id.meta.description.as_deref(), Some("Order identifier"));
    assert!(id
        .constraints
        .contains(&Constraint::Pattern("^[A-Z]{3}-[0-9]+$".to_string())));

    let status = order.properties["status"].as_primitive().unwrap();
    assert_eq!(status.enum_values.as_ref().map(Vec::len), Some(3));
    assert_eq!(status.default, Some(serde_json::json!("pending")));

    let items = order.properties["items"].as_array().unwrap();
    assert_eq!(items.constraints, vec![ArrayConstraint::MinItems(1)]);
    let line_item = items.items.as_object().unwrap();
    assert_eq!(line_item.properties["sku"].kind(), AstKind::Primitive);
    assert_eq!(
        line_item.properties["price"].as_primitive().unwrap().constraints,
        vec![Constraint::ExclusiveMinimum(0.0)]
    );

    let notes = order.properties["notes"].as_primitive().unwrap();
    assert_eq!(notes.primitive_type, PrimitiveType::String);
}

#[test]
fn test_order_payment_discriminator() {
    let output = parse(include_str!("fixtures/order.json"), None, ParseOptions::default());
    let order = output.ast.as_object().unwrap();

    let payment = order.properties["payment"].as_xor().expect("oneOf becomes xor");
    assert_eq!(payment.children.len(), 2);
    assert_eq!(payment.children[0].kind(), AstKind::Object);
    assert_eq!(payment.children[1].kind(), AstKind::And);

    let discriminator = payment.discriminator.as_ref().expect("discriminator");
    assert_eq!(discriminator.path, vec!["method"]);
    assert_eq!(discriminator.branch_for(&serde_json::json!("card")), Some(0));
    assert_eq!(discriminator.branch_for(&serde_json::json!("bank")), Some(1));
}

#[test]
fn test_order_metadata() {
    let output = parse(include_str!("fixtures/order.json"), None, ParseOptions::default());
    let metadata = &output.metadata;
    assert_eq!(metadata.title.as_deref(), Some("Order"));
    assert_eq!(metadata.draft.as_deref(), Some("http://json-schema.org/draft-07/schema#"));
    assert_eq!(metadata.definition_count, 4);
    assert_eq!(metadata.ref_count, 5);
    assert!(!metadata.has_external_refs);
}

#[test]
fn test_recursive_schema_terminates() {
    let output = parse(include_str!("fixtures/linked_list.json"), None, ParseOptions::default());
    assert!(output.is_ok());
    assert_eq!(output.warnings.len(), 1);
    assert!(output.diagnostics.contains(DiagnosticCode::CircularReference));

    let node = output.ast.as_object().unwrap();
    let next = &node.properties["next"];
    assert_eq!(next.kind(), AstKind::Or);
    let branches = next.children();
    assert_eq!(branches[0].kind(), AstKind::Object);
    assert!(branches[0]
        .description()
        .unwrap()
        .contains("Circular reference detected"));
    assert_eq!(
        branches[1].as_primitive().unwrap().primitive_type,
        PrimitiveType::Null
    );
}

#[test]
fn test_nested_logic_is_flattened() {
    let output = parse(include_str!("fixtures/flattening.json"), None, ParseOptions::default());
    let root = &output.ast;
    assert_eq!(root.kind(), AstKind::And);

    let children = root.children();
    assert_eq!(children.len(), 4);
    assert!(children.iter().all(|c| c.kind() != AstKind::And));

    let any_of = children[3];
    assert_eq!(any_of.kind(), AstKind::Or);
    assert_eq!(any_of.children().len(), 3);
    assert!(any_of.children().iter().all(|c| c.kind() != AstKind::Or));
}

#[test]
fn test_broken_refs_warn_in_order() {
    let output = parse(include_str!("fixtures/broken_refs.json"), None, ParseOptions::default());
    assert!(output.is_ok());
    assert_eq!(output.warnings.len(), 2);
    assert!(output.warnings[0].contains("#/definitions/Missing"));
    assert!(output.warnings[1].contains("#/definitions/AlsoMissing"));

    let object = output.ast.as_object().unwrap();
    assert_eq!(object.properties["a"].kind(), AstKind::Object);
    assert_eq!(object.properties["c"].kind(), AstKind::Primitive);
}

// =============================================================================
// External references on disk
// =============================================================================

#[test]
fn test_external_file_refs() {
    let root = fixtures_path().join("external/customer.json");
    let raw = std::fs::read_to_string(&root).unwrap();
    let fetcher = FileFetcher::new();

    let output = parse(
        &raw,
        root.to_str(),
        ParseOptions::new().with_fetcher(&fetcher),
    );
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);
    assert_eq!(output.external_refs.len(), 2);
    assert!(output.external_refs[0].ends_with("common.json"));
    assert!(output.external_refs[1].ends_with("phone.json"));
    assert!(output.metadata.has_external_refs);

    let customer = output.ast.as_object().unwrap();
    let billing = customer.properties["billing"].as_object().unwrap();
    assert_eq!(billing.meta.description.as_deref(), Some("Postal address"));
    assert!(billing.required.contains("zip"));

    let shipping = customer.properties["shipping"].as_object().unwrap();
    assert_eq!(shipping.meta.description.as_deref(), Some("Where parcels go"));

    let contact = customer.properties["contact"].as_object().unwrap();
    let country = contact.properties["country"].as_primitive().unwrap();
    assert_eq!(country.enum_values.as_ref().map(Vec::len), Some(3));
}

#[test]
fn test_external_refs_without_fetcher() {
    let raw = include_str!("fixtures/external/customer.json");
    let output = parse(raw, None, ParseOptions::default());

    assert!(output.is_ok());
    assert_eq!(output.warnings.len(), 3);
    assert!(output.diagnostics.contains(DiagnosticCode::ExternalRefUnavailable));
    assert!(output.external_refs.is_empty());
    assert_eq!(
        output.ast.as_object().unwrap().properties["billing"].kind(),
        AstKind::Object
    );
}

#[test]
fn test_ast_serializes_for_renderer() {
    let output = parse(include_str!("fixtures/order.json"), None, ParseOptions::default());
    let json = serde_json::to_value(&output.ast).unwrap();

    assert_eq!(json["kind"], "object");
    assert_eq!(json["properties"]["payment"]["kind"], "xor");
    assert_eq!(json["properties"]["payment"]["discriminator"]["path"][0], "method");
    assert_eq!(json["properties"]["id"]["type"], "string");
}

// =============================================================================
// Problem sentinels and traversal order
// =============================================================================

#[test]
fn test_ref_description_does_not_hide_problem() {
    let raw = r##"{
        "type": "object",
        "properties": {
            "a": {"$ref": "#/definitions/Missing", "description": "the a field"}
        }
    }"##;
    let output = parse(raw, None, ParseOptions::default());
    assert_eq!(output.warnings.len(), 1);

    let a = &output.ast.as_object().unwrap().properties["a"];
    assert_eq!(a.kind(), AstKind::Object);
    assert!(a.description().unwrap().contains("Could not resolve"));
}

#[test]
fn test_warnings_follow_sibling_branch_order() {
    let raw = r##"{
        "allOf": [
            {"properties": {"a": {"$ref": "#/definitions/A"}}},
            {"$ref": "#/definitions/B"}
        ],
        "anyOf": [
            {"properties": {"c": {"$ref": "#/definitions/C"}}},
            {"$ref": "#/definitions/D"}
        ],
        "oneOf": [
            {"properties": {"e": {"$ref": "#/definitions/E"}}},
            {"$ref": "#/definitions/F"}
        ]
    }"##;
    let output = parse(raw, None, ParseOptions::default());

    let missing: Vec<char> = output
        .warnings
        .iter()
        .map(|w| w.chars().rev().nth(1).unwrap())
        .collect();
    assert_eq!(missing, vec!['A', 'B', 'C', 'D', 'E', 'F']);
}

#[test]
fn test_discriminator_independent_of_ref_placement() {
    let raw = r##"{
        "definitions": {
            "Cat": {"const": "cat"},
            "Dog": {"const": "dog"},
            "DogBranch": {"type": "object", "properties": {"kind": {"$ref": "#/definitions/Dog"}}}
        },
        "oneOf": [
            {"type": "object", "properties": {"kind": {"$ref": "#/definitions/Cat"}}},
            {"$ref": "#/definitions/DogBranch"}
        ]
    }"##;
    let output = parse(raw, None, ParseOptions::default());
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);

    let xor = output.ast.as_xor().expect("oneOf becomes xor");
    let discriminator = xor.discriminator.as_ref().expect("discriminator");
    assert_eq!(discriminator.path, vec!["kind"]);
    assert_eq!(discriminator.branch_for(&serde_json::json!("cat")), Some(0));
    assert_eq!(discriminator.branch_for(&serde_json::json!("dog")), Some(1));
}
