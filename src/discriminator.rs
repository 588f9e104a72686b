//! Discriminator Detection
//!
//! Finds a property whose `const`/`enum` values tell `oneOf` branches apart.
//! Detection is conservative: any ambiguity yields `None`, never a guess.

use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::{stringify_value, Discriminator};

/// Property path -> allowed values, for one branch
type BranchConstraints = IndexMap<Vec<String>, Vec<Value>>;

/// Detect a discriminator over raw (resolved, not normalized) branch schemas.
pub fn detect(branches: &[Value]) -> Option<Discriminator> {
    if branches.len() < 2 {
        return None;
    }

    let constraints: Vec<BranchConstraints> = branches
        .iter()
        .map(|branch| {
            let mut out = BranchConstraints::new();
            collect_constraints(branch, &mut Vec::new(), &mut out);
            out
        })
        .collect();

    let (first, rest) = constraints.split_first()?;
    let candidates = first
        .keys()
        .filter(|path| rest.iter().all(|branch| branch.contains_key(*path)));

    for path in candidates {
        if let Some(mapping) = try_path(path, &constraints) {
            return Some(Discriminator {
                path: path.clone(),
                mapping,
            });
        }
    }
    None
}

/// Build the value mapping for `path`, or `None` if any branch has no values
/// there or two branches share a value.
fn try_path(path: &[String], constraints: &[BranchConstraints]) -> Option<IndexMap<String, usize>> {
    let mut keys_per_branch: Vec<Vec<String>> = Vec::with_capacity(constraints.len());
    for branch in constraints {
        let values = branch.get(path)?;
        if values.is_empty() {
            return None;
        }
        let mut keys: Vec<String> = Vec::with_capacity(values.len());
        for key in values.iter().map(stringify_value) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys_per_branch.push(keys);
    }

    for (i, left) in keys_per_branch.iter().enumerate() {
        for right in &keys_per_branch[i + 1..] {
            if left.iter().any(|key| right.contains(key)) {
                return None;
            }
        }
    }

    let mut mapping = IndexMap::new();
    for (index, keys) in keys_per_branch.into_iter().enumerate() {
        for key in keys {
            mapping.insert(key, index);
        }
    }
    Some(mapping)
}

/// Gather `const`/`enum` constraints below `properties` and `allOf`.
/// Nested `oneOf`/`anyOf` are deliberately not entered.
fn collect_constraints(schema: &Value, path: &mut Vec<String>, out: &mut BranchConstraints) {
    let Value::Object(map) = schema else {
        return;
    };

    if !path.is_empty() {
        if let Some(value) = map.get("const") {
            add_constraint(out, path, vec![value.clone()]);
        }
        if let Some(Value::Array(values)) = map.get("enum") {
            add_constraint(out, path, values.clone());
        }
    }

    if let Some(Value::Object(props)) = map.get("properties") {
        for (name, prop) in props {
            path.push(name.clone());
            collect_constraints(prop, path, out);
            path.pop();
        }
    }

    if let Some(Value::Array(members)) = map.get("allOf") {
        for member in members {
            collect_constraints(member, path, out);
        }
    }
}

/// Several constraints on one path must all hold, so their value sets intersect
fn add_constraint(out: &mut BranchConstraints, path: &[String], values: Vec<Value>) {
    let mut unique: Vec<Value> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }

    match out.get_mut(path) {
        Some(existing) => existing.retain(|v| unique.contains(v)),
        None => {
            out.insert(path.to_vec(), unique);
        }
    }
}
