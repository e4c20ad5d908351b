//! Init-schema dialect: validation of constructor arguments.
//!
//! Schemas are a JSON-Schema-like subset (§ wire contract): primitive types
//! with optional `default`/`enum`, `object` + `properties`, `anyOf` unions,
//! and `$ref: "#/$defs/Name"` references resolved against the parameter
//! schema's own `$defs`. Validation normalizes the arguments: declared
//! defaults are back-filled so constructors see a complete object.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

const DEFS_PREFIX: &str = "#/$defs/";

/// Validates `args` against a component's parameter schemas and returns the
/// normalized argument object (defaults filled in).
///
/// `args` must be a JSON object or null; unknown parameter names are
/// rejected so typos surface at edit time rather than as silently-defaulted
/// configuration.
pub fn validate_args(
    params: &BTreeMap<String, Value>,
    args: &Value,
) -> Result<Value, String> {
    let empty = Map::new();
    let supplied: &Map<String, Value> = match args {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => return Err(format!("init args must be an object, got {other}")),
    };

    for key in supplied.keys() {
        if !params.contains_key(key) {
            return Err(format!("unknown parameter '{key}'"));
        }
    }

    let mut normalized = Map::new();
    for (name, schema) in params {
        match supplied.get(name) {
            Some(value) => {
                let validated = validate_value(schema, value, schema)
                    .map_err(|e| format!("parameter '{name}': {e}"))?;
                normalized.insert(name.clone(), validated);
            }
            None => {
                if let Some(default) = default_for(schema, schema) {
                    normalized.insert(name.clone(), default);
                }
            }
        }
    }
    Ok(Value::Object(normalized))
}

/// Validates one value against one schema node, resolving `$ref` against
/// `root`. Returns the (possibly normalized) value.
fn validate_value(schema: &Value, value: &Value, root: &Value) -> Result<Value, String> {
    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        let target = resolve_ref(reference, root)?;
        return validate_value(target, value, root);
    }

    if let Some(branches) = schema.get("anyOf").and_then(Value::as_array) {
        for branch in branches {
            if let Ok(validated) = validate_value(branch, value, root) {
                return Ok(validated);
            }
        }
        return Err(format!("{value} matches no branch of anyOf"));
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{value} is not one of the allowed values"));
        }
    }

    match schema.get("type").and_then(Value::as_str) {
        Some("string") => {
            if !value.is_string() {
                return Err(format!("expected string, got {value}"));
            }
            Ok(value.clone())
        }
        Some("number") => {
            if !value.is_number() {
                return Err(format!("expected number, got {value}"));
            }
            Ok(value.clone())
        }
        Some("integer") => {
            if !(value.is_i64() || value.is_u64()) {
                return Err(format!("expected integer, got {value}"));
            }
            Ok(value.clone())
        }
        Some("boolean") => {
            if !value.is_boolean() {
                return Err(format!("expected boolean, got {value}"));
            }
            Ok(value.clone())
        }
        Some("null") => {
            if !value.is_null() {
                return Err(format!("expected null, got {value}"));
            }
            Ok(Value::Null)
        }
        Some("object") => validate_object(schema, value, root),
        Some(other) => Err(format!("unsupported schema type '{other}'")),
        // No type constraint: accept as-is (enum above may still have
        // narrowed it).
        None => Ok(value.clone()),
    }
}

fn validate_object(schema: &Value, value: &Value, root: &Value) -> Result<Value, String> {
    let Some(object) = value.as_object() else {
        return Err(format!("expected object, got {value}"));
    };
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    for key in object.keys() {
        if !properties.contains_key(key) {
            return Err(format!("unknown field '{key}'"));
        }
    }

    let mut normalized = Map::new();
    for (name, prop_schema) in properties {
        match object.get(name) {
            Some(v) => {
                let validated = validate_value(prop_schema, v, root)
                    .map_err(|e| format!("field '{name}': {e}"))?;
                normalized.insert(name.clone(), validated);
            }
            None => {
                if let Some(default) = default_for(prop_schema, root) {
                    normalized.insert(name.clone(), default);
                }
            }
        }
    }
    Ok(Value::Object(normalized))
}

/// Default value for an absent parameter: an explicit `default`, or for
/// object schemas, an object assembled from the property defaults.
fn default_for(schema: &Value, root: &Value) -> Option<Value> {
    if let Some(default) = schema.get("default") {
        return Some(default.clone());
    }
    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        let target = resolve_ref(reference, root).ok()?;
        return default_for(target, root);
    }
    if schema.get("type").and_then(Value::as_str) == Some("object") {
        let properties = schema.get("properties")?.as_object()?;
        let mut defaults = Map::new();
        for (name, prop_schema) in properties {
            if let Some(default) = default_for(prop_schema, root) {
                defaults.insert(name.clone(), default);
            }
        }
        return Some(Value::Object(defaults));
    }
    None
}

fn resolve_ref<'a>(reference: &str, root: &'a Value) -> Result<&'a Value, String> {
    let Some(name) = reference.strip_prefix(DEFS_PREFIX) else {
        return Err(format!("unsupported $ref '{reference}'"));
    };
    root.get("$defs")
        .and_then(|defs| defs.get(name))
        .ok_or_else(|| format!("unresolved $ref '{reference}'"))
}
