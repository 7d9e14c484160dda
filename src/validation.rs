//! Checks a configuration value against a [`Schema`].
//!
//! ```
//! use twingate_provider::schema::{Attribute, Schema};
//! use twingate_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("id", Attribute::computed_string());
//!
//! assert!(validate(&schema, &json!({"name": "office"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "office", "id": "abc"}));
//! assert_eq!(diagnostics[0].summary, "Invalid configuration for computed attribute");
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema};

pub const UNSUPPORTED_ARGUMENT: &str = "Unsupported argument";
pub const COMPUTED_ATTRIBUTE_SET: &str = "Invalid configuration for computed attribute";

/// Validate `value` against `schema`. An empty result means the value is valid.
///
/// Reports missing required attributes, type mismatches, unknown attributes,
/// computed-only attributes set by the user and nested block item limits.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        other => {
            let diagnostic = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(other)));
            diagnostics.push(if path.is_empty() {
                diagnostic
            } else {
                diagnostic.with_attribute(path)
            });
            return;
        },
    };

    for key in obj.keys() {
        if !block.attributes.contains_key(key) && !block.blocks.contains_key(key) {
            diagnostics.push(
                Diagnostic::error(UNSUPPORTED_ARGUMENT)
                    .with_detail(format!("An argument named \"{}\" is not expected here.", key))
                    .with_attribute(join_path(path, key)),
            );
        }
    }

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(_) if attr.is_computed_only() => {
            diagnostics.push(
                Diagnostic::error(COMPUTED_ATTRIBUTE_SET)
                    .with_detail(format!(
                        "\"{}\": this field is computed by the provider and cannot be set",
                        path
                    ))
                    .with_attribute(path),
            );
        },
        Some(v) => validate_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_type(attr_type: &AttributeType, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element) | AttributeType::Set(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_type(element, item, &format!("{}[{}]", path, i), diagnostics);
                }
            },
            None => {
                let expected = if matches!(attr_type, AttributeType::Set(_)) { "set" } else { "list" };
                diagnostics.push(type_error(path, expected, value));
            },
        },
        AttributeType::Map(element) => match value.as_object() {
            Some(entries) => {
                for (key, item) in entries {
                    validate_type(element, item, &join_path(path, key), diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
        AttributeType::Object(fields) => match value.as_object() {
            Some(obj) => validate_object(fields, obj, path, diagnostics),
            None => diagnostics.push(type_error(path, "object", value)),
        },
    }
}

fn validate_object(
    fields: &BTreeMap<String, AttributeType>,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, field_type) in fields {
        if let Some(value) = obj.get(name).filter(|v| !v.is_null()) {
            validate_type(field_type, value, &join_path(path, name), diagnostics);
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items: Vec<(String, &Value)> = match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => Vec::new(),
        (BlockNestingMode::Single, Some(v)) => vec![(path.to_string(), v)],
        (BlockNestingMode::List | BlockNestingMode::Set, Some(Value::Array(arr))) => arr
            .iter()
            .enumerate()
            .map(|(i, item)| (format!("{}[{}]", path, i), item))
            .collect(),
        (BlockNestingMode::Map, Some(Value::Object(obj))) => obj
            .iter()
            .map(|(key, item)| (join_path(path, key), item))
            .collect(),
        (mode, Some(v)) => {
            let expected = if mode == BlockNestingMode::Map { "map" } else { "list" };
            diagnostics.push(
                Diagnostic::error(format!("Expected {} for block '{}'", expected, path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
            return;
        },
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }

    for (item_path, item) in items {
        validate_block(&nested.block, item, &item_path, diagnostics);
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.as_i64().is_some(),
        Value::Number(n) => n
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}
