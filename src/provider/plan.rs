//! Schema-driven planning shared by every resource.

use serde_json::{Map, Value};

use crate::schema::{AttributeType, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Build the planned state from the user's proposal.
///
/// Unset computed attributes keep their prior value on update and are
/// unknown (null) on create. Unset attributes with a default get it. A set
/// that only differs from the prior one in order keeps the prior order.
pub fn fill(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> Value {
    let mut planned = proposed.as_object().cloned().unwrap_or_default();

    for (name, attr) in &schema.block.attributes {
        let proposed_value = proposed.get(name).filter(|v| !v.is_null());
        let prior_value = prior.and_then(|p| p.get(name)).filter(|v| !v.is_null());

        let value = match (proposed_value, prior_value) {
            (Some(new), Some(old)) if matches!(attr.attr_type, AttributeType::Set(_)) && sets_equal(new, old) => {
                old.clone()
            },
            (Some(new), _) => new.clone(),
            (None, Some(old)) if attr.flags.computed => old.clone(),
            (None, _) => attr.default.clone().unwrap_or(Value::Null),
        };
        planned.insert(name.clone(), value);
    }

    for name in schema.block.blocks.keys() {
        planned.entry(name.clone()).or_insert(Value::Null);
    }

    Value::Object(planned)
}

/// Compare the planned state against the prior one.
pub fn diff(schema: &Schema, prior: Option<&Value>, planned: Value) -> PlanResult {
    let Some(prior) = prior else {
        let changes = top_level(&planned)
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| AttributeChange::added(name.clone(), value.clone()))
            .collect();
        return PlanResult::with_changes(planned, changes, false);
    };

    let mut changes = Vec::new();
    let mut requires_replace = false;
    let empty = Map::new();
    let before = prior.as_object().unwrap_or(&empty);

    for (name, after) in top_level(&planned) {
        let old = before.get(name).unwrap_or(&Value::Null);
        let attr = schema.block.attributes.get(name);
        let equal = match attr.map(|a| &a.attr_type) {
            Some(AttributeType::Set(_)) => sets_equal(old, after),
            _ => old == after,
        };
        if equal {
            continue;
        }

        requires_replace |= attr.is_some_and(|a| a.force_new);
        changes.push(match (old.is_null(), after.is_null()) {
            (true, _) => AttributeChange::added(name.clone(), after.clone()),
            (false, true) => AttributeChange::removed(name.clone(), old.clone()),
            (false, false) => AttributeChange::modified(name.clone(), old.clone(), after.clone()),
        });
    }

    let mut planned = planned;
    if requires_replace {
        // The replacement starts from scratch; provider-set values are unknown again.
        if let Some(obj) = planned.as_object_mut() {
            for (name, attr) in &schema.block.attributes {
                if attr.is_computed_only() {
                    obj.insert(name.clone(), Value::Null);
                }
            }
        }
    }

    PlanResult::with_changes(planned, changes, requires_replace)
}

/// Plan removing the object: every known attribute goes away.
pub fn destroy(prior: &Value) -> PlanResult {
    let changes = top_level(prior)
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| AttributeChange::removed(name.clone(), value.clone()))
        .collect();
    PlanResult::with_changes(Value::Null, changes, false)
}

fn top_level(value: &Value) -> impl Iterator<Item = (&String, &Value)> {
    value.as_object().into_iter().flat_map(|obj| obj.iter())
}

/// Null and `[]` are the same empty set.
fn sets_equal(a: &Value, b: &Value) -> bool {
    fn sorted(v: &Value) -> Vec<String> {
        let mut items: Vec<String> = v
            .as_array()
            .map(|arr| arr.iter().map(Value::to_string).collect())
            .unwrap_or_default();
        items.sort();
        items
    }
    sorted(a) == sorted(b)
}
