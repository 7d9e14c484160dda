//! Helpers for moving between JSON state and typed state structs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::Diagnostic;

/// Decode state or configuration. Null decodes to the default value.
pub(crate) fn decode<T: DeserializeOwned + Default>(value: &Value) -> Result<T, ProviderError> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone()).map_err(|e| ProviderError::Validation(format!("invalid state: {}", e)))
}

pub(crate) fn encode<T: Serialize>(state: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(state)?)
}

/// The `id` of a stored object.
pub(crate) fn id_of(state: &Value) -> Result<&str, ProviderError> {
    state
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::Validation("state has no id".to_string()))
}

/// `Some(items)` unless the user left the set unset and there is nothing in it.
pub(crate) fn optional_set(configured: bool, items: Vec<String>) -> Option<Vec<String>> {
    if !configured && items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// An error diagnostic for a value the API will not accept.
pub(crate) fn invalid_value(attribute: &str, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(message).with_attribute(attribute)
}

/// Check an enum-like string attribute, when present, with `parse`.
pub(crate) fn check_enum<T, E: std::fmt::Display>(
    config: &Value,
    attribute: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Option<Diagnostic> {
    let value = config.get(attribute)?.as_str()?;
    parse(value).err().map(|e| invalid_value(attribute, e.to_string()))
}

/// Exactly one of `a` and `b` must be set.
pub(crate) fn exactly_one_of(config: &Value, a: &str, b: &str) -> Option<Diagnostic> {
    let set = |name: &str| config.get(name).and_then(Value::as_str).is_some_and(|v| !v.is_empty());
    if set(a) == set(b) {
        Some(
            Diagnostic::error("Invalid Attribute Combination")
                .with_detail(format!("Exactly one of these attributes must be configured: [{}, {}]", a, b)),
        )
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    struct Named {
        #[serde(default)]
        name: String,
    }

    #[test]
    fn test_decode() {
        let named: Named = decode(&Value::Null).unwrap();
        assert_eq!(named.name, "");

        let named: Named = decode(&json!({"name": "office"})).unwrap();
        assert_eq!(named.name, "office");

        assert!(decode::<Named>(&json!({"name": 1})).is_err());
    }

    #[test]
    fn test_id_of() {
        assert_eq!(id_of(&json!({"id": "n1"})).unwrap(), "n1");
        assert!(id_of(&json!({"id": ""})).is_err());
        assert!(id_of(&json!({"id": null})).is_err());
    }

    #[test]
    fn test_optional_set() {
        assert_eq!(optional_set(false, vec![]), None);
        assert_eq!(optional_set(true, vec![]), Some(vec![]));
        assert_eq!(optional_set(false, vec!["g1".into()]), Some(vec!["g1".to_string()]));
    }

    #[test]
    fn test_exactly_one_of() {
        assert!(exactly_one_of(&json!({"id": "n1"}), "id", "name").is_none());
        assert!(exactly_one_of(&json!({"name": "office"}), "id", "name").is_none());
        assert!(exactly_one_of(&json!({}), "id", "name").is_some());
        assert!(exactly_one_of(&json!({"id": "n1", "name": "office"}), "id", "name").is_some());
    }

    #[test]
    fn test_check_enum() {
        let parse = |s: &str| s.parse::<crate::model::Location>();
        assert!(check_enum(&json!({"location": "AWS"}), "location", parse).is_none());
        let diag = check_enum(&json!({"location": "MARS"}), "location", parse).unwrap();
        assert_eq!(diag.attribute.as_deref(), Some("location"));
    }
}
