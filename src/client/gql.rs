//! GraphQL request and response plumbing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ApiError, Cause};

pub(crate) const REMOTE_NETWORK: &str = "remote network";
pub(crate) const CONNECTOR: &str = "connector";
pub(crate) const CONNECTOR_TOKENS: &str = "connector tokens";
pub(crate) const GROUP: &str = "group";
pub(crate) const RESOURCE: &str = "resource";
pub(crate) const USER: &str = "user";

/// A client operation: a verb applied to a kind of object.
///
/// The operation names the GraphQL request (`createRemoteNetwork`) and
/// wraps failures into [`ApiError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Operation {
    verb: &'static str,
    resource: &'static str,
    custom_name: Option<&'static str>,
}

impl Operation {
    pub(crate) const fn create(resource: &'static str) -> Self {
        Self::new("create", resource)
    }

    pub(crate) const fn read(resource: &'static str) -> Self {
        Self::new("read", resource)
    }

    pub(crate) const fn update(resource: &'static str) -> Self {
        Self::new("update", resource)
    }

    pub(crate) const fn delete(resource: &'static str) -> Self {
        Self::new("delete", resource)
    }

    pub(crate) const fn generate(resource: &'static str) -> Self {
        Self::new("generate", resource)
    }

    pub(crate) const fn verify(resource: &'static str) -> Self {
        Self::new("verify", resource)
    }

    const fn new(verb: &'static str, resource: &'static str) -> Self {
        Self {
            verb,
            resource,
            custom_name: None,
        }
    }

    /// Use a request name other than the derived one.
    pub(crate) const fn named(mut self, name: &'static str) -> Self {
        self.custom_name = Some(name);
        self
    }

    /// The GraphQL operation name.
    pub(crate) fn name(&self) -> String {
        match self.custom_name {
            Some(name) => name.to_string(),
            None => lower_camel(&format!("{} {}", self.verb, self.resource)),
        }
    }

    pub(crate) fn error(&self, cause: impl Into<Cause>) -> ApiError {
        ApiError::new(cause.into(), self.verb, self.resource)
    }

    pub(crate) fn error_with_id(&self, cause: impl Into<Cause>, id: &str) -> ApiError {
        self.error(cause).with_id(id)
    }

    pub(crate) fn error_with_name(&self, cause: impl Into<Cause>, name: &str) -> ApiError {
        self.error(cause).with_name(name)
    }
}

fn lower_camel(words: &str) -> String {
    let mut out = String::with_capacity(words.len());
    for (i, word) in words.split_whitespace().enumerate() {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    out
}

/// GraphQL variables, built one option at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Variables(Map<String, Value>);

impl Variables {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Set `$id`.
    pub(crate) fn id(self, id: &str) -> Self {
        self.id_named("id", id)
    }

    pub(crate) fn id_named(mut self, name: &str, id: &str) -> Self {
        self.0.insert(name.to_string(), Value::String(id.to_string()));
        self
    }

    pub(crate) fn ids(mut self, name: &str, ids: &[String]) -> Self {
        self.0.insert(
            name.to_string(),
            Value::Array(ids.iter().cloned().map(Value::String).collect()),
        );
        self
    }

    /// Set a variable. `None` leaves it out entirely.
    pub(crate) fn var<T: Serialize>(mut self, name: &str, value: T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        if !value.is_null() {
            self.0.insert(name.to_string(), value);
        }
        self
    }

    /// Set a variable, sending zero values (`""`, `false`, `0`) as null.
    pub(crate) fn nullable<T: Serialize>(mut self, name: &str, value: T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        let value = if is_zero(&value) { Value::Null } else { value };
        self.0.insert(name.to_string(), value);
        self
    }

    /// Set a pagination cursor. The first page is requested with null.
    pub(crate) fn cursor(self, name: &str, cursor: Option<&str>) -> Self {
        self.nullable(name, cursor.unwrap_or_default())
    }

    pub(crate) fn page_limit(mut self, limit: usize) -> Self {
        self.0.insert("pageLimit".to_string(), Value::from(limit as u64));
        self
    }

    pub(crate) fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlErrorMessage>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

/// Decode a GraphQL response body into `T`.
pub(crate) fn decode_response<T: DeserializeOwned>(body: &str) -> Result<T, Cause> {
    let envelope: Envelope = serde_json::from_str(body)?;

    if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return Err(Cause::Graphql(messages.join("; ")));
    }

    match envelope.data {
        None | Some(Value::Null) => Err(Cause::ResultIsEmpty),
        Some(data) => Ok(serde_json::from_value(data)?),
    }
}

/// `{ ok error }` mutation payload.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OkError {
    pub(crate) ok: bool,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

impl OkError {
    pub(crate) fn into_result(self) -> Result<(), Cause> {
        if self.ok {
            Ok(())
        } else {
            Err(Cause::Mutation(self.error.unwrap_or_default()))
        }
    }
}

/// `{ ok error entity }` mutation payload.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EntityPayload<E> {
    pub(crate) ok: bool,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default = "Option::default")]
    pub(crate) entity: Option<E>,
}

impl<E> EntityPayload<E> {
    pub(crate) fn into_entity(self) -> Result<E, Cause> {
        if !self.ok {
            return Err(Cause::Mutation(self.error.unwrap_or_default()));
        }
        self.entity.ok_or(Cause::ResultIsEmpty)
    }
}

/// `{ id }` reference to another object.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct IdRef {
    pub(crate) id: String,
}
