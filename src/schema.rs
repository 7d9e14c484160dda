//! Schema types describing the provider block, resources and data sources.
//!
//! Schemas drive validation, planning and the `GetSchema` response. Maps are
//! ordered so plans and diagnostics come out in a stable order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A boolean value.
    Bool,
    /// An ordered list of values of a single type.
    List(Box<AttributeType>),
    /// An unordered collection of unique values of a single type.
    Set(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
    /// An object with a fixed set of attributes.
    Object(BTreeMap<String, AttributeType>),
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: AttributeType) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }

    /// Create an object type from `(name, type)` pairs.
    pub fn object<'a>(attributes: impl IntoIterator<Item = (&'a str, AttributeType)>) -> Self {
        Self::Object(
            attributes
                .into_iter()
                .map(|(name, ty)| (name.to_string(), ty))
                .collect(),
        )
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Set by the provider.
    pub computed: bool,
    /// Hidden in logs and plan output.
    pub sensitive: bool,
}

impl AttributeFlags {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Optional in configuration; the provider fills it in when unset.
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Changing this attribute replaces the object.
    #[serde(default)]
    pub force_new: bool,
    /// Value used when the attribute is not configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl Attribute {
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            default: None,
        }
    }

    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    pub fn optional_computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional_computed())
    }

    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    pub fn optional_computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional_computed())
    }

    /// An optional set of strings, such as a list of ids.
    pub fn optional_string_set() -> Self {
        Self::new(
            AttributeType::set(AttributeType::String),
            AttributeFlags::optional(),
        )
    }

    /// A computed list of objects, as returned by plural data sources.
    pub fn computed_object_list<'a>(
        attributes: impl IntoIterator<Item = (&'a str, AttributeType)>,
    ) -> Self {
        Self::new(
            AttributeType::list(AttributeType::object(attributes)),
            AttributeFlags::computed(),
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Set only by the provider, never by the user.
    pub fn is_computed_only(&self) -> bool {
        self.flags.computed && !self.flags.required && !self.flags.optional
    }
}

/// How repeated nested blocks are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// At most one block, stored as an object.
    #[default]
    Single,
    /// Zero or more blocks, ordered.
    List,
    /// Zero or more blocks, unordered.
    Set,
    /// Blocks keyed by label.
    Map,
}

/// A group of attributes and nested blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<String, NestedBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A nested block with its nesting mode and item limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    #[serde(flatten)]
    pub block: Block,
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    #[serde(default)]
    pub min_items: u32,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_items: u32,
}

impl NestedBlock {
    pub fn single(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Single,
            min_items: 0,
            max_items: 1,
        }
    }

    /// A list block. Use `with_max_items(1)` for an optional singleton block.
    pub fn list(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::List,
            min_items: 0,
            max_items: 0,
        }
    }

    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }
}

/// Schema for a resource, data source or the provider block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Bumped when stored state needs upgrading.
    #[serde(default)]
    pub version: u64,
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    pub fn v0() -> Self {
        Self::new(0)
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Every schema the provider exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    #[serde(default)]
    pub provider: Schema,
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
    #[serde(default)]
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The operation cannot complete.
    Error,
    /// The operation completed but something needs attention.
    Warning,
}

/// A message reported back to the host alongside a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted path of the offending attribute, e.g. `protocols[0].tcp[0].ports[1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_type_constructors() {
        let set = AttributeType::set(AttributeType::String);
        assert!(matches!(set, AttributeType::Set(_)));

        let object = AttributeType::object([("id", AttributeType::String), ("name", AttributeType::String)]);
        match object {
            AttributeType::Object(fields) => {
                assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["id", "name"]);
            },
            other => panic!("unexpected type {:?}", other),
        }
    }

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.optional);
        assert!(!required.computed);

        let optional_computed = AttributeFlags::optional_computed();
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);

        assert!(AttributeFlags::computed().sensitive().sensitive);
    }

    #[test]
    fn test_computed_only() {
        assert!(Attribute::computed_string().is_computed_only());
        assert!(!Attribute::optional_computed_string().is_computed_only());
        assert!(!Attribute::required_string().is_computed_only());
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("The ID of the Remote Network the Connector is attached to.")
            .with_force_new();

        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required);
        assert!(attr.force_new);
        assert!(attr.description.unwrap().starts_with("The ID"));

        let list = Attribute::computed_object_list([("id", AttributeType::String)]);
        assert!(list.flags.computed);
        assert!(matches!(list.attr_type, AttributeType::List(_)));
    }

    #[test]
    fn test_schema_builder() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("id", Attribute::computed_string())
            .with_block(
                "protocols",
                NestedBlock::list(
                    Block::new().with_attribute("allow_icmp", Attribute::optional_bool()),
                )
                .with_max_items(1),
            );

        assert_eq!(schema.version, 0);
        assert!(schema.block.attributes.contains_key("name"));
        assert_eq!(schema.block.blocks["protocols"].max_items, 1);
        assert_eq!(
            schema.block.blocks["protocols"].nesting_mode,
            BlockNestingMode::List
        );
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("api_token", Attribute::optional_string().sensitive()),
            )
            .with_resource(
                "twingate_group",
                Schema::v0().with_attribute("name", Attribute::required_string()),
            )
            .with_data_source("twingate_users", Schema::v0());

        assert!(provider_schema.provider.block.attributes["api_token"].flags.sensitive);
        assert!(provider_schema.resources.contains_key("twingate_group"));
        assert!(provider_schema.data_sources.contains_key("twingate_users"));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid policy")
            .with_detail("RESTRICTED policy requires specifying ports.")
            .with_attribute("protocols[0].tcp[0].policy");

        assert!(err.is_error());
        assert_eq!(err.attribute.as_deref(), Some("protocols[0].tcp[0].policy"));
        assert!(!Diagnostic::warning("w").is_error());
    }

    #[test]
    fn test_nested_block_modes() {
        let single = NestedBlock::single(Block::new());
        assert_eq!(single.nesting_mode, BlockNestingMode::Single);
        assert_eq!(single.max_items, 1);

        let list = NestedBlock::list(Block::new()).with_min_items(1).with_max_items(5);
        assert_eq!(list.min_items, 1);
        assert_eq!(list.max_items, 5);
    }
}
