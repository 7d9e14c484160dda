//! `twingate_resource` and the resource data sources.
//!
//! Protocols are stored the way the user wrote them. Port lists such as
//! `["80", "81-90"]` and `["80-90"]` cover the same ports, so whenever the API
//! reports rules equivalent to what is already in state, the state keeps its
//! own spelling instead of the API's.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::state::{decode, encode, id_of, invalid_value, optional_set};
use super::{DataSourceHandler, ResourceHandler};
use crate::client::Client;
use crate::error::ProviderError;
use crate::model::{ports_equivalent, Policy, Protocol, Protocols, Resource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, Diagnostic, NestedBlock, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProtocolState {
    #[serde(default)]
    policy: String,
    #[serde(default)]
    ports: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProtocolsState {
    #[serde(default)]
    allow_icmp: Option<bool>,
    #[serde(default)]
    tcp: Option<Vec<ProtocolState>>,
    #[serde(default)]
    udp: Option<Vec<ProtocolState>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResourceState {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    remote_network_id: String,
    #[serde(default)]
    group_ids: Option<Vec<String>>,
    #[serde(default)]
    protocols: Option<Vec<ProtocolsState>>,
}

impl ResourceState {
    /// State for `resource`, keeping `prior`'s representation of anything unchanged.
    fn from_resource(resource: Resource, prior: &ResourceState) -> Self {
        Self {
            protocols: reconcile_protocols(&resource.protocols, prior.protocols.as_deref()),
            group_ids: optional_set(prior.group_ids.is_some(), resource.group_ids),
            id: Some(resource.id),
            name: resource.name,
            address: resource.address,
            remote_network_id: resource.remote_network_id,
        }
    }

    fn to_resource(&self, id: String) -> Result<Resource, ProviderError> {
        Ok(Resource {
            id,
            name: self.name.clone(),
            address: self.address.clone(),
            remote_network_id: self.remote_network_id.clone(),
            group_ids: self.group_ids.clone().unwrap_or_default(),
            protocols: parse_protocols(self.protocols.as_deref())?,
            is_active: true,
        })
    }
}

fn parse_protocol(protocol: Option<&[ProtocolState]>) -> Result<Protocol, ProviderError> {
    let Some(state) = protocol.and_then(<[_]>::first) else {
        return Ok(Protocol::default());
    };

    let policy: Policy = state
        .policy
        .parse()
        .map_err(|e: crate::model::UnknownVariant| ProviderError::Validation(e.to_string()))?;
    let protocol = Protocol::parse(policy, state.ports.as_deref().unwrap_or_default())
        .map_err(|e| ProviderError::Validation(e.to_string()))?;
    protocol
        .validate()
        .map_err(|e| ProviderError::Validation(e.to_string()))?;
    Ok(protocol)
}

/// A missing block means the defaults: ICMP on, everything else open.
fn parse_protocols(protocols: Option<&[ProtocolsState]>) -> Result<Protocols, ProviderError> {
    let Some(state) = protocols.and_then(<[_]>::first) else {
        return Ok(Protocols::default());
    };

    Ok(Protocols {
        allow_icmp: state.allow_icmp.unwrap_or(true),
        tcp: parse_protocol(state.tcp.as_deref())?,
        udp: parse_protocol(state.udp.as_deref())?,
    })
}

fn protocol_equivalent(a: &Protocol, b: &Protocol) -> bool {
    a.policy == b.policy && ports_equivalent(&a.ports, &b.ports)
}

fn protocols_equivalent(a: &Protocols, b: &Protocols) -> bool {
    a.allow_icmp == b.allow_icmp && protocol_equivalent(&a.tcp, &b.tcp) && protocol_equivalent(&a.udp, &b.udp)
}

fn protocol_state(protocol: &Protocol) -> Vec<ProtocolState> {
    vec![ProtocolState {
        policy: protocol.policy.as_str().to_string(),
        ports: Some(protocol.port_strings()),
    }]
}

fn protocols_state(protocols: &Protocols) -> Vec<ProtocolsState> {
    vec![ProtocolsState {
        allow_icmp: Some(protocols.allow_icmp),
        tcp: Some(protocol_state(&protocols.tcp)),
        udp: Some(protocol_state(&protocols.udp)),
    }]
}

/// `prior` when it describes the same rules as `actual`, otherwise `actual`.
fn reconcile_protocols(actual: &Protocols, prior: Option<&[ProtocolsState]>) -> Option<Vec<ProtocolsState>> {
    match parse_protocols(prior) {
        Ok(parsed) if protocols_equivalent(actual, &parsed) => prior.map(<[_]>::to_vec),
        _ => Some(protocols_state(actual)),
    }
}

fn protocol_block() -> NestedBlock {
    NestedBlock::list(
        Block::new()
            .with_attribute(
                "policy",
                Attribute::required_string().with_description(format!(
                    "Whether to allow or deny all ports, or restrict protocol access within certain port ranges: Can be {}",
                    Policy::ALL.join(", ")
                )),
            )
            .with_attribute(
                "ports",
                Attribute::new(AttributeType::list(AttributeType::String), AttributeFlags::optional())
                    .with_description("List of port ranges between 1 and 65535 inclusive, in the format `100-200` for a range, or `8080` for a single port"),
            ),
    )
    .with_max_items(1)
}

fn protocol_type() -> AttributeType {
    AttributeType::list(AttributeType::object([
        ("policy", AttributeType::String),
        ("ports", AttributeType::list(AttributeType::String)),
    ]))
}

fn protocols_type() -> AttributeType {
    AttributeType::list(AttributeType::object([
        ("allow_icmp", AttributeType::Bool),
        ("tcp", protocol_type()),
        ("udp", protocol_type()),
    ]))
}

/// Policy and port diagnostics for one `tcp`/`udp` block.
fn validate_protocol(config: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let Some(policy) = config.get("policy").and_then(Value::as_str) else {
        return;
    };
    let policy = match policy.parse::<Policy>() {
        Ok(policy) => policy,
        Err(e) => {
            diagnostics.push(invalid_value(&format!("{}.policy", path), e.to_string()));
            return;
        },
    };

    let ports: Vec<&str> = config
        .get("ports")
        .and_then(Value::as_array)
        .map(|ports| ports.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    match Protocol::parse(policy, &ports) {
        Ok(protocol) => {
            if let Err(e) = protocol.validate() {
                diagnostics.push(invalid_value(path, e.to_string()));
            }
        },
        Err(e) => diagnostics.push(invalid_value(&format!("{}.ports", path), e.to_string())),
    }
}

pub(super) struct ResourceResource;

#[async_trait::async_trait]
impl ResourceHandler for ResourceResource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Resources in Twingate represent any network destination address that you wish to provide private access to for users authorized via the Twingate Client application.")
            .with_attribute("id", Attribute::computed_string().with_description("The ID of the Resource"))
            .with_attribute("name", Attribute::required_string().with_description("The name of the Resource"))
            .with_attribute(
                "address",
                Attribute::required_string().with_description("The Resource's IP/CIDR or FQDN/DNS zone"),
            )
            .with_attribute(
                "remote_network_id",
                Attribute::required_string().with_description("Remote Network ID where the Resource lives"),
            )
            .with_attribute(
                "group_ids",
                Attribute::optional_string_set().with_description("List of Group IDs that have permission to access the Resource."),
            )
            .with_block(
                "protocols",
                NestedBlock::list(
                    Block::new()
                        .with_description("Restrict access to certain protocols and ports. By default or when this argument is not defined, there is no restriction, and all protocols and ports are allowed.")
                        .with_attribute(
                            "allow_icmp",
                            Attribute::optional_bool()
                                .with_default(json!(true))
                                .with_description("Whether to allow ICMP (ping) traffic"),
                        )
                        .with_block("tcp", protocol_block())
                        .with_block("udp", protocol_block()),
                )
                .with_max_items(1),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let blocks = config.get("protocols").and_then(Value::as_array).into_iter().flatten();
        for (i, protocols) in blocks.enumerate() {
            for name in ["tcp", "udp"] {
                let items = protocols.get(name).and_then(Value::as_array).into_iter().flatten();
                for (j, item) in items.enumerate() {
                    validate_protocol(item, &format!("protocols[{}].{}[{}]", i, name, j), &mut diagnostics);
                }
            }
        }
        diagnostics
    }

    fn check_plan(&self, prior: Option<&Value>, planned: &mut Value) -> Result<(), ProviderError> {
        let proposed: ResourceState = decode(planned)?;
        let rules = parse_protocols(proposed.protocols.as_deref())?;

        let Some(prior) = prior else {
            return Ok(());
        };
        let prior: ResourceState = decode(prior)?;
        if let Ok(prior_rules) = parse_protocols(prior.protocols.as_deref()) {
            if protocols_equivalent(&rules, &prior_rules) {
                planned["protocols"] = encode(&prior.protocols)?;
            }
        }
        Ok(())
    }

    async fn create(&self, client: &Client, planned: &Value) -> Result<Value, ProviderError> {
        let planned: ResourceState = decode(planned)?;
        let resource = client.create_resource(&planned.to_resource(String::new())?).await?;
        info!(id = %resource.id, name = %resource.name, "Resource created");
        encode(&ResourceState::from_resource(resource, &planned))
    }

    /// A resource found deactivated is switched back on.
    async fn read(&self, client: &Client, state: &Value) -> Result<Value, ProviderError> {
        let current: ResourceState = decode(state)?;
        let id = id_of(state)?;
        let resource = client.read_resource(id).await?;

        if !resource.is_active {
            client.update_resource_active_state(id, true).await?;
            info!(id, "Resource was inactive, re-activated");
        }

        encode(&ResourceState::from_resource(resource, &current))
    }

    async fn update(&self, client: &Client, prior: &Value, planned: &Value) -> Result<Value, ProviderError> {
        let id = id_of(prior)?.to_string();
        let planned: ResourceState = decode(planned)?;
        let resource = client.update_resource(&planned.to_resource(id)?).await?;
        encode(&ResourceState::from_resource(resource, &planned))
    }

    async fn delete(&self, client: &Client, state: &Value) -> Result<(), ProviderError> {
        let id = id_of(state)?;
        client.delete_resource(id).await?;
        info!(id, "Resource deleted");
        Ok(())
    }

    async fn import(&self, client: &Client, id: &str) -> Result<Value, ProviderError> {
        let resource = client.read_resource(id).await?;
        encode(&ResourceState::from_resource(resource, &ResourceState::default()))
    }
}

/// A resource as data sources report it.
#[derive(Debug, Serialize)]
struct ResourceSummary {
    id: String,
    name: String,
    address: String,
    remote_network_id: String,
    protocols: Vec<ProtocolsState>,
}

impl From<Resource> for ResourceSummary {
    fn from(resource: Resource) -> Self {
        Self {
            protocols: protocols_state(&resource.protocols),
            id: resource.id,
            name: resource.name,
            address: resource.address,
            remote_network_id: resource.remote_network_id,
        }
    }
}

pub(super) struct ResourceDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for ResourceDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up a single Resource by id.")
            .with_attribute("id", Attribute::required_string().with_description("The ID of the Resource"))
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("address", Attribute::computed_string())
            .with_attribute("remote_network_id", Attribute::computed_string())
            .with_attribute(
                "protocols",
                Attribute::new(protocols_type(), AttributeFlags::computed())
                    .with_description("Protocols and ports the Resource allows"),
            )
    }

    async fn read(&self, client: &Client, config: &Value) -> Result<Value, ProviderError> {
        let resource = client.read_resource(id_of(config)?).await?;
        encode(&ResourceSummary::from(resource))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResourcesQuery {
    #[serde(default)]
    name: String,
}

pub(super) struct ResourcesDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for ResourcesDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Resources with exactly the given name.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string().with_description("The name of the Resource"))
            .with_attribute(
                "resources",
                Attribute::computed_object_list([
                    ("id", AttributeType::String),
                    ("name", AttributeType::String),
                    ("address", AttributeType::String),
                    ("remote_network_id", AttributeType::String),
                    ("protocols", protocols_type()),
                ])
                .with_description("List of Resources"),
            )
    }

    async fn read(&self, client: &Client, config: &Value) -> Result<Value, ProviderError> {
        let query: ResourcesQuery = decode(config)?;
        let resources: Vec<ResourceSummary> = client
            .read_resources_by_name(&query.name)
            .await?
            .into_iter()
            .map(ResourceSummary::from)
            .collect();

        Ok(json!({
            "id": format!("query resources by name: {}", query.name),
            "name": query.name,
            "resources": encode(&resources)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::provider;
    use super::super::{RESOURCE, RESOURCES};
    use super::*;
    use crate::server::ProviderService;
    use crate::testing::{assert_error_contains, assert_plan_changes_attribute, assert_plan_no_changes, MockTransport};

    fn api_node(active: bool) -> Value {
        json!({
            "id": "r1",
            "name": "db",
            "address": {"value": "10.0.0.5"},
            "remoteNetwork": {"id": "n1"},
            "protocols": {
                "allowIcmp": true,
                "tcp": {"policy": "RESTRICTED", "ports": [{"start": 80, "end": 82}]},
                "udp": {"policy": "RESTRICTED", "ports": []}
            },
            "isActive": active,
            "groups": {"pageInfo": {"hasNextPage": false}, "edges": [{"node": {"id": "g1"}}]}
        })
    }

    fn state(tcp_ports: Value) -> Value {
        json!({
            "id": "r1",
            "name": "db",
            "address": "10.0.0.5",
            "remote_network_id": "n1",
            "group_ids": ["g1"],
            "protocols": [{
                "allow_icmp": true,
                "tcp": [{"policy": "RESTRICTED", "ports": tcp_ports}],
                "udp": [{"policy": "DENY_ALL", "ports": []}]
            }]
        })
    }

    fn config(protocols: Value) -> Value {
        json!({
            "name": "db",
            "address": "10.0.0.5",
            "remote_network_id": "n1",
            "group_ids": ["g1"],
            "protocols": protocols
        })
    }

    #[tokio::test]
    async fn test_validate_policy_rules() {
        let mock = Arc::new(MockTransport::new());
        let diagnostics = provider(&mock)
            .validate_resource_config(
                RESOURCE,
                config(json!([{"tcp": [{"policy": "RESTRICTED"}], "udp": [{"policy": "ALLOW_ALL", "ports": ["53"]}]}])),
            )
            .await
            .unwrap();

        assert_error_contains(&diagnostics, "RESTRICTED policy requires specifying ports.");
        assert_error_contains(&diagnostics, "ALLOW_ALL policy does not allow specifying ports.");
        let paths: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.as_deref()).collect();
        assert!(paths.contains(&"protocols[0].tcp[0]"));
        assert!(paths.contains(&"protocols[0].udp[0]"));
    }

    #[tokio::test]
    async fn test_validate_bad_port() {
        let mock = Arc::new(MockTransport::new());
        let diagnostics = provider(&mock)
            .validate_resource_config(RESOURCE, config(json!([{"tcp": [{"policy": "RESTRICTED", "ports": ["70000"]}]}])))
            .await
            .unwrap();
        assert_error_contains(&diagnostics, "port 70000 not in the range of 0-65535");
    }

    #[tokio::test]
    async fn test_plan_rejects_bad_port() {
        let mock = Arc::new(MockTransport::new());
        let err = provider(&mock)
            .plan(
                RESOURCE,
                None,
                config(json!([{"tcp": [{"policy": "RESTRICTED", "ports": ["90-80"]}]}])),
                Value::Null,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rising sequence"));
    }

    #[tokio::test]
    async fn test_plan_keeps_equivalent_ports() {
        let mock = Arc::new(MockTransport::new());
        let prior = state(json!(["80-82"]));
        let proposed = config(json!([{
            "allow_icmp": true,
            "tcp": [{"policy": "RESTRICTED", "ports": ["80", "81", "82"]}],
            "udp": [{"policy": "DENY_ALL"}]
        }]));

        let plan = provider(&mock).plan(RESOURCE, Some(prior.clone()), proposed, Value::Null).await.unwrap();
        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state["protocols"], prior["protocols"]);
    }

    #[tokio::test]
    async fn test_plan_port_change() {
        let mock = Arc::new(MockTransport::new());
        let proposed = config(json!([{
            "tcp": [{"policy": "RESTRICTED", "ports": ["443"]}],
            "udp": [{"policy": "DENY_ALL"}]
        }]));

        let plan = provider(&mock)
            .plan(RESOURCE, Some(state(json!(["80-82"]))), proposed, Value::Null)
            .await
            .unwrap();
        assert_plan_changes_attribute(&plan, "protocols");
    }

    #[tokio::test]
    async fn test_plan_removed_block_matches_defaults() {
        let mock = Arc::new(MockTransport::new());
        let mut prior = state(json!([]));
        prior["protocols"] = json!([{
            "allow_icmp": true,
            "tcp": [{"policy": "ALLOW_ALL", "ports": []}],
            "udp": [{"policy": "ALLOW_ALL", "ports": []}]
        }]);
        let mut proposed = config(Value::Null);
        proposed.as_object_mut().unwrap().remove("protocols");

        let plan = provider(&mock).plan(RESOURCE, Some(prior), proposed, Value::Null).await.unwrap();
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_create_sends_deny_all_as_restricted() {
        let mock = Arc::new(MockTransport::new());
        let mut entity = api_node(true);
        entity.as_object_mut().unwrap().remove("groups");
        mock.respond_data(json!({"resourceCreate": {"ok": true, "error": null, "entity": entity}}));

        let mut planned = state(json!(["80-82"]));
        planned["id"] = Value::Null;
        let created = provider(&mock).create(RESOURCE, planned.clone()).await.unwrap();

        let variables = &mock.requests()[0].body["variables"];
        assert_eq!(variables["protocols"]["udp"], json!({"policy": "RESTRICTED", "ports": []}));
        assert_eq!(variables["groupIds"], json!(["g1"]));
        assert_eq!(created["id"], "r1");
        assert_eq!(created["protocols"], planned["protocols"]);
    }

    #[tokio::test]
    async fn test_read_reactivates_inactive_resource() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"resource": api_node(false)}));
        mock.respond_data(json!({"resourceUpdate": {"ok": true, "error": null}}));

        let current = state(json!(["80", "81-82"]));
        let read = provider(&mock).read(RESOURCE, current.clone()).await.unwrap();

        assert_eq!(read, current);
        assert_eq!(mock.operation_names(), vec!["readResource", "updateResourceActiveState"]);
    }

    #[tokio::test]
    async fn test_import_writes_protocols() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"resource": api_node(true)}));

        let imported = provider(&mock).import_resource(RESOURCE, "r1").await.unwrap();
        let state = &imported[0].state;
        assert_eq!(state["group_ids"], json!(["g1"]));
        assert_eq!(state["protocols"][0]["tcp"][0], json!({"policy": "RESTRICTED", "ports": ["80-82"]}));
        assert_eq!(state["protocols"][0]["udp"][0], json!({"policy": "DENY_ALL", "ports": []}));
    }

    #[tokio::test]
    async fn test_resources_data_source() {
        let mock = Arc::new(MockTransport::new());
        let mut node = api_node(true);
        node.as_object_mut().unwrap().remove("groups");
        mock.respond_data(json!({"resources": {"pageInfo": {"hasNextPage": false}, "edges": [{"node": node}]}}));

        let state = provider(&mock).read_data_source(RESOURCES, json!({"name": "db"})).await.unwrap();
        assert_eq!(state["id"], "query resources by name: db");
        assert_eq!(state["resources"][0]["address"], "10.0.0.5");
        assert_eq!(state["resources"][0]["protocols"][0]["allow_icmp"], true);
    }
}
