use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{ApiError, Cause};
use super::gql::{EntityPayload, IdRef, OkError, Operation, Variables, RESOURCE};
use super::pagination::Connection;
use super::Client;
use crate::model::{Policy, PortRange, Protocol, Protocols, Resource};

const CURSOR: &str = "resourcesEndCursor";
const GROUPS_CURSOR: &str = "groupsEndCursor";

macro_rules! resource_fields {
    () => {
        "id
    name
    address { value }
    remoteNetwork { id }
    protocols {
      allowIcmp
      tcp { policy ports { start end } }
      udp { policy ports { start end } }
    }
    isActive"
    };
}

macro_rules! groups_connection {
    () => {
        "groups(after: $groupsEndCursor, first: $pageLimit) {
      pageInfo { endCursor hasNextPage }
      edges { node { id } }
    }"
    };
}

const CREATE: &str = concat!(
    "mutation createResource($name: String!, $address: String!, $remoteNetworkId: ID!, $groupIds: [ID], $protocols: ProtocolsInput) {
  resourceCreate(name: $name, address: $address, remoteNetworkId: $remoteNetworkId, groupIds: $groupIds, protocols: $protocols) {
    ok
    error
    entity {
    ",
    resource_fields!(),
    "
    }
  }
}"
);

const READ: &str = concat!(
    "query readResource($id: ID!, $groupsEndCursor: String, $pageLimit: Int) {
  resource(id: $id) {
    ",
    resource_fields!(),
    "
    ",
    groups_connection!(),
    "
  }
}"
);

const READ_GROUPS: &str = concat!(
    "query readResourceGroups($id: ID!, $groupsEndCursor: String, $pageLimit: Int) {
  resource(id: $id) {
    ",
    groups_connection!(),
    "
  }
}"
);

const READ_ALL: &str = concat!(
    "query readResources($resourcesEndCursor: String, $pageLimit: Int) {
  resources(after: $resourcesEndCursor, first: $pageLimit) {
    pageInfo { endCursor hasNextPage }
    edges { node {
    ",
    resource_fields!(),
    "
    } }
  }
}"
);

const READ_BY_NAME: &str = concat!(
    "query readResourcesByName($name: String!, $resourcesEndCursor: String, $pageLimit: Int) {
  resources(filter: {name: {eq: $name}}, after: $resourcesEndCursor, first: $pageLimit) {
    pageInfo { endCursor hasNextPage }
    edges { node {
    ",
    resource_fields!(),
    "
    } }
  }
}"
);

const UPDATE: &str = concat!(
    "mutation updateResource($id: ID!, $name: String, $address: String, $remoteNetworkId: ID, $groupIds: [ID], $protocols: ProtocolsInput) {
  resourceUpdate(id: $id, name: $name, address: $address, remoteNetworkId: $remoteNetworkId, groupIds: $groupIds, protocols: $protocols) {
    ok
    error
    entity {
    ",
    resource_fields!(),
    "
    }
  }
}"
);

const UPDATE_ACTIVE_STATE: &str = "mutation updateResourceActiveState($id: ID!, $isActive: Boolean!) {
  resourceUpdate(id: $id, isActive: $isActive) { ok error }
}";

const DELETE: &str = "mutation deleteResource($id: ID!) {
  resourceDelete(id: $id) { ok error }
}";

#[derive(Debug, Default, Deserialize)]
struct GqlAddress {
    value: String,
}

#[derive(Debug, Deserialize)]
struct GqlProtocol {
    policy: Policy,
    #[serde(default)]
    ports: Option<Vec<PortRange>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlProtocols {
    #[serde(default)]
    allow_icmp: bool,
    #[serde(default)]
    tcp: Option<GqlProtocol>,
    #[serde(default)]
    udp: Option<GqlProtocol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlResource {
    id: String,
    name: String,
    #[serde(default)]
    address: GqlAddress,
    #[serde(default)]
    remote_network: IdRef,
    #[serde(default)]
    protocols: Option<GqlProtocols>,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    groups: Connection<IdRef>,
}

#[derive(Debug, Deserialize)]
struct GqlResourceGroups {
    #[serde(default)]
    groups: Connection<IdRef>,
}

fn protocol_from_api(protocol: Option<GqlProtocol>) -> Protocol {
    match protocol {
        Some(p) => Protocol::from_api(p.policy, p.ports.unwrap_or_default()),
        None => Protocol::default(),
    }
}

fn protocols_from_api(protocols: Option<GqlProtocols>) -> Protocols {
    match protocols {
        Some(p) => Protocols {
            allow_icmp: p.allow_icmp,
            tcp: protocol_from_api(p.tcp),
            udp: protocol_from_api(p.udp),
        },
        None => Protocols::default(),
    }
}

impl GqlResource {
    fn into_model(self, group_ids: Vec<String>) -> Resource {
        Resource {
            id: self.id,
            name: self.name,
            address: self.address.value,
            remote_network_id: self.remote_network.id,
            group_ids,
            protocols: protocols_from_api(self.protocols),
            is_active: self.is_active,
        }
    }
}

fn protocol_input(protocol: &Protocol) -> Value {
    let (policy, ports) = protocol.to_api();
    json!({ "policy": policy, "ports": ports })
}

fn protocols_input(protocols: &Protocols) -> Value {
    json!({
        "allowIcmp": protocols.allow_icmp,
        "tcp": protocol_input(&protocols.tcp),
        "udp": protocol_input(&protocols.udp),
    })
}

fn resource_variables(resource: &Resource) -> Variables {
    Variables::new()
        .var("name", &resource.name)
        .var("address", &resource.address)
        .id_named("remoteNetworkId", &resource.remote_network_id)
        .ids("groupIds", &resource.group_ids)
        .var("protocols", protocols_input(&resource.protocols))
}

impl Client {
    pub async fn create_resource(&self, resource: &Resource) -> Result<Resource, ApiError> {
        let op = Operation::create(RESOURCE);
        if resource.name.is_empty() {
            return Err(op.error(Cause::NameIsEmpty));
        }
        if resource.remote_network_id.is_empty() {
            return Err(op.error_with_name(Cause::NetworkIdIsEmpty, &resource.name));
        }

        let payload: Option<EntityPayload<GqlResource>> = self
            .graphql_field(op, CREATE, "resourceCreate", resource_variables(resource))
            .await
            .map_err(|e| op.error_with_name(e, &resource.name))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(EntityPayload::into_entity)
            .map(|node| node.into_model(resource.group_ids.clone()))
            .map_err(|e| op.error_with_name(e, &resource.name))
    }

    /// Read a resource with every group it grants access to.
    pub async fn read_resource(&self, id: &str) -> Result<Resource, ApiError> {
        let op = Operation::read(RESOURCE);
        if id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let variables = Variables::new()
            .id(id)
            .cursor(GROUPS_CURSOR, None)
            .page_limit(self.page_limit);
        let node: Option<GqlResource> = self
            .graphql_field(op, READ, "resource", variables)
            .await
            .map_err(|e| op.error_with_id(e, id))?;
        let mut node = node.ok_or_else(|| op.error_with_id(Cause::ResultIsEmpty, id))?;

        let groups_op = Operation::read(RESOURCE).named("readResourceGroups");
        let groups = std::mem::take(&mut node.groups)
            .fetch_pages(|cursor| {
                let variables = Variables::new()
                    .id(id)
                    .cursor(GROUPS_CURSOR, Some(&cursor))
                    .page_limit(self.page_limit);
                async move {
                    self.graphql_field::<GqlResourceGroups>(
                        groups_op,
                        READ_GROUPS,
                        "resource",
                        variables,
                    )
                    .await?
                    .map(|resource| resource.groups)
                    .ok_or(Cause::ResultIsEmpty)
                }
            })
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        let group_ids = groups.into_nodes().into_iter().map(|g| g.id).collect();
        Ok(node.into_model(group_ids))
    }

    /// List all resources. Group access is not included.
    pub async fn read_resources(&self) -> Result<Vec<Resource>, ApiError> {
        let op = Operation::read(RESOURCE).named("readResources");

        let nodes: Vec<GqlResource> = self
            .graphql_all(op, READ_ALL, "resources", CURSOR, Variables::new())
            .await
            .map_err(|e| op.error_with_id(e, "All"))?;

        Ok(nodes.into_iter().map(|n| n.into_model(Vec::new())).collect())
    }

    /// List resources with exactly this name. Group access is not included.
    pub async fn read_resources_by_name(&self, name: &str) -> Result<Vec<Resource>, ApiError> {
        let op = Operation::read(RESOURCE).named("readResourcesByName");
        if name.is_empty() {
            return Err(op.error(Cause::NameIsEmpty));
        }

        let nodes: Vec<GqlResource> = self
            .graphql_all(
                op,
                READ_BY_NAME,
                "resources",
                CURSOR,
                Variables::new().var("name", name),
            )
            .await
            .map_err(|e| op.error_with_name(e, name))?;

        Ok(nodes.into_iter().map(|n| n.into_model(Vec::new())).collect())
    }

    pub async fn update_resource(&self, resource: &Resource) -> Result<Resource, ApiError> {
        let op = Operation::update(RESOURCE);
        if resource.id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let variables = resource_variables(resource).id(&resource.id);
        let payload: Option<EntityPayload<GqlResource>> = self
            .graphql_field(op, UPDATE, "resourceUpdate", variables)
            .await
            .map_err(|e| op.error_with_id(e, &resource.id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(EntityPayload::into_entity)
            .map(|node| node.into_model(resource.group_ids.clone()))
            .map_err(|e| op.error_with_id(e, &resource.id))
    }

    /// Activate or deactivate a resource.
    pub async fn update_resource_active_state(
        &self,
        id: &str,
        is_active: bool,
    ) -> Result<(), ApiError> {
        let op = Operation::update(RESOURCE).named("updateResourceActiveState");
        if id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let variables = Variables::new().id(id).var("isActive", is_active);
        let payload: Option<OkError> = self
            .graphql_field(op, UPDATE_ACTIVE_STATE, "resourceUpdate", variables)
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(OkError::into_result)
            .map_err(|e| op.error_with_id(e, id))
    }

    pub async fn delete_resource(&self, id: &str) -> Result<(), ApiError> {
        let op = Operation::delete(RESOURCE);
        if id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let payload: Option<OkError> = self
            .graphql_field(op, DELETE, "resourceDelete", Variables::new().id(id))
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(OkError::into_result)
            .map_err(|e| op.error_with_id(e, id))
    }
}
