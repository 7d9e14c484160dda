use serde::Deserialize;

use super::error::{ApiError, Cause};
use super::gql::{EntityPayload, OkError, Operation, Variables, REMOTE_NETWORK};
use super::pagination::Connection;
use super::Client;
use crate::model::{Location, RemoteNetwork};

const CURSOR: &str = "remoteNetworksEndCursor";

const CREATE: &str = "mutation createRemoteNetwork($name: String!, $isActive: Boolean!, $location: RemoteNetworkLocation) {
  remoteNetworkCreate(name: $name, isActive: $isActive, location: $location) {
    ok
    error
    entity { id name location }
  }
}";

const READ_BY_ID: &str = "query readRemoteNetwork($id: ID!) {
  remoteNetwork(id: $id) { id name location }
}";

const READ_BY_NAME: &str = "query readRemoteNetworkByName($name: String!) {
  remoteNetworks(filter: {name: {eq: $name}}) {
    edges { node { id name location } }
  }
}";

const READ_ALL: &str = "query readRemoteNetworks($remoteNetworksEndCursor: String, $pageLimit: Int) {
  remoteNetworks(after: $remoteNetworksEndCursor, first: $pageLimit) {
    pageInfo { endCursor hasNextPage }
    edges { node { id name location } }
  }
}";

const UPDATE: &str = "mutation updateRemoteNetwork($id: ID!, $name: String, $location: RemoteNetworkLocation) {
  remoteNetworkUpdate(id: $id, name: $name, location: $location) {
    ok
    error
    entity { id name location }
  }
}";

const DELETE: &str = "mutation deleteRemoteNetwork($id: ID!) {
  remoteNetworkDelete(id: $id) { ok error }
}";

#[derive(Debug, Deserialize)]
struct GqlRemoteNetwork {
    id: String,
    name: String,
    #[serde(default)]
    location: Location,
}

impl From<GqlRemoteNetwork> for RemoteNetwork {
    fn from(node: GqlRemoteNetwork) -> Self {
        Self {
            id: node.id,
            name: node.name,
            location: node.location,
        }
    }
}

impl Client {
    /// Create an active remote network.
    pub async fn create_remote_network(
        &self,
        name: &str,
        location: Location,
    ) -> Result<RemoteNetwork, ApiError> {
        let op = Operation::create(REMOTE_NETWORK);
        if name.is_empty() {
            return Err(op.error(Cause::NetworkNameIsEmpty));
        }

        let variables = Variables::new()
            .var("name", name)
            .var("isActive", true)
            .var("location", location);

        let payload: Option<EntityPayload<GqlRemoteNetwork>> = self
            .graphql_field(op, CREATE, "remoteNetworkCreate", variables)
            .await
            .map_err(|e| op.error_with_name(e, name))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(EntityPayload::into_entity)
            .map(RemoteNetwork::from)
            .map_err(|e| op.error_with_name(e, name))
    }

    pub async fn read_remote_network_by_id(&self, id: &str) -> Result<RemoteNetwork, ApiError> {
        let op = Operation::read(REMOTE_NETWORK);
        if id.is_empty() {
            return Err(op.error(Cause::NetworkIdIsEmpty));
        }

        let node: Option<GqlRemoteNetwork> = self
            .graphql_field(op, READ_BY_ID, "remoteNetwork", Variables::new().id(id))
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        node.map(RemoteNetwork::from)
            .ok_or_else(|| op.error_with_id(Cause::ResultIsEmpty, id))
    }

    /// Read the first remote network with exactly this name.
    pub async fn read_remote_network_by_name(&self, name: &str) -> Result<RemoteNetwork, ApiError> {
        let op = Operation::read(REMOTE_NETWORK).named("readRemoteNetworkByName");
        if name.is_empty() {
            return Err(op.error(Cause::NetworkNameIsEmpty));
        }

        let networks: Option<Connection<GqlRemoteNetwork>> = self
            .graphql_field(op, READ_BY_NAME, "remoteNetworks", Variables::new().var("name", name))
            .await
            .map_err(|e| op.error_with_name(e, name))?;

        networks
            .and_then(|conn| conn.into_nodes().into_iter().next())
            .map(RemoteNetwork::from)
            .ok_or_else(|| op.error_with_name(Cause::ResultIsEmpty, name))
    }

    /// Read a remote network by id if one is given, by name otherwise.
    pub async fn read_remote_network(&self, id: &str, name: &str) -> Result<RemoteNetwork, ApiError> {
        match (id.is_empty(), name.is_empty()) {
            (true, true) => Err(Operation::read(REMOTE_NETWORK).error(Cause::EmptyBothNameAndId)),
            (false, _) => self.read_remote_network_by_id(id).await,
            (true, false) => self.read_remote_network_by_name(name).await,
        }
    }

    pub async fn read_remote_networks(&self) -> Result<Vec<RemoteNetwork>, ApiError> {
        let op = Operation::read(REMOTE_NETWORK).named("readRemoteNetworks");

        let nodes: Vec<GqlRemoteNetwork> = self
            .graphql_all(op, READ_ALL, "remoteNetworks", CURSOR, Variables::new())
            .await
            .map_err(|e| op.error_with_id(e, "All"))?;

        Ok(nodes.into_iter().map(RemoteNetwork::from).collect())
    }

    pub async fn update_remote_network(
        &self,
        network: &RemoteNetwork,
    ) -> Result<RemoteNetwork, ApiError> {
        let op = Operation::update(REMOTE_NETWORK);
        if network.id.is_empty() {
            return Err(op.error(Cause::NetworkIdIsEmpty));
        }
        if network.name.is_empty() {
            return Err(op.error_with_id(Cause::NetworkNameIsEmpty, &network.id));
        }

        let variables = Variables::new()
            .id(&network.id)
            .var("name", &network.name)
            .var("location", network.location);

        let payload: Option<EntityPayload<GqlRemoteNetwork>> = self
            .graphql_field(op, UPDATE, "remoteNetworkUpdate", variables)
            .await
            .map_err(|e| op.error_with_id(e, &network.id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(EntityPayload::into_entity)
            .map(RemoteNetwork::from)
            .map_err(|e| op.error_with_id(e, &network.id))
    }

    pub async fn delete_remote_network(&self, id: &str) -> Result<(), ApiError> {
        let op = Operation::delete(REMOTE_NETWORK);
        if id.is_empty() {
            return Err(op.error(Cause::NetworkIdIsEmpty));
        }

        let payload: Option<OkError> = self
            .graphql_field(op, DELETE, "remoteNetworkDelete", Variables::new().id(id))
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(OkError::into_result)
            .map_err(|e| op.error_with_id(e, id))
    }
}
