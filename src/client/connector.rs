use serde::Deserialize;

use super::error::{ApiError, Cause};
use super::gql::{EntityPayload, IdRef, OkError, Operation, Variables, CONNECTOR};
use super::Client;
use crate::model::Connector;

const CURSOR: &str = "connectorsEndCursor";

macro_rules! connector_fields {
    () => {
        "id name remoteNetwork { id } hasStatusNotificationsEnabled"
    };
}

const CREATE: &str = concat!(
    "mutation createConnector($remoteNetworkId: ID!, $connectorName: String, $hasStatusNotificationsEnabled: Boolean) {
  connectorCreate(remoteNetworkId: $remoteNetworkId, name: $connectorName, hasStatusNotificationsEnabled: $hasStatusNotificationsEnabled) {
    ok
    error
    entity { ",
    connector_fields!(),
    " }
  }
}"
);

const READ: &str = concat!(
    "query readConnector($id: ID!) {
  connector(id: $id) { ",
    connector_fields!(),
    " }
}"
);

const READ_ALL: &str = concat!(
    "query readConnectors($connectorsEndCursor: String, $pageLimit: Int) {
  connectors(after: $connectorsEndCursor, first: $pageLimit) {
    pageInfo { endCursor hasNextPage }
    edges { node { ",
    connector_fields!(),
    " } }
  }
}"
);

const UPDATE: &str = concat!(
    "mutation updateConnector($id: ID!, $name: String, $hasStatusNotificationsEnabled: Boolean) {
  connectorUpdate(id: $id, name: $name, hasStatusNotificationsEnabled: $hasStatusNotificationsEnabled) {
    ok
    error
    entity { ",
    connector_fields!(),
    " }
  }
}"
);

const DELETE: &str = "mutation deleteConnector($id: ID!) {
  connectorDelete(id: $id) { ok error }
}";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlConnector {
    id: String,
    name: String,
    #[serde(default)]
    remote_network: IdRef,
    #[serde(default)]
    has_status_notifications_enabled: Option<bool>,
}

impl From<GqlConnector> for Connector {
    fn from(node: GqlConnector) -> Self {
        Self {
            id: node.id,
            name: node.name,
            remote_network_id: node.remote_network.id,
            status_updates_enabled: node.has_status_notifications_enabled,
        }
    }
}

impl Client {
    /// Create a connector in a remote network.
    ///
    /// An empty `name` lets the API pick one.
    pub async fn create_connector(
        &self,
        remote_network_id: &str,
        name: &str,
        status_updates_enabled: Option<bool>,
    ) -> Result<Connector, ApiError> {
        let op = Operation::create(CONNECTOR);
        if remote_network_id.is_empty() {
            return Err(op.error(Cause::NetworkIdIsEmpty));
        }

        let variables = Variables::new()
            .id_named("remoteNetworkId", remote_network_id)
            .nullable("connectorName", name)
            .var("hasStatusNotificationsEnabled", status_updates_enabled);

        let payload: Option<EntityPayload<GqlConnector>> = self
            .graphql_field(op, CREATE, "connectorCreate", variables)
            .await
            .map_err(|e| op.error(e))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(EntityPayload::into_entity)
            .map(Connector::from)
            .map_err(|e| op.error_with_name(e, name))
    }

    pub async fn read_connector(&self, id: &str) -> Result<Connector, ApiError> {
        let op = Operation::read(CONNECTOR);
        if id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let node: Option<GqlConnector> = self
            .graphql_field(op, READ, "connector", Variables::new().id(id))
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        node.map(Connector::from)
            .ok_or_else(|| op.error_with_id(Cause::ResultIsEmpty, id))
    }

    pub async fn read_connectors(&self) -> Result<Vec<Connector>, ApiError> {
        let op = Operation::read(CONNECTOR).named("readConnectors");

        let nodes: Vec<GqlConnector> = self
            .graphql_all(op, READ_ALL, "connectors", CURSOR, Variables::new())
            .await
            .map_err(|e| op.error_with_id(e, "All"))?;

        Ok(nodes.into_iter().map(Connector::from).collect())
    }

    /// Rename a connector or toggle its status notifications.
    pub async fn update_connector(&self, connector: &Connector) -> Result<Connector, ApiError> {
        let op = Operation::update(CONNECTOR);
        if connector.id.is_empty() {
            return Err(op.error(Cause::ConnectorIdIsEmpty));
        }

        let variables = Variables::new()
            .id(&connector.id)
            .nullable("name", &connector.name)
            .var("hasStatusNotificationsEnabled", connector.status_updates_enabled);

        let payload: Option<EntityPayload<GqlConnector>> = self
            .graphql_field(op, UPDATE, "connectorUpdate", variables)
            .await
            .map_err(|e| op.error_with_id(e, &connector.id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(EntityPayload::into_entity)
            .map(Connector::from)
            .map_err(|e| op.error_with_id(e, &connector.id))
    }

    pub async fn delete_connector(&self, id: &str) -> Result<(), ApiError> {
        let op = Operation::delete(CONNECTOR);
        if id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let payload: Option<OkError> = self
            .graphql_field(op, DELETE, "connectorDelete", Variables::new().id(id))
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(OkError::into_result)
            .map_err(|e| op.error_with_id(e, id))
    }
}
