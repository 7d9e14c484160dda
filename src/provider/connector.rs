use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::state::{decode, encode, id_of};
use super::{DataSourceHandler, ResourceHandler};
use crate::client::Client;
use crate::error::ProviderError;
use crate::model::Connector;
use crate::schema::{Attribute, AttributeType, Schema};

const ALL_ID: &str = "all-connectors";

const MOVE_ERROR: &str = "connectors cannot be moved between Remote Networks: you must either create a new Connector or destroy and recreate the existing one";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct ConnectorState {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    remote_network_id: String,
    #[serde(default)]
    status_updates_enabled: Option<bool>,
}

impl From<Connector> for ConnectorState {
    fn from(connector: Connector) -> Self {
        Self {
            id: Some(connector.id),
            name: Some(connector.name),
            remote_network_id: connector.remote_network_id,
            status_updates_enabled: connector.status_updates_enabled,
        }
    }
}

impl ConnectorState {
    /// Fill in a flag the API did not report from what was planned.
    fn with_planned_flag(mut self, planned: Option<bool>) -> Self {
        self.status_updates_enabled = self.status_updates_enabled.or(planned);
        self
    }
}

pub(super) struct ConnectorResource;

#[async_trait::async_trait]
impl ResourceHandler for ConnectorResource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Connectors provide connectivity to Remote Networks.")
            .with_attribute("id", Attribute::computed_string().with_description("The ID of the Connector"))
            .with_attribute(
                "remote_network_id",
                Attribute::required_string().with_description("The ID of the Remote Network the Connector is attached to"),
            )
            .with_attribute(
                "name",
                Attribute::optional_computed_string()
                    .with_description("Name of the Connector, if not provided one will be generated"),
            )
            .with_attribute(
                "status_updates_enabled",
                Attribute::optional_computed_bool()
                    .with_description("Determines whether status notifications are enabled for the Connector"),
            )
    }

    fn check_plan(&self, prior: Option<&Value>, planned: &mut Value) -> Result<(), ProviderError> {
        let Some(prior) = prior else {
            return Ok(());
        };

        let before = prior.get("remote_network_id").and_then(Value::as_str);
        let after = planned.get("remote_network_id").and_then(Value::as_str);
        if before.is_some() && before != after {
            return Err(ProviderError::Validation(MOVE_ERROR.to_string()));
        }
        Ok(())
    }

    async fn create(&self, client: &Client, planned: &Value) -> Result<Value, ProviderError> {
        let planned: ConnectorState = decode(planned)?;
        let connector = client
            .create_connector(
                &planned.remote_network_id,
                planned.name.as_deref().unwrap_or_default(),
                planned.status_updates_enabled,
            )
            .await?;
        info!(id = %connector.id, name = %connector.name, "Connector created");
        encode(&ConnectorState::from(connector).with_planned_flag(planned.status_updates_enabled))
    }

    async fn read(&self, client: &Client, state: &Value) -> Result<Value, ProviderError> {
        let prior: ConnectorState = decode(state)?;
        let connector = client.read_connector(id_of(state)?).await?;
        encode(&ConnectorState::from(connector).with_planned_flag(prior.status_updates_enabled))
    }

    async fn update(&self, client: &Client, prior: &Value, planned: &Value) -> Result<Value, ProviderError> {
        let id = id_of(prior)?.to_string();
        let prior: ConnectorState = decode(prior)?;
        let planned: ConnectorState = decode(planned)?;

        let name_changed = planned.name.is_some() && planned.name != prior.name;
        let flag_changed =
            planned.status_updates_enabled.is_some() && planned.status_updates_enabled != prior.status_updates_enabled;
        if !name_changed && !flag_changed {
            debug!(id = %id, "Connector unchanged, skipping update");
            return encode(&ConnectorState {
                id: Some(id),
                ..planned
            });
        }

        let connector = client
            .update_connector(&Connector {
                id,
                name: planned.name.clone().unwrap_or_default(),
                remote_network_id: planned.remote_network_id.clone(),
                status_updates_enabled: planned.status_updates_enabled,
            })
            .await?;
        encode(&ConnectorState::from(connector).with_planned_flag(planned.status_updates_enabled))
    }

    async fn delete(&self, client: &Client, state: &Value) -> Result<(), ProviderError> {
        let id = id_of(state)?;
        client.delete_connector(id).await?;
        info!(id, "Connector deleted");
        Ok(())
    }

    async fn import(&self, client: &Client, id: &str) -> Result<Value, ProviderError> {
        let connector = client.read_connector(id).await?;
        encode(&ConnectorState::from(connector))
    }
}

pub(super) struct ConnectorDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for ConnectorDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up a single Connector by id.")
            .with_attribute("id", Attribute::required_string().with_description("The ID of the Connector"))
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("remote_network_id", Attribute::computed_string())
            .with_attribute("status_updates_enabled", Attribute::computed_bool())
    }

    async fn read(&self, client: &Client, config: &Value) -> Result<Value, ProviderError> {
        let connector = client.read_connector(id_of(config)?).await?;
        encode(&ConnectorState::from(connector))
    }
}

pub(super) struct ConnectorsDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for ConnectorsDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Every Connector in the Twingate network.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "connectors",
                Attribute::computed_object_list([
                    ("id", AttributeType::String),
                    ("name", AttributeType::String),
                    ("remote_network_id", AttributeType::String),
                    ("status_updates_enabled", AttributeType::Bool),
                ])
                .with_description("List of Connectors"),
            )
    }

    async fn read(&self, client: &Client, _config: &Value) -> Result<Value, ProviderError> {
        let connectors: Vec<ConnectorState> = client
            .read_connectors()
            .await?
            .into_iter()
            .map(ConnectorState::from)
            .collect();
        Ok(json!({"id": ALL_ID, "connectors": encode(&connectors)?}))
    }
}
