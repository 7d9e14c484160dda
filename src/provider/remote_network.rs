use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{check_enum, decode, encode, exactly_one_of, id_of};
use super::{DataSourceHandler, ResourceHandler};
use crate::client::Client;
use crate::error::ProviderError;
use crate::model::{Location, RemoteNetwork};
use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};

const ALL_ID: &str = "all-remote-networks";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteNetworkState {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    location: Option<String>,
}

impl RemoteNetworkState {
    fn location(&self) -> Result<Location, ProviderError> {
        match self.location.as_deref() {
            None | Some("") => Ok(Location::default()),
            Some(location) => location
                .parse()
                .map_err(|e: crate::model::UnknownVariant| ProviderError::Validation(e.to_string())),
        }
    }
}

impl From<RemoteNetwork> for RemoteNetworkState {
    fn from(network: RemoteNetwork) -> Self {
        Self {
            id: Some(network.id),
            name: network.name,
            location: Some(network.location.as_str().to_string()),
        }
    }
}

pub(super) struct RemoteNetworkResource;

#[async_trait::async_trait]
impl ResourceHandler for RemoteNetworkResource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Remote Network represents a single private network in Twingate that can have one or more Connectors and Resources assigned to it.")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("The ID of the Remote Network"),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the Remote Network"),
            )
            .with_attribute(
                "location",
                Attribute::optional_string()
                    .with_default(json!(Location::Other.as_str()))
                    .with_description(format!(
                        "The location of the Remote Network. Must be one of the following: {}.",
                        Location::ALL.join(", ")
                    )),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        check_enum(config, "location", |s: &str| s.parse::<Location>())
            .into_iter()
            .collect()
    }

    async fn create(&self, client: &Client, planned: &Value) -> Result<Value, ProviderError> {
        let planned: RemoteNetworkState = decode(planned)?;
        let network = client
            .create_remote_network(&planned.name, planned.location()?)
            .await?;
        tracing::info!(id = %network.id, "Remote network created");
        encode(&RemoteNetworkState::from(network))
    }

    async fn read(&self, client: &Client, state: &Value) -> Result<Value, ProviderError> {
        let network = client.read_remote_network_by_id(id_of(state)?).await?;
        encode(&RemoteNetworkState::from(network))
    }

    async fn update(&self, client: &Client, prior: &Value, planned: &Value) -> Result<Value, ProviderError> {
        let id = id_of(prior)?.to_string();
        let planned: RemoteNetworkState = decode(planned)?;
        let network = client
            .update_remote_network(&RemoteNetwork {
                id,
                location: planned.location()?,
                name: planned.name,
            })
            .await?;
        encode(&RemoteNetworkState::from(network))
    }

    async fn delete(&self, client: &Client, state: &Value) -> Result<(), ProviderError> {
        let id = id_of(state)?;
        client.delete_remote_network(id).await?;
        tracing::info!(id, "Remote network deleted");
        Ok(())
    }

    async fn import(&self, client: &Client, id: &str) -> Result<Value, ProviderError> {
        let network = client.read_remote_network_by_id(id).await?;
        encode(&RemoteNetworkState::from(network))
    }
}

pub(super) struct RemoteNetworkDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for RemoteNetworkDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up a single Remote Network by id or name.")
            .with_attribute(
                "id",
                Attribute::optional_computed_string()
                    .with_description("The ID of the Remote Network. Either id or name must be set."),
            )
            .with_attribute(
                "name",
                Attribute::optional_computed_string()
                    .with_description("The name of the Remote Network. Either id or name must be set."),
            )
            .with_attribute(
                "location",
                Attribute::computed_string().with_description("The location of the Remote Network"),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        exactly_one_of(config, "id", "name").into_iter().collect()
    }

    async fn read(&self, client: &Client, config: &Value) -> Result<Value, ProviderError> {
        let query: RemoteNetworkState = decode(config)?;
        let network = client
            .read_remote_network(query.id.as_deref().unwrap_or_default(), &query.name)
            .await?;
        encode(&RemoteNetworkState::from(network))
    }
}

pub(super) struct RemoteNetworksDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for RemoteNetworksDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Every Remote Network in the Twingate network.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "remote_networks",
                Attribute::computed_object_list([
                    ("id", AttributeType::String),
                    ("name", AttributeType::String),
                    ("location", AttributeType::String),
                ])
                .with_description("List of Remote Networks"),
            )
    }

    async fn read(&self, client: &Client, _config: &Value) -> Result<Value, ProviderError> {
        let networks: Vec<RemoteNetworkState> = client
            .read_remote_networks()
            .await?
            .into_iter()
            .map(RemoteNetworkState::from)
            .collect();
        Ok(json!({"id": ALL_ID, "remote_networks": encode(&networks)?}))
    }
}
