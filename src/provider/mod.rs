//! The Twingate provider: schemas, planning and the CRUD handlers behind each
//! resource and data source type.

mod connector;
mod connector_tokens;
mod group;
pub mod plan;
mod remote_network;
mod resource;
mod state;
mod user;

use std::sync::RwLock;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::validation::validate;

pub const REMOTE_NETWORK: &str = "twingate_remote_network";
pub const REMOTE_NETWORKS: &str = "twingate_remote_networks";
pub const CONNECTOR: &str = "twingate_connector";
pub const CONNECTORS: &str = "twingate_connectors";
pub const CONNECTOR_TOKENS: &str = "twingate_connector_tokens";
pub const GROUP: &str = "twingate_group";
pub const GROUPS: &str = "twingate_groups";
pub const RESOURCE: &str = "twingate_resource";
pub const RESOURCES: &str = "twingate_resources";
pub const USER: &str = "twingate_user";
pub const USERS: &str = "twingate_users";

const RESOURCE_TYPES: [&str; 5] = [REMOTE_NETWORK, CONNECTOR, CONNECTOR_TOKENS, GROUP, RESOURCE];
const DATA_SOURCE_TYPES: [&str; 10] = [
    REMOTE_NETWORK,
    REMOTE_NETWORKS,
    CONNECTOR,
    CONNECTORS,
    GROUP,
    GROUPS,
    RESOURCE,
    RESOURCES,
    USER,
    USERS,
];

const CLIENT_ERROR: &str = "Unable to create Twingate client";

/// CRUD for one managed object type.
#[async_trait::async_trait]
trait ResourceHandler: Send + Sync {
    fn schema(&self) -> Schema;

    /// Checks beyond what the schema expresses.
    fn validate(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Adjust or reject a planned state before it is diffed.
    fn check_plan(&self, _prior: Option<&Value>, _planned: &mut Value) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn create(&self, client: &Client, planned: &Value) -> Result<Value, ProviderError>;

    async fn read(&self, client: &Client, state: &Value) -> Result<Value, ProviderError>;

    async fn update(&self, client: &Client, prior: &Value, planned: &Value) -> Result<Value, ProviderError>;

    async fn delete(&self, client: &Client, state: &Value) -> Result<(), ProviderError>;

    async fn import(&self, client: &Client, id: &str) -> Result<Value, ProviderError>;
}

/// A read-only query.
#[async_trait::async_trait]
trait DataSourceHandler: Send + Sync {
    fn schema(&self) -> Schema;

    fn validate(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    async fn read(&self, client: &Client, config: &Value) -> Result<Value, ProviderError>;
}

fn resource_handler(resource_type: &str) -> Result<&'static dyn ResourceHandler, ProviderError> {
    match resource_type {
        REMOTE_NETWORK => Ok(&remote_network::RemoteNetworkResource),
        CONNECTOR => Ok(&connector::ConnectorResource),
        CONNECTOR_TOKENS => Ok(&connector_tokens::ConnectorTokensResource),
        GROUP => Ok(&group::GroupResource),
        RESOURCE => Ok(&resource::ResourceResource),
        other => Err(ProviderError::UnknownResource(other.to_string())),
    }
}

fn data_source_handler(data_source_type: &str) -> Result<&'static dyn DataSourceHandler, ProviderError> {
    match data_source_type {
        REMOTE_NETWORK => Ok(&remote_network::RemoteNetworkDataSource),
        REMOTE_NETWORKS => Ok(&remote_network::RemoteNetworksDataSource),
        CONNECTOR => Ok(&connector::ConnectorDataSource),
        CONNECTORS => Ok(&connector::ConnectorsDataSource),
        GROUP => Ok(&group::GroupDataSource),
        GROUPS => Ok(&group::GroupsDataSource),
        RESOURCE => Ok(&resource::ResourceDataSource),
        RESOURCES => Ok(&resource::ResourcesDataSource),
        USER => Ok(&user::UserDataSource),
        USERS => Ok(&user::UsersDataSource),
        other => Err(ProviderError::UnknownResource(other.to_string())),
    }
}

fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_description("Manage Twingate remote networks, connectors, resources and groups.")
        .with_attribute(
            "api_token",
            Attribute::optional_string()
                .sensitive()
                .with_description("The access key for API operations. Falls back to TWINGATE_API_TOKEN."),
        )
        .with_attribute(
            "network",
            Attribute::optional_string().with_description(
                "Your Twingate network ID, the first label of https://{network}.twingate.com. Falls back to TWINGATE_NETWORK.",
            ),
        )
        .with_attribute(
            "url",
            Attribute::optional_string()
                .with_description("The default is 'twingate.com'. Falls back to TWINGATE_URL."),
        )
        .with_attribute(
            "http_timeout",
            Attribute::optional_int64()
                .with_description("Timeout in seconds for each HTTP request. Falls back to TWINGATE_HTTP_TIMEOUT."),
        )
        .with_attribute(
            "http_max_retry",
            Attribute::optional_int64()
                .with_description("Retry limit for failed HTTP requests. Falls back to TWINGATE_HTTP_MAX_RETRY."),
        )
}

/// Implements [`ProviderService`] against the Twingate API.
pub struct TwingateProvider {
    version: String,
    client: RwLock<Option<Client>>,
}

impl TwingateProvider {
    /// An unconfigured provider. `version` goes into the `User-Agent` header.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            client: RwLock::new(None),
        }
    }

    /// A provider that is already configured with `client`.
    pub fn with_client(client: Client) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            client: RwLock::new(Some(client)),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn client(&self) -> Result<Client, ProviderError> {
        let guard = self.client.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .clone()
            .ok_or_else(|| ProviderError::Configuration("provider is not configured".to_string()))
    }

    fn set_client(&self, client: Client) {
        let mut guard = self.client.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(client);
    }
}

#[async_trait::async_trait]
impl ProviderService for TwingateProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(provider_config_schema());
        for name in RESOURCE_TYPES {
            if let Ok(handler) = resource_handler(name) {
                schema = schema.with_resource(name, handler.schema());
            }
        }
        for name in DATA_SOURCE_TYPES {
            if let Ok(handler) = data_source_handler(name) {
                schema = schema.with_data_source(name, handler.schema());
            }
        }
        schema
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: RESOURCE_TYPES.iter().map(|s| s.to_string()).collect(),
            data_sources: DATA_SOURCE_TYPES.iter().map(|s| s.to_string()).collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&provider_config_schema(), &config);
        for name in ["http_timeout", "http_max_retry"] {
            if config.get(name).and_then(Value::as_i64).is_some_and(|v| v < 0) {
                diagnostics.push(state::invalid_value(name, format!("{} must not be negative", name)));
            }
        }
        Ok(diagnostics)
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let resolved = match ProviderConfig::from_env(&config) {
            Ok(resolved) => resolved,
            Err(e) => return Ok(vec![Diagnostic::error(CLIENT_ERROR).with_detail(e.to_string())]),
        };

        let client = match Client::from_config(&resolved, &self.version) {
            Ok(client) => client,
            Err(e) => return Ok(vec![Diagnostic::error(CLIENT_ERROR).with_detail(e.to_string())]),
        };

        info!(network = %resolved.network, version = %self.version, "Provider configured");
        self.set_client(client);
        Ok(vec![])
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let handler = resource_handler(resource_type)?;
        let mut diagnostics = validate(&handler.schema(), &config);
        diagnostics.extend(handler.validate(&config));
        Ok(diagnostics)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let handler = resource_handler(resource_type)?;

        if proposed_state.is_null() {
            return Ok(prior_state.as_ref().map(plan::destroy).unwrap_or_else(|| PlanResult::no_change(Value::Null)));
        }

        let schema = handler.schema();
        let prior = prior_state.as_ref().filter(|p| !p.is_null());
        let mut planned = plan::fill(&schema, prior, &proposed_state);
        handler.check_plan(prior, &mut planned)?;
        Ok(plan::diff(&schema, prior, planned))
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let handler = resource_handler(resource_type)?;
        handler.create(&self.client()?, &planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let handler = resource_handler(resource_type)?;
        if current_state.is_null() {
            return Ok(Value::Null);
        }

        match handler.read(&self.client()?, &current_state).await {
            Err(e) if e.is_not_found() => {
                warn!(resource_type, error = %e, "Object not found, removing from state");
                Ok(Value::Null)
            },
            other => other,
        }
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let handler = resource_handler(resource_type)?;
        handler.update(&self.client()?, &prior_state, &planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let handler = resource_handler(resource_type)?;
        handler.delete(&self.client()?, &current_state).await
    }

    async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>, ProviderError> {
        let handler = resource_handler(resource_type)?;
        let state = handler.import(&self.client()?, id).await?;
        debug!(resource_type, id, "Imported");
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let handler = data_source_handler(data_source_type)?;
        let mut diagnostics = validate(&handler.schema(), &config);
        diagnostics.extend(handler.validate(&config));
        Ok(diagnostics)
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        let handler = data_source_handler(data_source_type)?;
        handler.read(&self.client()?, &config).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::testing::MockTransport;

    pub(crate) fn provider(mock: &Arc<MockTransport>) -> TwingateProvider {
        TwingateProvider::with_client(Client::new(mock.clone(), "acme", "twingate.com"))
    }

    #[test]
    fn test_every_type_has_a_schema() {
        let schema = TwingateProvider::new("test").schema();
        assert_eq!(schema.resources.len(), RESOURCE_TYPES.len());
        assert_eq!(schema.data_sources.len(), DATA_SOURCE_TYPES.len());
        assert!(schema.provider.block.attributes["api_token"].flags.sensitive);
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let provider = TwingateProvider::new("test");
        let err = tokio_test::assert_err!(provider.create(GROUP, json!({"name": "Engineering"})).await);
        assert!(matches!(err, ProviderError::Configuration(_)));

        let err = provider.read_data_source(USERS, json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_types() {
        let mock = Arc::new(MockTransport::new());
        let provider = provider(&mock);

        let err = provider.read("twingate_widget", json!({"id": "w1"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));

        let err = provider.read_data_source("twingate_widgets", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_validate_provider_config() {
        let provider = TwingateProvider::new("test");
        let diagnostics = provider
            .validate_provider_config(json!({"network": "acme", "http_timeout": -5, "token": "x"}))
            .await
            .unwrap();
        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Unsupported argument", "http_timeout must not be negative"]);
    }

    #[tokio::test]
    async fn test_configure_rejects_negative_timeout() {
        let provider = TwingateProvider::new("test");
        let diagnostics = provider
            .configure(json!({"api_token": "t", "network": "acme", "http_timeout": -1}))
            .await
            .unwrap();
        assert_eq!(diagnostics[0].summary, CLIENT_ERROR);
        assert!(provider.client().is_err());
    }

    #[tokio::test]
    async fn test_configure_builds_client() {
        let provider = TwingateProvider::new("1.2.3");
        let diagnostics = tokio_test::assert_ok!(
            provider
                .configure(json!({"api_token": "t", "network": "acme", "url": "stg.opstg.com"}))
                .await
        );
        assert!(diagnostics.is_empty());
        assert_eq!(provider.client().unwrap().server_url(), "https://acme.stg.opstg.com");
    }

    #[tokio::test]
    async fn test_read_not_found_clears_state() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"group": null}));

        let state = provider(&mock).read(GROUP, json!({"id": "g1", "name": "Eng"})).await.unwrap();
        assert!(state.is_null());
    }

    #[tokio::test]
    async fn test_plan_destroy() {
        let mock = Arc::new(MockTransport::new());
        let plan = provider(&mock)
            .plan(GROUP, Some(json!({"id": "g1", "name": "Eng"})), Value::Null, Value::Null)
            .await
            .unwrap();
        assert!(plan.planned_state.is_null());
        assert_eq!(plan.changes.len(), 2);
        assert_eq!(mock.requests().len(), 0);
    }
}
