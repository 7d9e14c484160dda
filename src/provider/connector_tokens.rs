use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::state::{decode, encode};
use super::ResourceHandler;
use crate::client::Client;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};

#[derive(Default, Serialize, Deserialize)]
struct ConnectorTokensState {
    #[serde(default)]
    connector_id: String,
    #[serde(default)]
    keepers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub(super) struct ConnectorTokensResource;

#[async_trait::async_trait]
impl ResourceHandler for ConnectorTokensResource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Generates the access and refresh tokens a Connector needs to authenticate with Twingate.")
            .with_attribute(
                "connector_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The ID of the parent Connector"),
            )
            .with_attribute(
                "keepers",
                Attribute::new(AttributeType::map(AttributeType::String), AttributeFlags::optional())
                    .with_force_new()
                    .with_description("Arbitrary map of values that, when changed, will trigger recreation of resource"),
            )
            .with_attribute(
                "access_token",
                Attribute::computed_string()
                    .sensitive()
                    .with_description("The Access Token of the parent Connector"),
            )
            .with_attribute(
                "refresh_token",
                Attribute::computed_string()
                    .sensitive()
                    .with_description("The Refresh Token of the parent Connector"),
            )
    }

    async fn create(&self, client: &Client, planned: &Value) -> Result<Value, ProviderError> {
        let planned: ConnectorTokensState = decode(planned)?;
        let tokens = client.generate_connector_tokens(&planned.connector_id).await?;
        info!(connector_id = %tokens.connector_id, "Connector tokens generated");

        encode(&ConnectorTokensState {
            connector_id: tokens.connector_id,
            keepers: planned.keepers,
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
        })
    }

    /// Tokens the API rejects are dropped so the next plan regenerates them.
    /// Any other verification failure is an error and leaves state alone.
    async fn read(&self, client: &Client, state: &Value) -> Result<Value, ProviderError> {
        let current: ConnectorTokensState = decode(state)?;
        let access = current.access_token.as_deref().unwrap_or_default();
        let refresh = current.refresh_token.as_deref().unwrap_or_default();

        match client.verify_connector_tokens(refresh, access).await {
            Ok(()) => Ok(state.clone()),
            Err(e) if e.is_rejected() => {
                warn!(connector_id = %current.connector_id, error = %e, "Connector tokens are invalid, removing from state");
                Ok(Value::Null)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Every configurable attribute forces replacement, so only the tokens carry over.
    async fn update(&self, _client: &Client, prior: &Value, planned: &Value) -> Result<Value, ProviderError> {
        let prior: ConnectorTokensState = decode(prior)?;
        let planned: ConnectorTokensState = decode(planned)?;
        encode(&ConnectorTokensState {
            access_token: prior.access_token,
            refresh_token: prior.refresh_token,
            ..planned
        })
    }

    /// Regenerating the pair revokes the tokens held in state.
    async fn delete(&self, client: &Client, state: &Value) -> Result<(), ProviderError> {
        let current: ConnectorTokensState = decode(state)?;
        client.generate_connector_tokens(&current.connector_id).await?;
        info!(connector_id = %current.connector_id, "Connector tokens revoked");
        Ok(())
    }

    async fn import(&self, _client: &Client, _id: &str) -> Result<Value, ProviderError> {
        Err(ProviderError::Unimplemented(
            "connector tokens cannot be imported".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::super::tests::provider;
    use super::super::CONNECTOR_TOKENS;
    use super::*;
    use crate::client::TransportError;
    use crate::server::ProviderService;
    use crate::testing::{assert_plan_replaces, MockTransport};

    fn tokens_state() -> Value {
        json!({"connector_id": "c1", "keepers": null, "access_token": "at", "refresh_token": "rt"})
    }

    #[tokio::test]
    async fn test_create_generates_tokens() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"connectorGenerateTokens": {
            "ok": true,
            "error": null,
            "connectorTokens": {"accessToken": "at", "refreshToken": "rt"}
        }}));

        let state = provider(&mock)
            .create(CONNECTOR_TOKENS, json!({"connector_id": "c1", "keepers": {"rotate": "1"}}))
            .await
            .unwrap();
        assert_eq!(state["access_token"], "at");
        assert_eq!(state["keepers"], json!({"rotate": "1"}));
        assert_eq!(mock.operation_names(), vec!["generateConnectorTokens"]);
    }

    #[tokio::test]
    async fn test_read_keeps_valid_tokens() {
        let mock = Arc::new(MockTransport::new());
        mock.respond("{}");

        let state = provider(&mock).read(CONNECTOR_TOKENS, tokens_state()).await.unwrap();
        assert_eq!(state, tokens_state());
        assert!(mock.requests()[0].url.ends_with("/api/v4/connector/validate_tokens"));
    }

    #[tokio::test]
    async fn test_read_drops_rejected_tokens() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(TransportError::Http {
            url: "https://acme.twingate.com/api/v4/connector/validate_tokens".into(),
            status: 401,
            body: "invalid token".into(),
        });

        let state = provider(&mock).read(CONNECTOR_TOKENS, tokens_state()).await.unwrap();
        assert!(state.is_null());
    }

    #[tokio::test]
    async fn test_read_keeps_state_when_verify_times_out() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(TransportError::Timeout {
            url: "https://acme.twingate.com/api/v4/connector/validate_tokens".into(),
        });

        let err = provider(&mock).read(CONNECTOR_TOKENS, tokens_state()).await.unwrap_err();
        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_read_keeps_state_when_verify_unavailable() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(TransportError::Http {
            url: "https://acme.twingate.com/api/v4/connector/validate_tokens".into(),
            status: 503,
            body: "unavailable".into(),
        });

        let err = provider(&mock).read(CONNECTOR_TOKENS, tokens_state()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api(_)));
    }

    #[tokio::test]
    async fn test_keepers_change_replaces() {
        let mock = Arc::new(MockTransport::new());
        let plan = provider(&mock)
            .plan(
                CONNECTOR_TOKENS,
                Some(tokens_state()),
                json!({"connector_id": "c1", "keepers": {"rotate": "2"}}),
                Value::Null,
            )
            .await
            .unwrap();
        assert_plan_replaces(&plan);
        assert!(plan.planned_state["access_token"].is_null());
    }

    #[tokio::test]
    async fn test_delete_revokes_tokens() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"connectorGenerateTokens": {
            "ok": true,
            "error": null,
            "connectorTokens": {"accessToken": "at2", "refreshToken": "rt2"}
        }}));

        provider(&mock).delete(CONNECTOR_TOKENS, tokens_state()).await.unwrap();
        assert_eq!(mock.operation_names(), vec!["generateConnectorTokens"]);
        assert_eq!(mock.requests()[0].body["variables"], json!({"connectorId": "c1"}));
    }

    #[tokio::test]
    async fn test_delete_fails_when_revoke_fails() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"connectorGenerateTokens": {
            "ok": false,
            "error": "connector not found",
            "connectorTokens": null
        }}));

        let err = provider(&mock).delete(CONNECTOR_TOKENS, tokens_state()).await.unwrap_err();
        assert!(err.to_string().contains("connector not found"));
    }

    #[tokio::test]
    async fn test_import_unsupported() {
        let mock = Arc::new(MockTransport::new());
        let err = provider(&mock).import_resource(CONNECTOR_TOKENS, "c1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented(_)));
        assert!(mock.requests().is_empty());
    }
}
