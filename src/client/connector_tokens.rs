use serde::Deserialize;
use serde_json::json;

use super::error::{ApiError, Cause};
use super::gql::{Operation, Variables, CONNECTOR_TOKENS};
use super::Client;
use crate::model::ConnectorTokens;

const GENERATE: &str = "mutation generateConnectorTokens($connectorId: ID!) {
  connectorGenerateTokens(connectorId: $connectorId) {
    ok
    error
    connectorTokens { accessToken refreshToken }
  }
}";

const VERIFY_PATH: &str = "/connector/validate_tokens";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokensPayload {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    connector_tokens: Option<GqlTokens>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlTokens {
    access_token: String,
    refresh_token: String,
}

impl std::fmt::Debug for GqlTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GqlTokens { .. }")
    }
}

impl Client {
    /// Issue a fresh access/refresh token pair for a connector.
    pub async fn generate_connector_tokens(
        &self,
        connector_id: &str,
    ) -> Result<ConnectorTokens, ApiError> {
        let op = Operation::generate(CONNECTOR_TOKENS);
        if connector_id.is_empty() {
            return Err(op.error(Cause::ConnectorIdIsEmpty));
        }

        let variables = Variables::new().id_named("connectorId", connector_id);
        let payload: Option<TokensPayload> = self
            .graphql_field(op, GENERATE, "connectorGenerateTokens", variables)
            .await
            .map_err(|e| op.error_with_id(e, connector_id))?;

        let payload = payload.ok_or_else(|| op.error_with_id(Cause::ResultIsEmpty, connector_id))?;
        if !payload.ok {
            return Err(op.error_with_id(
                Cause::Mutation(payload.error.unwrap_or_default()),
                connector_id,
            ));
        }

        let tokens = payload
            .connector_tokens
            .ok_or_else(|| op.error_with_id(Cause::ResultIsEmpty, connector_id))?;

        Ok(ConnectorTokens {
            connector_id: connector_id.to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Check that a token pair is still accepted by the API.
    pub async fn verify_connector_tokens(
        &self,
        refresh_token: &str,
        access_token: &str,
    ) -> Result<(), ApiError> {
        let op = Operation::verify(CONNECTOR_TOKENS);

        self.rest(
            VERIFY_PATH,
            json!({ "refresh_token": refresh_token }),
            vec![(
                "Authorization".to_string(),
                format!("Bearer {}", access_token),
            )],
        )
        .await
        .map(|_| ())
        .map_err(|e| op.error(e))
    }
}
