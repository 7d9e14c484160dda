//! Twingate API client.
//!
//! [`Client`] exposes one async method per API operation. Queries and
//! mutations go to the GraphQL endpoint; token verification goes to the REST
//! endpoint. All methods return [`ApiError`] on failure.

mod connector;
mod connector_tokens;
pub mod error;
mod gql;
mod group;
mod pagination;
mod remote_network;
mod resource;
pub mod transport;
mod user;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::ProviderConfig;
pub use error::{ApiError, Cause, TransportError};
use gql::{decode_response, Operation, Variables};
use pagination::Connection;
pub use transport::{HttpRequest, HttpTransport, RetryPolicy, Transport, DEFAULT_AGENT};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

const GRAPHQL_PATH: &str = "/api/graphql/";
const REST_PATH: &str = "/api/v4";

/// Client for one Twingate network.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    server_url: String,
    graphql_url: String,
    api_url: String,
    page_limit: usize,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_url", &self.server_url)
            .field("page_limit", &self.page_limit)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client for `https://{network}.{url}` over the given transport.
    pub fn new(transport: Arc<dyn Transport>, network: &str, url: &str) -> Self {
        let server_url = server_url(network, url);
        info!(server_url = %server_url, "Twingate client created");

        Self {
            transport,
            graphql_url: format!("{}{}", server_url, GRAPHQL_PATH),
            api_url: format!("{}{}", server_url, REST_PATH),
            server_url,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Build an HTTP-backed client from resolved provider configuration.
    pub fn from_config(config: &ProviderConfig, version: &str) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(
            config.api_token.clone(),
            config.http_timeout,
            RetryPolicy::with_max_retries(config.http_max_retry),
        )?
        .with_agent(DEFAULT_AGENT, version)
        .with_concurrency(config.rate_limit);

        Ok(Self::new(Arc::new(transport), &config.network, &config.url).with_page_limit(config.page_limit))
    }

    /// Set the number of items requested per page.
    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn graphql_url(&self) -> &str {
        &self.graphql_url
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    /// Run a GraphQL document and decode its `data`.
    async fn graphql<T: DeserializeOwned>(
        &self,
        op: Operation,
        document: &str,
        variables: Variables,
    ) -> Result<T, Cause> {
        let name = op.name();
        debug!(operation = %name, "GraphQL request");

        let body = json!({
            "query": document,
            "variables": variables.into_value(),
            "operationName": name,
        });
        let response = self
            .transport
            .post(HttpRequest::new(self.graphql_url.clone(), body))
            .await?;

        decode_response(&response)
    }

    /// Run a GraphQL document and decode one top-level field of `data`.
    ///
    /// A null field decodes as `None`.
    async fn graphql_field<T: DeserializeOwned>(
        &self,
        op: Operation,
        document: &str,
        field: &str,
        variables: Variables,
    ) -> Result<Option<T>, Cause> {
        let mut data: Map<String, Value> = self.graphql(op, document, variables).await?;
        match data.remove(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Read every node of a paginated connection field.
    ///
    /// An empty first page yields an empty list; an empty follow-up page is an error.
    async fn graphql_all<N: DeserializeOwned>(
        &self,
        op: Operation,
        document: &str,
        field: &str,
        cursor_name: &str,
        variables: Variables,
    ) -> Result<Vec<N>, Cause> {
        let first = variables
            .clone()
            .cursor(cursor_name, None)
            .page_limit(self.page_limit);
        let first: Connection<N> = self
            .graphql_field(op, document, field, first)
            .await?
            .unwrap_or_default();

        if first.is_empty() {
            return Ok(Vec::new());
        }

        let all = first
            .fetch_pages(|cursor| {
                let next = variables
                    .clone()
                    .cursor(cursor_name, Some(&cursor))
                    .page_limit(self.page_limit);
                async move {
                    self.graphql_field::<Connection<N>>(op, document, field, next)
                        .await
                        .map(Option::unwrap_or_default)
                }
            })
            .await?;

        Ok(all.into_nodes())
    }

    /// POST a JSON body to a REST endpoint below `/api/v4`.
    async fn rest(
        &self,
        path: &str,
        body: Value,
        headers: Vec<(String, String)>,
    ) -> Result<String, Cause> {
        let mut request = HttpRequest::new(format!("{}{}", self.api_url, path), body);
        for (name, value) in headers {
            request = request.with_header(name, value);
        }
        Ok(self.transport.post(request).await?)
    }
}

fn server_url(network: &str, url: &str) -> String {
    format!("https://{}.{}", network, url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    #[test]
    fn test_urls() {
        let client = Client::new(Arc::new(MockTransport::new()), "acme", "twingate.com");
        assert_eq!(client.server_url(), "https://acme.twingate.com");
        assert_eq!(client.graphql_url(), "https://acme.twingate.com/api/graphql/");
        assert_eq!(client.api_url(), "https://acme.twingate.com/api/v4");
        assert_eq!(client.page_limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(client.clone().with_page_limit(0).page_limit(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = ProviderConfig {
            api_token: "token".into(),
            network: "acme".into(),
            url: "stg.opstg.com".into(),
            page_limit: 20,
            ..Default::default()
        };
        let client = Client::from_config(&config, "1.2.3").unwrap();
        assert_eq!(client.server_url(), "https://acme.stg.opstg.com");
        assert_eq!(client.page_limit(), 20);
    }

    #[tokio::test]
    async fn test_graphql_envelope() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"remoteNetwork": {"id": "n1"}}));
        let client = Client::new(mock.clone(), "acme", "twingate.com");

        let node: Option<gql::IdRef> = client
            .graphql_field(
                Operation::read(gql::REMOTE_NETWORK),
                "query readRemoteNetwork($id: ID!) { remoteNetwork(id: $id) { id } }",
                "remoteNetwork",
                Variables::new().id("n1"),
            )
            .await
            .unwrap();
        assert_eq!(node.unwrap().id, "n1");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://acme.twingate.com/api/graphql/");
        assert_eq!(requests[0].body["operationName"], "readRemoteNetwork");
        assert_eq!(requests[0].body["variables"], json!({"id": "n1"}));
    }

    #[tokio::test]
    async fn test_graphql_field_null() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"remoteNetwork": null}));
        let client = Client::new(mock, "acme", "twingate.com");

        let node: Option<gql::IdRef> = client
            .graphql_field(
                Operation::read(gql::REMOTE_NETWORK),
                "query readRemoteNetwork($id: ID!) { remoteNetwork(id: $id) { id } }",
                "remoteNetwork",
                Variables::new().id("n1"),
            )
            .await
            .unwrap();
        assert!(node.is_none());
    }

    #[tokio::test]
    async fn test_graphql_all_pages() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"users": {
            "pageInfo": {"endCursor": "c1", "hasNextPage": true},
            "edges": [{"node": {"id": "u1"}}]
        }}));
        mock.respond_data(json!({"users": {
            "pageInfo": {"endCursor": "c2", "hasNextPage": false},
            "edges": [{"node": {"id": "u2"}}, {"node": {"id": "u3"}}]
        }}));
        let client = Client::new(mock.clone(), "acme", "twingate.com").with_page_limit(2);

        let users: Vec<gql::IdRef> = client
            .graphql_all(
                Operation::read(gql::USER).named("readUsers"),
                "query readUsers { users { id } }",
                "users",
                "usersEndCursor",
                Variables::new(),
            )
            .await
            .unwrap();
        let ids: Vec<_> = users.into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["u1", "u2", "u3"]);

        let requests = mock.requests();
        assert_eq!(requests[0].body["variables"]["usersEndCursor"], Value::Null);
        assert_eq!(requests[0].body["variables"]["pageLimit"], 2);
        assert_eq!(requests[1].body["variables"]["usersEndCursor"], "c1");
    }

    #[tokio::test]
    async fn test_graphql_all_empty() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"users": {"pageInfo": {"hasNextPage": false}, "edges": []}}));
        let client = Client::new(mock, "acme", "twingate.com");

        let users: Vec<gql::IdRef> = client
            .graphql_all(
                Operation::read(gql::USER).named("readUsers"),
                "query readUsers { users { id } }",
                "users",
                "usersEndCursor",
                Variables::new(),
            )
            .await
            .unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_rest_request() {
        let mock = Arc::new(MockTransport::new());
        mock.respond("{}");
        let client = Client::new(mock.clone(), "acme", "twingate.com");

        client
            .rest(
                "/connector/validate_tokens",
                json!({"refresh_token": "r"}),
                vec![("Authorization".into(), "Bearer a".into())],
            )
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(
            requests[0].url,
            "https://acme.twingate.com/api/v4/connector/validate_tokens"
        );
        assert_eq!(
            requests[0].headers,
            vec![("Authorization".to_string(), "Bearer a".to_string())]
        );
    }
}
