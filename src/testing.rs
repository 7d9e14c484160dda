//! Test support: a scripted [`Transport`] and a harness that drives a
//! [`ProviderService`] without a gRPC server.
//!
//! ```ignore
//! use std::sync::Arc;
//! use twingate_provider::client::Client;
//! use twingate_provider::provider::TwingateProvider;
//! use twingate_provider::testing::{MockTransport, ProviderTester};
//!
//! let mock = Arc::new(MockTransport::new());
//! mock.respond_data(json!({"remoteNetworkCreate": {
//!     "ok": true,
//!     "entity": {"id": "UmVtb3RlTmV0d29yazox", "name": "office", "location": "OTHER"}
//! }}));
//! let tester = ProviderTester::new(TwingateProvider::with_client(
//!     Client::new(mock.clone(), "acme", "twingate.com"),
//! ));
//! let state = tester.create("twingate_remote_network", json!({"name": "office"})).await?;
//! assert_eq!(mock.operation_names(), ["createRemoteNetwork"]);
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::client::{HttpRequest, Transport, TransportError};
use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};

#[derive(Default)]
struct MockState {
    responses: VecDeque<Result<String, TransportError>>,
    requests: Vec<HttpRequest>,
}

/// Replays queued responses in order and records every request.
///
/// A request that arrives after the queue is drained fails with
/// [`TransportError::Request`].
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a raw response body.
    pub fn respond(&self, body: &str) {
        self.state().responses.push_back(Ok(body.to_string()));
    }

    /// Queue a GraphQL response `{"data": data}`.
    pub fn respond_data(&self, data: Value) {
        let body = serde_json::json!({ "data": data }).to_string();
        self.state().responses.push_back(Ok(body));
    }

    /// Queue a transport failure.
    pub fn fail(&self, err: TransportError) {
        self.state().responses.push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state().requests.clone()
    }

    /// `operationName` of every GraphQL request sent so far.
    pub fn operation_names(&self) -> Vec<String> {
        self.state()
            .requests
            .iter()
            .filter_map(|r| r.body.get("operationName").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    /// Responses still waiting to be consumed.
    pub fn pending(&self) -> usize {
        self.state().responses.len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn post(&self, request: HttpRequest) -> Result<String, TransportError> {
        let mut state = self.state();
        let url = request.url.clone();
        state.requests.push(request);
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request(format!("no response scripted for {}", url))))
    }
}

/// Drives a [`ProviderService`] directly, the way the host would.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    pub async fn validate_resource_config(&self, resource_type: &str, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_resource_config(resource_type, config).await?;
        check_diagnostics(diagnostics)
    }

    pub async fn validate_data_source_config(&self, data_source_type: &str, config: Value) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    pub async fn plan_create(&self, resource_type: &str, config: Value) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, config.clone(), config).await
    }

    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), config.clone(), config)
            .await
    }

    pub async fn plan_delete(&self, resource_type: &str, prior_state: Value) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.update(resource_type, prior_state, planned_state).await
    }

    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    pub async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    /// plan, create, then read back.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// plan, update, then read back.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_update(resource_type, prior_state.clone(), config).await?;
        let updated = self.update(resource_type, prior_state, plan.planned_state).await?;
        self.read(resource_type, updated).await
    }

    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }
}

/// A harness call that failed with error diagnostics or a provider error.
#[derive(Debug)]
pub enum TestError {
    Diagnostics(Vec<Diagnostic>),
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        changed_paths(plan)
    );
}

pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(!plan.changes.is_empty(), "Expected plan to have changes, but got no changes");
}

pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(plan.requires_replace, "Expected plan to require replacement, but it does not");
}

pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.change(path).is_some(),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        changed_paths(plan)
    );
}

pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.change(path).is_none(),
        "Expected plan to not change attribute '{}', but it was changed",
        path
    );
}

pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).map(|d| &d.summary).collect();
    assert!(errors.is_empty(), "Expected no errors, but got {} error(s): {:?}", errors.len(), errors);
}

pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics.iter().any(Diagnostic::is_error),
        "Expected at least one error, but got none"
    );
}

/// Passes when an error diagnostic's summary or detail contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let matched = diagnostics.iter().filter(|d| d.is_error()).any(|d| {
        d.summary.contains(substring) || d.detail.as_deref().is_some_and(|detail| detail.contains(substring))
    });
    assert!(
        matched,
        "Expected an error containing '{}'. Errors: {:?}",
        substring,
        diagnostics.iter().filter(|d| d.is_error()).map(|d| &d.summary).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::client::Client;
    use crate::provider::TwingateProvider;
    use crate::types::AttributeChange;

    fn network_entity(name: &str, location: &str) -> Value {
        json!({"id": "UmVtb3RlTmV0d29yazox", "name": name, "location": location})
    }

    fn tester(mock: &Arc<MockTransport>) -> ProviderTester<TwingateProvider> {
        ProviderTester::new(TwingateProvider::with_client(Client::new(
            mock.clone(),
            "acme",
            "twingate.com",
        )))
    }

    #[tokio::test]
    async fn test_mock_transport_replays_in_order() {
        let mock = MockTransport::new();
        mock.respond("first");
        mock.fail(TransportError::Timeout { url: "u".into() });

        let request = HttpRequest::new("https://acme.twingate.com/api/graphql/", json!({"operationName": "readUsers"}));
        assert_eq!(mock.post(request.clone()).await.unwrap(), "first");
        assert!(matches!(mock.post(request.clone()).await, Err(TransportError::Timeout { .. })));
        assert!(matches!(mock.post(request).await, Err(TransportError::Request(_))));

        assert_eq!(mock.requests().len(), 3);
        assert_eq!(mock.operation_names(), vec!["readUsers"; 3]);
        assert_eq!(mock.pending(), 0);
    }

    #[tokio::test]
    async fn test_tester_schema_and_metadata() {
        let mock = Arc::new(MockTransport::new());
        let tester = tester(&mock);

        assert!(tester.schema().resources.contains_key("twingate_resource"));
        assert!(tester.resource_types().contains(&"twingate_connector_tokens".to_string()));
        assert!(tester.data_source_types().contains(&"twingate_users".to_string()));
    }

    #[tokio::test]
    async fn test_tester_lifecycle_create() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"remoteNetworkCreate": {
            "ok": true, "error": null, "entity": network_entity("office", "AWS")
        }}));
        mock.respond_data(json!({"remoteNetwork": network_entity("office", "AWS")}));

        let state = tester(&mock)
            .lifecycle_create("twingate_remote_network", json!({"name": "office", "location": "AWS"}))
            .await
            .unwrap();

        assert_eq!(state["id"], "UmVtb3RlTmV0d29yazox");
        assert_eq!(state["location"], "AWS");
        assert_eq!(mock.operation_names(), vec!["createRemoteNetwork", "readRemoteNetwork"]);
    }

    #[tokio::test]
    async fn test_tester_lifecycle_update() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"remoteNetworkUpdate": {
            "ok": true, "error": null, "entity": network_entity("hq", "OTHER")
        }}));
        mock.respond_data(json!({"remoteNetwork": network_entity("hq", "OTHER")}));
        let tester = tester(&mock);

        let prior = json!({"id": "UmVtb3RlTmV0d29yazox", "name": "office", "location": "OTHER"});
        let plan = tester
            .plan_update("twingate_remote_network", prior.clone(), json!({"name": "hq", "location": "OTHER"}))
            .await
            .unwrap();
        assert_plan_changes_attribute(&plan, "name");
        assert_plan_does_not_change_attribute(&plan, "id");
        assert_plan_updates_in_place(&plan);

        let state = tester
            .lifecycle_update("twingate_remote_network", prior, json!({"name": "hq", "location": "OTHER"}))
            .await
            .unwrap();
        assert_eq!(state["name"], "hq");
    }

    #[tokio::test]
    async fn test_tester_lifecycle_delete() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"remoteNetworkDelete": {"ok": true, "error": null}}));

        tester(&mock)
            .lifecycle_delete("twingate_remote_network", network_entity("office", "OTHER"))
            .await
            .unwrap();
        assert_eq!(mock.operation_names(), vec!["deleteRemoteNetwork"]);
    }

    #[tokio::test]
    async fn test_configure_requires_credentials() {
        let tester = ProviderTester::new(TwingateProvider::new("test"));
        match tester.configure(json!({"network": "acme", "api_token": ""})).await {
            Err(TestError::Diagnostics(diags)) => {
                assert_eq!(diags[0].summary, "Unable to create Twingate client");
            },
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_plan_assertions() {
        let plan = PlanResult::with_changes(
            json!({"name": "hq"}),
            vec![AttributeChange::modified("name", json!("office"), json!("hq"))],
            false,
        );
        assert_plan_has_changes(&plan);
        assert_plan_changes_attribute(&plan, "name");

        assert_plan_no_changes(&PlanResult::no_change(json!({})));
    }

    #[test]
    #[should_panic(expected = "Expected plan to require replacement")]
    fn test_assert_plan_replaces_fails() {
        assert_plan_replaces(&PlanResult::no_change(json!({})));
    }

    #[test]
    fn test_diagnostic_assertions() {
        let diagnostics = vec![
            Diagnostic::warning("Connector tokens are invalid"),
            Diagnostic::error("Invalid policy").with_detail("RESTRICTED policy requires specifying ports."),
        ];
        assert_has_errors(&diagnostics);
        assert_error_contains(&diagnostics, "requires specifying ports");
        assert_no_errors(&diagnostics[..1]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("Unsupported argument").with_attribute("groups"),
            Diagnostic::error("Unable to create Twingate client").with_detail("token and network have to be provided"),
        ]);

        let display = err.to_string();
        assert!(display.contains("(at groups)"));
        assert!(display.contains("token and network have to be provided"));
    }
}
