//! The host plugin protocol: the [`ProviderService`] trait and the gRPC server
//! that exposes it.
//!
//! # Signal Handling
//!
//! On SIGTERM or SIGINT the server stops accepting connections, gives
//! in-flight requests [`ServeOptions::shutdown_timeout`] to finish, calls
//! [`ProviderService::stop`] and returns.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated;
use crate::schema::{Block, BlockNestingMode, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};
use crate::validation::validate;

/// Operations a provider implements, in plain Rust and JSON types.
///
/// State and configuration travel as `serde_json::Value`. A read that
/// returns `Value::Null` tells the host the object is gone.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    fn schema(&self) -> ProviderSchema;

    /// Derived from the schema unless overridden.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validate(&self.schema().provider, &config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Checks `config` against the resource schema by default.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.schema();
        let resource = schema
            .resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;
        Ok(validate(resource, &config))
    }

    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// `prior_state` is `None` on create; `proposed_state` is null on destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            resource_type
        )))
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.schema();
        let data_source = schema
            .data_sources
            .get(data_source_type)
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))?;
        Ok(validate(data_source, &config))
    }

    async fn read_data_source(&self, data_source_type: &str, _config: Value) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

impl From<Diagnostic> for generated::Diagnostic {
    fn from(d: Diagnostic) -> Self {
        let severity = match d.severity {
            DiagnosticSeverity::Error => generated::diagnostic::Severity::Error,
            DiagnosticSeverity::Warning => generated::diagnostic::Severity::Warning,
        };
        Self {
            severity: severity as i32,
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        Diagnostic::error(err.to_string())
    }
}

impl From<&Schema> for generated::Schema {
    fn from(schema: &Schema) -> Self {
        Self {
            version: schema.version as i64,
            block: Some(block_to_proto(&schema.block)),
        }
    }
}

fn block_to_proto(block: &Block) -> generated::Block {
    let attributes = block
        .attributes
        .iter()
        .map(|(name, attr)| generated::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            force_new: attr.force_new,
            default_value: attr
                .default
                .as_ref()
                .and_then(|v| serde_json::to_vec(v).ok())
                .unwrap_or_default(),
        })
        .collect();

    let block_types = block
        .blocks
        .iter()
        .map(|(name, nested)| {
            let nesting_mode = match nested.nesting_mode {
                BlockNestingMode::Single => generated::nested_block::NestingMode::Single,
                BlockNestingMode::List => generated::nested_block::NestingMode::List,
                BlockNestingMode::Set => generated::nested_block::NestingMode::Set,
                BlockNestingMode::Map => generated::nested_block::NestingMode::Map,
            };
            generated::NestedBlock {
                type_name: name.clone(),
                block: Some(block_to_proto(&nested.block)),
                nesting_mode: nesting_mode as i32,
                min_items: nested.min_items as i32,
                max_items: nested.max_items as i32,
            }
        })
        .collect();

    generated::Block {
        attributes,
        block_types,
        description: block.description.clone().unwrap_or_default(),
    }
}

/// Empty bytes decode to null, as do bytes that are not JSON.
fn decode(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|err| {
        warn!(error = %err, "Ignoring malformed JSON payload");
        Value::Null
    })
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn error_diagnostics(err: ProviderError) -> Vec<generated::Diagnostic> {
    vec![Diagnostic::from(err).into()]
}

/// Converts a validation outcome, logging whether it carried errors.
fn validation_diagnostics(
    call: &'static str,
    subject: &str,
    result: Result<Vec<Diagnostic>, ProviderError>,
) -> Vec<generated::Diagnostic> {
    match result {
        Ok(diagnostics) => {
            let errors = diagnostics.iter().filter(|d| d.is_error()).count();
            if errors > 0 {
                warn!(call, subject, errors, "Completed with errors");
            } else {
                debug!(call, subject, "Completed");
            }
            diagnostics.into_iter().map(Into::into).collect()
        },
        Err(e) => {
            error!(call, subject, error = %e, "Failed");
            error_diagnostics(e)
        },
    }
}

/// Adapts a [`ProviderService`] to the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

#[tonic::async_trait]
impl<P: ProviderService> generated::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<generated::GetMetadataRequest>,
    ) -> Result<tonic::Response<generated::GetMetadataResponse>, tonic::Status> {
        let metadata = self.provider.metadata();
        debug!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "GetMetadata completed"
        );
        Ok(tonic::Response::new(generated::GetMetadataResponse {
            server_capabilities: Some(generated::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<generated::GetSchemaRequest>,
    ) -> Result<tonic::Response<generated::GetSchemaResponse>, tonic::Status> {
        let schema = self.provider.schema();
        Ok(tonic::Response::new(generated::GetSchemaResponse {
            provider: Some((&schema.provider).into()),
            resources: schema.resources.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            data_sources: schema.data_sources.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: tonic::Request<generated::ValidateProviderConfigRequest>,
    ) -> Result<tonic::Response<generated::ValidateProviderConfigResponse>, tonic::Status> {
        let config = decode(&request.into_inner().config);
        let result = self.provider.validate_provider_config(config).await;
        Ok(tonic::Response::new(generated::ValidateProviderConfigResponse {
            diagnostics: validation_diagnostics("ValidateProviderConfig", "provider", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<generated::ConfigureRequest>,
    ) -> Result<tonic::Response<generated::ConfigureResponse>, tonic::Status> {
        let config = decode(&request.into_inner().config);
        let result = self.provider.configure(config).await;
        Ok(tonic::Response::new(generated::ConfigureResponse {
            diagnostics: validation_diagnostics("Configure", "provider", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<generated::StopRequest>,
    ) -> Result<tonic::Response<generated::StopResponse>, tonic::Status> {
        info!("Stop requested");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(tonic::Response::new(generated::StopResponse { error }))
    }

    #[instrument(skip_all, name = "grpc.validate_resource_config", fields(resource_type))]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<generated::ValidateResourceConfigRequest>,
    ) -> Result<tonic::Response<generated::ValidateResourceConfigResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());
        let result = self
            .provider
            .validate_resource_config(&req.resource_type, decode(&req.config))
            .await;
        Ok(tonic::Response::new(generated::ValidateResourceConfigResponse {
            diagnostics: validation_diagnostics("ValidateResourceConfig", &req.resource_type, result),
        }))
    }

    #[instrument(skip_all, name = "grpc.upgrade_resource_state", fields(resource_type))]
    async fn upgrade_resource_state(
        &self,
        request: tonic::Request<generated::UpgradeResourceStateRequest>,
    ) -> Result<tonic::Response<generated::UpgradeResourceStateResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let response = match self
            .provider
            .upgrade_resource_state(&req.resource_type, req.version, decode(&req.raw_state))
            .await
        {
            Ok(upgraded) => generated::UpgradeResourceStateResponse {
                upgraded_state: encode(&upgraded),
                diagnostics: vec![],
            },
            Err(e) => {
                error!(version = req.version, error = %e, "UpgradeResourceState failed");
                generated::UpgradeResourceStateResponse {
                    upgraded_state: vec![],
                    diagnostics: error_diagnostics(e),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.plan", fields(resource_type))]
    async fn plan(
        &self,
        request: tonic::Request<generated::PlanRequest>,
    ) -> Result<tonic::Response<generated::PlanResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let prior_state = match decode(&req.prior_state) {
            Value::Null => None,
            prior => Some(prior),
        };
        let result = self
            .provider
            .plan(
                &req.resource_type,
                prior_state,
                decode(&req.proposed_state),
                decode(&req.config),
            )
            .await;

        let response = match result {
            Ok(plan) => {
                debug!(
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "Plan completed"
                );
                generated::PlanResponse {
                    planned_state: encode(&plan.planned_state),
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Plan failed");
                generated::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_diagnostics(e),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.create", fields(resource_type))]
    async fn create(
        &self,
        request: tonic::Request<generated::CreateRequest>,
    ) -> Result<tonic::Response<generated::CreateResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let response = match self.provider.create(&req.resource_type, decode(&req.planned_state)).await {
            Ok(state) => {
                info!(id = %state["id"], "Created");
                generated::CreateResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Create failed");
                generated::CreateResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(e),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.read", fields(resource_type))]
    async fn read(
        &self,
        request: tonic::Request<generated::ReadRequest>,
    ) -> Result<tonic::Response<generated::ReadResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let response = match self.provider.read(&req.resource_type, decode(&req.current_state)).await {
            Ok(state) => {
                if state.is_null() {
                    info!("Object no longer exists, removing from state");
                }
                generated::ReadResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Read failed");
                generated::ReadResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(e),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.update", fields(resource_type))]
    async fn update(
        &self,
        request: tonic::Request<generated::UpdateRequest>,
    ) -> Result<tonic::Response<generated::UpdateResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let response = match self
            .provider
            .update(&req.resource_type, decode(&req.prior_state), decode(&req.planned_state))
            .await
        {
            Ok(state) => {
                info!(id = %state["id"], "Updated");
                generated::UpdateResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(error = %e, "Update failed");
                generated::UpdateResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(e),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.delete", fields(resource_type))]
    async fn delete(
        &self,
        request: tonic::Request<generated::DeleteRequest>,
    ) -> Result<tonic::Response<generated::DeleteResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("resource_type", req.resource_type.as_str());

        let diagnostics = match self.provider.delete(&req.resource_type, decode(&req.current_state)).await {
            Ok(()) => {
                info!("Deleted");
                vec![]
            },
            Err(e) => {
                error!(error = %e, "Delete failed");
                error_diagnostics(e)
            },
        };
        Ok(tonic::Response::new(generated::DeleteResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.import_resource_state", fields(resource_type, id))]
    async fn import_resource_state(
        &self,
        request: tonic::Request<generated::ImportResourceStateRequest>,
    ) -> Result<tonic::Response<generated::ImportResourceStateResponse>, tonic::Status> {
        let req = request.into_inner();
        let span = tracing::Span::current();
        span.record("resource_type", req.resource_type.as_str());
        span.record("id", req.id.as_str());

        let response = match self.provider.import_resource(&req.resource_type, &req.id).await {
            Ok(imported) => generated::ImportResourceStateResponse {
                imported: imported.into_iter().map(Into::into).collect(),
                diagnostics: vec![],
            },
            Err(e) => {
                error!(error = %e, "ImportResourceState failed");
                generated::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: error_diagnostics(e),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.validate_data_source_config", fields(data_source_type))]
    async fn validate_data_source_config(
        &self,
        request: tonic::Request<generated::ValidateDataSourceConfigRequest>,
    ) -> Result<tonic::Response<generated::ValidateDataSourceConfigResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());
        let result = self
            .provider
            .validate_data_source_config(&req.data_source_type, decode(&req.config))
            .await;
        Ok(tonic::Response::new(generated::ValidateDataSourceConfigResponse {
            diagnostics: validation_diagnostics("ValidateDataSourceConfig", &req.data_source_type, result),
        }))
    }

    #[instrument(skip_all, name = "grpc.read_data_source", fields(data_source_type))]
    async fn read_data_source(
        &self,
        request: tonic::Request<generated::ReadDataSourceRequest>,
    ) -> Result<tonic::Response<generated::ReadDataSourceResponse>, tonic::Status> {
        let req = request.into_inner();
        tracing::Span::current().record("data_source_type", req.data_source_type.as_str());

        let response = match self
            .provider
            .read_data_source(&req.data_source_type, decode(&req.config))
            .await
        {
            Ok(state) => generated::ReadDataSourceResponse {
                state: encode(&state),
                diagnostics: vec![],
            },
            Err(e) => {
                error!(error = %e, "ReadDataSource failed");
                generated::ReadDataSourceResponse {
                    state: vec![],
                    diagnostics: error_diagnostics(e),
                }
            },
        };
        Ok(tonic::Response::new(response))
    }
}

/// Options for the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may run once a shutdown signal arrives.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Resolves on SIGTERM or SIGINT (CTRL+C on Windows).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => info!("Received SIGINT, shutting down"),
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await;
            },
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            },
        }
    }
}

/// Serve on a free loopback port and print the handshake line
/// `TWINGATE_PROVIDER|1|<address>` to stdout.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_listener(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Like [`serve`] but binds `addr`.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Serve on a bound listener until `shutdown` resolves.
pub async fn serve_listener<P, F>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: ProviderService,
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr()?;
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let service = generated::provider_server::ProviderServer::new(ProviderGrpcService {
        provider: Arc::clone(&provider),
    });

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = Server::builder().add_service(service).serve_with_incoming_shutdown(
        tokio_stream::wrappers::TcpListenerStream::new(listener),
        async {
            let _ = stop_rx.await;
        },
    );
    tokio::pin!(server);

    // The drain timeout starts only once shutdown has been requested.
    tokio::select! {
        result = &mut server => result?,
        () = shutdown => {
            let _ = stop_tx.send(());
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(Ok(())) => info!("Server drained"),
                Ok(Err(e)) => {
                    error!(error = %e, "Server error during shutdown");
                    return Err(e.into());
                },
                Err(_) => warn!(timeout = ?options.shutdown_timeout, "Shutdown timeout exceeded, forcing shutdown"),
            }
        }
    }

    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop returned an error");
    }
    info!("Provider shutdown complete");
    Ok(())
}
