//! Twingate infrastructure provider.
//!
//! A provider plugin that manages Twingate remote networks, connectors,
//! connector tokens, resources and groups, and reads users, over the Twingate
//! GraphQL API. The host process spawns the plugin and talks to it over gRPC.
//!
//! # Layout
//!
//! - [`client`]: the Twingate API client (GraphQL plus the token REST endpoint),
//!   with retries, pagination and typed errors.
//! - [`model`]: domain objects and the protocol/port rules for resources.
//! - [`provider`]: [`TwingateProvider`], the schemas and CRUD handlers for every
//!   resource and data source type.
//! - [`server`]: the [`ProviderService`] trait and the gRPC server.
//! - [`schema`], [`validation`], [`types`]: schema description, config
//!   validation and plan types.
//! - [`sweeper`]: cleanup of objects left behind by acceptance runs.
//!
//! # Handshake
//!
//! On startup [`serve`] binds a local port and prints one line to stdout:
//!
//! ```text
//! TWINGATE_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `TWINGATE_PROVIDER|<protocol_version>|<address>`. All logging goes to
//! stderr.
//!
//! # Configuration
//!
//! The provider block accepts `api_token`, `network`, `url`, `http_timeout` and
//! `http_max_retry`; unset values fall back to `TWINGATE_API_TOKEN`,
//! `TWINGATE_NETWORK`, `TWINGATE_URL`, `TWINGATE_HTTP_TIMEOUT` and
//! `TWINGATE_HTTP_MAX_RETRY`. See [`config::ProviderConfig`].

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod provider;
pub mod schema;
pub mod server;
pub mod sweeper;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(clippy::all)]
pub mod generated;

pub use client::Client;
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::TwingateProvider;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;
