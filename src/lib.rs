//! MintFlow integration core: schema-declared plugin actions dispatched
//! through a single validating entry point, storage provider selection, and
//! flow-execution event relaying.
//!
//! The pieces compose explicitly. A [`PluginRegistry`] holds
//! [`PluginDescriptor`]s; [`PluginRegistry::dispatch`] resolves the plugin
//! and action, validates the input against the declared schemas, and only
//! then runs the handler with a caller-built [`ExecutionContext`]:
//!
//! ```no_run
//! use mintflow::{standard_registry, ExecutionContext};
//! use serde_json::json;
//!
//! # async fn run() -> mintflow::Result<()> {
//! let registry = standard_registry()?;
//! let ctx = ExecutionContext::new()?;
//! let issue = registry
//!     .dispatch(
//!         "github",
//!         "create_issue",
//!         json!({
//!             "token": "ghp_xxxx",
//!             "owner": "octocat",
//!             "repo": "hello-world",
//!             "title": "Found a bug",
//!         }),
//!         &ctx,
//!     )
//!     .await?;
//! println!("created #{}", issue["number"]);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod context;
pub mod descriptor;
pub mod errors;
mod http;
pub mod plugins;
pub mod providers;
pub mod registry;
pub mod relay;
pub mod schema;
pub mod sse;
pub mod testing;

/// Default TCP connect timeout for the built-in HTTP client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-request timeout advertised on the execution context.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub use context::{ExecutionContext, ExecutionContextBuilder};
pub use descriptor::{
    handler_fn, Action, ActionHandler, ActionName, BoxFuture, PluginDescriptor, PluginId,
};
pub use errors::{
    ActionNotFoundError, Error, PluginNotFoundError, Result, TransportError, TransportErrorKind,
    UpstreamError, ValidationError,
};
pub use plugins::postgres::{
    PostgresConfig, SqlConnection, SqlConnector, SqlOutcome, SqlStatement,
};
pub use plugins::standard_registry;
pub use providers::{
    database_provider, vector_store_provider, DatabaseProvider, ProviderConfig, VectorMatch,
    VectorRecord, VectorStoreProvider,
};
pub use registry::PluginRegistry;
pub use relay::{FlowEvent, FlowEventKind, FlowEventRelay, Room};
pub use schema::{ActionSchema, FieldSpec, FieldType, RuleAction, RuleOperation, VisibilityRule};
pub use sse::{sse_stream, SseEvent, SseFrame, SseParser};
