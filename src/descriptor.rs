//! Plugin descriptors and action handlers.
//!
//! A [`PluginDescriptor`] aggregates one or more named actions under a plugin
//! identity. Descriptors are built once at registration and are immutable
//! behind `Arc` thereafter; an [`Action`] is owned exclusively by its
//! descriptor.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::{Result, ValidationError};
use crate::schema::ActionSchema;

/// A boxed future type for async action handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler function bound to one named action. Receives the raw input object
/// (already validated against the declared schemas) and the caller-supplied
/// execution context.
pub type ActionHandler =
    Arc<dyn Fn(Value, ExecutionContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wrap a plain async function as an [`ActionHandler`].
pub fn handler_fn<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |input, ctx| Box::pin(f(input, ctx)))
}

/// Helper macro to create an action handler from an async closure.
///
/// ```ignore
/// let handler = action_handler!(|input, _ctx| async move {
///     Ok(serde_json::json!({ "echo": input }))
/// });
/// ```
#[macro_export]
macro_rules! action_handler {
    ($closure:expr) => {{
        use std::sync::Arc;
        let handler: $crate::ActionHandler =
            Arc::new(move |input, ctx| Box::pin($closure(input, ctx)));
        handler
    }};
}

/// Validated, trimmed plugin identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let trimmed = value.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(ValidationError::new("plugin id is required"));
        }
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<PluginId> for String {
    fn from(value: PluginId) -> Self {
        value.0
    }
}

/// Validated, trimmed action name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionName(String);

impl ActionName {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let trimmed = value.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(ValidationError::new("action name is required"));
        }
        Ok(Self(trimmed))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ActionName> for String {
    fn from(value: ActionName) -> Self {
        value.0
    }
}

/// One named action: an optional per-action schema plus the handler.
pub struct Action {
    name: ActionName,
    description: Option<String>,
    input_schema: Option<ActionSchema>,
    output_schema: Option<ActionSchema>,
    handler: ActionHandler,
}

impl Action {
    pub fn new(name: impl Into<String>, handler: ActionHandler) -> Result<Self> {
        Ok(Self {
            name: ActionName::new(name)?,
            description: None,
            input_schema: None,
            output_schema: None,
            handler,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: ActionSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: ActionSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn name(&self) -> &ActionName {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn input_schema(&self) -> Option<&ActionSchema> {
        self.input_schema.as_ref()
    }

    pub fn output_schema(&self) -> Option<&ActionSchema> {
        self.output_schema.as_ref()
    }

    /// Invoke the handler. Callers go through
    /// [`PluginRegistry::dispatch`](crate::PluginRegistry::dispatch), which
    /// validates the input first.
    pub async fn execute(&self, input: Value, ctx: ExecutionContext) -> Result<Value> {
        (self.handler)(input, ctx).await
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Aggregates actions under a plugin identity, plus the metadata the UI and
/// documentation surfaces render (schemas, examples, tags).
pub struct PluginDescriptor {
    id: PluginId,
    name: String,
    description: String,
    version: String,
    groups: Vec<String>,
    tags: Vec<String>,
    input_schema: ActionSchema,
    output_schema: Option<ActionSchema>,
    example_input: Option<Value>,
    example_output: Option<Value>,
    documentation: Option<String>,
    actions: Vec<Action>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            id: PluginId::new(id)?,
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            groups: Vec::new(),
            tags: Vec::new(),
            input_schema: ActionSchema::object(),
            output_schema: None,
            example_input: None,
            example_output: None,
            documentation: None,
            actions: Vec::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| (*g).to_string()).collect();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_string()).collect();
        self
    }

    /// Plugin-level input schema; its `required` array applies to every
    /// action of the plugin.
    pub fn with_input_schema(mut self, schema: ActionSchema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: ActionSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_example_input(mut self, example: Value) -> Self {
        self.example_input = Some(example);
        self
    }

    pub fn with_example_output(mut self, example: Value) -> Self {
        self.example_output = Some(example);
        self
    }

    pub fn with_documentation(mut self, url: impl Into<String>) -> Self {
        self.documentation = Some(url.into());
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn input_schema(&self) -> &ActionSchema {
        &self.input_schema
    }

    pub fn output_schema(&self) -> Option<&ActionSchema> {
        self.output_schema.as_ref()
    }

    pub fn example_input(&self) -> Option<&Value> {
        self.example_input.as_ref()
    }

    pub fn example_output(&self) -> Option<&Value> {
        self.example_output.as_ref()
    }

    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name().as_str() == name)
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions
            .iter()
            .map(|a| a.name().as_str().to_string())
            .collect()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("actions", &self.action_names())
            .finish_non_exhaustive()
    }
}
