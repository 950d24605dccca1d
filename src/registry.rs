//! Plugin registration and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::descriptor::PluginDescriptor;
use crate::errors::{ActionNotFoundError, Error, PluginNotFoundError, Result};

/// Registry mapping plugin ids to descriptors, with a single dispatch entry
/// point.
///
/// Dispatch itself is side-effect-free: all validation runs before the
/// handler, and the only side effects are those of the wrapped vendor call.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<PluginDescriptor>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Register a descriptor. Returns self for method chaining.
    pub fn register(mut self, plugin: PluginDescriptor) -> Self {
        self.plugins
            .insert(plugin.id().as_str().to_string(), Arc::new(plugin));
        self
    }

    /// Register a descriptor (mutable reference version).
    pub fn register_mut(&mut self, plugin: PluginDescriptor) -> &mut Self {
        self.plugins
            .insert(plugin.id().as_str().to_string(), Arc::new(plugin));
        self
    }

    /// Remove a plugin. Returns true if it was registered.
    pub fn unregister(&mut self, plugin_id: &str) -> bool {
        self.plugins.remove(plugin_id).is_some()
    }

    pub fn has(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    pub fn get(&self, plugin_id: &str) -> Option<Arc<PluginDescriptor>> {
        self.plugins.get(plugin_id).cloned()
    }

    /// Registered plugin ids, sorted for stable error messages.
    pub fn registered_plugins(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Locate and invoke an action handler.
    ///
    /// Resolution and validation happen in order: plugin id, action name,
    /// plugin-level schema, action-level schema. A failure at any step rejects
    /// before any network I/O; the required-field check is the centralized one
    /// driven by the declared `required` arrays.
    pub async fn dispatch(
        &self,
        plugin_id: &str,
        action_name: &str,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value> {
        let plugin = self.plugins.get(plugin_id).ok_or_else(|| {
            Error::PluginNotFound(PluginNotFoundError {
                plugin: plugin_id.to_string(),
                available: self.registered_plugins(),
            })
        })?;

        let action = plugin.action(action_name).ok_or_else(|| {
            Error::ActionNotFound(ActionNotFoundError {
                plugin: plugin_id.to_string(),
                action: action_name.to_string(),
                available: plugin.action_names(),
            })
        })?;

        plugin.input_schema().validate(&input)?;
        if let Some(schema) = action.input_schema() {
            schema.validate(&input)?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(plugin = plugin_id, action = action_name, "dispatching action");

        action.execute(input, ctx.clone()).await
    }
}
