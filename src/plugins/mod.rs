//! Built-in integration plugins.

pub mod github;
pub mod openai;
pub mod postgres;
pub mod s3;

use crate::errors::Result;
use crate::registry::PluginRegistry;

/// Registry pre-loaded with every built-in plugin.
pub fn standard_registry() -> Result<PluginRegistry> {
    Ok(PluginRegistry::new()
        .register(github::plugin()?)
        .register(openai::plugin()?)
        .register(postgres::plugin()?)
        .register(s3::plugin()?))
}
