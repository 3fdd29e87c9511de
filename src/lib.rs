use std::sync::Arc;

use log::{debug, error, trace, warn};

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod id;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod types;
mod tests;

pub use config::{EngineConfig, NumberFormatConfig};
pub use context::{Context, Scope};
pub use crate::core::filters::{ArgSpec, Filter, FilterSignature, FnFilter};
pub use crate::core::services::{ChoiceSource, DateFormatter, NoReverseMatch, NumberFormatter, UrlResolver};
pub use errors::{ParserError, RenderError, TemplateError};
pub use registry::{FilterRegistry, Services};
pub use types::{Map, Number, Object, Str, Value};

use crate::core::nodes::NodeList;
use crate::parser::Compiler;

/// Configuration, collaborators and filters shared by every template an
/// engine compiles.
#[derive(Debug)]
struct EngineState {
    config: EngineConfig,
    services: Services,
    filters: FilterRegistry,
}

/// Compiles and renders templates.
#[derive(Debug, Clone)]
pub struct Engine {
    state: Arc<EngineState>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with the default configuration and built-in filters.
    pub fn new() -> Self {
        let config = EngineConfig::default();
        let services = Services::from_config(&config);
        Self { state: Arc::new(EngineState { config, services, filters: FilterRegistry::new() }) }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.state.filters
    }

    /// Adds a filter for templates compiled from now on. Already compiled
    /// templates keep the filters they were compiled with.
    pub fn register_filter(&self, filter: Arc<dyn Filter>) -> Result<(), ParserError> {
        self.state.filters.register_filter(filter)
    }

    pub fn compile(&self, source: &str) -> Result<Template, ParserError> {
        trace!("Engine::compile: {} bytes", source.len());
        let nodes = Compiler::new(source, &self.state.filters).compile()?;
        Ok(Template { nodes, engine: self.state.clone() })
    }

    /// Compiles and renders in one step.
    pub fn render_str(&self, source: &str, vars: &Map) -> Result<String, TemplateError> {
        let template = self.compile(source)?;
        Ok(template.render(vars)?)
    }
}

/// Builder for [`Engine`]. Collaborators left unset fall back to the
/// defaults derived from the configuration.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    url_resolver: Option<Arc<dyn UrlResolver>>,
    number_formatter: Option<Arc<dyn NumberFormatter>>,
    date_formatter: Option<Arc<dyn DateFormatter>>,
    choice: Option<Arc<dyn ChoiceSource>>,
    filters: Vec<Arc<dyn Filter>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&mut self, config: EngineConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn autoescape(&mut self, enabled: bool) -> &mut Self {
        self.config.autoescape = enabled;
        self
    }

    pub fn string_if_invalid(&mut self, text: &str) -> &mut Self {
        self.config.string_if_invalid = text.to_string();
        self
    }

    pub fn url_resolver(&mut self, resolver: Arc<dyn UrlResolver>) -> &mut Self {
        self.url_resolver = Some(resolver);
        self
    }

    pub fn number_formatter(&mut self, formatter: Arc<dyn NumberFormatter>) -> &mut Self {
        self.number_formatter = Some(formatter);
        self
    }

    pub fn date_formatter(&mut self, formatter: Arc<dyn DateFormatter>) -> &mut Self {
        self.date_formatter = Some(formatter);
        self
    }

    pub fn choice_source(&mut self, choice: Arc<dyn ChoiceSource>) -> &mut Self {
        self.choice = Some(choice);
        self
    }

    pub fn register_filter(&mut self, filter: Arc<dyn Filter>) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn build(&self) -> Result<Engine, ParserError> {
        let mut services = Services::from_config(&self.config);
        services.url_resolver = self.url_resolver.clone();
        if let Some(formatter) = &self.number_formatter {
            services.number_formatter = formatter.clone();
        }
        if let Some(formatter) = &self.date_formatter {
            services.date_formatter = formatter.clone();
        }
        if let Some(choice) = &self.choice {
            services.choice = choice.clone();
        }

        let filters = FilterRegistry::new();
        for filter in &self.filters {
            filters.register_filter(filter.clone())?;
        }
        debug!("Built engine with {} filters", filters.names().len());
        Ok(Engine { state: Arc::new(EngineState { config: self.config.clone(), services, filters }) })
    }
}

/// A compiled template. Immutable; every render starts from a fresh scope
/// and fresh per-node state, so one template can be rendered any number of
/// times, from any number of threads.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: NodeList,
    engine: Arc<EngineState>,
}

impl Template {
    pub fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    pub fn render(&self, vars: &Map) -> Result<String, RenderError> {
        let scope = Scope::from(vars.clone());
        let mut ctx = Context::new(scope, &self.engine.config, &self.engine.services);
        self.nodes.render(&mut ctx).inspect_err(|err| error!("Render failed: {}", err))
    }

    /// Renders with a JSON object as the root scope. Anything other than an
    /// object renders against an empty scope.
    pub fn render_json(&self, vars: &serde_json::Value) -> Result<String, RenderError> {
        match Value::from(vars) {
            Value::Map(map) => self.render(&map),
            other => {
                warn!("Template rendered with a {} root instead of a map", other.kind());
                self.render(&Map::new())
            }
        }
    }
}
