use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::{Arc, RwLock},
};

use log::{debug, error, trace};

use crate::{
    config::EngineConfig,
    core::{
        filters::{load_filters, Filter},
        services::{
            ChoiceSource, DateFormatter, LocaleNumberFormatter, NumberFormatter, PhpDateFormatter,
            ThreadRngChoice, UrlResolver,
        },
    },
    ParserError,
};

/// Named filters available to the compiler. Built-ins are loaded on
/// construction; hosts may register more (or override built-ins) at any time.
pub struct FilterRegistry {
    filters: RwLock<HashMap<String, Arc<dyn Filter>>>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self { filters: RwLock::new(load_filters()) }
    }

    /// Registers a filter under the name from its signature.
    pub fn register_filter(&self, filter: Arc<dyn Filter>) -> Result<(), ParserError> {
        let name = filter.signature().name.clone();
        debug!("Registering filter: {}", name);
        let mut filters = self.filters.write().map_err(|_| {
            error!("Failed to acquire write lock on filters");
            ParserError::Internal("Filter lock poisoned".to_string())
        })?;
        filters.insert(name, filter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Filter>, ParserError> {
        trace!("FilterRegistry::get: name='{}'", name);
        let filters = self.filters.read().map_err(|_| {
            error!("Failed to acquire read lock on filters");
            ParserError::Internal("Filter lock poisoned".to_string())
        })?;
        filters.get(name).cloned().ok_or_else(|| {
            error!("Attempted to use undefined filter '{}'", name);
            ParserError::UnknownFilter(name.to_string())
        })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.filters.read() {
            Ok(filters) => filters.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

/// Collaborators called during a render pass.
#[derive(Debug, Clone)]
pub struct Services {
    pub url_resolver: Option<Arc<dyn UrlResolver>>,
    pub number_formatter: Arc<dyn NumberFormatter>,
    pub date_formatter: Arc<dyn DateFormatter>,
    pub choice: Arc<dyn ChoiceSource>,
}

impl Default for Services {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Services {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            url_resolver: None,
            number_formatter: Arc::new(LocaleNumberFormatter::new(config.number.clone())),
            date_formatter: Arc::new(PhpDateFormatter),
            choice: Arc::new(ThreadRngChoice),
        }
    }
}
