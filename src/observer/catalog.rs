//! Observer catalog: name to constructor mapping.
//!
//! The catalog is consulted once at startup and again by the reload
//! coordinator whenever a snapshot names an observer that is not registered yet.

use std::fmt;
use std::sync::Arc;

use super::Observer;
use crate::config::ObserverSettings;
use crate::error::Result;

/// Builds an observer instance from its settings section
pub type ObserverFactory =
    Arc<dyn Fn(&ObserverSettings) -> Result<Arc<dyn Observer>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ObserverCatalog {
    factories: Vec<(String, ObserverFactory)>,
}

impl fmt::Debug for ObserverCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverCatalog")
            .field("observers", &self.names())
            .finish()
    }
}

impl ObserverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. A second registration under the same name
    /// replaces the first but keeps its position.
    pub fn register<N, F>(&mut self, name: N, factory: F) -> &mut Self
    where
        N: Into<String>,
        F: Fn(&ObserverSettings) -> Result<Arc<dyn Observer>> + Send + Sync + 'static,
    {
        let name = name.into();
        let factory: ObserverFactory = Arc::new(factory);
        match self.factories.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory,
            None => self.factories.push((name, factory)),
        }
        self
    }

    pub fn with<N, F>(mut self, name: N, factory: F) -> Self
    where
        N: Into<String>,
        F: Fn(&ObserverSettings) -> Result<Arc<dyn Observer>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate `name`; `None` when the catalog does not know it
    pub fn create(&self, name: &str, settings: &ObserverSettings) -> Option<Result<Arc<dyn Observer>>> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory(settings))
    }
}
