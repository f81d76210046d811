use crate::error::{CollaboratorKind, GenerateError};
use crate::models::PluginSpec;
use crate::services::builtin;
use crate::services::collaborators::{Publisher, Runtime};
use crate::services::hooks::Plugin;
use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

pub type RuntimeFactory = Box<dyn Fn(Option<&Value>) -> Result<Runtime> + Send + Sync>;
pub type PublisherFactory = Box<dyn Fn(Option<&Value>) -> Result<Arc<dyn Publisher>> + Send + Sync>;
pub type PluginFactory = Box<dyn Fn(Option<&Value>) -> Result<Box<dyn Plugin>> + Send + Sync>;

/// Named factories for runtimes, publishers and plugins.
///
/// Configs reference collaborators by name; the embedding application
/// registers what those names resolve to. A name with no registration is a
/// [`GenerateError::CollaboratorLoad`].
#[derive(Default)]
pub struct CollaboratorRegistry {
    runtimes: IndexMap<String, RuntimeFactory>,
    publishers: IndexMap<String, PublisherFactory>,
    plugins: IndexMap<String, PluginFactory>,
}

impl CollaboratorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the file runtime and JSON publisher.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    pub fn register_runtime<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Option<&Value>) -> Result<Runtime> + Send + Sync + 'static,
    {
        self.runtimes.insert(name.into(), Box::new(factory));
        self
    }

    pub fn register_publisher<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Option<&Value>) -> Result<Arc<dyn Publisher>> + Send + Sync + 'static,
    {
        self.publishers.insert(name.into(), Box::new(factory));
        self
    }

    pub fn register_plugin<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Option<&Value>) -> Result<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.plugins.insert(name.into(), Box::new(factory));
        self
    }

    pub fn load_runtime(
        &self,
        spec: &PluginSpec,
        options: Option<&Value>,
    ) -> Result<Runtime, GenerateError> {
        let factory = lookup(&self.runtimes, CollaboratorKind::Runtime, spec.name())?;
        factory(spec.options(options)).map_err(|e| load_error(CollaboratorKind::Runtime, spec, e))
    }

    pub fn load_publisher(
        &self,
        spec: &PluginSpec,
        options: Option<&Value>,
    ) -> Result<Arc<dyn Publisher>, GenerateError> {
        let factory = lookup(&self.publishers, CollaboratorKind::Publisher, spec.name())?;
        factory(spec.options(options)).map_err(|e| load_error(CollaboratorKind::Publisher, spec, e))
    }

    pub fn load_plugin(&self, spec: &PluginSpec) -> Result<Box<dyn Plugin>, GenerateError> {
        let factory = lookup(&self.plugins, CollaboratorKind::Plugin, spec.name())?;
        factory(spec.options(None)).map_err(|e| load_error(CollaboratorKind::Plugin, spec, e))
    }

    pub fn runtime_names(&self) -> impl Iterator<Item = &str> {
        self.runtimes.keys().map(String::as_str)
    }

    pub fn publisher_names(&self) -> impl Iterator<Item = &str> {
        self.publishers.keys().map(String::as_str)
    }
}

fn lookup<'a, T>(
    factories: &'a IndexMap<String, T>,
    kind: CollaboratorKind,
    name: &str,
) -> Result<&'a T, GenerateError> {
    factories.get(name).ok_or_else(|| GenerateError::CollaboratorLoad {
        kind,
        name: name.to_string(),
        reason: "no collaborator registered under this name".to_string(),
    })
}

fn load_error(kind: CollaboratorKind, spec: &PluginSpec, err: anyhow::Error) -> GenerateError {
    GenerateError::CollaboratorLoad {
        kind,
        name: spec.name().to_string(),
        reason: format!("{err:#}"),
    }
}
