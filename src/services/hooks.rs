//! Plugin hook protocol.
//!
//! A [`Plugin`] overrides the hooks it cares about; the [`HookDispatcher`]
//! invokes every registered plugin in registration order, awaiting each one
//! before moving on. Payloads are passed by mutable reference, so whatever
//! one plugin changes is seen by the next plugin and by the pipeline.

use crate::error::{CollaboratorFailure, GenerateError};
use crate::lifecycle::LifecycleHandle;
use crate::metrics::Metrics;
use crate::models::{DocumentRecord, PackageMetadata, RawConfig, RunConfig, RunState, VirtualCode};
use crate::services::pipeline::FileReparser;
use crate::state::DocStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// The closed set of extension points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HookPoint {
    HandleConfig,
    Start,
    HandleVirtual,
    HandleDocData,
    HandleDocDb,
    Complete,
    Regenerate,
    Shutdown,
}

impl HookPoint {
    /// Every hook point in pipeline order.
    pub const ALL: [HookPoint; 8] = [
        HookPoint::HandleConfig,
        HookPoint::Start,
        HookPoint::HandleVirtual,
        HookPoint::HandleDocData,
        HookPoint::HandleDocDb,
        HookPoint::Complete,
        HookPoint::Regenerate,
        HookPoint::Shutdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HookPoint::HandleConfig => "onHandleConfig",
            HookPoint::Start => "onStart",
            HookPoint::HandleVirtual => "onHandleVirtual",
            HookPoint::HandleDocData => "onHandleDocData",
            HookPoint::HandleDocDb => "onHandleDocDB",
            HookPoint::Complete => "onComplete",
            HookPoint::Regenerate => "onRegenerate",
            HookPoint::Shutdown => "onShutdown",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The loaded configuration, before post-validation.
pub struct HandleConfigEvent<'a> {
    pub config: &'a mut RawConfig,
}

/// A generation pass is about to parse sources.
pub struct StartEvent<'a> {
    pub config: &'a RunConfig,
    pub package: &'a PackageMetadata,
    pub db: &'a DocStore,
    /// File lists may be appended to or replaced here.
    pub run_state: &'a mut RunState,
}

/// Collects in-memory code to parse after the file sources.
pub struct HandleVirtualEvent<'a> {
    pub config: &'a RunConfig,
    pub code: Vec<VirtualCode>,
}

/// Extracted records of the pass, handed back to the database after every plugin ran.
pub struct HandleDocDataEvent<'a> {
    pub config: &'a RunConfig,
    pub records: Vec<DocumentRecord>,
}

/// The assembled database, before resolution.
pub struct HandleDocDbEvent<'a> {
    pub config: &'a RunConfig,
    pub db: &'a DocStore,
}

/// Publishing finished.
pub struct CompleteEvent<'a> {
    pub config: &'a RunConfig,
    pub db: &'a DocStore,

    /// Signal channel for later `regenerate` / `shutdown` requests.
    pub handle: LifecycleHandle,

    /// Re-parses single files, surfacing parse errors to the caller.
    pub reparser: FileReparser,

    /// Set to keep the coordinator resident after this pass.
    pub keep_alive: bool,
}

/// A new pass starts after the database was reset.
pub struct RegenerateEvent<'a> {
    pub config: &'a RunConfig,
    pub db: &'a DocStore,
    pub run_state: &'a mut RunState,
    pub reparser: FileReparser,
}

/// Final teardown. `config` is absent when the run never got past configuration.
pub struct ShutdownEvent<'a> {
    pub config: Option<&'a RunConfig>,
}

/// A lifecycle extension.
///
/// Every hook defaults to a no-op. A returned error aborts the run and is
/// attributed to [`name`](Plugin::name).
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn on_handle_config(&mut self, _event: &mut HandleConfigEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_start(&mut self, _event: &mut StartEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_handle_virtual(&mut self, _event: &mut HandleVirtualEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_handle_doc_data(&mut self, _event: &mut HandleDocDataEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_handle_doc_db(&mut self, _event: &mut HandleDocDbEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_complete(&mut self, _event: &mut CompleteEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_regenerate(&mut self, _event: &mut RegenerateEvent<'_>) -> Result<()> {
        Ok(())
    }

    async fn on_shutdown(&mut self, _event: &mut ShutdownEvent<'_>) -> Result<()> {
        Ok(())
    }
}

/// Invokes one hook on every plugin in order, attributing failures.
macro_rules! dispatch {
    ($self:ident, $point:expr, $method:ident, $event:expr) => {{
        let point: HookPoint = $point;
        if $self.destroyed {
            return Err(GenerateError::Terminated.into());
        }

        for plugin in $self.plugins.iter_mut() {
            tracing::debug!("{} -> {}", point, plugin.name());
            $self.metrics.record_hook_invocation();

            let result = plugin.$method($event).await;
            result.with_context(|| CollaboratorFailure::new(plugin.name(), point.as_str()))?;
        }

        Ok(())
    }};
}

/// Owns the registered plugins for one coordinator.
pub struct HookDispatcher {
    plugins: Vec<Box<dyn Plugin>>,
    metrics: Arc<Metrics>,
    destroyed: bool,
}

impl HookDispatcher {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            plugins: Vec::new(),
            metrics,
            destroyed: false,
        }
    }

    /// Append a plugin; it runs after every plugin registered before it.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), GenerateError> {
        if self.destroyed {
            return Err(GenerateError::Terminated);
        }

        tracing::debug!("registered plugin: {}", plugin.name());
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub async fn on_handle_config(&mut self, event: &mut HandleConfigEvent<'_>) -> Result<()> {
        dispatch!(self, HookPoint::HandleConfig, on_handle_config, event)
    }

    pub async fn on_start(&mut self, event: &mut StartEvent<'_>) -> Result<()> {
        dispatch!(self, HookPoint::Start, on_start, event)
    }

    pub async fn on_handle_virtual(&mut self, event: &mut HandleVirtualEvent<'_>) -> Result<()> {
        dispatch!(self, HookPoint::HandleVirtual, on_handle_virtual, event)
    }

    pub async fn on_handle_doc_data(&mut self, event: &mut HandleDocDataEvent<'_>) -> Result<()> {
        dispatch!(self, HookPoint::HandleDocData, on_handle_doc_data, event)
    }

    pub async fn on_handle_doc_db(&mut self, event: &mut HandleDocDbEvent<'_>) -> Result<()> {
        dispatch!(self, HookPoint::HandleDocDb, on_handle_doc_db, event)
    }

    pub async fn on_complete(&mut self, event: &mut CompleteEvent<'_>) -> Result<()> {
        dispatch!(self, HookPoint::Complete, on_complete, event)
    }

    pub async fn on_regenerate(&mut self, event: &mut RegenerateEvent<'_>) -> Result<()> {
        dispatch!(self, HookPoint::Regenerate, on_regenerate, event)
    }

    pub async fn on_shutdown(&mut self, event: &mut ShutdownEvent<'_>) -> Result<()> {
        dispatch!(self, HookPoint::Shutdown, on_shutdown, event)
    }

    /// Release every plugin. Later hook invocations fail with
    /// [`GenerateError::Terminated`].
    pub fn destroy(&mut self) {
        if !self.destroyed {
            tracing::debug!("releasing {} plugins", self.plugins.len());
            self.plugins.clear();
            self.destroyed = true;
        }
    }
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("plugins", &self.plugin_names())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    struct Appender {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for Appender {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_handle_virtual(&mut self, event: &mut HandleVirtualEvent<'_>) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{} saw {}", self.name, event.code.len()));
            event.code.push(VirtualCode::new(self.name, "class A {}"));
            Ok(())
        }

        async fn on_shutdown(&mut self, _event: &mut ShutdownEvent<'_>) -> Result<()> {
            tokio::task::yield_now().await;
            self.log.lock().unwrap().push(format!("{} shutdown", self.name));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Plugin for Failing {
        fn name(&self) -> &str {
            "my-broken-plugin"
        }

        async fn on_shutdown(&mut self, _event: &mut ShutdownEvent<'_>) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    fn dispatcher_with(names: &[&'static str], log: &Arc<Mutex<Vec<String>>>) -> HookDispatcher {
        let mut dispatcher = HookDispatcher::new(Arc::new(Metrics::new()));
        for name in names {
            dispatcher
                .register(Box::new(Appender {
                    name,
                    log: Arc::clone(log),
                }))
                .unwrap();
        }
        dispatcher
    }

    #[tokio::test]
    async fn test_registration_order_and_shared_payload() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = dispatcher_with(&["first", "second"], &log);
        let config = RunConfig::for_tests(camino::Utf8Path::new("/p"), None, Default::default());

        let mut event = HandleVirtualEvent {
            config: &config,
            code: Vec::new(),
        };
        dispatcher.on_handle_virtual(&mut event).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first saw 0", "second saw 1"]);
        assert_eq!(event.code.len(), 2);
    }

    #[tokio::test]
    async fn test_async_hooks_awaited_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = dispatcher_with(&["a", "b", "c"], &log);

        dispatcher
            .on_shutdown(&mut ShutdownEvent { config: None })
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a shutdown", "b shutdown", "c shutdown"]);
    }

    #[tokio::test]
    async fn test_failure_is_attributed_to_plugin() {
        let mut dispatcher = HookDispatcher::new(Arc::new(Metrics::new()));
        dispatcher.register(Box::new(Failing)).unwrap();

        let err = dispatcher
            .on_shutdown(&mut ShutdownEvent { config: None })
            .await
            .unwrap_err();

        let failure = err.downcast_ref::<CollaboratorFailure>().unwrap();
        assert_eq!(failure.module, "my-broken-plugin");
        assert_eq!(failure.stage, "onShutdown");
        assert!(!failure.is_builtin());
    }

    #[tokio::test]
    async fn test_destroyed_dispatcher_rejects_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = dispatcher_with(&["a"], &log);

        dispatcher.destroy();

        assert!(dispatcher.is_empty());
        let err = dispatcher
            .on_shutdown(&mut ShutdownEvent { config: None })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<GenerateError>(), Some(GenerateError::Terminated)));
        assert!(dispatcher.register(Box::new(Failing)).is_err());
    }

    #[tokio::test]
    async fn test_hook_invocations_counted() {
        let metrics = Arc::new(Metrics::new());
        let mut dispatcher = HookDispatcher::new(Arc::clone(&metrics));
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            dispatcher
                .register(Box::new(Appender {
                    name,
                    log: Arc::clone(&log),
                }))
                .unwrap();
        }

        dispatcher
            .on_shutdown(&mut ShutdownEvent { config: None })
            .await
            .unwrap();

        assert_eq!(metrics.hook_invocations.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_hook_names() {
        assert_eq!(HookPoint::HandleDocDb.to_string(), "onHandleDocDB");
        assert_eq!(HookPoint::ALL.len(), 8);
    }
}
