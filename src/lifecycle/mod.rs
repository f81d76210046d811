//! Lifecycle coordination.
//!
//! The [`Coordinator`] owns the plugin dispatcher, the Doc Database and the
//! lifecycle state machine, and drives one run from configuration to
//! shutdown:
//!
//! ```text
//! Init -> Configuring -> Discovering -> Generating -> Resolving -> Publishing -> Completing
//!                                          ^                                       |
//!                                          |                          keepAlive?   v
//!                                     Regenerating <---- regenerate ---------- Idle
//!                                                                               |
//!                                       Terminated <---- shutdown / no handles -+
//! ```

pub mod error_handler;
pub mod signals;

pub use error_handler::{ErrorHandler, FATAL_EXIT_CODE, FatalKind, FatalReport};
pub use signals::{LifecycleHandle, Signal};

use crate::config::ConfigResolver;
use crate::error::{CollaboratorFailure, GenerateError};
use crate::logging::LogLevelHandle;
use crate::metrics::Metrics;
use crate::models::{DocDatabase, InvalidCode, LogLevel, PackageMetadata, RunConfig, RunState};
use crate::services::builtin::{DefaultPackageFormatter, DiagnosticsPlugin};
use crate::services::discovery::{self, FileCandidate, FileDiscovery, FsGlobHydrator};
use crate::services::hooks::{
    CompleteEvent, HandleConfigEvent, HandleDocDataEvent, HandleDocDbEvent, HandleVirtualEvent,
    HookDispatcher, Plugin, RegenerateEvent, ShutdownEvent, StartEvent,
};
use crate::services::pipeline::{FileReparser, GenerationPipeline, OnParseError};
use crate::services::{
    CollaboratorRegistry, GlobHydrator, PackageFormatter, PublishContext, Publisher, Runtime,
};
use crate::state::{DocStore, LifecycleState, StateMachine, Transition};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use signals::SignalChannel;
use std::sync::Arc;

/// Everything resolved during configuration, kept for the rest of the run.
struct Session {
    config: Arc<RunConfig>,
    run_state: RunState,
    package: Arc<PackageMetadata>,
    runtime: Runtime,
    publisher: Arc<dyn Publisher>,

    /// Discovered in `Discovering`, consumed by the first pass.
    discovered: Option<Candidates>,
}

impl Session {
    fn reparser(&self, metrics: &Arc<Metrics>) -> FileReparser {
        FileReparser::new(
            Arc::clone(&self.config),
            self.runtime.clone(),
            Arc::clone(&self.package),
            Arc::clone(metrics),
        )
    }
}

struct Candidates {
    main: Vec<FileCandidate>,
    tests: Vec<FileCandidate>,
}

/// Copy of the run state file lists, to notice plugin edits.
#[derive(PartialEq)]
struct FileLists {
    main: Option<Vec<Utf8PathBuf>>,
    tests: Option<Vec<Utf8PathBuf>>,
}

impl FileLists {
    fn of(run_state: &RunState) -> Self {
        Self {
            main: run_state.source_files.clone(),
            tests: run_state.test_source_files.clone(),
        }
    }
}

/// Builder for [`Coordinator`].
#[derive(Default)]
pub struct CoordinatorBuilder {
    dir_path: Option<Utf8PathBuf>,
    registry: Option<CollaboratorRegistry>,
    plugins: Vec<Box<dyn Plugin>>,
    hydrator: Option<Box<dyn GlobHydrator>>,
    formatter: Option<Box<dyn PackageFormatter>>,
    log_level: Option<LogLevelHandle>,
}

impl CoordinatorBuilder {
    /// Working directory for path resolution. Defaults to the process cwd.
    pub fn working_dir(mut self, dir_path: impl Into<Utf8PathBuf>) -> Self {
        self.dir_path = Some(dir_path.into());
        self
    }

    /// Collaborators configs may name. Defaults to the built-ins.
    pub fn registry(mut self, registry: CollaboratorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// A plugin registered after the ones named in the config.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn hydrator(mut self, hydrator: impl GlobHydrator + 'static) -> Self {
        self.hydrator = Some(Box::new(hydrator));
        self
    }

    pub fn package_formatter(mut self, formatter: impl PackageFormatter + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    /// Lets the coordinator apply `config.logLevel`.
    pub fn log_level_handle(mut self, handle: LogLevelHandle) -> Self {
        self.log_level = Some(handle);
        self
    }

    pub fn build(self) -> Result<Coordinator> {
        let dir_path = match self.dir_path {
            Some(dir_path) => dir_path,
            None => {
                let cwd = std::env::current_dir().context("Failed to read the working directory")?;
                Utf8PathBuf::try_from(cwd).context("Working directory is not valid UTF-8")?
            }
        };

        let metrics = Arc::new(Metrics::new());

        Ok(Coordinator {
            dir_path,
            registry: self.registry.unwrap_or_else(CollaboratorRegistry::with_builtins),
            pending_plugins: self.plugins,
            hydrator: self.hydrator.unwrap_or_else(|| Box::new(FsGlobHydrator)),
            formatter: self.formatter.unwrap_or_else(|| Box::new(DefaultPackageFormatter)),
            log_level: self.log_level,
            dispatcher: HookDispatcher::new(Arc::clone(&metrics)),
            machine: StateMachine::new(),
            store: DocStore::new(),
            metrics,
            signals: SignalChannel::new(),
            config: None,
            package_message: None,
        })
    }
}

/// Drives a generation run and owns everything lent to plugins.
pub struct Coordinator {
    dir_path: Utf8PathBuf,
    registry: CollaboratorRegistry,
    pending_plugins: Vec<Box<dyn Plugin>>,
    hydrator: Box<dyn GlobHydrator>,
    formatter: Box<dyn PackageFormatter>,
    log_level: Option<LogLevelHandle>,
    dispatcher: HookDispatcher,
    machine: StateMachine,
    store: DocStore,
    metrics: Arc<Metrics>,
    signals: SignalChannel,
    config: Option<Arc<RunConfig>>,
    package_message: Option<String>,
}

impl Coordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.machine.current()
    }

    pub fn history(&self) -> &[Transition] {
        self.machine.history()
    }

    /// Handle to the Doc Database; stays valid across regeneration.
    pub fn store(&self) -> DocStore {
        self.store.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// The resolved config, once configuration succeeded.
    pub fn config(&self) -> Option<Arc<RunConfig>> {
        self.config.clone()
    }

    pub fn dir_path(&self) -> &Utf8Path {
        &self.dir_path
    }

    /// Signal handle for callers outside the plugin set.
    pub fn handle(&mut self) -> Result<LifecycleHandle, GenerateError> {
        if self.machine.current().is_terminal() {
            return Err(GenerateError::Terminated);
        }
        Ok(self.signals.handle())
    }

    /// Error handler configured from the resolved config, if any.
    pub fn error_handler(&self) -> ErrorHandler {
        let full_stack_trace = self.config.as_ref().is_some_and(|config| config.full_stack_trace);
        let handler = ErrorHandler::new(full_stack_trace);
        match &self.package_message {
            Some(message) => handler.with_package_message(message.as_str()),
            None => handler,
        }
    }

    /// Run the whole lifecycle for `raw` config.
    ///
    /// Returns once the coordinator terminated: right after the first pass,
    /// or after a shutdown signal when a plugin asked to keep alive. On error
    /// the coordinator is terminated without firing `onShutdown`; pass the
    /// error to [`error_handler`](Self::error_handler).
    pub async fn generate(&mut self, raw: Value) -> Result<()> {
        let result = self.run(raw).await;
        if result.is_err() {
            self.abort();
        }
        result
    }

    async fn run(&mut self, raw: Value) -> Result<()> {
        self.machine.transition(LifecycleState::Configuring)?;
        let mut session = self.configure(raw).await?;

        self.machine.transition(LifecycleState::Discovering)?;
        let candidates = self.discover(&mut session)?;
        tracing::info!(
            "discovered {} source files and {} test files",
            candidates.main.len(),
            candidates.tests.len()
        );
        session.discovered = Some(candidates);

        loop {
            self.machine.transition(LifecycleState::Generating)?;
            self.generate_pass(&mut session).await?;

            self.machine.transition(LifecycleState::Resolving)?;
            self.resolve(&session)?;

            self.machine.transition(LifecycleState::Publishing)?;
            self.publish(&mut session).await?;

            self.machine.transition(LifecycleState::Completing)?;
            let keep_alive = self.complete(&session).await?;
            self.metrics.record_pass();

            if !keep_alive {
                break;
            }

            self.machine.transition(LifecycleState::Idle)?;
            tracing::info!("keep alive: waiting for regenerate or shutdown");

            match self.signals.wait().await {
                Some(Signal::Regenerate) => {
                    self.machine.transition(LifecycleState::Regenerating)?;
                    self.regenerate(&mut session).await?;
                }
                Some(Signal::Shutdown) => {
                    tracing::info!("shutdown requested");
                    break;
                }
                None => {
                    tracing::info!("no lifecycle handles left; shutting down");
                    break;
                }
            }
        }

        self.shutdown(&session.config).await
    }

    async fn configure(&mut self, raw: Value) -> Result<Session> {
        self.dispatcher.register(Box::new(DiagnosticsPlugin::default()))?;

        let resolver = ConfigResolver::new(&self.dir_path);
        let mut raw_config = resolver.load(raw)?;
        self.apply_log_level(raw_config.log_level);

        let runtime_spec = raw_config
            .runtime
            .clone()
            .ok_or_else(|| GenerateError::validation("'runtime' is required"))?;
        let runtime = self
            .registry
            .load_runtime(&runtime_spec, raw_config.runtime_options.as_ref())?;
        tracing::info!("runtime: {}", runtime.name);

        for spec in &raw_config.plugins {
            let plugin = self.registry.load_plugin(spec)?;
            self.dispatcher.register(plugin)?;
        }
        for plugin in self.pending_plugins.drain(..) {
            self.dispatcher.register(plugin)?;
        }

        self.dispatcher
            .on_handle_config(&mut HandleConfigEvent {
                config: &mut raw_config,
            })
            .await?;

        let (config, run_state) = resolver.finalize(raw_config)?;
        self.apply_log_level(config.log_level);

        // Loaded after `onHandleConfig` so plugins may swap the publisher
        let publisher = self
            .registry
            .load_publisher(&config.publisher, config.publisher_options.as_ref())?;

        let package = Arc::new(self.load_package(&config.package));
        self.package_message = Some(package.formatted().formatted_message.clone());
        self.config = Some(Arc::clone(&config));

        Ok(Session {
            config,
            run_state,
            package,
            runtime,
            publisher,
            discovered: None,
        })
    }

    fn discover(&self, session: &mut Session) -> Result<Candidates> {
        let discovery = FileDiscovery::new(self.hydrator.as_ref(), &self.metrics);

        Ok(Candidates {
            main: discovery.discover_main(&session.config, &mut session.run_state)?,
            tests: discovery.discover_tests(&session.config, &mut session.run_state)?,
        })
    }

    async fn generate_pass(&mut self, session: &mut Session) -> Result<()> {
        let before = FileLists::of(&session.run_state);
        self.dispatcher
            .on_start(&mut StartEvent {
                config: &session.config,
                package: &session.package,
                db: &self.store,
                run_state: &mut session.run_state,
            })
            .await?;

        // Plugins may have edited the file lists in `onStart` or `onRegenerate`
        let candidates = match session.discovered.take() {
            Some(candidates) if before == FileLists::of(&session.run_state) => candidates,
            _ => self.discover(session)?,
        };

        let pipeline = GenerationPipeline::new(
            &session.config,
            session.runtime.parser.as_ref(),
            &session.package,
            &self.metrics,
        );
        let policy = OnParseError::LogAndSkip;

        pipeline.parse_sources(&candidates.main, &self.store, policy)?;
        if let Some(test) = &session.config.test {
            pipeline.parse_tests(&test.test_type, &candidates.tests, &self.store, policy)?;
        }

        let mut virtual_event = HandleVirtualEvent {
            config: &session.config,
            code: Vec::new(),
        };
        self.dispatcher.on_handle_virtual(&mut virtual_event).await?;
        pipeline.parse_virtual(&virtual_event.code, &self.store, policy)?;
        session.run_state.invalid_code = pipeline.take_invalid_code();

        let mut data_event = HandleDocDataEvent {
            config: &session.config,
            records: self.store.take_records(),
        };
        self.dispatcher.on_handle_doc_data(&mut data_event).await?;

        let mut records = data_event.records;
        if !session.config.include_source {
            let stripped = DocDatabase::strip_source(&mut records);
            tracing::debug!("stripped source text from {} records", stripped);
        }
        self.store.replace_records(records);

        self.dispatcher
            .on_handle_doc_db(&mut HandleDocDbEvent {
                config: &session.config,
                db: &self.store,
            })
            .await?;

        tracing::info!("generated {} records", self.store.len());
        Ok(())
    }

    fn resolve(&self, session: &Session) -> Result<()> {
        let resolver = Arc::clone(&session.runtime.resolver);
        let mut result = Ok(());
        self.store.update(|db| result = resolver.resolve(db));

        result.with_context(|| CollaboratorFailure::new(session.runtime.name.as_str(), "resolve"))
    }

    async fn publish(&mut self, session: &mut Session) -> Result<()> {
        if session.config.empty_destination {
            empty_destination(&session.config.destination, &self.dir_path).await?;
        }

        let publisher_name = session.config.publisher.name().to_string();
        tracing::info!("publishing with: {}", publisher_name);

        let mut ctx = PublishContext {
            config: &session.config,
            package: &session.package,
            db: &self.store,
            run_state: &mut session.run_state,
        };
        session
            .publisher
            .publish(&mut ctx)
            .await
            .with_context(|| CollaboratorFailure::new(publisher_name.as_str(), "publish"))?;

        if session.config.doc_coverage {
            let coverage = self.store.read(DocDatabase::coverage);
            tracing::info!("coverage: {}", coverage);
        }

        if let Some(report) = invalid_code_report(&session.run_state.invalid_code) {
            tracing::warn!("{}", report);
        }

        Ok(())
    }

    async fn complete(&mut self, session: &Session) -> Result<bool> {
        let mut event = CompleteEvent {
            config: &session.config,
            db: &self.store,
            handle: self.signals.handle(),
            reparser: session.reparser(&self.metrics),
            keep_alive: false,
        };
        self.dispatcher.on_complete(&mut event).await?;

        Ok(event.keep_alive)
    }

    async fn regenerate(&mut self, session: &mut Session) -> Result<()> {
        self.store.reset();
        session.run_state.menu_links.clear();
        tracing::info!("regenerating (generation {})", self.store.generation());

        let reparser = session.reparser(&self.metrics);
        self.dispatcher
            .on_regenerate(&mut RegenerateEvent {
                config: &session.config,
                db: &self.store,
                run_state: &mut session.run_state,
                reparser,
            })
            .await
    }

    async fn shutdown(&mut self, config: &RunConfig) -> Result<()> {
        self.machine.transition(LifecycleState::Terminated)?;

        let result = self
            .dispatcher
            .on_shutdown(&mut ShutdownEvent {
                config: Some(config),
            })
            .await;

        self.dispatcher.destroy();
        self.signals.close();
        self.metrics.log_summary();
        result
    }

    /// Terminate after an error. No hooks fire.
    fn abort(&mut self) {
        if !self.machine.current().is_terminal() {
            // Any state may move to Terminated
            let _ = self.machine.transition(LifecycleState::Terminated);
        }
        self.dispatcher.destroy();
        self.signals.close();
    }

    fn apply_log_level(&self, level: LogLevel) {
        if let Some(handle) = &self.log_level {
            if let Err(e) = handle.set_level(level) {
                tracing::warn!("{:#}", e);
            }
        }
    }

    /// Read and format the target manifest. A missing or unreadable manifest
    /// yields empty metadata.
    fn load_package(&self, path: &Utf8Path) -> PackageMetadata {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!("no package manifest at {}: {}", path, e);
                return PackageMetadata::empty();
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(raw) => {
                let formatted = self.formatter.format(&raw);
                PackageMetadata::new(raw, formatted)
            }
            Err(e) => {
                tracing::warn!("Ignoring unparsable package manifest {}: {}", path, e);
                PackageMetadata::empty()
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("dir_path", &self.dir_path)
            .field("state", &self.machine.current())
            .field("dispatcher", &self.dispatcher)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Summary of the files skipped this pass, one line per file.
fn invalid_code_report(invalid: &[InvalidCode]) -> Option<String> {
    if invalid.is_empty() {
        return None;
    }

    let mut report = format!("invalid code: {} skipped", invalid.len());
    for entry in invalid {
        report.push_str("\n  ");
        report.push_str(&entry.to_string());
    }
    Some(report)
}

/// Whether emptying `destination` would remove `dir_path`: the destination is
/// the working directory or one of its ancestors. Checked lexically, and
/// again on canonical paths when both exist so symlinks cannot hide it.
async fn contains_working_dir(destination: &Utf8Path, dir_path: &Utf8Path) -> bool {
    if discovery::normalize(dir_path).starts_with(discovery::normalize(destination)) {
        return true;
    }

    match (
        tokio::fs::canonicalize(destination).await,
        tokio::fs::canonicalize(dir_path).await,
    ) {
        (Ok(destination), Ok(dir_path)) => dir_path.starts_with(destination),
        _ => false,
    }
}

/// Remove everything inside `destination`, keeping the directory itself.
async fn empty_destination(destination: &Utf8Path, dir_path: &Utf8Path) -> Result<()> {
    if contains_working_dir(destination, dir_path).await {
        return Err(GenerateError::validation(format!(
            "refusing to empty destination {} because it contains the working directory",
            destination
        ))
        .into());
    }

    let mut entries = match tokio::fs::read_dir(destination).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read destination: {}", destination));
        }
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to read destination: {}", destination))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("Failed to inspect {}", path.display()))?;

        let removed = if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        removed.with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    tracing::info!("emptied destination: {}", destination);
    Ok(())
}
