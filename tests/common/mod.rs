//! Shared test doubles for the integration suites.

#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tjsdoc::models::{DocumentRecord, VirtualCode};
use tjsdoc::services::hooks::{
    CompleteEvent, HandleConfigEvent, HandleDocDataEvent, HandleDocDbEvent, HandleVirtualEvent,
    RegenerateEvent, ShutdownEvent, StartEvent,
};
use tjsdoc::services::{ParseOutput, Parser, PublishContext, Publisher};
use tjsdoc::{LifecycleHandle, Plugin};

/// A project directory with `src/` sources and a manifest.
pub struct Project {
    pub temp: TempDir,
    pub dir: Utf8PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        Self { temp, dir }
    }

    /// Project with two documented sources, a test file and a non-JS file.
    pub fn sample() -> Self {
        let project = Self::new();
        project.write("package.json", r#"{ "name": "demo", "version": "1.0.0", "main": "src/a.js" }"#);
        project.write("src/a.js", "/** A */\nexport class A {}\n");
        project.write("src/b.js", "function helper() {}\n/** B */\nfunction b() {}\n");
        project.write("src/c.txt", "not code");
        project.write("test/a.test.js", "describe('A', () => { it('works', () => {}); });\n");
        project
    }

    pub fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn path(&self, relative: &str) -> Utf8PathBuf {
        self.dir.join(relative)
    }

    /// Minimal valid config using the built-in runtime and publisher.
    pub fn config(&self) -> Value {
        json!({
            "source": "./src",
            "destination": "./docs",
            "runtime": "tjsdoc-runtime-file",
        })
    }
}

/// Shared log of `<plugin>:<hook>` entries.
pub type HookLog = Arc<Mutex<Vec<String>>>;

pub fn hook_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &HookLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Records every hook it sees.
pub struct RecordingPlugin {
    pub name: String,
    pub log: HookLog,
}

impl RecordingPlugin {
    pub fn new(name: &str, log: &HookLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
        }
    }

    fn push(&self, hook: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, hook));
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_handle_config(&mut self, _event: &mut HandleConfigEvent<'_>) -> Result<()> {
        self.push("onHandleConfig");
        Ok(())
    }

    async fn on_start(&mut self, _event: &mut StartEvent<'_>) -> Result<()> {
        self.push("onStart");
        Ok(())
    }

    async fn on_handle_virtual(&mut self, _event: &mut HandleVirtualEvent<'_>) -> Result<()> {
        self.push("onHandleVirtual");
        Ok(())
    }

    async fn on_handle_doc_data(&mut self, _event: &mut HandleDocDataEvent<'_>) -> Result<()> {
        self.push("onHandleDocData");
        Ok(())
    }

    async fn on_handle_doc_db(&mut self, _event: &mut HandleDocDbEvent<'_>) -> Result<()> {
        self.push("onHandleDocDB");
        Ok(())
    }

    async fn on_complete(&mut self, _event: &mut CompleteEvent<'_>) -> Result<()> {
        self.push("onComplete");
        Ok(())
    }

    async fn on_regenerate(&mut self, _event: &mut RegenerateEvent<'_>) -> Result<()> {
        self.push("onRegenerate");
        Ok(())
    }

    async fn on_shutdown(&mut self, _event: &mut ShutdownEvent<'_>) -> Result<()> {
        self.push("onShutdown");
        Ok(())
    }
}

/// What [`KeepAlivePlugin`] does in each `onComplete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteAction {
    Regenerate,
    Shutdown,
    /// Keep alive but drop the handle.
    DropHandle,
    /// Keep alive and hand the handle out through `handles`.
    Stash,
}

/// Asks to stay resident and scripts the signals sent from `onComplete`.
pub struct KeepAlivePlugin {
    script: Vec<CompleteAction>,
    pub record_counts: Arc<Mutex<Vec<usize>>>,
    pub handles: Arc<Mutex<Vec<LifecycleHandle>>>,
}

impl KeepAlivePlugin {
    pub fn new(script: &[CompleteAction]) -> Self {
        Self {
            script: script.iter().rev().copied().collect(),
            record_counts: Arc::new(Mutex::new(Vec::new())),
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Plugin for KeepAlivePlugin {
    fn name(&self) -> &str {
        "keep-alive"
    }

    async fn on_complete(&mut self, event: &mut CompleteEvent<'_>) -> Result<()> {
        self.record_counts.lock().unwrap().push(event.db.len());

        let Some(action) = self.script.pop() else {
            return Ok(());
        };
        event.keep_alive = true;

        match action {
            CompleteAction::Regenerate => event.handle.regenerate()?,
            CompleteAction::Shutdown => event.handle.shutdown()?,
            CompleteAction::DropHandle => {}
            CompleteAction::Stash => self.handles.lock().unwrap().push(event.handle.clone()),
        }
        Ok(())
    }
}

/// Contributes one virtual fragment per pass.
pub struct VirtualPlugin;

#[async_trait]
impl Plugin for VirtualPlugin {
    fn name(&self) -> &str {
        "virtual"
    }

    async fn on_handle_virtual(&mut self, event: &mut HandleVirtualEvent<'_>) -> Result<()> {
        event
            .code
            .push(VirtualCode::new("builtin-globals", "/** Globals */\nclass Globals {}\n"));
        Ok(())
    }
}

/// Fails in `onHandleDocDB`.
pub struct FailingPlugin;

#[async_trait]
impl Plugin for FailingPlugin {
    fn name(&self) -> &str {
        "failing-plugin"
    }

    async fn on_handle_doc_db(&mut self, _event: &mut HandleDocDbEvent<'_>) -> Result<()> {
        bail!("doc db rejected")
    }
}

/// One `class` record per file, named after the file. `broken*` files fail.
#[derive(Debug, Default)]
pub struct StubParser;

impl Parser for StubParser {
    fn parse_file(
        &self,
        _dir_path: &Utf8Path,
        file_path: &Utf8Path,
        _package_name: Option<&str>,
        _main_file_path: Option<&str>,
    ) -> Result<Option<ParseOutput>> {
        let name = file_path.file_name().unwrap_or_default();
        if name.starts_with("broken") {
            bail!("unexpected token");
        }

        Ok(Some(ParseOutput {
            records: vec![DocumentRecord::new("class").with_field("name", name)],
            ast: None,
        }))
    }

    fn parse_code(&self, _dir_path: &Utf8Path, _code: &str) -> Result<Option<ParseOutput>> {
        Ok(None)
    }

    fn parse_test(
        &self,
        _test_type: &str,
        _dir_path: &Utf8Path,
        _file_path: &Utf8Path,
    ) -> Result<Option<ParseOutput>> {
        Ok(None)
    }
}

/// Captures the record names of every publish instead of writing files.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    pub published: Arc<Mutex<Vec<Vec<String>>>>,
    /// Skipped files visible to each publish.
    pub invalid_code: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, ctx: &mut PublishContext<'_>) -> Result<()> {
        let names: Vec<String> = ctx.db.read(|db| {
            db.records
                .iter()
                .map(|record| format!("{}:{}", record.kind, record.name().unwrap_or_default()))
                .collect()
        });
        self.published.lock().unwrap().push(names);
        self.invalid_code
            .lock()
            .unwrap()
            .push(ctx.run_state.invalid_code.iter().map(ToString::to_string).collect());
        ctx.run_state.add_menu_link("Memory", "memory");
        Ok(())
    }
}

/// Publisher that always fails.
#[derive(Debug, Default)]
pub struct FailingPublisher;

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, _ctx: &mut PublishContext<'_>) -> Result<()> {
        bail!("disk full")
    }
}
