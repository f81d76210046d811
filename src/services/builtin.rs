//! Collaborators shipped with the orchestrator.
//!
//! - [`FileRuntime`]: a lightweight declaration scanner standing in for a full parser
//! - [`IndexResolver`]: indexes records by name
//! - [`JsonPublisher`]: writes the database as JSON into the destination
//! - [`DiagnosticsPlugin`]: logs every hook invocation, always registered first
//! - [`DefaultPackageFormatter`]: builds the formatted package view

use crate::models::{DocDatabase, DocumentRecord, FormattedPackage, MenuLink, RunConfig};
use crate::services::collaborators::{
    DocResolver, PackageFormatter, ParseOutput, Parser, PublishContext, Publisher, Runtime,
};
use crate::services::discovery;
use crate::services::hooks::{
    CompleteEvent, HandleConfigEvent, HandleDocDataEvent, HandleDocDbEvent, HandleVirtualEvent,
    Plugin, RegenerateEvent, ShutdownEvent, StartEvent,
};
use crate::services::registry::CollaboratorRegistry;
use crate::state::{DocChange, DocStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use camino::Utf8Path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use tokio::sync::broadcast::{self, error::TryRecvError};

pub const FILE_RUNTIME: &str = "tjsdoc-runtime-file";
pub const JSON_PUBLISHER: &str = "tjsdoc-publisher-json";
pub const DIAGNOSTICS_PLUGIN: &str = "tjsdoc-plugin-diagnostics";

/// Register the built-in runtime, publisher and diagnostics plugin.
pub fn register(registry: &mut CollaboratorRegistry) {
    registry
        .register_runtime(FILE_RUNTIME, |_| {
            Ok(Runtime {
                name: FILE_RUNTIME.to_string(),
                parser: Arc::new(FileRuntime),
                resolver: Arc::new(IndexResolver),
            })
        })
        .register_publisher(JSON_PUBLISHER, |options| {
            Ok(Arc::new(JsonPublisher::from_options(options)?) as Arc<dyn Publisher>)
        })
        .register_plugin(DIAGNOSTICS_PLUGIN, |_| {
            Ok(Box::new(DiagnosticsPlugin::default()) as Box<dyn Plugin>)
        });
}

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:export[ \t]+(?:default[ \t]+)?)?(?:async[ \t]+)?(class|function\*?)[ \t]+([A-Za-z_$][\w$]*)")
        .expect("Invalid declaration regex")
});

static TEST_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)\b(describe|context|it)\s*\(\s*['"`]([^'"`]*)['"`]"#)
        .expect("Invalid test block regex")
});

/// Scans sources for top-level class and function declarations.
///
/// Emits one `file` record carrying the source text, followed by one record
/// per declaration. A declaration not directly preceded by a `/** */` block
/// is flagged `undocument: true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRuntime;

impl FileRuntime {
    fn read(file_path: &Utf8Path) -> Result<String> {
        std::fs::read_to_string(file_path).with_context(|| format!("Failed to read {}", file_path))
    }

    fn scan(code: &str, memberof: &str, file_kind: &str) -> ParseOutput {
        let mut records = vec![
            DocumentRecord::new(file_kind)
                .with_field("name", memberof)
                .with_content(code),
        ];
        let mut declarations = Vec::new();

        for captures in DECLARATION.captures_iter(code) {
            let (Some(whole), Some(kind), Some(name)) = (captures.get(0), captures.get(1), captures.get(2)) else {
                continue;
            };

            let kind = kind.as_str().trim_end_matches('*');
            let line = code[..whole.start()].lines().count() + 1;
            let documented = code[..whole.start()].trim_end().ends_with("*/");

            records.push(
                DocumentRecord::new(kind)
                    .with_field("name", name.as_str())
                    .with_field("longname", format!("{memberof}~{}", name.as_str()))
                    .with_field("memberof", memberof)
                    .with_field("lineNumber", line)
                    .with_field("undocument", !documented),
            );
            declarations.push(json!({ "kind": kind, "name": name.as_str(), "line": line }));
        }

        let ast = json!({
            "type": "Program",
            "lines": code.lines().count(),
            "declarations": declarations,
        });

        ParseOutput {
            records,
            ast: Some(ast),
        }
    }
}

impl Parser for FileRuntime {
    fn parse_file(
        &self,
        dir_path: &Utf8Path,
        file_path: &Utf8Path,
        package_name: Option<&str>,
        main_file_path: Option<&str>,
    ) -> Result<Option<ParseOutput>> {
        let code = Self::read(file_path)?;
        if code.trim().is_empty() {
            return Ok(None);
        }

        let relative = discovery::relative_path(dir_path, file_path);
        let mut output = Self::scan(&code, &relative, "file");

        // The package main file is documented under the package name.
        if let (Some(package), Some(main)) = (package_name, main_file_path) {
            if Utf8Path::new(main) == file_path {
                for record in output.records.iter_mut().skip(1) {
                    record.fields.insert("importPath".into(), Value::from(package));
                }
            }
        }

        Ok(Some(output))
    }

    fn parse_code(&self, _dir_path: &Utf8Path, code: &str) -> Result<Option<ParseOutput>> {
        let mut output = Self::scan(code, "virtual", "file");
        // No file record for in-memory code.
        output.records.remove(0);
        output.ast = None;
        Ok((!output.records.is_empty()).then_some(output))
    }

    fn parse_test(&self, test_type: &str, dir_path: &Utf8Path, file_path: &Utf8Path) -> Result<Option<ParseOutput>> {
        let code = Self::read(file_path)?;
        let relative = discovery::relative_path(dir_path, file_path);

        let mut records = vec![
            DocumentRecord::new("testFile")
                .with_field("name", relative.as_str())
                .with_field("testType", test_type)
                .with_content(code.as_str()),
        ];

        for captures in TEST_BLOCK.captures_iter(&code) {
            if let (Some(kind), Some(description)) = (captures.get(1), captures.get(2)) {
                records.push(
                    DocumentRecord::new(if kind.as_str() == "it" { "test" } else { "testDescribe" })
                        .with_field("name", description.as_str())
                        .with_field("memberof", relative.as_str()),
                );
            }
        }

        Ok(Some(ParseOutput {
            records,
            ast: Some(json!({ "type": "Program", "testType": test_type })),
        }))
    }
}

/// Indexes every named record under its `name` and `longname`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexResolver;

impl DocResolver for IndexResolver {
    fn resolve(&self, db: &mut DocDatabase) -> Result<()> {
        db.index.clear();

        for (position, record) in db.records.iter().enumerate() {
            for key in ["name", "longname"] {
                if let Some(value) = record.field(key).and_then(Value::as_str) {
                    let positions = db.index.entry(value.to_string()).or_default();
                    if positions.last() != Some(&position) {
                        positions.push(position);
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsonPublisherOptions {
    /// Output file name inside the destination directory.
    pub file_name: String,
    pub pretty: bool,
}

impl Default for JsonPublisherOptions {
    fn default() -> Self {
        Self {
            file_name: "docData.json".to_string(),
            pretty: true,
        }
    }
}

/// Writes the database, package summary and menu links as one JSON document.
#[derive(Debug, Clone, Default)]
pub struct JsonPublisher {
    options: JsonPublisherOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocOutput<'a> {
    title: Option<&'a str>,
    package: &'a FormattedPackage,
    menu_links: &'a [MenuLink],
    docs: &'a DocDatabase,
}

impl JsonPublisher {
    pub fn from_options(options: Option<&Value>) -> Result<Self> {
        let options = match options {
            Some(value) => JsonPublisherOptions::deserialize(value).context("Invalid JSON publisher options")?,
            None => JsonPublisherOptions::default(),
        };
        Ok(Self { options })
    }

    fn render(
        &self,
        config: &RunConfig,
        package: &FormattedPackage,
        menu_links: &[MenuLink],
        db: &DocDatabase,
    ) -> Result<String> {
        let output = DocOutput {
            title: config.title.as_deref().or(package.name.as_deref()),
            package,
            menu_links,
            docs: db,
        };

        let rendered = if self.options.pretty {
            serde_json::to_string_pretty(&output)
        } else {
            serde_json::to_string(&output)
        };
        rendered.context("Failed to serialize doc data")
    }
}

#[async_trait]
impl Publisher for JsonPublisher {
    async fn publish(&self, ctx: &mut PublishContext<'_>) -> Result<()> {
        // The link to this output is part of the output
        ctx.run_state.add_menu_link("Doc Data", self.options.file_name.as_str());

        let menu_links = &ctx.run_state.menu_links;
        let rendered = ctx
            .db
            .read(|db| self.render(ctx.config, ctx.package.formatted(), menu_links, db))
            .context("Failed to render doc data")?;

        tokio::fs::create_dir_all(&ctx.config.destination)
            .await
            .with_context(|| format!("Failed to create destination: {}", ctx.config.destination))?;

        let target = ctx.config.destination.join(&self.options.file_name);
        tokio::fs::write(&target, rendered)
            .await
            .with_context(|| format!("Failed to write {}", target))?;

        tracing::info!("output: {}", target);
        Ok(())
    }
}

/// Logs every hook as it fires, and the Doc Database changes between hooks.
#[derive(Debug, Default)]
pub struct DiagnosticsPlugin {
    passes: usize,
    changes: Option<broadcast::Receiver<DocChange>>,
    observed: usize,
}

impl DiagnosticsPlugin {
    /// Number of database change events seen so far.
    pub fn observed(&self) -> usize {
        self.observed
    }

    fn watch(&mut self, db: &DocStore) {
        if self.changes.is_none() {
            self.changes = Some(db.subscribe());
        }
    }

    /// Log the changes queued since the last hook.
    fn drain(&mut self) {
        let Some(changes) = self.changes.as_mut() else {
            return;
        };

        loop {
            match changes.try_recv() {
                Ok(change) => {
                    self.observed += 1;
                    tracing::trace!("doc db: {:?}", change);
                }
                Err(TryRecvError::Lagged(missed)) => {
                    self.observed += missed as usize;
                    tracing::trace!("doc db: {} changes not shown", missed);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

#[async_trait]
impl Plugin for DiagnosticsPlugin {
    fn name(&self) -> &str {
        DIAGNOSTICS_PLUGIN
    }

    async fn on_handle_config(&mut self, event: &mut HandleConfigEvent<'_>) -> Result<()> {
        tracing::debug!(
            "onHandleConfig: runtime={:?}, publisher={}, plugins={}",
            event.config.runtime.as_ref().map(|spec| spec.name()),
            event.config.publisher.name(),
            event.config.plugins.len()
        );
        Ok(())
    }

    async fn on_start(&mut self, event: &mut StartEvent<'_>) -> Result<()> {
        self.passes += 1;
        self.watch(event.db);
        self.drain();
        tracing::debug!(
            "onStart: pass {}, destination={}, package={:?}",
            self.passes,
            event.config.destination,
            event.package.name()
        );
        Ok(())
    }

    async fn on_handle_virtual(&mut self, event: &mut HandleVirtualEvent<'_>) -> Result<()> {
        self.drain();
        tracing::debug!("onHandleVirtual: {} fragments so far", event.code.len());
        Ok(())
    }

    async fn on_handle_doc_data(&mut self, event: &mut HandleDocDataEvent<'_>) -> Result<()> {
        self.drain();
        tracing::debug!("onHandleDocData: {} records", event.records.len());
        Ok(())
    }

    async fn on_handle_doc_db(&mut self, event: &mut HandleDocDbEvent<'_>) -> Result<()> {
        self.drain();
        tracing::debug!("onHandleDocDB: {:?}", event.db);
        Ok(())
    }

    async fn on_complete(&mut self, event: &mut CompleteEvent<'_>) -> Result<()> {
        self.drain();
        tracing::debug!("onComplete: {} records, keepAlive={}", event.db.len(), event.keep_alive);
        Ok(())
    }

    async fn on_regenerate(&mut self, event: &mut RegenerateEvent<'_>) -> Result<()> {
        self.drain();
        tracing::debug!("onRegenerate: generation {}", event.db.generation());
        Ok(())
    }

    async fn on_shutdown(&mut self, _event: &mut ShutdownEvent<'_>) -> Result<()> {
        self.drain();
        tracing::debug!("onShutdown after {} passes, {} db changes", self.passes, self.observed);
        Ok(())
    }
}

/// Normalizes `package.json` fields; `repository` and `bugs` may be strings or `{ url }` objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPackageFormatter;

impl DefaultPackageFormatter {
    fn string(raw: &Value, key: &str) -> Option<String> {
        raw.get(key).and_then(Value::as_str).map(String::from)
    }

    fn url(raw: &Value, key: &str) -> Option<String> {
        match raw.get(key)? {
            Value::String(url) => Some(url.clone()),
            Value::Object(object) => object.get("url").and_then(Value::as_str).map(String::from),
            _ => None,
        }
    }
}

impl PackageFormatter for DefaultPackageFormatter {
    fn format(&self, raw: &Value) -> FormattedPackage {
        let mut formatted = FormattedPackage {
            name: Self::string(raw, "name"),
            version: Self::string(raw, "version"),
            description: Self::string(raw, "description"),
            homepage: Self::string(raw, "homepage"),
            repository: Self::url(raw, "repository"),
            bugs_url: Self::url(raw, "bugs"),
            formatted_message: String::new(),
        };

        let lines = [
            ("name", &formatted.name),
            ("version", &formatted.version),
            ("description", &formatted.description),
            ("homepage", &formatted.homepage),
            ("repository", &formatted.repository),
            ("bugs", &formatted.bugs_url),
        ];
        formatted.formatted_message = lines
            .iter()
            .filter_map(|(label, value)| value.as_ref().map(|value| format!("{label}: {value}")))
            .collect::<Vec<_>>()
            .join("\n");

        formatted
    }
}
