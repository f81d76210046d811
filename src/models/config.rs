use crate::services::discovery::FileFilter;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default include pattern for main and test sources.
pub const DEFAULT_INCLUDE: &str = r"\.(js|jsm|jsx)$";

/// Publisher used when the config does not name one.
pub const DEFAULT_PUBLISHER: &str = "tjsdoc-publisher-json";

/// One or more source locations (directories, files or glob patterns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    One(String),
    Many(Vec<String>),
}

impl SourceSpec {
    /// All patterns in declaration order.
    pub fn patterns(&self) -> Vec<String> {
        match self {
            SourceSpec::One(pattern) => vec![pattern.clone()],
            SourceSpec::Many(patterns) => patterns.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SourceSpec::One(pattern) => pattern.is_empty(),
            SourceSpec::Many(patterns) => patterns.is_empty(),
        }
    }
}

/// A runtime, publisher or user plugin reference: either a bare name or a descriptor object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginSpec {
    Name(String),
    Descriptor(PluginDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl PluginSpec {
    pub fn name(&self) -> &str {
        match self {
            PluginSpec::Name(name) => name,
            PluginSpec::Descriptor(descriptor) => &descriptor.name,
        }
    }

    /// Options for the plugin. Descriptor options win over the `fallback`
    /// (`runtimeOptions` / `publisherOptions`) sibling field.
    pub fn options<'a>(&'a self, fallback: Option<&'a Value>) -> Option<&'a Value> {
        match self {
            PluginSpec::Name(_) => fallback,
            PluginSpec::Descriptor(descriptor) => descriptor.options.as_ref().or(fallback),
        }
    }
}

/// Log verbosity accepted by `config.logLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Fatal,
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Fatal | LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Verbose | LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration as read from disk and merged with its `extends` chain.
///
/// This is the only mutable form of the configuration. Plugins receive it in
/// `onHandleConfig`; afterwards [`ConfigResolver::finalize`](crate::config::ConfigResolver::finalize)
/// turns it into an immutable [`RunConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_files: Option<Vec<Utf8PathBuf>>,

    #[serde(default = "default_destination")]
    pub destination: Utf8PathBuf,

    #[serde(default = "default_includes")]
    pub includes: Vec<String>,

    #[serde(default)]
    pub excludes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<RawTestConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<PluginSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_options: Option<Value>,

    #[serde(default = "default_publisher")]
    pub publisher: PluginSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_options: Option<Value>,

    #[serde(default)]
    pub plugins: Vec<PluginSpec>,

    #[serde(default = "default_package")]
    pub package: Utf8PathBuf,

    #[serde(default = "default_true")]
    pub include_source: bool,

    #[serde(default)]
    pub empty_destination: bool,

    #[serde(default = "default_true")]
    pub doc_coverage: bool,

    #[serde(default)]
    pub full_stack_trace: bool,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default = "default_index")]
    pub index: Utf8PathBuf,

    /// Publisher or plugin specific keys the orchestrator does not interpret.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Test source configuration, same shape as the main source selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTestConfig {
    #[serde(rename = "type", default)]
    pub test_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_files: Option<Vec<Utf8PathBuf>>,

    #[serde(default = "default_includes")]
    pub includes: Vec<String>,

    #[serde(default)]
    pub excludes: Vec<String>,
}

fn default_destination() -> Utf8PathBuf {
    Utf8PathBuf::from("./docs")
}

fn default_includes() -> Vec<String> {
    vec![DEFAULT_INCLUDE.to_string()]
}

fn default_publisher() -> PluginSpec {
    PluginSpec::Name(DEFAULT_PUBLISHER.to_string())
}

fn default_package() -> Utf8PathBuf {
    Utf8PathBuf::from("./package.json")
}

fn default_index() -> Utf8PathBuf {
    Utf8PathBuf::from("./README.md")
}

fn default_true() -> bool {
    true
}

/// The resolved configuration for one generation run.
///
/// Shared as `Arc<RunConfig>` and never mutated once built. Paths are absolute
/// (resolved against [`dir_path`](Self::dir_path)). Fields that legitimately
/// change between passes live in [`RunState`](crate::models::RunState).
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Working directory the run was started from.
    pub dir_path: Utf8PathBuf,
    pub source: Option<SourceSpec>,
    pub destination: Utf8PathBuf,
    pub filter: FileFilter,
    pub test: Option<TestRunConfig>,
    pub runtime: PluginSpec,
    pub runtime_options: Option<Value>,
    pub publisher: PluginSpec,
    pub publisher_options: Option<Value>,
    pub plugins: Vec<PluginSpec>,
    pub package: Utf8PathBuf,
    pub include_source: bool,
    pub empty_destination: bool,
    pub doc_coverage: bool,
    pub full_stack_trace: bool,
    pub log_level: LogLevel,
    pub title: Option<String>,
    pub index: Utf8PathBuf,
    pub extra: IndexMap<String, Value>,
}

impl RunConfig {
    #[cfg(test)]
    pub(crate) fn for_tests(
        dir_path: &camino::Utf8Path,
        source: Option<SourceSpec>,
        filter: FileFilter,
    ) -> Self {
        Self {
            dir_path: dir_path.to_path_buf(),
            source,
            destination: dir_path.join("docs"),
            filter,
            test: None,
            runtime: PluginSpec::Name("tjsdoc-runtime-file".to_string()),
            runtime_options: None,
            publisher: default_publisher(),
            publisher_options: None,
            plugins: Vec::new(),
            package: dir_path.join("package.json"),
            include_source: true,
            empty_destination: false,
            doc_coverage: false,
            full_stack_trace: false,
            log_level: LogLevel::Info,
            title: None,
            index: dir_path.join("README.md"),
            extra: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestRunConfig {
    pub test_type: String,
    pub source: Option<SourceSpec>,
    pub filter: FileFilter,
}
