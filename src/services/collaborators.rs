//! External collaborator interfaces consumed by the pipeline.
//!
//! None of these are implemented by the orchestrator itself beyond the small
//! built-ins in [`crate::services::builtin`].

use crate::models::{DocDatabase, DocumentRecord, FormattedPackage, PackageMetadata, RunConfig, RunState};
use crate::state::DocStore;
use anyhow::Result;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use std::sync::Arc;

/// Records and AST produced for one file or code fragment.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub records: Vec<DocumentRecord>,
    pub ast: Option<Value>,
}

/// Source parser supplied by the runtime.
///
/// `Ok(None)` means there was nothing to document; it is not a failure.
pub trait Parser: Send + Sync {
    fn parse_file(
        &self,
        dir_path: &Utf8Path,
        file_path: &Utf8Path,
        package_name: Option<&str>,
        main_file_path: Option<&str>,
    ) -> Result<Option<ParseOutput>>;

    /// Parse an in-memory fragment.
    fn parse_code(&self, dir_path: &Utf8Path, code: &str) -> Result<Option<ParseOutput>>;

    /// Parse a test file of the configured test type (e.g. `mocha`).
    fn parse_test(
        &self,
        test_type: &str,
        dir_path: &Utf8Path,
        file_path: &Utf8Path,
    ) -> Result<Option<ParseOutput>>;
}

/// Computes derived relationships over the database in place.
pub trait DocResolver: Send + Sync {
    fn resolve(&self, db: &mut DocDatabase) -> Result<()>;
}

/// Everything a publisher may read, plus the run state it may append menu links to.
pub struct PublishContext<'a> {
    pub config: &'a RunConfig,
    pub package: &'a PackageMetadata,
    pub db: &'a DocStore,
    pub run_state: &'a mut RunState,
}

/// Produces the final documentation output as a side effect.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, ctx: &mut PublishContext<'_>) -> Result<()>;
}

/// Files and literal glob patterns produced by expanding source patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hydrated {
    pub files: Vec<Utf8PathBuf>,
    pub globs: Vec<String>,
}

/// Expands directories and glob patterns into absolute file paths.
#[cfg_attr(test, mockall::automock)]
pub trait GlobHydrator: Send + Sync {
    fn hydrate(&self, dir_path: &Utf8Path, patterns: &[String]) -> Result<Hydrated>;
}

/// Builds the formatted view of a package manifest.
pub trait PackageFormatter: Send + Sync {
    fn format(&self, raw: &Value) -> FormattedPackage;
}

/// A loaded runtime: the parser plus the resolver that accompanies it.
#[derive(Clone)]
pub struct Runtime {
    pub name: String,
    pub parser: Arc<dyn Parser>,
    pub resolver: Arc<dyn DocResolver>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("name", &self.name).finish_non_exhaustive()
    }
}
