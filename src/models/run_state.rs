use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A navigation entry contributed while publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuLink {
    pub label: String,
    pub href: String,
}

/// A file or fragment skipped because it failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidCode {
    /// Relative path, or the label of a virtual fragment.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for InvalidCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The mutable part of a run that survives across regeneration passes.
///
/// Everything else lives in the immutable [`RunConfig`](crate::models::RunConfig).
/// Watch-style plugins may append to or replace the file lists in
/// `onStart` / `onRegenerate`.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Explicit or hydrated main source files. `None` until discovery runs
    /// against `config.source`.
    pub source_files: Option<Vec<Utf8PathBuf>>,

    /// Literal glob patterns used to hydrate `source_files`. Set once.
    pub source_globs: Option<Arc<[String]>>,

    pub test_source_files: Option<Vec<Utf8PathBuf>>,

    pub test_source_globs: Option<Arc<[String]>>,

    pub menu_links: Vec<MenuLink>,

    /// Parse failures skipped during the current pass.
    pub invalid_code: Vec<InvalidCode>,
}

impl RunState {
    pub fn new(
        source_files: Option<Vec<Utf8PathBuf>>,
        test_source_files: Option<Vec<Utf8PathBuf>>,
    ) -> Self {
        Self {
            source_files,
            test_source_files,
            ..Self::default()
        }
    }

    pub fn add_menu_link(&mut self, label: impl Into<String>, href: impl Into<String>) {
        self.menu_links.push(MenuLink {
            label: label.into(),
            href: href.into(),
        });
    }
}
