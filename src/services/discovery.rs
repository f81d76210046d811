//! Source file discovery and include / exclude filtering.
//!
//! Filtering works on the path relative to the run's working directory so
//! patterns stay portable. A file is kept only when it matches at least one
//! include pattern and no exclude pattern; excludes always win.

use crate::error::GenerateError;
use crate::metrics::Metrics;
use crate::models::{RunConfig, RunState, SourceSpec};
use crate::services::collaborators::{GlobHydrator, Hydrated};
use anyhow::{Context, Result};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use regex::Regex;
use std::sync::Arc;
use walkdir::WalkDir;

/// Compiled list of regular expressions, kept with their source strings.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    pub fn compile<S: AsRef<str>>(sources: &[S], label: &str) -> Result<Self, GenerateError> {
        let patterns = sources
            .iter()
            .map(|source| {
                Regex::new(source.as_ref()).map_err(|e| {
                    GenerateError::validation(format!(
                        "'{label}' pattern '{}' is not a valid regular expression: {e}",
                        source.as_ref()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Position of the first pattern matching `text`.
    pub fn first_match(&self, text: &str) -> Option<usize> {
        self.patterns.iter().position(|pattern| pattern.is_match(text))
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Why a relative path was kept or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Matched the include pattern at this position and no exclude.
    Accepted(usize),
    NotIncluded,
    /// Rejected by the exclude pattern at this position.
    Excluded(usize),
}

/// Include-then-exclude filter over relative paths.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub includes: PatternSet,
    pub excludes: PatternSet,
}

impl FileFilter {
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> Result<Self, GenerateError> {
        Ok(Self {
            includes: PatternSet::compile(includes, "includes")?,
            excludes: PatternSet::compile(excludes, "excludes")?,
        })
    }

    pub fn evaluate(&self, relative: &str) -> FilterDecision {
        let Some(include) = self.includes.first_match(relative) else {
            return FilterDecision::NotIncluded;
        };

        match self.excludes.first_match(relative) {
            Some(exclude) => FilterDecision::Excluded(exclude),
            None => FilterDecision::Accepted(include),
        }
    }

    pub fn accepts(&self, relative: &str) -> bool {
        matches!(self.evaluate(relative), FilterDecision::Accepted(_))
    }
}

/// A file accepted for parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub absolute: Utf8PathBuf,
    /// Path relative to the run's working directory, `/`-separated.
    pub relative: String,
}

/// Path of `path` relative to `base`, using `..` where `path` is outside `base`.
pub fn relative_path(base: &Utf8Path, path: &Utf8Path) -> String {
    let base_parts: Vec<_> = base.components().collect();
    let path_parts: Vec<_> = path.components().collect();

    let common = base_parts
        .iter()
        .zip(&path_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; base_parts.len() - common];
    parts.extend(path_parts[common..].iter().map(|c| c.as_str()));
    parts.join("/")
}

/// Resolve `path` against `dir_path` unless it is already absolute, then
/// normalize it.
pub fn absolutize(dir_path: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&dir_path.join(path))
    }
}

/// Lexically drop `.` segments and fold `..` into its parent. Works on paths
/// that do not exist yet; symlinks are not followed.
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match normalized.components().next_back() {
                Some(Utf8Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` above the root stays at the root
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_str()),
        }
    }
    normalized
}

/// Apply `filter` to `files` in order, producing the accepted candidates.
pub fn select(dir_path: &Utf8Path, files: &[Utf8PathBuf], filter: &FileFilter) -> Vec<FileCandidate> {
    files
        .iter()
        .filter_map(|file| {
            let absolute = absolutize(dir_path, file);
            let relative = relative_path(dir_path, &absolute);

            match filter.evaluate(&relative) {
                FilterDecision::Accepted(_) => Some(FileCandidate { absolute, relative }),
                FilterDecision::NotIncluded => {
                    tracing::trace!("skip (no include match): {}", relative);
                    None
                }
                FilterDecision::Excluded(position) => {
                    tracing::trace!("skip (exclude #{}): {}", position, relative);
                    None
                }
            }
        })
        .collect()
}

/// Discovery for main and test sources of a run.
pub struct FileDiscovery<'a> {
    hydrator: &'a dyn GlobHydrator,
    metrics: &'a Metrics,
}

impl<'a> FileDiscovery<'a> {
    pub fn new(hydrator: &'a dyn GlobHydrator, metrics: &'a Metrics) -> Self {
        Self { hydrator, metrics }
    }

    /// Candidates for the main sources. Hydrates `config.source` into
    /// `run_state.source_files` the first time, recording the globs used.
    pub fn discover_main(&self, config: &RunConfig, run_state: &mut RunState) -> Result<Vec<FileCandidate>> {
        if run_state.source_files.is_none() {
            let hydrated = self.hydrate(&config.dir_path, config.source.as_ref(), "source")?;
            run_state.source_globs = Some(Arc::from(hydrated.globs));
            run_state.source_files = Some(hydrated.files);
        }

        let files = run_state.source_files.as_deref().unwrap_or_default();
        Ok(self.filter(config, files, &config.filter))
    }

    /// Candidates for the test sources, empty when no test config exists.
    pub fn discover_tests(&self, config: &RunConfig, run_state: &mut RunState) -> Result<Vec<FileCandidate>> {
        let Some(test) = config.test.as_ref() else {
            return Ok(Vec::new());
        };

        if run_state.test_source_files.is_none() {
            let hydrated = self.hydrate(&config.dir_path, test.source.as_ref(), "test.source")?;
            run_state.test_source_globs = Some(Arc::from(hydrated.globs));
            run_state.test_source_files = Some(hydrated.files);
        }

        let files = run_state.test_source_files.as_deref().unwrap_or_default();
        Ok(self.filter(config, files, &test.filter))
    }

    fn hydrate(&self, dir_path: &Utf8Path, source: Option<&SourceSpec>, label: &str) -> Result<Hydrated> {
        let source = source.ok_or_else(|| {
            GenerateError::validation(format!("'{label}' is required when no explicit file list is given"))
        })?;

        let hydrated = self
            .hydrator
            .hydrate(dir_path, &source.patterns())
            .with_context(|| format!("Failed to expand '{label}' patterns"))?;

        tracing::debug!(
            "hydrated {} -> {} files from {} globs",
            label,
            hydrated.files.len(),
            hydrated.globs.len()
        );
        Ok(hydrated)
    }

    fn filter(&self, config: &RunConfig, files: &[Utf8PathBuf], filter: &FileFilter) -> Vec<FileCandidate> {
        let accepted = select(&config.dir_path, files, filter);
        self.metrics.record_files_filtered(files.len() - accepted.len());
        accepted
    }
}

/// Filesystem glob hydration: directories are walked recursively, glob
/// patterns expanded, plain files taken as-is. Output order is stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsGlobHydrator;

impl FsGlobHydrator {
    fn is_glob(pattern: &str) -> bool {
        pattern.contains(['*', '?', '[', '{'])
    }
}

impl GlobHydrator for FsGlobHydrator {
    fn hydrate(&self, dir_path: &Utf8Path, patterns: &[String]) -> Result<Hydrated> {
        let mut files = IndexSet::new();
        let mut globs = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let absolute = absolutize(dir_path, Utf8Path::new(pattern));

            if absolute.is_dir() {
                for entry in WalkDir::new(&absolute).sort_by_file_name() {
                    let entry = entry.with_context(|| format!("Failed to walk {}", absolute))?;
                    if entry.file_type().is_file() {
                        let path = Utf8PathBuf::try_from(entry.into_path())
                            .context("Source path is not valid UTF-8")?;
                        files.insert(path);
                    }
                }
                globs.push(format!("{}/**/*", absolute.as_str().trim_end_matches('/')));
            } else if Self::is_glob(pattern) {
                let matches = glob::glob(absolute.as_str())
                    .with_context(|| format!("Invalid source glob: {}", pattern))?;
                for entry in matches {
                    let path = entry.with_context(|| format!("Failed to read glob match for {}", pattern))?;
                    if path.is_file() {
                        files.insert(Utf8PathBuf::try_from(path).context("Source path is not valid UTF-8")?);
                    }
                }
                globs.push(absolute.to_string());
            } else {
                if absolute.is_file() {
                    files.insert(absolute.clone());
                } else {
                    tracing::warn!("Source location does not exist: {}", absolute);
                }
                globs.push(absolute.to_string());
            }
        }

        Ok(Hydrated {
            files: files.into_iter().collect(),
            globs,
        })
    }
}
