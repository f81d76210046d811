//! Per-file parse dispatch into the Doc Database.
//!
//! Files are parsed strictly in list order and their records appended as soon
//! as they are produced; insertion order is the final documentation order.

use crate::error::FileParseError;
use crate::metrics::Metrics;
use crate::models::{AstRecord, DocumentRecord, InvalidCode, PackageMetadata, RunConfig, VirtualCode};
use crate::services::collaborators::{ParseOutput, Parser, Runtime};
use crate::services::discovery::{self, FileCandidate};
use crate::state::DocStore;
use anyhow::Result;
use camino::Utf8Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// What to do when a single file or fragment fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnParseError {
    /// Log a warning, count the failure, remember it for the end-of-pass
    /// summary and continue with the next file. Used by batch generation.
    #[default]
    LogAndSkip,

    /// Return the [`FileParseError`] to the caller.
    /// Used by interactive single-file re-parse.
    Propagate,
}

/// Drives the parser over one pass worth of sources.
pub struct GenerationPipeline<'a> {
    config: &'a RunConfig,
    parser: &'a dyn Parser,
    metrics: &'a Metrics,
    package_name: Option<&'a str>,
    main_file_path: Option<String>,
    skipped: Mutex<Vec<InvalidCode>>,
}

impl<'a> GenerationPipeline<'a> {
    pub fn new(
        config: &'a RunConfig,
        parser: &'a dyn Parser,
        package: &'a PackageMetadata,
        metrics: &'a Metrics,
    ) -> Self {
        let main_file_path = package
            .main()
            .map(|main| discovery::absolutize(&config.dir_path, Utf8Path::new(main)).into_string());

        Self {
            config,
            parser,
            metrics,
            package_name: package.name(),
            main_file_path,
            skipped: Mutex::new(Vec::new()),
        }
    }

    /// Failures skipped under [`OnParseError::LogAndSkip`] so far, in parse order.
    pub fn take_invalid_code(&self) -> Vec<InvalidCode> {
        std::mem::take(&mut *self.skipped.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Parse main sources in order, appending to `db`. Returns the record count added.
    pub fn parse_sources(&self, files: &[FileCandidate], db: &DocStore, policy: OnParseError) -> Result<usize> {
        let mut added = 0;
        for candidate in files {
            if let Some(output) = self.parse_source(candidate, policy)? {
                added += self.append(db, output, candidate.relative.clone());
            }
        }
        Ok(added)
    }

    /// Parse test sources in order. ASTs are keyed `test/<relative path>`.
    pub fn parse_tests(
        &self,
        test_type: &str,
        files: &[FileCandidate],
        db: &DocStore,
        policy: OnParseError,
    ) -> Result<usize> {
        let mut added = 0;
        for candidate in files {
            tracing::info!("parse: {}", candidate.relative);

            let started = Instant::now();
            let result = self
                .parser
                .parse_test(test_type, &self.config.dir_path, &candidate.absolute);
            self.metrics.record_parse_time(started.elapsed());

            if let Some(output) = self.settle(result, candidate.relative.as_str(), policy)? {
                added += self.append(db, output, format!("test/{}", candidate.relative));
            }
        }
        Ok(added)
    }

    /// Parse in-memory fragments. Their records are tagged builtin-virtual.
    pub fn parse_virtual(&self, code: &[VirtualCode], db: &DocStore, policy: OnParseError) -> Result<usize> {
        let mut added = 0;
        for fragment in code {
            tracing::debug!("parse virtual: {}", fragment.label);

            let result = self.parser.parse_code(&self.config.dir_path, &fragment.code);
            let Some(output) = self.settle(result, fragment.label.as_str(), policy)? else {
                continue;
            };

            let mut records = output.records;
            for record in &mut records {
                record.builtin_virtual = true;
            }

            self.metrics.record_virtual(records.len());
            added += records.len();
            db.append(records, None);
        }
        Ok(added)
    }

    /// Parse one main-source file without touching the database.
    pub fn parse_source(&self, candidate: &FileCandidate, policy: OnParseError) -> Result<Option<ParseOutput>> {
        tracing::info!("parse: {}", candidate.relative);

        let started = Instant::now();
        let result = self.parser.parse_file(
            &self.config.dir_path,
            &candidate.absolute,
            self.package_name,
            self.main_file_path.as_deref(),
        );
        self.metrics.record_parse_time(started.elapsed());

        self.settle(result, candidate.relative.as_str(), policy)
    }

    fn settle(
        &self,
        result: Result<Option<ParseOutput>>,
        label: &str,
        policy: OnParseError,
    ) -> Result<Option<ParseOutput>> {
        match result {
            Ok(output) => Ok(output),
            Err(err) => {
                self.metrics.record_parse_failure();
                let err = FileParseError::new(label, err);
                match policy {
                    OnParseError::LogAndSkip => {
                        tracing::warn!("{}: {}", err, err.source);
                        self.skipped
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(InvalidCode {
                                path: label.to_string(),
                                message: err.source.to_string(),
                            });
                        Ok(None)
                    }
                    OnParseError::Propagate => Err(err.into()),
                }
            }
        }
    }

    fn append(&self, db: &DocStore, output: ParseOutput, ast_key: String) -> usize {
        let count = output.records.len();
        if count == 0 && output.ast.is_none() {
            self.metrics.record_file_empty();
        } else {
            self.metrics.record_file_parsed(count);
        }

        let ast = output.ast.map(|ast| AstRecord { file_path: ast_key, ast });
        db.append(output.records, ast);
        count
    }
}

/// Re-parses single files on behalf of plugins (watch tooling).
///
/// Always uses [`OnParseError::Propagate`] so the caller sees failures. The
/// records are returned, not appended to the database.
#[derive(Clone)]
pub struct FileReparser {
    config: Arc<RunConfig>,
    runtime: Runtime,
    package: Arc<PackageMetadata>,
    metrics: Arc<Metrics>,
}

impl FileReparser {
    pub fn new(config: Arc<RunConfig>, runtime: Runtime, package: Arc<PackageMetadata>, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            runtime,
            package,
            metrics,
        }
    }

    /// Parse `path` (absolute or relative to the working directory).
    ///
    /// A parse failure is returned as a [`FileParseError`] inside the error chain.
    pub fn parse_file(&self, path: impl AsRef<Utf8Path>) -> Result<Vec<DocumentRecord>> {
        let absolute = discovery::absolutize(&self.config.dir_path, path.as_ref());
        let candidate = FileCandidate {
            relative: discovery::relative_path(&self.config.dir_path, &absolute),
            absolute,
        };

        let pipeline = GenerationPipeline::new(&self.config, self.runtime.parser.as_ref(), &self.package, &self.metrics);
        let output = pipeline.parse_source(&candidate, OnParseError::Propagate)?;
        Ok(output.map(|output| output.records).unwrap_or_default())
    }
}

impl std::fmt::Debug for FileReparser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReparser")
            .field("runtime", &self.runtime.name)
            .field("dir_path", &self.config.dir_path)
            .finish()
    }
}
