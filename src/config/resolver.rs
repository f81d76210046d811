use crate::config::ConfigLocator;
use crate::error::GenerateError;
use crate::models::{PluginSpec, RawConfig, RawTestConfig, RunConfig, RunState, SourceSpec, TestRunConfig};
use crate::services::discovery::{FileFilter, absolutize};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Turns a loaded config value into a validated [`RunConfig`].
///
/// Resolution happens in two steps so plugins can edit the config in between:
///
/// 1. [`load`](Self::load): shape checks, `extends` expansion, defaults,
///    validation. Produces the mutable [`RawConfig`].
/// 2. [`finalize`](Self::finalize): validation again (plugins may have broken
///    the config), the source requirement, pattern compilation and path
///    resolution. Produces the immutable [`RunConfig`] plus the [`RunState`].
///
/// Sources are only required at step 2 so `onHandleConfig` can supply them.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    dir_path: Utf8PathBuf,
}

impl ConfigResolver {
    pub fn new<P: AsRef<Utf8Path>>(dir_path: P) -> Self {
        Self {
            dir_path: dir_path.as_ref().to_path_buf(),
        }
    }

    pub fn dir_path(&self) -> &Utf8Path {
        &self.dir_path
    }

    /// Validate and default a raw config value.
    pub fn load(&self, raw: Value) -> Result<RawConfig> {
        if !raw.is_object() {
            return Err(GenerateError::validation("config must be an object").into());
        }

        let merged = self.expand_extends(raw, &mut Vec::new())?;
        Self::check_shape(&merged)?;

        let config: RawConfig = serde_json::from_value(merged)
            .map_err(|e| GenerateError::validation(format!("config is malformed: {e}")))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Checks that hold for both the loaded and the plugin-edited config.
    pub fn validate(config: &RawConfig) -> Result<(), GenerateError> {
        match &config.runtime {
            None => return Err(GenerateError::validation("'runtime' is required")),
            Some(spec) => Self::check_spec_name(spec, "runtime")?,
        }
        Self::check_spec_name(&config.publisher, "publisher")?;
        for plugin in &config.plugins {
            Self::check_spec_name(plugin, "plugins")?;
        }

        if let Some(test) = &config.test {
            if test.test_type.is_empty() {
                return Err(GenerateError::validation("'test.type' is not defined"));
            }
            if test.source_files.is_none() && test.source.as_ref().is_none_or(SourceSpec::is_empty) {
                return Err(GenerateError::validation(
                    "'test.source' or 'test.sourceFiles' is not defined",
                ));
            }
        }

        Ok(())
    }

    /// Post-validate and freeze the config.
    pub fn finalize(&self, config: RawConfig) -> Result<(Arc<RunConfig>, RunState)> {
        Self::validate(&config)?;
        if config.source_files.is_none() && config.source.as_ref().is_none_or(SourceSpec::is_empty) {
            return Err(GenerateError::validation("'source' or 'sourceFiles' is not defined").into());
        }

        let filter = FileFilter::new(&config.includes, &config.excludes)?;
        let (test, test_source_files) = match config.test {
            Some(test) => {
                let (test_config, files) = self.finalize_test(test)?;
                (Some(test_config), files)
            }
            None => (None, None),
        };

        let runtime = config
            .runtime
            .ok_or_else(|| GenerateError::validation("'runtime' is required"))?;

        let run_state = RunState::new(self.absolute_files(config.source_files), test_source_files);

        let run_config = RunConfig {
            dir_path: self.dir_path.clone(),
            source: config.source,
            destination: absolutize(&self.dir_path, &config.destination),
            filter,
            test,
            runtime,
            runtime_options: config.runtime_options,
            publisher: config.publisher,
            publisher_options: config.publisher_options,
            plugins: config.plugins,
            package: absolutize(&self.dir_path, &config.package),
            include_source: config.include_source,
            empty_destination: config.empty_destination,
            doc_coverage: config.doc_coverage,
            full_stack_trace: config.full_stack_trace,
            log_level: config.log_level,
            title: config.title,
            index: absolutize(&self.dir_path, &config.index),
            extra: config.extra,
        };

        tracing::debug!(
            "config resolved: destination={}, {} includes, {} excludes",
            run_config.destination,
            run_config.filter.includes.len(),
            run_config.filter.excludes.len()
        );

        Ok((Arc::new(run_config), run_state))
    }

    fn finalize_test(&self, test: RawTestConfig) -> Result<(TestRunConfig, Option<Vec<Utf8PathBuf>>)> {
        let filter = FileFilter::new(&test.includes, &test.excludes)?;
        let files = self.absolute_files(test.source_files);

        Ok((
            TestRunConfig {
                test_type: test.test_type,
                source: test.source,
                filter,
            },
            files,
        ))
    }

    fn absolute_files(&self, files: Option<Vec<Utf8PathBuf>>) -> Option<Vec<Utf8PathBuf>> {
        files.map(|files| {
            files
                .iter()
                .map(|file| absolutize(&self.dir_path, file))
                .collect()
        })
    }

    /// Replace `extends` with the merged parent configs. Parents apply in
    /// list order, the child last.
    fn expand_extends(&self, mut value: Value, chain: &mut Vec<Utf8PathBuf>) -> Result<Value> {
        let Some(object) = value.as_object_mut() else {
            return Err(GenerateError::validation("extended config must be an object").into());
        };
        let Some(extends) = object.remove("extends") else {
            return Ok(value);
        };

        let parents: Vec<String> = match extends {
            Value::String(path) => vec![path],
            Value::Array(paths) => paths
                .into_iter()
                .map(|path| match path {
                    Value::String(path) => Ok(path),
                    _ => Err(GenerateError::validation("'extends' entries must be strings")),
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(GenerateError::validation("'extends' must be a string or an array").into()),
        };

        let mut merged = Value::Object(Map::new());
        for parent in parents {
            let path = absolutize(&self.dir_path, Utf8Path::new(&parent));
            if chain.contains(&path) {
                return Err(GenerateError::validation(format!("'extends' cycle through {}", path)).into());
            }

            let parent_value = ConfigLocator::load_file(&path)
                .with_context(|| format!("Failed to load extended config: {}", parent))?;

            chain.push(path);
            let parent_value = self.expand_extends(parent_value, chain)?;
            chain.pop();

            deep_merge(&mut merged, parent_value);
        }

        deep_merge(&mut merged, value);
        Ok(merged)
    }

    /// Type checks that would otherwise surface as opaque serde errors.
    fn check_shape(value: &Value) -> Result<(), GenerateError> {
        for key in ["runtime", "publisher"] {
            match value.get(key) {
                None | Some(Value::String(_)) => {}
                Some(Value::Object(object)) if object.get("name").is_some_and(Value::is_string) => {}
                Some(_) => {
                    return Err(GenerateError::validation(format!(
                        "'{key}' must be a string or an object with a 'name'"
                    )));
                }
            }
        }

        Ok(())
    }

    fn check_spec_name(spec: &PluginSpec, key: &str) -> Result<(), GenerateError> {
        if spec.name().trim().is_empty() {
            return Err(GenerateError::validation(format!("'{key}' names an empty module")));
        }
        Ok(())
    }
}

/// Objects merge key by key; anything else in `overlay` replaces `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn resolver() -> ConfigResolver {
        ConfigResolver::new("/work")
    }

    fn validation_message(err: anyhow::Error) -> String {
        match err.downcast::<GenerateError>() {
            Ok(GenerateError::ConfigValidation(message)) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_source_fails_at_finalize() {
        let config = resolver()
            .load(json!({ "runtime": "tjsdoc-runtime-file", "destination": "./docs" }))
            .unwrap();
        let err = resolver().finalize(config).unwrap_err();
        assert!(validation_message(err).contains("'source' or 'sourceFiles'"));
    }

    #[test]
    fn test_missing_destination_defaults() {
        let config = resolver()
            .load(json!({ "runtime": "tjsdoc-runtime-file", "source": "./src" }))
            .unwrap();
        let (run_config, _) = resolver().finalize(config).unwrap();

        assert_eq!(run_config.destination, Utf8PathBuf::from("/work/docs"));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = resolver().load(json!(["source"])).unwrap_err();
        assert!(validation_message(err).contains("object"));
    }

    #[test]
    fn test_bad_runtime_type_rejected() {
        let err = resolver()
            .load(json!({ "runtime": 42, "source": "./src" }))
            .unwrap_err();
        assert!(validation_message(err).contains("'runtime'"));

        let err = resolver()
            .load(json!({ "runtime": "x", "publisher": { "options": {} }, "source": "./src" }))
            .unwrap_err();
        assert!(validation_message(err).contains("'publisher'"));
    }

    #[test]
    fn test_runtime_required() {
        let err = resolver().load(json!({ "source": "./src" })).unwrap_err();
        assert!(validation_message(err).contains("'runtime' is required"));
    }

    #[test]
    fn test_invalid_pattern_fails_finalize() {
        let config = resolver()
            .load(json!({ "runtime": "x", "source": "./src", "excludes": ["(unclosed"] }))
            .unwrap();
        let err = resolver().finalize(config).unwrap_err();
        assert!(validation_message(err).contains("(unclosed"));
    }

    #[test]
    fn test_post_validation_after_plugin_edit() {
        let mut config = resolver()
            .load(json!({ "runtime": "x", "source": "./src" }))
            .unwrap();

        // A plugin removing the source leaves the config invalid.
        config.source = None;

        let err = resolver().finalize(config).unwrap_err();
        assert!(validation_message(err).contains("'source' or 'sourceFiles'"));
    }

    #[test]
    fn test_test_block_requires_type() {
        let err = resolver()
            .load(json!({ "runtime": "x", "source": "./src", "test": { "source": "./test" } }))
            .unwrap_err();
        assert!(validation_message(err).contains("test.type"));
    }

    #[test]
    fn test_source_files_resolved_into_run_state() {
        let config = resolver()
            .load(json!({ "runtime": "x", "sourceFiles": ["src/a.js", "/abs/b.js"] }))
            .unwrap();
        let (_, run_state) = resolver().finalize(config).unwrap();

        assert_eq!(
            run_state.source_files,
            Some(vec![Utf8PathBuf::from("/work/src/a.js"), Utf8PathBuf::from("/abs/b.js")])
        );
    }

    #[test]
    fn test_deep_merge() {
        let mut base = json!({ "a": { "x": 1, "y": [1, 2] }, "b": true });
        deep_merge(&mut base, json!({ "a": { "y": [3] , "z": 2 }, "b": false }));

        assert_eq!(base, json!({ "a": { "x": 1, "y": [3], "z": 2 }, "b": false }));
    }

    #[test]
    fn test_extends_chain() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::write(
            dir.join("base.json"),
            r#"{ "runtime": "tjsdoc-runtime-file", "excludes": ["/base/"], "publisherOptions": { "pretty": true } }"#,
        )
        .unwrap();
        fs::write(
            dir.join("mid.yaml"),
            "extends: base.json\npublisherOptions:\n  fileName: out.json\n",
        )
        .unwrap();

        let config = ConfigResolver::new(&dir)
            .load(json!({ "extends": ["mid.yaml"], "source": "./src", "excludes": ["/child/"] }))
            .unwrap();

        assert_eq!(config.runtime.as_ref().map(PluginSpec::name), Some("tjsdoc-runtime-file"));
        assert_eq!(config.excludes, vec!["/child/".to_string()]);
        assert_eq!(
            config.publisher_options,
            Some(json!({ "pretty": true, "fileName": "out.json" }))
        );
    }

    #[test]
    fn test_extends_cycle_rejected() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::write(dir.join("a.json"), r#"{ "extends": "b.json" }"#).unwrap();
        fs::write(dir.join("b.json"), r#"{ "extends": "a.json" }"#).unwrap();

        let err = ConfigResolver::new(&dir)
            .load(json!({ "extends": "a.json", "source": "./src", "runtime": "x" }))
            .unwrap_err();
        assert!(validation_message(err).contains("cycle"));
    }
}
