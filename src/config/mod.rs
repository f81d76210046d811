//! Configuration discovery, loading and resolution.
//!
//! [`ConfigLocator`] finds and reads config files (JSON or YAML) the way the
//! CLI does; [`ConfigResolver`] turns the loaded value into a validated,
//! immutable [`RunConfig`](crate::models::RunConfig).

pub mod resolver;

pub use resolver::ConfigResolver;

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use json_comments::StripComments;
use serde_json::Value;
use std::fs;

/// Conventional config file names, probed in this order.
pub const CONFIG_FILE_NAMES: [&str; 6] = [
    ".tjsdocrc",
    ".tjsdocrc.json",
    ".tjsdocrc.yaml",
    ".tjsdocrc.yml",
    ".tjsdoc.json",
    ".tjsdoc.yaml",
];

/// Field of `package.json` consulted when no config file exists.
pub const PACKAGE_CONFIG_FIELD: &str = "tjsdoc";

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named with `-c`.
    Explicit(Utf8PathBuf),
    /// One of [`CONFIG_FILE_NAMES`].
    Conventional(Utf8PathBuf),
    /// The `tjsdoc` field of this manifest.
    PackageJson(Utf8PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Conventional(path) => write!(f, "{}", path),
            ConfigSource::PackageJson(path) => write!(f, "{} ({})", path, PACKAGE_CONFIG_FIELD),
        }
    }
}

/// Locates and reads configuration files relative to a working directory.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    dir_path: Utf8PathBuf,
}

impl ConfigLocator {
    pub fn new<P: AsRef<Utf8Path>>(dir_path: P) -> Self {
        Self {
            dir_path: dir_path.as_ref().to_path_buf(),
        }
    }

    /// Load the configuration for a CLI invocation.
    ///
    /// An explicit path must exist. Otherwise the conventional file names are
    /// probed, then the `tjsdoc` field of `package.json`. `Ok(None)` when
    /// nothing was found.
    pub fn locate(&self, explicit: Option<&Utf8Path>) -> Result<Option<(Value, ConfigSource)>> {
        if let Some(path) = explicit {
            let path = self.resolve(path);
            let value = Self::load_file(&path)?;
            return Ok(Some((value, ConfigSource::Explicit(path))));
        }

        if let Some(path) = self.find_config_file() {
            let value = Self::load_file(&path)?;
            return Ok(Some((value, ConfigSource::Conventional(path))));
        }

        let package_path = self.dir_path.join("package.json");
        Ok(self
            .load_from_package_json(&package_path)?
            .map(|value| (value, ConfigSource::PackageJson(package_path))))
    }

    /// First existing conventional config file in the working directory.
    pub fn find_config_file(&self) -> Option<Utf8PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.dir_path.join(name))
            .find(|path| path.is_file())
    }

    /// The `tjsdoc` field of a manifest, if the manifest exists and has one.
    pub fn load_from_package_json(&self, package_path: &Utf8Path) -> Result<Option<Value>> {
        if !package_path.is_file() {
            return Ok(None);
        }

        let contents = fs::read_to_string(package_path)
            .with_context(|| format!("Failed to read package manifest: {}", package_path))?;
        let mut manifest: Value = parse_json(&contents)
            .with_context(|| format!("Failed to parse package manifest: {}", package_path))?;

        Ok(manifest
            .as_object_mut()
            .and_then(|object| object.remove(PACKAGE_CONFIG_FIELD)))
    }

    /// Read a JSON or YAML config file.
    ///
    /// JSON may carry `//` and `/* */` comments. `.json` is JSON and `.yaml` / `.yml` YAML; extensionless files (such as
    /// `.tjsdocrc`) are tried as JSON first, then YAML. JavaScript configs
    /// are rejected.
    pub fn load_file(path: &Utf8Path) -> Result<Value> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config: {}", path))?;

        let value = match path.extension() {
            Some("json") => parse_json(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path))?,
            Some("yaml" | "yml") => serde_yaml_ng::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path))?,
            Some("js" | "cjs" | "mjs") => {
                bail!("JavaScript config files are not supported: {}", path)
            }
            _ => match parse_json(&contents) {
                Ok(value) => value,
                Err(_) => serde_yaml_ng::from_str(&contents)
                    .with_context(|| format!("Failed to parse config as JSON or YAML: {}", path))?,
            },
        };

        tracing::info!("Loaded config from {}", path);
        Ok(value)
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir_path.join(path)
        }
    }
}

/// JSON with comments stripped before parsing.
fn parse_json(contents: &str) -> serde_json::Result<Value> {
    serde_json::from_reader(StripComments::new(contents.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_dir() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        (temp, dir)
    }

    #[test]
    fn test_lookup_order() {
        let (_temp, dir) = temp_dir();
        fs::write(dir.join(".tjsdoc.json"), r#"{ "source": "./late" }"#).unwrap();
        fs::write(dir.join(".tjsdocrc.yml"), "source: ./early\n").unwrap();

        let (value, source) = ConfigLocator::new(&dir).locate(None).unwrap().unwrap();

        assert_eq!(value["source"], json!("./early"));
        assert_eq!(source, ConfigSource::Conventional(dir.join(".tjsdocrc.yml")));
    }

    #[test]
    fn test_extensionless_rc_accepts_yaml() {
        let (_temp, dir) = temp_dir();
        fs::write(dir.join(".tjsdocrc"), "source: ./src\nexcludes:\n  - '/test/'\n").unwrap();

        let value = ConfigLocator::load_file(&dir.join(".tjsdocrc")).unwrap();
        assert_eq!(value, json!({ "source": "./src", "excludes": ["/test/"] }));
    }

    #[test]
    fn test_json_comments_are_stripped() {
        let (_temp, dir) = temp_dir();
        let config = r#"{
  // docs
  "source": "./src", /* inline */
  "excludes": ["//not-a-comment"]
}"#;
        fs::write(dir.join(".tjsdocrc.json"), config).unwrap();
        fs::write(dir.join(".tjsdocrc"), config).unwrap();

        let expected = json!({ "source": "./src", "excludes": ["//not-a-comment"] });
        assert_eq!(ConfigLocator::load_file(&dir.join(".tjsdocrc.json")).unwrap(), expected);
        assert_eq!(ConfigLocator::load_file(&dir.join(".tjsdocrc")).unwrap(), expected);
    }

    #[test]
    fn test_package_json_field_with_comments() {
        let (_temp, dir) = temp_dir();
        fs::write(
            dir.join("package.json"),
            "{\n  \"name\": \"demo\",\n  // settings\n  \"tjsdoc\": { \"source\": \"./lib\" }\n}\n",
        )
        .unwrap();

        let (value, _) = ConfigLocator::new(&dir).locate(None).unwrap().unwrap();
        assert_eq!(value, json!({ "source": "./lib" }));
    }

    #[test]
    fn test_package_json_fallback() {
        let (_temp, dir) = temp_dir();
        fs::write(
            dir.join("package.json"),
            r#"{ "name": "demo", "tjsdoc": { "source": "./lib" } }"#,
        )
        .unwrap();

        let (value, source) = ConfigLocator::new(&dir).locate(None).unwrap().unwrap();

        assert_eq!(value, json!({ "source": "./lib" }));
        assert!(matches!(source, ConfigSource::PackageJson(_)));
    }

    #[test]
    fn test_nothing_found() {
        let (_temp, dir) = temp_dir();
        fs::write(dir.join("package.json"), r#"{ "name": "demo" }"#).unwrap();

        assert!(ConfigLocator::new(&dir).locate(None).unwrap().is_none());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let (_temp, dir) = temp_dir();
        let locator = ConfigLocator::new(&dir);

        assert!(locator.locate(Some(Utf8Path::new("missing.json"))).is_err());
    }

    #[test]
    fn test_js_config_rejected() {
        let (_temp, dir) = temp_dir();
        fs::write(dir.join(".tjsdocrc.js"), "module.exports = {};").unwrap();

        let err = ConfigLocator::load_file(&dir.join(".tjsdocrc.js")).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}
