use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The target project's manifest plus a derived, read-only formatted view.
#[derive(Debug, Clone, Default)]
pub struct PackageMetadata {
    raw: Value,
    formatted: FormattedPackage,
}

/// Normalized view of a package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedPackage {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<String>,
    pub bugs_url: Option<String>,

    /// Multi-line summary used in fatal diagnostics.
    pub formatted_message: String,
}

impl PackageMetadata {
    pub fn new(raw: Value, formatted: FormattedPackage) -> Self {
        Self { raw, formatted }
    }

    /// Metadata used when no manifest could be loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn formatted(&self) -> &FormattedPackage {
        &self.formatted
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    /// The manifest `main` entry.
    pub fn main(&self) -> Option<&str> {
        self.raw.get("main").and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_null()
    }
}
