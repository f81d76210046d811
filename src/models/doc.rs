use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Discriminator of a [`DocumentRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocKind {
    File,
    TestFile,
    /// Any code entity kind the parser emits (`class`, `function`, `typedef`, ...).
    Entity(String),
}

impl DocKind {
    /// File-level kinds carry the raw source text in `content`.
    pub fn is_file_like(&self) -> bool {
        matches!(self, DocKind::File | DocKind::TestFile)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DocKind::File => "file",
            DocKind::TestFile => "testFile",
            DocKind::Entity(kind) => kind,
        }
    }
}

impl From<String> for DocKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "file" => DocKind::File,
            "testFile" => DocKind::TestFile,
            _ => DocKind::Entity(value),
        }
    }
}

impl From<&str> for DocKind {
    fn from(value: &str) -> Self {
        DocKind::from(value.to_string())
    }
}

impl From<DocKind> for String {
    fn from(kind: DocKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of extracted documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub kind: DocKind,

    /// Raw source text for `file` / `testFile` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Set on records produced from virtual code rather than a file.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub builtin_virtual: bool,

    /// Free-form fields extracted by the parser.
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

impl DocumentRecord {
    pub fn new(kind: impl Into<DocKind>) -> Self {
        Self {
            kind: kind.into(),
            content: None,
            builtin_virtual: false,
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// `name` field as a string, if present.
    pub fn name(&self) -> Option<&str> {
        self.field("name").and_then(Value::as_str)
    }

    /// Whether the record was flagged as lacking documentation.
    pub fn is_undocumented(&self) -> bool {
        self.field("undocument").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Parsed AST of one file, kept beside the records it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstRecord {
    pub file_path: String,
    pub ast: Value,
}

/// An in-memory code fragment parsed as if it were a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualCode {
    /// Label used in logs.
    pub label: String,
    pub code: String,
}

impl VirtualCode {
    pub fn new(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
        }
    }
}

/// All document records of one generation pass plus the derived indices.
///
/// Insertion order of `records` is the final documentation order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocDatabase {
    pub records: Vec<DocumentRecord>,
    pub asts: Vec<AstRecord>,

    /// Built by the resolution collaborator: key -> record positions.
    pub index: IndexMap<String, Vec<usize>>,

    /// Incremented on every reset; the first pass is 0.
    pub generation: u64,
}

impl DocDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records matching `kind`, in insertion order.
    pub fn by_kind<'a>(&'a self, kind: &'a DocKind) -> impl Iterator<Item = &'a DocumentRecord> + 'a {
        self.records.iter().filter(move |record| &record.kind == kind)
    }

    /// Records registered in the index under `key`.
    pub fn lookup(&self, key: &str) -> Vec<&DocumentRecord> {
        self.index
            .get(key)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&position| self.records.get(position))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Clear every record and index in place for a new pass.
    pub fn reset(&mut self) {
        self.records.clear();
        self.asts.clear();
        self.index.clear();
        self.generation += 1;
    }

    /// Blank out raw source text of file-level records.
    pub fn strip_source(records: &mut [DocumentRecord]) -> usize {
        let mut stripped = 0;
        for record in records.iter_mut() {
            if record.kind.is_file_like() && record.content.is_some() {
                record.content = Some(String::new());
                stripped += 1;
            }
        }
        stripped
    }

    /// Documentation coverage over non-file records.
    pub fn coverage(&self) -> Coverage {
        let mut coverage = Coverage::default();
        for record in self.records.iter().filter(|record| !record.kind.is_file_like()) {
            coverage.expect += 1;
            if !record.is_undocumented() {
                coverage.actual += 1;
            }
        }
        coverage
    }
}

/// Documented versus documentable record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub actual: usize,
    pub expect: usize,
}

impl Coverage {
    /// Whole percent, rounded down. 100 when nothing is documentable.
    pub fn percent(&self) -> usize {
        if self.expect == 0 {
            100
        } else {
            self.actual * 100 / self.expect
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% ({}/{})", self.percent(), self.actual, self.expect)
    }
}
