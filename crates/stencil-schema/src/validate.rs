//! Schema loading and page validation.
//!
//! Every schema is indexed under two aliases, its short id (`page`) and its
//! file name (`page.schema.json`). Cross-schema `$ref`s are resolved from
//! that index by the last path segment of the reference, so either alias
//! works with or without a URI prefix. Unknown references fail instead of
//! going to the network.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::{Retrieve, Uri, ValidationOptions, Validator};
use serde_json::Value;
use stencil_content::loader::list_files;

/// File name suffix of schema documents. Stripping it yields the short id.
pub const SCHEMA_SUFFIX: &str = ".schema.json";

/// Schema every page content document is validated against.
pub const PAGE_SCHEMA: &str = "page";

/// Errors that stop a validation run before any page is checked.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to load schema {schema}: {reason}")]
    Load { schema: String, reason: String },

    #[error("Schema '{id}' not found in {dir}")]
    NotFound { id: String, dir: String },

    #[error("Failed to compile schema '{id}': {reason}")]
    Build { id: String, reason: String },

    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },
}

/// A single structural violation.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// JSON Pointer to the offending value in the document
    pub instance_path: String,

    /// JSON Pointer to the schema keyword that failed
    pub schema_path: String,

    /// Human-readable description
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "  (root): {}", self.message)
        } else {
            write!(f, "  {}: {}", self.instance_path, self.message)
        }
    }
}

/// Outcome for one content file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    /// File name, e.g. `about.json`
    pub file: String,

    /// Every violation found; empty when the file is valid
    pub violations: Vec<Violation>,
}

impl FileReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Outcome of a whole validation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub files: Vec<FileReport>,
}

impl ValidationReport {
    /// True only when no file failed.
    pub fn is_success(&self) -> bool {
        self.files.iter().all(FileReport::is_valid)
    }

    /// Reports for the files that failed.
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| !f.is_valid())
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }
}

/// Resolves `$ref`s against the loaded schemas only.
struct LocalSchemaRetriever {
    by_alias: HashMap<String, Value>,
}

impl Retrieve for LocalSchemaRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri = uri.as_str();
        let without_fragment = uri.split('#').next().unwrap_or(uri);
        let alias = without_fragment
            .rsplit('/')
            .next()
            .unwrap_or(without_fragment);

        self.by_alias
            .get(alias)
            .cloned()
            .ok_or_else(|| format!("unknown schema reference: {uri}").into())
    }
}

/// All schemas from a schemas directory.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schema_dir: PathBuf,
    /// Schema documents keyed by short id
    schemas: BTreeMap<String, Value>,
}

impl SchemaRegistry {
    /// Load every `*.schema.json` file in `schema_dir`.
    pub fn load(schema_dir: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let schema_dir = schema_dir.as_ref().to_path_buf();
        let mut schemas = BTreeMap::new();

        let entries = fs::read_dir(&schema_dir).map_err(|e| SchemaError::Read {
            path: schema_dir.display().to_string(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| SchemaError::Read {
                    path: schema_dir.display().to_string(),
                    reason: e.to_string(),
                })?
                .path();

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = name.strip_suffix(SCHEMA_SUFFIX) else {
                continue;
            };
            if id.is_empty() || name.starts_with('.') || !path.is_file() {
                continue;
            }

            let text = fs::read_to_string(&path).map_err(|e| SchemaError::Load {
                schema: name.to_string(),
                reason: e.to_string(),
            })?;
            let schema: Value = serde_json::from_str(&text).map_err(|e| SchemaError::Load {
                schema: name.to_string(),
                reason: format!("invalid JSON: {e}"),
            })?;

            schemas.insert(id.to_string(), schema);
        }

        tracing::info!("Loaded {} schemas", schemas.len());

        Ok(Self {
            schema_dir,
            schemas,
        })
    }

    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }

    /// Short ids of all loaded schemas, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    /// Look up a schema by short id or file name.
    pub fn get(&self, alias: &str) -> Option<&Value> {
        let id = alias.strip_suffix(SCHEMA_SUFFIX).unwrap_or(alias);
        self.schemas.get(id)
    }

    fn build_options(&self) -> ValidationOptions {
        let mut by_alias = HashMap::new();
        for (id, schema) in &self.schemas {
            by_alias.insert(id.clone(), schema.clone());
            by_alias.insert(format!("{id}{SCHEMA_SUFFIX}"), schema.clone());
        }

        let mut opts = jsonschema::options();
        opts.with_retriever(LocalSchemaRetriever { by_alias });
        opts
    }

    /// Compile the schema registered under `alias`.
    pub fn validator(&self, alias: &str) -> Result<Validator, SchemaError> {
        let schema = self.get(alias).ok_or_else(|| SchemaError::NotFound {
            id: alias.to_string(),
            dir: self.schema_dir.display().to_string(),
        })?;

        self.build_options()
            .build(schema)
            .map_err(|e| SchemaError::Build {
                id: alias.to_string(),
                reason: e.to_string(),
            })
    }

    /// Every violation of `instance` against a compiled validator.
    pub fn violations(validator: &Validator, instance: &Value) -> Vec<Violation> {
        validator
            .iter_errors(instance)
            .map(|e| Violation {
                instance_path: e.instance_path.to_string(),
                schema_path: e.schema_path.to_string(),
                message: e.to_string(),
            })
            .collect()
    }

    /// Validate every `*.json` file in `pages_dir` against the `page` schema.
    ///
    /// A file that cannot be read or parsed is reported as failed; the run
    /// always continues to the next file. A missing pages directory yields an
    /// empty report.
    pub fn validate_pages(&self, pages_dir: &Path) -> Result<ValidationReport, SchemaError> {
        let validator = self.validator(PAGE_SCHEMA)?;
        let mut report = ValidationReport::default();

        if !pages_dir.is_dir() {
            tracing::warn!("Pages directory not found: {}", pages_dir.display());
            return Ok(report);
        }

        let files = list_files(pages_dir, Some("json")).map_err(|e| SchemaError::Read {
            path: pages_dir.display().to_string(),
            reason: e.to_string(),
        })?;

        for path in files {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let violations = match read_instance(&path) {
                Ok(instance) => Self::violations(&validator, &instance),
                Err(message) => vec![Violation {
                    instance_path: String::new(),
                    schema_path: String::new(),
                    message,
                }],
            };

            report.files.push(FileReport { file, violations });
        }

        Ok(report)
    }
}

fn read_instance(path: &Path) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read file: {e}"))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))
}
