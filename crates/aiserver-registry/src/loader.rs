//! Catalog discovery and per-field merging of module schema documents.
//!
//! Built-in modules come from the embedded catalog (or a configured
//! directory); user override files are layered on top. A later document
//! replaces individual top-level fields of an earlier one with the same
//! `name`, never the whole document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aiserver_common::config::CatalogConfig;
use aiserver_common::error::{OrchestratorError, Result};
use serde_json::{Map, Value};

use crate::schema::ModuleSchema;

const BUILTIN_CATALOG: &[(&str, &str)] = &[
    ("postgres.json", include_str!("../catalog/postgres.json")),
    ("mysql.json", include_str!("../catalog/mysql.json")),
    ("redis.json", include_str!("../catalog/redis.json")),
    ("minio.json", include_str!("../catalog/minio.json")),
    ("qdrant.json", include_str!("../catalog/qdrant.json")),
    ("elasticsearch.json", include_str!("../catalog/elasticsearch.json")),
    ("n8n.json", include_str!("../catalog/n8n.json")),
    ("oneapi.json", include_str!("../catalog/oneapi.json")),
    ("dify.json", include_str!("../catalog/dify.json")),
    ("dify-web.json", include_str!("../catalog/dify-web.json")),
    ("ragflow.json", include_str!("../catalog/ragflow.json")),
];

/// A parsed catalog document and where it came from.
#[derive(Debug, Clone)]
struct Document {
    origin: String,
    dir: Option<PathBuf>,
    body: Value,
}

/// Merges documents by name, preserving first-declaration order.
#[derive(Debug, Default)]
struct MergedCatalog {
    order: Vec<String>,
    entries: HashMap<String, (Map<String, Value>, Option<PathBuf>)>,
}

impl MergedCatalog {
    fn apply(&mut self, doc: Document) {
        let bodies = match doc.body {
            Value::Array(items) => items,
            other => vec![other],
        };
        for body in bodies {
            let Value::Object(fields) = body else {
                tracing::warn!(origin = %doc.origin, "skipping non-object catalog entry");
                continue;
            };
            let Some(name) = fields.get("name").and_then(Value::as_str).map(str::to_string) else {
                tracing::warn!(origin = %doc.origin, "skipping catalog entry without a name");
                continue;
            };
            match self.entries.get_mut(&name) {
                Some((existing, dir)) => {
                    tracing::debug!(module = %name, origin = %doc.origin, "merging override");
                    // Template files resolve against the document that declared `template`.
                    if fields.contains_key("template") {
                        dir.clone_from(&doc.dir);
                    }
                    for (key, value) in fields {
                        let _ = existing.insert(key, value);
                    }
                }
                None => {
                    self.order.push(name.clone());
                    let _ = self.entries.insert(name, (fields, doc.dir.clone()));
                }
            }
        }
    }

    fn into_schemas(mut self) -> Result<Vec<ModuleSchema>> {
        let mut modules = Vec::with_capacity(self.order.len());
        let mut issues = Vec::new();
        for name in self.order {
            let Some((fields, dir)) = self.entries.remove(&name) else {
                continue;
            };
            match serde_json::from_value::<ModuleSchema>(Value::Object(fields)) {
                Ok(mut schema) => {
                    schema.source_dir = dir;
                    modules.push(schema);
                }
                Err(e) => issues.push(format!("[{name}] {e}")),
            }
        }
        if issues.is_empty() {
            Ok(modules)
        } else {
            Err(OrchestratorError::Validation { issues })
        }
    }
}

/// Loads and merges the built-in catalog with user overrides.
///
/// # Errors
///
/// Returns an error if a configured built-in directory cannot be read, or
/// if a merged module does not match the schema shape.
pub fn load(config: &CatalogConfig) -> Result<Vec<ModuleSchema>> {
    let mut merged = MergedCatalog::default();
    let builtin = match &config.builtin_dir {
        Some(dir) => read_dir(dir)?,
        None => embedded(),
    };
    for doc in builtin {
        merged.apply(doc);
    }
    if let Some(dir) = &config.user_dir {
        if dir.is_dir() {
            for doc in read_dir(dir)? {
                merged.apply(doc);
            }
        } else {
            tracing::debug!(dir = %dir.display(), "user catalog directory absent");
        }
    }
    let modules = merged.into_schemas()?;
    tracing::info!(count = modules.len(), "module catalog loaded");
    Ok(modules)
}

fn embedded() -> Vec<Document> {
    BUILTIN_CATALOG
        .iter()
        .filter_map(|(file, content)| match serde_json::from_str(content) {
            Ok(body) => Some(Document {
                origin: format!("builtin:{file}"),
                dir: None,
                body,
            }),
            Err(e) => {
                tracing::warn!(file = %file, error = %e, "skipping malformed built-in module");
                None
            }
        })
        .collect()
}

/// Reads every JSON/YAML document in `dir`, sorted by file name.
///
/// Unparseable files are skipped with a warning.
fn read_dir(dir: &Path) -> Result<Vec<Document>> {
    let io_err = |e| OrchestratorError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(io_err)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_catalog_file(p))
        .collect();
    paths.sort();

    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        match parse_file(&path) {
            Ok(body) => docs.push(Document {
                origin: path.display().to_string(),
                dir: Some(dir.to_path_buf()),
                body,
            }),
            Err(message) => {
                tracing::warn!(path = %path.display(), error = %message, "skipping unreadable catalog file");
            }
        }
    }
    Ok(docs)
}

fn is_catalog_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml")
    )
}

fn parse_file(path: &Path) -> std::result::Result<Value, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    }
}
