//! Core [`RuleLoader`] struct: filesystem-backed document loading.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::metadata::MetadataStore;
use crate::schema::{RuleEnvelope, ServiceDocument};
use crate::validation::{validate_document, validate_document_with_metadata, ValidationResult};

use super::error::{DocumentError, LoadResult, LoadStatus, Result};
use super::ruleset::RuleSet;

/// Filesystem-backed rule loader.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files, deserializes
/// them into [`ServiceDocument`]s via two-pass deserialization, validates
/// them, and keeps the valid ones keyed by document id.
pub struct RuleLoader {
    rules_dir: PathBuf,
    documents: RwLock<BTreeMap<String, Arc<ServiceDocument>>>,
    metadata: Option<Arc<dyn MetadataStore>>,
}

impl RuleLoader {
    pub fn new(rules_dir: PathBuf) -> Self {
        Self {
            rules_dir,
            documents: RwLock::new(BTreeMap::new()),
            metadata: None,
        }
    }

    /// Validate against a metadata store as well; uncovered rule ids become warnings.
    pub fn with_metadata(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    /// Recursively scan the rules directory and load all YAML files.
    ///
    /// Replaces any previously loaded documents. Dotfiles and non-YAML files
    /// are skipped; parse and validation errors are reported per file and do
    /// not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        let mut loaded: BTreeMap<String, Arc<ServiceDocument>> = BTreeMap::new();
        let mut origins: HashMap<String, PathBuf> = HashMap::new();

        self.scan_dir_recursive(&self.rules_dir, &mut results, &mut loaded, &mut origins)?;

        let count = loaded.len();
        *self.documents.write().unwrap_or_else(PoisonError::into_inner) = loaded;

        let failed = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Failed { .. }))
            .count();
        info!(
            path = %self.rules_dir.display(),
            loaded = count,
            failed,
            "rule documents loaded"
        );
        Ok(results)
    }

    fn scan_dir_recursive(
        &self,
        dir: &Path,
        results: &mut Vec<LoadResult>,
        loaded: &mut BTreeMap<String, Arc<ServiceDocument>>,
        origins: &mut HashMap<String, PathBuf>,
    ) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();

        for path in paths {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results, loaded, origins)?;
                continue;
            }

            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yml" || e == "yaml")
                .unwrap_or(false);

            if !is_yaml {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            let outcome = self.load_file_with_warnings(&path).and_then(|(doc, warnings)| {
                if let Some(first) = origins.get(doc.id()) {
                    return Err(DocumentError::Validation(format!(
                        "duplicate document id '{}' (already loaded from {})",
                        doc.id(),
                        first.display()
                    )));
                }
                Ok((doc, warnings))
            });

            match outcome {
                Ok((doc, warnings)) => {
                    let document_id = doc.id().to_string();
                    info!(
                        document_id = %document_id,
                        provider = %doc.provider(),
                        service = %doc.service(),
                        checks = doc.checks.len(),
                        path = %path.display(),
                        "loaded rule document"
                    );
                    origins.insert(document_id.clone(), path.clone());
                    loaded.insert(document_id.clone(), Arc::new(doc));
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded {
                            document_id,
                            warnings,
                        },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse and validate a single YAML file.
    pub fn load_file(&self, path: &Path) -> Result<ServiceDocument> {
        self.load_file_with_warnings(path).map(|(doc, _)| doc)
    }

    fn load_file_with_warnings(&self, path: &Path) -> Result<(ServiceDocument, usize)> {
        let contents = fs::read_to_string(path)?;
        let doc = parse_document(&contents)?;
        let validation = match &self.metadata {
            Some(store) => validate_document_with_metadata(&doc, store.as_ref()),
            None => validate_document(&doc),
        };
        for w in &validation.warnings {
            debug!(document_id = %doc.id(), path = %w.path, "{}", w.message);
        }
        let warnings = validation.warnings.len();
        check_validation(&doc, validation)?;
        Ok((doc, warnings))
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// A loaded document by id.
    pub fn get(&self, id: &str) -> Option<Arc<ServiceDocument>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the loaded documents, ordered by id.
    pub fn rule_set(&self) -> RuleSet {
        let guard = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        RuleSet::from_validated(guard.values().cloned().collect())
    }
}

/// Parse a YAML string into a [`ServiceDocument`] via two-pass deserialization.
///
/// First pass: deserialize as [`RuleEnvelope`] to read `kind` and `metadata.id`.
/// Second pass: deserialize the full document with unknown fields rejected.
pub fn parse_document(contents: &str) -> Result<ServiceDocument> {
    let envelope: RuleEnvelope = serde_yaml::from_str(contents)?;

    if envelope.metadata.id.is_empty() {
        return Err(DocumentError::Validation(
            "document metadata.id must not be empty".to_string(),
        ));
    }

    envelope.parse_full().map_err(|e| {
        DocumentError::Validation(format!(
            "failed to parse document '{}': {}",
            envelope.metadata.id, e
        ))
    })
}

pub(super) fn check_validation(doc: &ServiceDocument, validation: ValidationResult) -> Result<()> {
    if validation.valid {
        Ok(())
    } else {
        Err(DocumentError::Invalid {
            id: doc.id().to_string(),
            errors: validation.errors,
        })
    }
}
