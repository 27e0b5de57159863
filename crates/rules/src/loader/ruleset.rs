//! The set of validated documents a scan runs over.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::schema::ServiceDocument;
use crate::validation::validate_document;

use super::core::check_validation;
use super::error::DocumentError;

/// Immutable collection of validated service documents.
///
/// Cheap to clone; documents are shared behind `Arc` across scan runs.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    documents: Vec<Arc<ServiceDocument>>,
}

impl RuleSet {
    /// Validate documents from any source. Invalid or duplicate documents are
    /// returned alongside the set instead of being included.
    pub fn from_documents(
        docs: impl IntoIterator<Item = ServiceDocument>,
    ) -> (Self, Vec<(String, DocumentError)>) {
        let mut documents = Vec::new();
        let mut rejected = Vec::new();
        let mut ids = HashSet::new();

        for doc in docs {
            let id = doc.id().to_string();
            if ids.contains(&id) {
                rejected.push((
                    id.clone(),
                    DocumentError::Validation(format!("duplicate document id '{id}'")),
                ));
                continue;
            }
            match check_validation(&doc, validate_document(&doc)) {
                Ok(()) => {
                    ids.insert(id);
                    documents.push(Arc::new(doc));
                }
                Err(e) => {
                    warn!(document_id = %id, error = %e, "rejected rule document");
                    rejected.push((id, e));
                }
            }
        }

        (Self { documents }, rejected)
    }

    pub(super) fn from_validated(documents: Vec<Arc<ServiceDocument>>) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> &[Arc<ServiceDocument>] {
        &self.documents
    }

    /// Documents with `metadata.enabled` set.
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<ServiceDocument>> {
        self.documents.iter().filter(|d| d.metadata.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ServiceDocument>> {
        self.documents.iter().find(|d| d.id() == id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Enabled checks across enabled documents.
    pub fn check_count(&self) -> usize {
        self.enabled()
            .map(|d| d.checks.iter().filter(|c| c.enabled).count())
            .sum()
    }
}
