//! Workspace page store
//!
//! A [`Session`] holds the loaded source documents and the ordered list of
//! retained page references. Every transition takes the current session by
//! reference and returns a new one; nothing is mutated in place, so a caller
//! only ever observes complete states.
//!
//! Page references are deleted, never renumbered: a reference keeps pointing
//! at the same source page for as long as it survives.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SuiteConfig;
use crate::error::{Result, SuiteError};
use crate::renderer::PdfRenderer;

/// Opaque id assigned to a source document when it is loaded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn generate() -> Self {
        DocumentId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        DocumentId(value.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One loaded PDF. Content is shared, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    pub id: DocumentId,
    pub name: String,
    pub size_bytes: usize,
    pub page_count: usize,
    #[serde(skip)]
    pub content: Arc<[u8]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageReference {
    pub source_id: DocumentId,
    /// Zero-based page index within the source
    pub page_index: usize,
}

impl PageReference {
    pub fn new(source_id: DocumentId, page_index: usize) -> Self {
        Self {
            source_id,
            page_index,
        }
    }

    fn points_at(&self, source_id: &DocumentId, page_index: usize) -> bool {
        &self.source_id == source_id && self.page_index == page_index
    }
}

/// Loads uploads into source documents, enforcing the configured limits
pub struct PageStore<'r, R: PdfRenderer> {
    renderer: &'r R,
    config: SuiteConfig,
}

impl<'r, R: PdfRenderer> PageStore<'r, R> {
    pub fn new(renderer: &'r R, config: SuiteConfig) -> Self {
        Self { renderer, config }
    }

    /// Validate and open `(name, bytes)` uploads in call order.
    ///
    /// Fails on size limits or a non-PDF name before any document is parsed.
    pub fn load(&self, files: Vec<(String, Vec<u8>)>) -> Result<Vec<SourceDocument>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        self.config.check_uploads(files.as_slice())?;

        let mut documents = Vec::with_capacity(files.len());
        for (name, bytes) in files {
            let page_count = self.renderer.page_count(&bytes)?;
            tracing::debug!(name = %name, page_count, "loaded source document");
            documents.push(SourceDocument {
                id: DocumentId::generate(),
                size_bytes: bytes.len(),
                page_count,
                content: Arc::from(bytes),
                name,
            });
        }
        Ok(documents)
    }
}

/// One reference per page of each document, documents in order
pub fn initial_page_references(documents: &[SourceDocument]) -> Vec<PageReference> {
    documents
        .iter()
        .flat_map(|doc| (0..doc.page_count).map(move |index| PageReference::new(doc.id.clone(), index)))
        .collect()
}

pub fn remove_single_page(
    refs: &[PageReference],
    source_id: &DocumentId,
    page_index: usize,
) -> Vec<PageReference> {
    refs.iter()
        .filter(|r| !r.points_at(source_id, page_index))
        .cloned()
        .collect()
}

pub fn remove_multiple_pages(
    refs: &[PageReference],
    source_id: &DocumentId,
    page_indices: &HashSet<usize>,
) -> Vec<PageReference> {
    refs.iter()
        .filter(|r| !(&r.source_id == source_id && page_indices.contains(&r.page_index)))
        .cloned()
        .collect()
}

/// Drop a source together with every reference to it
pub fn remove_source(
    documents: &[SourceDocument],
    refs: &[PageReference],
    source_id: &DocumentId,
) -> (Vec<SourceDocument>, Vec<PageReference>) {
    let documents = documents
        .iter()
        .filter(|doc| &doc.id != source_id)
        .cloned()
        .collect();
    let refs = refs
        .iter()
        .filter(|r| &r.source_id != source_id)
        .cloned()
        .collect();
    (documents, refs)
}

/// Parse a page range spec like "1, 3, 5-7" into sorted unique 1-based pages,
/// each within `1..=max_page`.
pub fn parse_page_ranges(spec: &str, max_page: usize) -> Result<Vec<usize>> {
    use std::collections::BTreeSet;

    let parts: Vec<&str> = spec
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(SuiteError::validation(
            "Enter one or more page numbers or ranges.",
        ));
    }

    let mut pages = BTreeSet::new();
    for part in parts {
        if let Some((start, end)) = part.split_once('-') {
            let (start, end) = match (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
                (Ok(start), Ok(end)) => (start, end),
                _ => return Err(invalid_token(part)),
            };
            if start > end {
                return Err(SuiteError::validation(format!(
                    "Invalid range '{}'. Start must be <= end.",
                    part
                )));
            }
            if start < 1 || end > max_page {
                return Err(SuiteError::validation(format!(
                    "Range '{}' is out of range (1-{}).",
                    part, max_page
                )));
            }
            pages.extend(start..=end);
        } else {
            let page: usize = part.parse().map_err(|_| invalid_token(part))?;
            if page < 1 || page > max_page {
                return Err(SuiteError::validation(format!(
                    "Page {} is out of range (1-{}).",
                    page, max_page
                )));
            }
            pages.insert(page);
        }
    }

    Ok(pages.into_iter().collect())
}

fn invalid_token(part: &str) -> SuiteError {
    SuiteError::validation(format!(
        "Invalid token '{}'. Use formats like 1,3,5-7.",
        part
    ))
}

/// Caller-owned workspace state. Transitions return a new session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    documents: Vec<SourceDocument>,
    page_refs: Vec<PageReference>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    pub fn page_refs(&self) -> &[PageReference] {
        &self.page_refs
    }

    pub fn document(&self, id: &DocumentId) -> Option<&SourceDocument> {
        self.documents.iter().find(|doc| &doc.id == id)
    }

    /// Append freshly loaded documents with all of their pages retained
    pub fn add_documents(&self, loaded: Vec<SourceDocument>) -> Session {
        let mut page_refs = self.page_refs.clone();
        page_refs.extend(initial_page_references(&loaded));
        let mut documents = self.documents.clone();
        documents.extend(loaded);
        Session {
            documents,
            page_refs,
        }
    }

    pub fn remove_page(&self, source_id: &DocumentId, page_index: usize) -> Session {
        Session {
            documents: self.documents.clone(),
            page_refs: remove_single_page(&self.page_refs, source_id, page_index),
        }
    }

    pub fn remove_pages(&self, source_id: &DocumentId, page_indices: &HashSet<usize>) -> Session {
        Session {
            documents: self.documents.clone(),
            page_refs: remove_multiple_pages(&self.page_refs, source_id, page_indices),
        }
    }

    /// Remove pages given as a 1-based range spec against the source's page count
    pub fn remove_page_ranges(&self, source_id: &DocumentId, spec: &str) -> Result<Session> {
        let document = self.document(source_id).ok_or_else(|| {
            SuiteError::validation(format!("Unknown source document: {}", source_id))
        })?;
        let indices: HashSet<usize> = parse_page_ranges(spec, document.page_count)?
            .into_iter()
            .map(|page| page - 1)
            .collect();
        Ok(self.remove_pages(source_id, &indices))
    }

    pub fn remove_source(&self, source_id: &DocumentId) -> Session {
        let (documents, page_refs) = remove_source(&self.documents, &self.page_refs, source_id);
        Session {
            documents,
            page_refs,
        }
    }

    /// Retained page count per source, for display
    pub fn retained_counts(&self) -> BTreeMap<DocumentId, usize> {
        let mut counts = BTreeMap::new();
        for page_ref in &self.page_refs {
            *counts.entry(page_ref.source_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}
