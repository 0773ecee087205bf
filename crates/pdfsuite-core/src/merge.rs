//! PDF Merge algorithm
//!
//! Reassembles retained pages from many sources into one document.
//!
//! The algorithm:
//! 1. If no pages are selected, return an error
//! 2. Coalesce the ordered references into maximal runs: consecutive entries
//!    from the same source with consecutive page indices
//! 3. Open each distinct source once, on first use
//! 4. Issue one bulk copy per run, in encounter order
//! 5. Finalize (optimize and serialize) the output

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Result, SuiteError};
use crate::renderer::PdfRenderer;
use crate::workspace::{DocumentId, PageReference, SourceDocument};

pub const MERGED_OUTPUT_NAME: &str = "merged_output.pdf";

/// A maximal stretch of pages `from..=to` taken from one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRun {
    pub source_id: DocumentId,
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub output_name: String,
    #[serde(skip)]
    pub output_pdf: Vec<u8>,
    pub merged_pages: usize,
}

/// Split ordered references into maximal contiguous runs. Runs are neither
/// reordered nor deduplicated.
pub fn coalesce_runs(refs: &[PageReference]) -> Vec<PageRun> {
    let mut runs: Vec<PageRun> = Vec::new();
    for page_ref in refs {
        if let Some(run) = runs.last_mut() {
            if run.source_id == page_ref.source_id && page_ref.page_index == run.to + 1 {
                run.to = page_ref.page_index;
                continue;
            }
        }
        runs.push(PageRun {
            source_id: page_ref.source_id.clone(),
            from: page_ref.page_index,
            to: page_ref.page_index,
        });
    }
    runs
}

/// Single-source variant of [`coalesce_runs`]: `(from, to)` pairs
pub fn coalesce_indices(indices: &[usize]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &index in indices {
        match runs.last_mut() {
            Some((_, to)) if index == *to + 1 => *to = index,
            _ => runs.push((index, index)),
        }
    }
    runs
}

/// Merge the referenced pages, in order, into a new document
pub fn merge_pages<R: PdfRenderer>(
    renderer: &R,
    documents: &[SourceDocument],
    refs: &[PageReference],
) -> Result<MergeResult> {
    if refs.is_empty() {
        return Err(SuiteError::validation("Cannot merge when no pages remain."));
    }

    let by_id: HashMap<&DocumentId, &SourceDocument> =
        documents.iter().map(|doc| (&doc.id, doc)).collect();

    let runs = coalesce_runs(refs);
    tracing::debug!(pages = refs.len(), runs = runs.len(), "merging page runs");

    let mut opened: HashMap<&DocumentId, R::Source> = HashMap::new();
    let mut output = renderer.new_output();

    for run in &runs {
        let document: &SourceDocument = by_id.get(&run.source_id).copied().ok_or_else(|| {
            SuiteError::validation(format!(
                "Page reference points at unknown source document {}",
                run.source_id
            ))
        })?;

        if !opened.contains_key(&document.id) {
            let source = renderer
                .open_source(&document.content)
                .map_err(|e| merge_failure(&document.name, e))?;
            opened.insert(&document.id, source);
        }
        let source = &opened[&document.id];

        renderer
            .copy_page_range(&mut output, source, run.from, run.to)
            .map_err(|e| merge_failure(&document.name, e))?;
    }

    let output_pdf = renderer.finalize_output(output)?;

    Ok(MergeResult {
        output_name: MERGED_OUTPUT_NAME.to_string(),
        output_pdf,
        merged_pages: refs.len(),
    })
}

/// Build a new document from ascending page indices of a single source
pub fn extract_pages<R: PdfRenderer>(renderer: &R, bytes: &[u8], indices: &[usize]) -> Result<Vec<u8>> {
    if indices.is_empty() {
        return Err(SuiteError::validation("No pages selected for extraction."));
    }

    let source = renderer.open_source(bytes)?;
    let mut output = renderer.new_output();
    for (from, to) in coalesce_indices(indices) {
        renderer.copy_page_range(&mut output, &source, from, to)?;
    }
    renderer.finalize_output(output)
}

fn merge_failure(name: &str, err: SuiteError) -> SuiteError {
    match err {
        SuiteError::Parsing(cause) => {
            SuiteError::Parsing(format!("Unable to merge selected pages from {}: {}", name, cause))
        }
        other => other,
    }
}
