//! PDF collaborator
//!
//! Everything the domain logic needs from a PDF library sits behind
//! [`PdfRenderer`]: page counting, per-page text, and building a new document
//! out of page ranges copied from opened sources.
//!
//! [`LopdfRenderer`] is the production implementation. Output documents are
//! assembled object by object:
//! 1. Each source is imported once per output, with its object ids shifted
//!    past the output's current `max_id`
//! 2. Every copied page gets a fresh page dictionary (inherited attributes
//!    resolved) so the same source page may appear more than once
//! 3. On finalize a new page tree and catalog are written. Annotations on the
//!    copied pages are re-pointed at the copies (links to pages that were not
//!    copied are dropped) and the imported page trees are deleted, so pages
//!    that were not selected cannot stay reachable. Then the document
//!    is optimized: unreachable objects pruned, identical streams collapsed
//!    and empty ones dropped, objects renumbered, streams deflated

use std::collections::{HashMap, HashSet};

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use sha2::{Digest, Sha256};

use crate::error::{Result, SuiteError};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Ancestor walk limit for malformed, cyclic page trees
const MAX_TREE_DEPTH: usize = 64;

/// TJ adjustments below this (in thousandths of an em) read as a word gap
const KERNING_GAP: f32 = -100.0;

/// `Tm` baselines closer than this continue the current line
const SAME_LINE_TOLERANCE: f32 = 0.01;

/// Form XObjects nested deeper than this are not read for text
const MAX_FORM_DEPTH: usize = 8;

pub trait PdfRenderer {
    /// A decoded source document, opened once and copied from many times
    type Source;
    /// An output document under construction
    type Output;

    fn page_count(&self, bytes: &[u8]) -> Result<usize>;

    /// One entry per page, in page order
    fn extract_text_per_page(&self, bytes: &[u8]) -> Result<Vec<String>>;

    fn open_source(&self, bytes: &[u8]) -> Result<Self::Source>;

    fn new_output(&self) -> Self::Output;

    /// Append pages `from..=to` (zero-based) of `source` to `output`
    fn copy_page_range(
        &self,
        output: &mut Self::Output,
        source: &Self::Source,
        from: usize,
        to: usize,
    ) -> Result<()>;

    /// Serialize the output, compacted
    fn finalize_output(&self, output: Self::Output) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfRenderer;

impl LopdfRenderer {
    pub fn new() -> Self {
        Self
    }
}

pub struct LopdfSource {
    document: Document,
    page_ids: Vec<ObjectId>,
    fingerprint: [u8; 32],
}

impl LopdfSource {
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }
}

pub struct LopdfOutput {
    document: Document,
    pages: Vec<ObjectId>,
    /// Source fingerprint -> object id offset it was imported at
    imported: HashMap<[u8; 32], u32>,
    /// Imported page id -> its first copy in this output
    page_clones: HashMap<ObjectId, ObjectId>,
    /// Imported page tree nodes and catalogs, all removed on finalize
    source_trees: HashSet<ObjectId>,
}

impl LopdfOutput {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn import(&mut self, source: &LopdfSource) -> u32 {
        if let Some(&offset) = self.imported.get(&source.fingerprint) {
            return offset;
        }

        let offset = self.document.max_id;
        for (&(number, generation), object) in source.document.objects.iter() {
            let id = (number + offset, generation);
            if is_page_tree_node(object) {
                self.source_trees.insert(id);
            }
            let mut object = object.clone();
            shift_references(&mut object, offset);
            self.document.objects.insert(id, object);
        }
        self.source_trees.extend(
            source
                .page_ids
                .iter()
                .map(|&(number, generation)| (number + offset, generation)),
        );

        let source_max = source
            .document
            .objects
            .keys()
            .map(|id| id.0)
            .max()
            .unwrap_or(0)
            .max(source.document.max_id);
        self.document.max_id = offset + source_max;
        self.imported.insert(source.fingerprint, offset);

        tracing::debug!(offset, objects = source.document.objects.len(), "imported source objects");
        offset
    }
}

impl PdfRenderer for LopdfRenderer {
    type Source = LopdfSource;
    type Output = LopdfOutput;

    fn page_count(&self, bytes: &[u8]) -> Result<usize> {
        let document = load_document(bytes, "Unable to read PDF page count")?;
        Ok(document.get_pages().len())
    }

    fn extract_text_per_page(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let document = load_document(bytes, "Unable to extract PDF text")?;
        Ok(ordered_page_ids(&document)
            .into_iter()
            .map(|page_id| page_text(&document, page_id))
            .collect())
    }

    fn open_source(&self, bytes: &[u8]) -> Result<LopdfSource> {
        let document = load_document(bytes, "Unable to open source PDF")?;
        let page_ids = ordered_page_ids(&document);

        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&Sha256::digest(bytes));

        Ok(LopdfSource {
            document,
            page_ids,
            fingerprint,
        })
    }

    fn new_output(&self) -> LopdfOutput {
        LopdfOutput {
            document: Document::with_version("1.7"),
            pages: Vec::new(),
            imported: HashMap::new(),
            page_clones: HashMap::new(),
            source_trees: HashSet::new(),
        }
    }

    fn copy_page_range(
        &self,
        output: &mut LopdfOutput,
        source: &LopdfSource,
        from: usize,
        to: usize,
    ) -> Result<()> {
        if from > to || to >= source.page_count() {
            return Err(SuiteError::validation(format!(
                "Page range {}-{} is out of range (document has {} pages)",
                from + 1,
                to + 1,
                source.page_count()
            )));
        }

        let offset = output.import(source);
        for &page_id in &source.page_ids[from..=to] {
            let page = clone_page(&source.document, page_id, offset)?;
            let new_id = output.document.add_object(page);
            output.pages.push(new_id);
            output
                .page_clones
                .entry((page_id.0 + offset, page_id.1))
                .or_insert(new_id);
        }

        Ok(())
    }

    fn finalize_output(&self, output: LopdfOutput) -> Result<Vec<u8>> {
        let LopdfOutput {
            mut document,
            pages,
            page_clones,
            source_trees,
            ..
        } = output;

        let pages_id = document.new_object_id();
        for page_id in &pages {
            if let Some(Object::Dictionary(ref mut page)) = document.objects.get_mut(page_id) {
                page.set("Parent", Object::Reference(pages_id));
            }
        }

        let kids = pages
            .iter()
            .map(|&id| Object::Reference(id))
            .collect::<Vec<_>>();
        let pages_dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(pages.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]);
        document
            .objects
            .insert(pages_id, Object::Dictionary(pages_dict));

        let catalog_id = document.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        document.trailer.set("Root", Object::Reference(catalog_id));

        detach_source_trees(&mut document, &pages, &page_clones, &source_trees);
        optimize(&mut document);

        let mut buffer = Vec::new();
        document
            .save_to(&mut buffer)
            .map_err(|e| SuiteError::parsing("Unable to write output PDF", e))?;
        Ok(buffer)
    }
}

fn load_document(bytes: &[u8], context: &str) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| SuiteError::parsing(context, e))
}

fn ordered_page_ids(document: &Document) -> Vec<ObjectId> {
    // get_pages is keyed by 1-based page number, so values come out in page order
    document.get_pages().into_values().collect()
}

/// Copy a page dictionary out of `source`, resolving inherited attributes,
/// and shift its references into the output's id space.
fn clone_page(source: &Document, page_id: ObjectId, offset: u32) -> Result<Object> {
    let mut page = source
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| SuiteError::parsing("Unable to read page dictionary", e))?
        .clone();

    for key in INHERITABLE {
        if !page.has(key) {
            if let Some(value) = inherited_attribute(source, &page, key) {
                page.set(key.to_vec(), value);
            }
        }
    }
    page.remove(b"Parent");
    // article beads point back into the source's thread list
    page.remove(b"B");

    let mut object = Object::Dictionary(page);
    shift_references(&mut object, offset);
    Ok(object)
}

fn inherited_attribute(document: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(node_id) = parent {
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let node = document.get_object(node_id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    None
}

fn is_page_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .and_then(|dict| dict.get(b"Type"))
        .and_then(Object::as_name)
        .map(|kind| matches!(kind, b"Page" | b"Pages" | b"Catalog"))
        .unwrap_or(false)
}

/// Cut every path from the copied pages back into the imported page trees.
///
/// Annotations are copied per output page with `/P` set to the copy, and
/// destinations naming a copied page are retargeted. Links to pages that were
/// not copied and popups are dropped. The imported tree nodes are deleted and
/// any reference still naming one becomes `null`.
fn detach_source_trees(
    document: &mut Document,
    pages: &[ObjectId],
    page_clones: &HashMap<ObjectId, ObjectId>,
    source_trees: &HashSet<ObjectId>,
) {
    let mut dropped = 0;
    for &page_id in pages {
        let Some(annotations) = page_annotations(document, page_id) else {
            continue;
        };

        let mut kept = Vec::with_capacity(annotations.len());
        for mut annotation in annotations {
            if is_popup(&annotation)
                || !retarget_destination(document, &mut annotation, page_clones, source_trees)
            {
                dropped += 1;
                continue;
            }
            annotation.remove(b"Popup");
            annotation.set("P", Object::Reference(page_id));
            kept.push(Object::Reference(document.add_object(annotation)));
        }

        if let Some(Object::Dictionary(page)) = document.objects.get_mut(&page_id) {
            if kept.is_empty() {
                page.remove(b"Annots");
            } else {
                page.set("Annots", Object::Array(kept));
            }
        }
    }

    for id in source_trees {
        document.objects.remove(id);
    }
    for object in document.objects.values_mut() {
        null_references(object, source_trees);
    }
    for (_, value) in document.trailer.iter_mut() {
        null_references(value, source_trees);
    }

    tracing::debug!(
        dropped,
        removed = source_trees.len(),
        "detached copied pages from source page trees"
    );
}

/// The page's annotation dictionaries, cloned. `None` when it has no `/Annots`.
fn page_annotations(document: &Document, page_id: ObjectId) -> Option<Vec<Dictionary>> {
    let page = document.get_object(page_id).and_then(Object::as_dict).ok()?;
    let items = match page.get(b"Annots").ok()? {
        Object::Array(items) => items,
        Object::Reference(id) => document.get_object(*id).and_then(Object::as_array).ok()?,
        _ => return None,
    };

    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Object::Reference(id) => document
                    .get_object(*id)
                    .and_then(Object::as_dict)
                    .ok()
                    .cloned(),
                Object::Dictionary(dict) => Some(dict.clone()),
                _ => None,
            })
            .collect(),
    )
}

fn is_popup(annotation: &Dictionary) -> bool {
    annotation
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|subtype| subtype == b"Popup")
        .unwrap_or(false)
}

/// Retarget the annotation's `/Dest` or GoTo action destination.
/// Returns false when it links to a page that was not copied.
fn retarget_destination(
    document: &Document,
    annotation: &mut Dictionary,
    page_clones: &HashMap<ObjectId, ObjectId>,
    source_trees: &HashSet<ObjectId>,
) -> bool {
    if let Ok(dest) = annotation.get_mut(b"Dest") {
        return retarget_page_target(dest, page_clones, source_trees);
    }

    let action = match annotation.get(b"A") {
        Ok(Object::Reference(id)) => document
            .get_object(*id)
            .and_then(Object::as_dict)
            .ok()
            .cloned(),
        Ok(Object::Dictionary(action)) => Some(action.clone()),
        _ => None,
    };
    if let Some(mut action) = action {
        if let Ok(dest) = action.get_mut(b"D") {
            if !retarget_page_target(dest, page_clones, source_trees) {
                return false;
            }
        }
        annotation.set("A", Object::Dictionary(action));
    }
    true
}

/// Explicit destinations start with the target page; named ones are kept as is
fn retarget_page_target(
    dest: &mut Object,
    page_clones: &HashMap<ObjectId, ObjectId>,
    source_trees: &HashSet<ObjectId>,
) -> bool {
    let Object::Array(items) = dest else {
        return true;
    };
    match items.first_mut() {
        Some(Object::Reference(target)) if source_trees.contains(&*target) => {
            match page_clones.get(&*target) {
                Some(&copy) => {
                    *target = copy;
                    true
                }
                None => false,
            }
        }
        _ => true,
    }
}

/// Replace references to removed objects with `null`
fn null_references(object: &mut Object, removed: &HashSet<ObjectId>) {
    if matches!(*object, Object::Reference(ref id) if removed.contains(id)) {
        *object = Object::Null;
        return;
    }
    match object {
        Object::Array(items) => {
            for item in items.iter_mut() {
                null_references(item, removed);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                null_references(value, removed);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                null_references(value, removed);
            }
        }
        _ => {}
    }
}

/// Recursively shift object references by `offset`
fn shift_references(object: &mut Object, offset: u32) {
    match object {
        Object::Reference(id) => id.0 += offset,
        Object::Array(items) => {
            for item in items.iter_mut() {
                shift_references(item, offset);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                shift_references(value, offset);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                shift_references(value, offset);
            }
        }
        _ => {}
    }
}

/// Point every reference listed in `redirects` at its replacement
fn redirect_references(object: &mut Object, redirects: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(&target) = redirects.get(id) {
                *id = target;
            }
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                redirect_references(item, redirects);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                redirect_references(value, redirects);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                redirect_references(value, redirects);
            }
        }
        _ => {}
    }
}

/// Lossless size optimization of a freshly assembled document
pub(crate) fn optimize(document: &mut Document) {
    let pruned = document.prune_objects().len();
    let collapsed = collapse_duplicate_streams(document);
    let emptied = document.delete_zero_length_streams().len();
    document.renumber_objects();
    document.compress();
    tracing::debug!(pruned, collapsed, emptied, "optimized output document");
}

/// Collapse byte-identical streams (same dictionary, same content) into one
/// object. Returns the number of objects removed.
fn collapse_duplicate_streams(document: &mut Document) -> usize {
    let mut canonical: HashMap<[u8; 32], ObjectId> = HashMap::new();
    let mut redirects: HashMap<ObjectId, ObjectId> = HashMap::new();

    for (&id, object) in document.objects.iter() {
        if let Object::Stream(stream) = object {
            let mut hasher = Sha256::new();
            hasher.update(format!("{:?}", stream.dict).as_bytes());
            hasher.update(&stream.content);
            let mut key = [0u8; 32];
            key.copy_from_slice(&hasher.finalize());

            match canonical.get(&key) {
                Some(&keep) => {
                    redirects.insert(id, keep);
                }
                None => {
                    canonical.insert(key, id);
                }
            }
        }
    }

    if redirects.is_empty() {
        return 0;
    }

    for object in document.objects.values_mut() {
        redirect_references(object, &redirects);
    }
    for (_, value) in document.trailer.iter_mut() {
        redirect_references(value, &redirects);
    }
    for id in redirects.keys() {
        document.objects.remove(id);
    }

    redirects.len()
}

fn page_text(document: &Document, page_id: ObjectId) -> String {
    let Ok(raw) = document.get_page_content(page_id) else {
        return String::new();
    };
    let resources = document
        .get_object(page_id)
        .and_then(Object::as_dict)
        .ok()
        .and_then(|page| page_resources(document, page));

    let mut walker = TextWalker {
        document,
        text: String::new(),
        line_y: None,
        forms_read: HashSet::new(),
    };
    walker.walk(&raw, resources, 0);
    walker.text
}

/// Content stream text walk for one page, descending into form XObjects
struct TextWalker<'d> {
    document: &'d Document,
    text: String,
    /// Baseline of the current line, when known
    line_y: Option<f32>,
    /// A form drawn several times on a page is read once
    forms_read: HashSet<ObjectId>,
}

impl<'d> TextWalker<'d> {
    fn walk(&mut self, raw: &[u8], resources: Option<&'d Dictionary>, depth: usize) {
        let Ok(content) = Content::decode(raw) else {
            return;
        };

        for op in &content.operations {
            match op.operator.as_str() {
                "Tj" => {
                    if let Some(operand) = op.operands.first() {
                        push_shown_text(&mut self.text, operand);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            match item {
                                Object::String(..) => push_shown_text(&mut self.text, item),
                                Object::Integer(_) | Object::Real(_) => {
                                    if item.as_float().map(|n| n < KERNING_GAP).unwrap_or(false) {
                                        push_space(&mut self.text);
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
                "'" | "\"" => {
                    push_newline(&mut self.text);
                    if let Some(operand) = op.operands.last() {
                        push_shown_text(&mut self.text, operand);
                    }
                }
                "Td" | "TD" => {
                    let ty = op.operands.get(1).and_then(|ty| ty.as_float().ok());
                    match ty {
                        Some(ty) if ty == 0.0 => push_space(&mut self.text),
                        _ => push_newline(&mut self.text),
                    }
                    self.line_y = self.line_y.zip(ty).map(|(y, ty)| y + ty);
                }
                "Tm" => {
                    let y = op.operands.get(5).and_then(|y| y.as_float().ok());
                    match self.line_y.zip(y) {
                        Some((line_y, y)) if (line_y - y).abs() < SAME_LINE_TOLERANCE => {
                            push_space(&mut self.text)
                        }
                        _ => push_newline(&mut self.text),
                    }
                    self.line_y = y;
                }
                "T*" => {
                    push_newline(&mut self.text);
                    self.line_y = None;
                }
                "ET" => push_newline(&mut self.text),
                "Do" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.walk_form(name, resources, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn walk_form(&mut self, name: &[u8], resources: Option<&'d Dictionary>, depth: usize) {
        if depth >= MAX_FORM_DEPTH {
            return;
        }
        let document = self.document;
        let Some(xobjects) = resources.and_then(|r| dict_entry(document, r, b"XObject")) else {
            return;
        };
        let Ok(form_id) = xobjects.get(name).and_then(Object::as_reference) else {
            return;
        };
        if !self.forms_read.insert(form_id) {
            return;
        }
        let Ok(Object::Stream(stream)) = document.get_object(form_id) else {
            return;
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|subtype| subtype == b"Form")
            .unwrap_or(false);
        if !is_form {
            return;
        }

        let content = if stream.dict.has(b"Filter") {
            match stream.decompressed_content() {
                Ok(content) => content,
                Err(_) => return,
            }
        } else {
            stream.content.clone()
        };
        let form_resources = dict_entry(document, &stream.dict, b"Resources").or(resources);

        push_newline(&mut self.text);
        let line_y = self.line_y.take();
        self.walk(&content, form_resources, depth + 1);
        self.line_y = line_y;
    }
}

/// A dictionary stored inline or behind a reference
fn dict_entry<'d>(document: &'d Document, dict: &'d Dictionary, key: &[u8]) -> Option<&'d Dictionary> {
    match dict.get(key).ok()? {
        Object::Reference(id) => document.get_object(*id).and_then(Object::as_dict).ok(),
        Object::Dictionary(inner) => Some(inner),
        _ => None,
    }
}

/// The page's own `/Resources`, or the nearest ancestor's
fn page_resources<'d>(document: &'d Document, page: &'d Dictionary) -> Option<&'d Dictionary> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Some(resources) = dict_entry(document, node, b"Resources") {
            return Some(resources);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = document.get_object(parent).and_then(Object::as_dict).ok()?;
    }
    None
}

fn push_shown_text(text: &mut String, operand: &Object) {
    if let Object::String(bytes, _) = operand {
        text.push_str(&decode_pdf_string(bytes));
    }
}

fn push_newline(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

fn push_space(text: &mut String) {
    if !text.is_empty() && !text.ends_with(char::is_whitespace) {
        text.push(' ');
    }
}

/// UTF-16BE (with BOM), then UTF-8, then Latin-1
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
