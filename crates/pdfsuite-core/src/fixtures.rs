//! Test fixtures: small lopdf-built documents and a renderer that records
//! the copy operations it is asked to perform.

use std::cell::RefCell;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::Result;
use crate::renderer::{LopdfOutput, LopdfRenderer, LopdfSource, PdfRenderer};

/// Build a PDF with one page per entry; `\n` inside an entry starts a new line.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let pages = pages
        .iter()
        .map(|text| {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                set_font(),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
            ];
            for (line_no, line) in text.split('\n').enumerate() {
                if line_no > 0 {
                    operations.push(Operation::new(
                        "Td",
                        vec![Object::Integer(0), Object::Integer(-14)],
                    ));
                }
                operations.push(show(line));
            }
            operations.push(Operation::new("ET", vec![]));
            operations
        })
        .collect();
    pdf_with_operations(pages, None)
}

/// Build a PDF from raw page content operations. Every page gets font `/F1`,
/// and, when `form` is given, a form XObject `/X1` drawing those operations.
pub fn pdf_with_operations(pages: Vec<Vec<Operation>>, form: Option<Vec<Operation>>) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let fonts = || {
        Object::Dictionary(Dictionary::from_iter(vec![(
            "F1",
            Object::Reference(font_id),
        )]))
    };

    let form_id = form.map(|operations| {
        let dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Form".to_vec())),
            ("BBox", letter_box()),
            (
                "Resources",
                Object::Dictionary(Dictionary::from_iter(vec![("Font", fonts())])),
            ),
        ]);
        let content = Content { operations }.encode().expect("encode form");
        doc.add_object(Stream::new(dict, content))
    });

    let mut page_ids = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("encode content"),
        ));

        let mut resources = Dictionary::from_iter(vec![("Font", fonts())]);
        if let Some(form_id) = form_id {
            resources.set(
                "XObject",
                Object::Dictionary(Dictionary::from_iter(vec![(
                    "X1",
                    Object::Reference(form_id),
                )])),
            );
        }
        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("MediaBox", letter_box()),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(page_ids.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    save(&mut doc)
}

/// `num_pages` pages reading "{prefix}-Page-{n}"
pub fn text_pdf(num_pages: usize, prefix: &str) -> Vec<u8> {
    let texts: Vec<String> = (1..=num_pages)
        .map(|n| format!("{}-Page-{}", prefix, n))
        .collect();
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
    pdf_with_pages(&texts)
}

/// [`text_pdf`] where every page carries a Link annotation whose `/P` is the
/// page itself and whose destination is the next page (the last wraps around)
pub fn linked_pdf(num_pages: usize, prefix: &str) -> Vec<u8> {
    let mut doc = Document::load_mem(&text_pdf(num_pages, prefix)).expect("reload fixture");
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for (index, &page_id) in page_ids.iter().enumerate() {
        let target = page_ids[(index + 1) % page_ids.len()];
        let annot = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Annot".to_vec())),
            ("Subtype", Object::Name(b"Link".to_vec())),
            (
                "Rect",
                Object::Array(vec![
                    Object::Integer(72),
                    Object::Integer(700),
                    Object::Integer(200),
                    Object::Integer(730),
                ]),
            ),
            ("P", Object::Reference(page_id)),
            (
                "Dest",
                Object::Array(vec![Object::Reference(target), Object::Name(b"Fit".to_vec())]),
            ),
        ]));
        if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
            page.set("Annots", Object::Array(vec![Object::Reference(annot)]));
        }
    }

    save(&mut doc)
}

/// The three-page question document used throughout the tests
pub fn question_pdf() -> Vec<u8> {
    pdf_with_pages(&["Cover page", "Question 1\nQuestion 2", "Question 4"])
}

pub fn set_font() -> Operation {
    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)])
}

pub fn show(text: &str) -> Operation {
    Operation::new(
        "Tj",
        vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
    )
}

/// `1 0 0 1 x y Tm`
pub fn set_matrix(x: i64, y: i64) -> Operation {
    Operation::new(
        "Tm",
        vec![
            Object::Integer(1),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(1),
            Object::Integer(x),
            Object::Integer(y),
        ],
    )
}

fn letter_box() -> Object {
    Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(612),
        Object::Integer(792),
    ])
}

fn save(doc: &mut Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save fixture");
    buffer
}

/// Delegates to [`LopdfRenderer`] and logs opens and copies.
/// Sources are labelled by the trimmed text of their first page.
#[derive(Default)]
pub struct RecordingRenderer {
    inner: LopdfRenderer,
    pub opened: RefCell<Vec<String>>,
    pub copies: RefCell<Vec<(String, usize, usize)>>,
}

pub struct RecordedSource {
    label: String,
    inner: LopdfSource,
}

impl PdfRenderer for RecordingRenderer {
    type Source = RecordedSource;
    type Output = LopdfOutput;

    fn page_count(&self, bytes: &[u8]) -> Result<usize> {
        self.inner.page_count(bytes)
    }

    fn extract_text_per_page(&self, bytes: &[u8]) -> Result<Vec<String>> {
        self.inner.extract_text_per_page(bytes)
    }

    fn open_source(&self, bytes: &[u8]) -> Result<RecordedSource> {
        let label = self
            .inner
            .extract_text_per_page(bytes)?
            .first()
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        self.opened.borrow_mut().push(label.clone());
        Ok(RecordedSource {
            label,
            inner: self.inner.open_source(bytes)?,
        })
    }

    fn new_output(&self) -> LopdfOutput {
        self.inner.new_output()
    }

    fn copy_page_range(
        &self,
        output: &mut LopdfOutput,
        source: &RecordedSource,
        from: usize,
        to: usize,
    ) -> Result<()> {
        self.copies
            .borrow_mut()
            .push((source.label.clone(), from, to));
        self.inner.copy_page_range(output, &source.inner, from, to)
    }

    fn finalize_output(&self, output: LopdfOutput) -> Result<Vec<u8>> {
        self.inner.finalize_output(output)
    }
}
