//! The imperative half of pdfmark: PDF access through `lopdf`, outline
//! reading and writing, and the pipeline that drives the pure stages of
//! `pdfmark_core`.

use thiserror::Error;

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod outline;
pub mod parser;

pub use config::{EngineConfig, Invocation, Mode};
pub use engine::{run, RunSummary};
pub use error::{EngineError, ErrorKind, Failure};
pub use events::{EngineEvent, EventSink, Stage};

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Bookmark {title:?} targets page {page}, but the document has {page_count} page(s)")]
    PageOutOfRange {
        title: String,
        page: u32,
        page_count: usize,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for PdfError {
    fn from(e: lopdf::Error) -> Self {
        PdfError::Parse(e.to_string())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory PDFs for tests.

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, ObjectId, Stream};

    /// A line of text placed on a page.
    pub struct Line<'a> {
        pub text: &'a str,
        pub size: f32,
        pub x: f32,
        pub y: f32,
        pub bold: bool,
    }

    pub fn line(text: &str, size: f32, x: f32, y: f32) -> Line<'_> {
        Line {
            text,
            size,
            x,
            y,
            bold: false,
        }
    }

    pub fn bold(text: &str, size: f32, x: f32, y: f32) -> Line<'_> {
        Line {
            text,
            size,
            x,
            y,
            bold: true,
        }
    }

    /// Build a document with one page per entry. The MediaBox (A4) lives on
    /// the page tree root and is inherited by every page.
    pub fn document(pages: &[Vec<Line>]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let heavy = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let resources = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => heavy,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            for l in lines {
                let font = if l.bold { "F2" } else { "F1" };
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec![font.into(), Object::Real(l.size)]));
                operations.push(Operation::new(
                    "Tm",
                    vec![1.into(), 0.into(), 0.into(), 1.into(), Object::Real(l.x), Object::Real(l.y)],
                ));
                operations.push(Operation::new("Tj", vec![Object::string_literal(l.text)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    pub fn to_bytes(doc: &mut Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// One page showing "In" through a Type0 font whose glyph codes only
    /// make sense through its ToUnicode CMap.
    pub fn to_unicode_document() -> Document {
        let mut doc = document(&[vec![]]);
        let cmap = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0001> <0049>
<0002> <006E>
endbfchar
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";
        let to_unicode = doc.add_object(Stream::new(dictionary! {}, cmap.to_vec()));
        let font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "NotoSansCJK-Regular",
            "Encoding" => "Identity-H",
            "ToUnicode" => to_unicode,
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F3".into(), Object::Real(12.0)]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(vec![0, 1, 0, 2], lopdf::StringFormat::Hexadecimal)],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let resources = doc.add_object(dictionary! {
            "Font" => dictionary! { "F3" => font },
        });
        let page_id = doc.page_iter().next().unwrap();
        let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut).unwrap();
        page.set("Contents", content_id);
        page.set("Resources", resources);
        doc
    }

    /// `n` pages of plain body text.
    pub fn blank_document(n: usize) -> Document {
        let pages: Vec<Vec<Line>> = (0..n).map(|_| vec![line("body", 11.0, 72.0, 700.0)]).collect();
        document(&pages)
    }
}
