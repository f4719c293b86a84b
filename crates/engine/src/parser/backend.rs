use std::collections::BTreeMap;

use lopdf::{self, content::Content, dictionary, Dictionary, Document, Encoding, ObjectId};

use crate::PdfError;

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// A page identifier mirroring `lopdf::ObjectId`: (object number, generation number).
pub type PageId = (u32, u16);

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Font information extracted from a page's resource dictionary.
#[derive(Debug, Clone)]
pub struct BackendFontInfo {
    /// The font name key as it appears in the resource dictionary (e.g. `b"F1"`).
    pub name: Vec<u8>,
    /// Base font name from the font dictionary, if present.
    pub base_font: Option<String>,
}

/// How the strings shown with one font become text.
pub enum FontDecoder<'a> {
    /// A ToUnicode CMap or one of the standard single-byte encodings.
    Mapped(Encoding<'a>),
    /// Identity-H/V without a ToUnicode CMap: codes are read as UTF-16BE.
    Identity,
    /// Nothing usable declared.
    Plain,
}

impl FontDecoder<'_> {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FontDecoder::Mapped(encoding) => match encoding.bytes_to_string(bytes) {
                Ok(text) if is_readable(&text) => text,
                _ => decode_text_simple(bytes),
            },
            FontDecoder::Identity => decode_identity(bytes).unwrap_or_else(|| decode_text_simple(bytes)),
            FontDecoder::Plain => decode_text_simple(bytes),
        }
    }
}

fn is_readable(text: &str) -> bool {
    !text.is_empty() && !text.chars().all(|c| c == '\u{FFFD}' || c.is_control())
}

fn decode_identity(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return None;
    }
    let code_units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    let decoded = String::from_utf16_lossy(&code_units);
    is_readable(&decoded).then_some(decoded)
}

/// Parse the font's ToUnicode CMap, whatever its declared encoding.
fn to_unicode_encoding<'a>(doc: &Document, font: &Dictionary) -> Option<Encoding<'a>> {
    let to_unicode = font.get(b"ToUnicode").ok()?;
    let cid_font = dictionary! {
        "Type" => "Font",
        "Encoding" => "Identity-H",
        "ToUnicode" => to_unicode.clone(),
    };
    match cid_font.get_font_encoding(doc).ok()? {
        Encoding::UnicodeMapEncoding(cmap) => Some(Encoding::UnicodeMapEncoding(cmap)),
        _ => None,
    }
}

/// A simplified, lopdf-independent representation of a content-stream operand.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Dict(Vec<(Vec<u8>, PdfValue)>),
    Reference(PageId),
}

/// A single content-stream operation (operator + operands).
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Extract an `f32` from a [`PdfValue`], accepting both `Integer` and `Real`.
pub fn get_number_from_value(val: &PdfValue) -> Option<f32> {
    match val {
        PdfValue::Integer(i) => Some(*i as f32),
        PdfValue::Real(f) => Some(*f),
        _ => None,
    }
}

/// Convert a `lopdf::Object` into a [`PdfValue`]. Stream bodies are dropped.
pub fn convert_object(obj: &lopdf::Object) -> PdfValue {
    match obj {
        lopdf::Object::Null => PdfValue::Null,
        lopdf::Object::Boolean(b) => PdfValue::Bool(*b),
        lopdf::Object::Integer(i) => PdfValue::Integer(*i),
        lopdf::Object::Real(f) => PdfValue::Real(*f),
        lopdf::Object::Name(n) => PdfValue::Name(n.clone()),
        lopdf::Object::String(s, _) => PdfValue::Str(s.clone()),
        lopdf::Object::Array(arr) => PdfValue::Array(arr.iter().map(convert_object).collect()),
        lopdf::Object::Dictionary(dict) => {
            PdfValue::Dict(dict.iter().map(|(k, v)| (k.clone(), convert_object(v))).collect())
        }
        lopdf::Object::Stream(stream) => PdfValue::Dict(
            stream
                .dict
                .iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect(),
        ),
        lopdf::Object::Reference(id) => PdfValue::Reference(*id),
    }
}

/// Best-effort decoding of raw PDF string bytes into a Rust `String`.
///
/// Handles three cases in order:
/// 1. UTF-16BE with BOM (`\xFE\xFF` prefix) -- strips BOM and decodes.
/// 2. Valid UTF-8 -- returned as-is.
/// 3. Fallback to Latin-1 (ISO 8859-1) -- each byte mapped to its Unicode
///    code point.
///
/// Used for shown text and for outline titles alike.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let code_units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&code_units);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Fallback: Latin-1 (PDFDocEncoding for the printable range).
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode text for a PDF text string: literal bytes when ASCII, otherwise
/// UTF-16BE with a BOM.
pub fn encode_text_string(text: &str) -> lopdf::Object {
    if text.is_ascii() {
        return lopdf::Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    lopdf::Object::String(bytes, lopdf::StringFormat::Hexadecimal)
}

/// Follow indirect references until a direct object is reached.
///
/// Gives up after a handful of hops so a reference loop cannot spin forever.
pub fn resolve<'a>(doc: &'a Document, obj: &'a lopdf::Object) -> Option<&'a lopdf::Object> {
    let mut current = obj;
    for _ in 0..8 {
        match current {
            lopdf::Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// The page's MediaBox as `[llx, lly, urx, ury]`, inherited through the page
/// tree when the page itself does not carry one.
pub fn media_box(doc: &Document, page: ObjectId) -> Option<[f32; 4]> {
    let mut dict = doc.get_object(page).ok()?.as_dict().ok()?;
    // Page trees are shallow; the bound only guards against Parent cycles.
    for _ in 0..32 {
        if let Some(arr) = dict.get(b"MediaBox").ok().and_then(|o| resolve(doc, o)) {
            let nums = array_to_f32s(doc, arr.as_array().ok()?)?;
            return (nums.len() >= 4).then(|| [nums[0], nums[1], nums[2], nums[3]]);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

fn array_to_f32s(doc: &Document, objects: &[lopdf::Object]) -> Option<Vec<f32>> {
    objects
        .iter()
        .map(|obj| match resolve(doc, obj)? {
            lopdf::Object::Integer(i) => Some(*i as f32),
            lopdf::Object::Real(f) => Some(*f),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// PdfBackend trait
// ---------------------------------------------------------------------------

/// Abstraction over a PDF parsing backend (currently backed by `lopdf`).
///
/// Span extraction is written against this trait so its state machine can be
/// tested with pre-decoded operations.
pub trait PdfBackend {
    /// Return a mapping from 1-based page number to [`PageId`].
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Return font information for every font referenced by the given page.
    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>, PdfError>;

    /// Return the raw (possibly compressed) content stream bytes for a page.
    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError>;

    /// Decode raw content-stream bytes into a sequence of [`ContentOp`]s.
    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError>;

    /// The decoder for strings shown with the named font on a page. Called
    /// once per `Tf`.
    fn font_decoder(&self, page: PageId, font_name: &[u8]) -> FontDecoder<'_>;
}

// ---------------------------------------------------------------------------
// LopdfBackend
// ---------------------------------------------------------------------------

/// Concrete [`PdfBackend`] implementation backed by [`lopdf::Document`].
pub struct LopdfBackend {
    doc: Document,
}

impl LopdfBackend {
    /// Parse a PDF from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Wrap an already loaded document. Files protected only by an owner
    /// password open with the empty user password.
    pub fn from_document(mut doc: Document) -> Result<Self, PdfError> {
        if doc.is_encrypted() && doc.decrypt("").is_err() {
            return Err(PdfError::Encrypted);
        }
        Ok(Self { doc })
    }

    /// Direct access to the underlying `lopdf::Document`.
    pub fn raw_doc(&self) -> &Document {
        &self.doc
    }

    /// Give the document back, e.g. to write an outline into it.
    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Total number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

}

// ---------------------------------------------------------------------------
// PdfBackend implementation for LopdfBackend
// ---------------------------------------------------------------------------

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>, PdfError> {
        let fonts_map = self
            .doc
            .get_page_fonts(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page fonts: {}", e)))?;

        let fonts = fonts_map
            .iter()
            .map(|(name, dict)| BackendFontInfo {
                name: name.clone(),
                base_font: dict
                    .get(b"BaseFont")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .map(|n| String::from_utf8_lossy(n).into_owned()),
            })
            .collect();

        Ok(fonts)
    }

    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError> {
        self.doc
            .get_page_content(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e)))
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError> {
        let content =
            Content::decode(data).map_err(|e| PdfError::Parse(format!("content stream decode error: {}", e)))?;

        Ok(content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(convert_object).collect(),
            })
            .collect())
    }

    fn font_decoder(&self, page: PageId, font_name: &[u8]) -> FontDecoder<'_> {
        let Ok(fonts) = self.doc.get_page_fonts(page) else {
            return FontDecoder::Plain;
        };
        let Some(font) = fonts.get(font_name).copied() else {
            return FontDecoder::Plain;
        };

        if let Some(encoding) = to_unicode_encoding(&self.doc, font) {
            return FontDecoder::Mapped(encoding);
        }
        match font.get(b"Encoding").and_then(lopdf::Object::as_name) {
            Ok(b"StandardEncoding" | b"MacRomanEncoding" | b"MacExpertEncoding" | b"WinAnsiEncoding") => font
                .get_font_encoding(&self.doc)
                .map(FontDecoder::Mapped)
                .unwrap_or(FontDecoder::Plain),
            Ok(name) if name.starts_with(b"Identity") => FontDecoder::Identity,
            _ => FontDecoder::Plain,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    // -- decode_text_simple -------------------------------------------------

    #[test]
    fn decode_text_simple_utf8() {
        assert_eq!(decode_text_simple("1.1 Scope".as_bytes()), "1.1 Scope");
    }

    #[test]
    fn decode_text_simple_latin1() {
        // 0xE9 is U+00E9 in Latin-1 but not valid standalone UTF-8.
        assert_eq!(decode_text_simple(&[0x52, 0xE9, 0x73, 0x75, 0x6D, 0xE9]), "R\u{e9}sum\u{e9}");
    }

    #[test]
    fn decode_text_simple_utf16be() {
        let input: &[u8] = &[0xFE, 0xFF, 0x7B, 0x2C, 0x4E, 0x00, 0x7A, 0xE0];
        assert_eq!(decode_text_simple(input), "第一章");
    }

    #[test]
    fn decode_text_simple_utf16be_odd_trailing_byte() {
        let input: &[u8] = &[0xFE, 0xFF, 0x00, 0x41, 0x00];
        assert_eq!(decode_text_simple(input), "A");
    }

    #[test]
    fn decode_text_simple_empty() {
        assert_eq!(decode_text_simple(&[]), "");
    }

    // -- encode_text_string -------------------------------------------------

    #[test]
    fn encode_ascii_title_as_literal() {
        match encode_text_string("Intro") {
            lopdf::Object::String(bytes, lopdf::StringFormat::Literal) => assert_eq!(bytes, b"Intro"),
            other => panic!("expected literal string, got {:?}", other),
        }
    }

    #[test]
    fn encode_non_ascii_title_round_trips() {
        match encode_text_string("第一章 概述") {
            lopdf::Object::String(bytes, _) => {
                assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
                assert_eq!(decode_text_simple(&bytes), "第一章 概述");
            }
            other => panic!("expected string, got {:?}", other),
        }
    }

    // -- convert_object -----------------------------------------------------

    #[test]
    fn convert_tf_operands() {
        let operands = [lopdf::Object::Name(b"F2".to_vec()), lopdf::Object::Real(14.0)];
        let converted: Vec<PdfValue> = operands.iter().map(convert_object).collect();
        assert_eq!(converted, vec![PdfValue::Name(b"F2".to_vec()), PdfValue::Real(14.0)]);
        assert_eq!(get_number_from_value(&converted[1]), Some(14.0));
        assert_eq!(get_number_from_value(&converted[0]), None);
    }

    #[test]
    fn convert_tj_array_with_kerning() {
        let arr = lopdf::Object::Array(vec![
            lopdf::Object::string_literal("Meth"),
            lopdf::Object::Integer(-20),
            lopdf::Object::string_literal("ods"),
        ]);
        assert_eq!(
            convert_object(&arr),
            PdfValue::Array(vec![
                PdfValue::Str(b"Meth".to_vec()),
                PdfValue::Integer(-20),
                PdfValue::Str(b"ods".to_vec()),
            ])
        );
    }

    // -- LopdfBackend -------------------------------------------------------

    #[test]
    fn load_bytes_and_inherit_media_box() {
        let mut doc = fixtures::blank_document(2);
        let backend = LopdfBackend::load_bytes(&fixtures::to_bytes(&mut doc)).unwrap();
        assert_eq!(backend.page_count(), 2);

        let first = backend.pages()[&1];
        assert_eq!(media_box(backend.raw_doc(), first), Some([0.0, 0.0, 595.0, 842.0]));
    }

    #[test]
    fn load_bytes_rejects_garbage() {
        assert!(matches!(
            LopdfBackend::load_bytes(b"definitely not a pdf"),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn page_fonts_resolve_base_font() {
        let doc = fixtures::blank_document(1);
        let backend = LopdfBackend::from_document(doc).unwrap();
        let page = backend.pages()[&1];
        let fonts = backend.page_fonts(page).unwrap();
        let f2 = fonts.iter().find(|f| f.name == b"F2").unwrap();
        assert_eq!(f2.base_font.as_deref(), Some("Helvetica-Bold"));
    }

    #[test]
    fn test_font_decoder_uses_to_unicode_cmap() {
        let backend = LopdfBackend::from_document(fixtures::to_unicode_document()).unwrap();
        let page = backend.pages()[&1];
        let decoder = backend.font_decoder(page, b"F3");
        assert!(matches!(decoder, FontDecoder::Mapped(_)));
        assert_eq!(decoder.decode(&[0x00, 0x01, 0x00, 0x02]), "In");
    }

    #[test]
    fn test_font_decoder_without_encoding_is_plain() {
        let backend = LopdfBackend::from_document(fixtures::blank_document(1)).unwrap();
        let page = backend.pages()[&1];
        let decoder = backend.font_decoder(page, b"F1");
        assert!(matches!(decoder, FontDecoder::Plain));
        assert_eq!(decoder.decode(b"1. Intro"), "1. Intro");
        assert!(matches!(backend.font_decoder(page, b"Missing"), FontDecoder::Plain));
    }

    #[test]
    fn test_identity_without_cmap_reads_utf16() {
        assert_eq!(FontDecoder::Identity.decode(&[0x7B, 0x2C, 0x4E, 0x00]), "第一");
        // Odd length falls back to the byte heuristics.
        assert_eq!(FontDecoder::Identity.decode(b"abc"), "abc");
    }

    #[test]
    fn test_undecryptable_document_is_rejected() {
        let mut doc = fixtures::blank_document(1);
        let encrypt = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 99,
            "R" => 99,
        });
        doc.trailer.set("Encrypt", encrypt);
        assert!(matches!(LopdfBackend::from_document(doc), Err(PdfError::Encrypted)));
    }
}
