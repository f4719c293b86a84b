//! Reading and writing the document outline (`/Outlines`).
//!
//! Writing replaces any existing outline with one item per [`BookmarkNode`],
//! linked through `Parent`/`Prev`/`Next`/`First`/`Last`. Reading walks an
//! outline back into the same forest shape, with native depth as level.

use std::collections::{BTreeMap, HashMap, HashSet};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use pdfmark_core::hierarchy::{count_nodes, flatten};
use pdfmark_core::BookmarkNode;

use crate::parser::backend::{decode_text_simple, encode_text_string, media_box, resolve};
use crate::PdfError;

/// Name-tree nodes and named-destination hops are followed at most this deep.
const MAX_LOOKUP_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Replace the document outline with `forest` and return the number of items
/// written.
///
/// Every page is checked before the document is touched, so an out-of-range
/// node leaves `doc` unchanged. Nodes without a page get no destination.
pub fn write_outline(doc: &mut Document, forest: &[BookmarkNode]) -> Result<usize, PdfError> {
    let pages = doc.get_pages();
    for node in flatten(forest) {
        if let Some(page) = node.page {
            if !pages.contains_key(&page) {
                return Err(PdfError::PageOutOfRange {
                    title: node.title.clone(),
                    page,
                    page_count: pages.len(),
                });
            }
        }
    }

    let catalog_id = doc.trailer.get(b"Root")?.as_reference()?;
    // Fail on a broken catalog before allocating anything.
    doc.get_object(catalog_id)?.as_dict()?;

    if forest.is_empty() {
        doc.get_object_mut(catalog_id)?.as_dict_mut()?.remove(b"Outlines");
        doc.prune_objects();
        return Ok(0);
    }

    let outlines_id = doc.new_object_id();
    let (first, last) = write_siblings(doc, forest, outlines_id, &pages);
    let total = count_nodes(forest);

    doc.objects.insert(
        outlines_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first,
            "Last" => last,
            "Count" => total as i64,
        }),
    );

    let catalog = doc.get_object_mut(catalog_id)?.as_dict_mut()?;
    catalog.set("Outlines", outlines_id);
    catalog.set("PageMode", "UseOutlines");

    // Drops the items of the outline that was replaced.
    doc.prune_objects();
    Ok(total)
}

/// Write one sibling list under `parent`, returning its first and last ids.
/// `nodes` must not be empty.
fn write_siblings(
    doc: &mut Document,
    nodes: &[BookmarkNode],
    parent: ObjectId,
    pages: &BTreeMap<u32, ObjectId>,
) -> (ObjectId, ObjectId) {
    let ids: Vec<ObjectId> = nodes.iter().map(|_| doc.new_object_id()).collect();

    for (i, node) in nodes.iter().enumerate() {
        let mut item = Dictionary::new();
        item.set("Title", encode_text_string(&node.title));
        item.set("Parent", parent);
        if i > 0 {
            item.set("Prev", ids[i - 1]);
        }
        if i + 1 < ids.len() {
            item.set("Next", ids[i + 1]);
        }
        if !node.children.is_empty() {
            let (first, last) = write_siblings(doc, &node.children, ids[i], pages);
            item.set("First", first);
            item.set("Last", last);
            // Positive: the item starts expanded.
            item.set("Count", count_nodes(&node.children) as i64);
        }
        if let Some(page_ref) = node.page.and_then(|p| pages.get(&p)) {
            item.set("Dest", destination(doc, *page_ref));
        }
        doc.objects.insert(ids[i], Object::Dictionary(item));
    }

    (ids[0], ids[ids.len() - 1])
}

/// `[page /XYZ null top null]`, or `[page /Fit]` without a MediaBox.
fn destination(doc: &Document, page_ref: ObjectId) -> Object {
    match media_box(doc, page_ref) {
        Some([_, _, _, top]) => Object::Array(vec![
            page_ref.into(),
            "XYZ".into(),
            Object::Null,
            Object::Real(top),
            Object::Null,
        ]),
        None => Object::Array(vec![page_ref.into(), "Fit".into()]),
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

struct Reader<'a> {
    doc: &'a Document,
    /// Page object id to 1-based page number.
    pages: HashMap<ObjectId, u32>,
    visited: HashSet<ObjectId>,
}

/// Walk the existing outline into a forest. A document without an outline
/// yields an empty forest.
pub fn read_outline(doc: &Document) -> Result<Vec<BookmarkNode>, PdfError> {
    let catalog = doc.catalog()?;
    let Some(outlines) = catalog
        .get(b"Outlines")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
    else {
        return Ok(Vec::new());
    };
    let Ok(first) = outlines.get(b"First").and_then(Object::as_reference) else {
        return Ok(Vec::new());
    };

    let mut reader = Reader {
        doc,
        pages: doc.get_pages().into_iter().map(|(n, id)| (id, n)).collect(),
        visited: HashSet::new(),
    };
    Ok(reader.siblings(first, 1))
}

impl<'a> Reader<'a> {
    fn siblings(&mut self, first: ObjectId, level: u8) -> Vec<BookmarkNode> {
        let mut nodes = Vec::new();
        let mut next = Some(first);

        while let Some(id) = next {
            // Sibling or child links that loop back end the walk.
            if !self.visited.insert(id) {
                log::warn!("outline item {id:?} is linked twice; stopping there");
                break;
            }
            let Some(item) = self.doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) else {
                break;
            };

            let mut node = BookmarkNode::new(self.title(item), self.page(item), level);
            if let Ok(child) = item.get(b"First").and_then(Object::as_reference) {
                node.children = self.siblings(child, level.saturating_add(1));
            }
            nodes.push(node);

            next = item.get(b"Next").and_then(Object::as_reference).ok();
        }
        nodes
    }

    fn title(&self, item: &Dictionary) -> String {
        match item.get(b"Title").ok().and_then(|o| resolve(self.doc, o)) {
            Some(Object::String(bytes, _)) => decode_text_simple(bytes).trim().to_string(),
            _ => String::new(),
        }
    }

    /// Target page of an item, from `/Dest` or a GoTo action.
    fn page(&self, item: &Dictionary) -> Option<u32> {
        let dest = match item.get(b"Dest") {
            Ok(dest) => dest,
            Err(_) => {
                let action = resolve(self.doc, item.get(b"A").ok()?)?.as_dict().ok()?;
                if action.get(b"S").and_then(Object::as_name).ok()? != b"GoTo" {
                    return None;
                }
                action.get(b"D").ok()?
            }
        };
        self.dest_page(dest, 0)
    }

    fn dest_page(&self, dest: &Object, depth: usize) -> Option<u32> {
        if depth > MAX_LOOKUP_DEPTH {
            return None;
        }
        match resolve(self.doc, dest)? {
            Object::Array(items) => match items.first()? {
                Object::Reference(page) => self.pages.get(page).copied(),
                // Remote-style destinations count pages from zero.
                Object::Integer(n) => u32::try_from(*n).ok().map(|n| n + 1),
                _ => None,
            },
            Object::Dictionary(dict) => self.dest_page(dict.get(b"D").ok()?, depth + 1),
            Object::Name(name) | Object::String(name, _) => {
                let target = self.named_dest(name)?;
                self.dest_page(target, depth + 1)
            }
            _ => None,
        }
    }

    /// Look a named destination up in the catalog `/Dests` dictionary, then
    /// in the `/Names` `/Dests` name tree.
    fn named_dest(&self, name: &[u8]) -> Option<&'a Object> {
        let catalog = self.doc.catalog().ok()?;

        if let Some(dests) = catalog
            .get(b"Dests")
            .ok()
            .and_then(|o| resolve(self.doc, o))
            .and_then(|o| o.as_dict().ok())
        {
            if let Ok(target) = dests.get(name) {
                return Some(target);
            }
        }

        let tree = resolve(self.doc, catalog.get(b"Names").ok()?)?
            .as_dict()
            .ok()?
            .get(b"Dests")
            .ok()?;
        self.name_tree_lookup(resolve(self.doc, tree)?.as_dict().ok()?, name, 0)
    }

    fn name_tree_lookup(&self, node: &'a Dictionary, key: &[u8], depth: usize) -> Option<&'a Object> {
        if depth > MAX_LOOKUP_DEPTH {
            return None;
        }
        if let Some(names) = node
            .get(b"Names")
            .ok()
            .and_then(|o| resolve(self.doc, o))
            .and_then(|o| o.as_array().ok())
        {
            for pair in names.chunks_exact(2) {
                if let Some(Object::String(k, _)) = resolve(self.doc, &pair[0]) {
                    if k.as_slice() == key {
                        return Some(&pair[1]);
                    }
                }
            }
        }
        let kids = resolve(self.doc, node.get(b"Kids").ok()?)?.as_array().ok()?;
        kids.iter()
            .filter_map(|kid| resolve(self.doc, kid)?.as_dict().ok())
            .find_map(|kid| self.name_tree_lookup(kid, key, depth + 1))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
