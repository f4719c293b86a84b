//! PDF access: the `lopdf` backend and the span extractor built on it.

pub mod backend;
pub mod layout;
