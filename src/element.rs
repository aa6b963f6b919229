//! In-memory model of the parsing service's output.
//!
//! The service describes a document as a flat, ordered list of "elements"
//! (titles, paragraphs, list items, tables, images …). The order is the
//! reading order and therefore the rendering order; nothing in this crate
//! reorders elements.
//!
//! The service's `type` strings are open-ended and change between versions,
//! so they are folded into the closed [`ElementKind`] enum at decode time.
//! Anything unrecognised becomes [`ElementKind::Unknown`] and is rendered as
//! plain text rather than rejected.

use serde::Serialize;
use serde_json::{Map, Value};

/// The structural role of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementKind {
    /// Document title, rendered as a level-1 heading.
    Title,
    /// Section header, rendered as a level-2+ heading.
    Header,
    /// Body text paragraph.
    NarrativeText,
    /// One bullet of a list.
    ListItem,
    /// Tabular content, kept verbatim in a code fence.
    Table,
    /// Picture reference.
    Image,
    /// Running page footer.
    Footer,
    /// Page boundary marker.
    PageBreak,
    /// Any type the renderer has no dedicated rule for.
    Unknown,
}

impl ElementKind {
    /// Map a service `type` string onto a kind. Never fails.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "Title" => ElementKind::Title,
            "Header" => ElementKind::Header,
            "NarrativeText" | "UncategorizedText" => ElementKind::NarrativeText,
            "ListItem" => ElementKind::ListItem,
            "Table" => ElementKind::Table,
            "Image" => ElementKind::Image,
            "Footer" => ElementKind::Footer,
            "PageBreak" => ElementKind::PageBreak,
            _ => ElementKind::Unknown,
        }
    }

    /// Whether an element of this kind is dropped when its text is empty.
    ///
    /// Images and page breaks carry their meaning outside `text`.
    pub fn requires_text(self) -> bool {
        !matches!(self, ElementKind::Image | ElementKind::PageBreak)
    }
}

/// One element of a parsed document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentElement {
    /// Normalised kind used for rendering.
    pub kind: ElementKind,
    /// The `type` string exactly as the service sent it (diagnostics only).
    pub type_name: String,
    /// Service-assigned element id, when present.
    pub element_id: Option<String>,
    /// Textual content; may be empty.
    pub text: String,
    /// Heading or list depth, when the service reports one.
    pub level: Option<u8>,
    /// Auxiliary fields (image paths, table HTML, page numbers …).
    pub metadata: Map<String, Value>,
}

impl DocumentElement {
    /// Build an element of `kind` with the given text and no metadata.
    pub fn new(kind: ElementKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: format!("{kind:?}"),
            element_id: None,
            text: text.into(),
            level: None,
            metadata: Map::new(),
        }
    }

    /// Set the depth.
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    /// Add one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A metadata value as a non-empty string.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// An ordered sequence of elements in reading order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    elements: Vec<DocumentElement>,
}

impl Document {
    pub fn new(elements: Vec<DocumentElement>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[DocumentElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentElement> {
        self.elements.iter()
    }

    /// Number of elements the service sent with a type we do not recognise.
    pub fn unknown_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| e.kind == ElementKind::Unknown)
            .count()
    }
}

impl From<Vec<DocumentElement>> for Document {
    fn from(elements: Vec<DocumentElement>) -> Self {
        Self::new(elements)
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = &'a DocumentElement;
    type IntoIter = std::slice::Iter<'a, DocumentElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_type_names_map_to_kinds() {
        assert_eq!(ElementKind::from_type_name("Title"), ElementKind::Title);
        assert_eq!(ElementKind::from_type_name("Header"), ElementKind::Header);
        assert_eq!(ElementKind::from_type_name("ListItem"), ElementKind::ListItem);
        assert_eq!(ElementKind::from_type_name("Table"), ElementKind::Table);
        assert_eq!(ElementKind::from_type_name("Image"), ElementKind::Image);
        assert_eq!(ElementKind::from_type_name("Footer"), ElementKind::Footer);
        assert_eq!(ElementKind::from_type_name("PageBreak"), ElementKind::PageBreak);
    }

    #[test]
    fn uncategorized_text_is_narrative() {
        assert_eq!(
            ElementKind::from_type_name("UncategorizedText"),
            ElementKind::NarrativeText
        );
    }

    #[test]
    fn unrecognised_type_names_are_unknown() {
        for name in ["FigureCaption", "Formula", "title", "", "🙂"] {
            assert_eq!(ElementKind::from_type_name(name), ElementKind::Unknown, "{name}");
        }
    }

    #[test]
    fn metadata_str_ignores_blank_and_non_strings() {
        let e = DocumentElement::new(ElementKind::Image, "")
            .with_metadata("path", "  ")
            .with_metadata("page_number", 3)
            .with_metadata("image_path", "fig.png");
        assert_eq!(e.metadata_str("path"), None);
        assert_eq!(e.metadata_str("page_number"), None);
        assert_eq!(e.metadata_str("image_path"), Some("fig.png"));
    }

    #[test]
    fn document_preserves_order() {
        let doc = Document::from(vec![
            DocumentElement::new(ElementKind::Title, "a"),
            DocumentElement::new(ElementKind::Unknown, "b"),
            DocumentElement::new(ElementKind::NarrativeText, "c"),
        ]);
        let texts: Vec<&str> = doc.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
        assert_eq!(doc.unknown_count(), 1);
    }
}
