//! Markdown rendering: fold an ordered element sequence into one document.
//!
//! Every element maps to at most one Markdown *block*. Blocks are joined by
//! exactly one blank line, with one exception: consecutive list items form a
//! single list and are joined by a bare newline. The only state carried from
//! one element to the next is the [`Mode`] of the previous block and, inside
//! a list, the stack of open nesting levels. Both are threaded through a fold
//! in an explicit [`Accumulator`].
//!
//! | kind | block |
//! |------|-------|
//! | Title | `# text` |
//! | Header | `## text`, one `#` more per `level`, capped at six |
//! | NarrativeText, Unknown | text as a paragraph |
//! | ListItem | `- text`, indented two spaces per open nesting level |
//! | Table | text inside a code fence |
//! | Image | `![image](path)`, or `![]()` when no path is known |
//! | Footer | `*text*` |
//! | PageBreak | `---` |
//!
//! Rendering is total: it never fails and never consults anything but its
//! input, so the same elements always produce the same bytes.

use crate::element::{Document, DocumentElement, ElementKind};
use crate::pipeline::normalize::{code_fence_for, normalize_preformatted, normalize_text};
use tracing::debug;

/// Metadata keys searched, in order, for an image location.
const IMAGE_PATH_KEYS: [&str; 4] = ["path", "image_path", "image_url", "url"];

/// Deepest heading Markdown supports.
const MAX_HEADING_DEPTH: usize = 6;

/// Nested lists deeper than this are flattened to this depth.
const MAX_LIST_DEPTH: usize = 8;

/// Render a whole document.
pub fn render_document(document: &Document) -> String {
    render(document.elements())
}

/// Render elements in the order given.
pub fn render<'a, I>(elements: I) -> String
where
    I: IntoIterator<Item = &'a DocumentElement>,
{
    let acc = elements
        .into_iter()
        .filter_map(block_for)
        .fold(Accumulator::default(), Accumulator::push);
    debug!("Rendered {} blocks", acc.blocks);
    acc.finish()
}

/// One unit of Markdown output.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    /// A block separated from its neighbours by blank lines.
    Standalone(String),
    /// A list item at the service's nesting `level`; merges with adjacent
    /// list items.
    ListItem { level: u8, text: String },
}

/// What the last emitted block was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Start,
    Block,
    List,
}

#[derive(Debug, Default)]
struct Accumulator {
    out: String,
    mode: Mode,
    /// Service levels of the open list items, outermost first. Its length
    /// is the nesting depth of the next sibling; it only grows one step per
    /// item, so no item is indented past its parent's content.
    open_levels: Vec<u8>,
    blocks: usize,
}

impl Accumulator {
    fn push(mut self, block: Block) -> Self {
        let (text, next_mode) = match block {
            Block::Standalone(text) => (text, Mode::Block),
            Block::ListItem { level, text } => {
                let depth = self.list_depth(level);
                (list_item(&text, depth), Mode::List)
            }
        };

        match (self.mode, next_mode) {
            (Mode::Start, _) => {}
            (Mode::List, Mode::List) => self.out.push('\n'),
            _ => self.out.push_str("\n\n"),
        }

        self.out.push_str(&text);
        self.mode = next_mode;
        self.blocks += 1;
        self
    }

    /// Nesting depth for an item at `level`, relative to the items before it
    /// in the same list.
    fn list_depth(&mut self, level: u8) -> usize {
        if self.mode != Mode::List {
            self.open_levels.clear();
        }
        while self.open_levels.last().is_some_and(|&open| open > level) {
            self.open_levels.pop();
        }
        if self.open_levels.last() != Some(&level) && self.open_levels.len() <= MAX_LIST_DEPTH {
            self.open_levels.push(level);
        }
        self.open_levels.len().saturating_sub(1)
    }

    fn finish(mut self) -> String {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out
    }
}

/// The block for one element, or `None` when a text element has no text.
fn block_for(element: &DocumentElement) -> Option<Block> {
    let text = normalize_text(&element.text);
    if text.is_empty() && element.kind.requires_text() && element.kind != ElementKind::Table {
        return None;
    }

    let block = match element.kind {
        ElementKind::Title => Block::Standalone(heading(1, &text)),
        ElementKind::Header => {
            let depth = 2 + usize::from(element.level.unwrap_or(0));
            Block::Standalone(heading(depth, &text))
        }
        ElementKind::ListItem => Block::ListItem {
            level: element.level.unwrap_or(0),
            text,
        },
        ElementKind::Table => Block::Standalone(table(element)?),
        ElementKind::Image => Block::Standalone(image(element)),
        ElementKind::Footer => Block::Standalone(format!("*{}*", single_line(&text))),
        ElementKind::PageBreak => Block::Standalone("---".to_string()),
        ElementKind::NarrativeText | ElementKind::Unknown => Block::Standalone(text),
    };
    Some(block)
}

fn heading(depth: usize, text: &str) -> String {
    let hashes = "#".repeat(depth.clamp(1, MAX_HEADING_DEPTH));
    format!("{hashes} {}", single_line(text))
}

/// Headings and emphasis cannot span lines in Markdown.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn list_item(text: &str, depth: usize) -> String {
    let indent = "  ".repeat(depth);
    let continuation = format!("{indent}  ");

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let mut item = format!("{indent}- {}", lines.next().unwrap_or_default());
    for line in lines {
        item.push('\n');
        item.push_str(&continuation);
        item.push_str(line.trim_start());
    }
    item
}

/// Table content kept verbatim in a fence; HTML is the fallback source.
///
/// Column alignment often lives in leading spaces, so the text is only
/// lightly normalised.
fn table(element: &DocumentElement) -> Option<String> {
    let text = normalize_preformatted(&element.text);
    let content = if text.is_empty() {
        normalize_preformatted(element.metadata_str("text_as_html")?)
    } else {
        text
    };
    if content.is_empty() {
        return None;
    }
    let fence = code_fence_for(&content);
    Some(format!("{fence}\n{content}\n{fence}"))
}

fn image(element: &DocumentElement) -> String {
    match image_target(element) {
        Some(target) => format!("![image]({})", link_destination(&target)),
        None => "![]()".to_string(),
    }
}

fn image_target(element: &DocumentElement) -> Option<String> {
    if let Some(path) = IMAGE_PATH_KEYS
        .iter()
        .find_map(|key| element.metadata_str(key))
    {
        return Some(path.to_string());
    }

    let data = element.metadata_str("image_base64")?;
    let mime = element.metadata_str("image_mime_type").unwrap_or("image/png");
    Some(format!("data:{mime};base64,{data}"))
}

/// Percent-encode the characters that would end or split a link
/// destination. Existing escapes are left alone.
fn link_destination(target: &str) -> String {
    let mut out = String::with_capacity(target.len());
    for c in target.chars() {
        match c {
            ' ' | '\t' | '\n' | '\r' | '(' | ')' | '<' | '>' => {
                out.push_str(&format!("%{:02X}", c as u32));
            }
            c if c.is_whitespace() || c.is_control() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind::*;

    fn el(kind: ElementKind, text: &str) -> DocumentElement {
        DocumentElement::new(kind, text)
    }

    #[test]
    fn title_then_paragraph() {
        let out = render(&[el(Title, "Report"), el(NarrativeText, "Intro text.")]);
        assert_eq!(out, "# Report\n\nIntro text.\n");
    }

    #[test]
    fn list_group_then_paragraph() {
        let out = render(&[el(ListItem, "a"), el(ListItem, "b"), el(NarrativeText, "after")]);
        assert_eq!(out, "- a\n- b\n\nafter\n");
    }

    #[test]
    fn paragraph_before_list_gets_one_blank_line() {
        let out = render(&[el(NarrativeText, "before"), el(ListItem, "x"), el(ListItem, "y")]);
        assert_eq!(out, "before\n\n- x\n- y\n");
    }

    #[test]
    fn lists_split_by_other_blocks_are_separate_groups() {
        let out = render(&[
            el(ListItem, "a"),
            el(Header, "Mid"),
            el(ListItem, "b"),
        ]);
        assert_eq!(out, "- a\n\n## Mid\n\n- b\n");
    }

    #[test]
    fn n_list_items_are_one_block_of_n_lines() {
        let items: Vec<DocumentElement> = (0..7).map(|i| el(ListItem, &format!("item {i}"))).collect();
        let out = render(&items);
        let body = out.trim_end_matches('\n');
        assert!(!body.contains("\n\n"));
        assert_eq!(body.lines().count(), 7);
        assert!(body.lines().all(|l| l.starts_with("- item ")));
    }

    #[test]
    fn header_depth_follows_level() {
        assert_eq!(render(&[el(Header, "H")]), "## H\n");
        assert_eq!(render(&[el(Header, "H").with_level(1)]), "### H\n");
        assert_eq!(render(&[el(Header, "H").with_level(200)]), "###### H\n");
    }

    #[test]
    fn headings_are_single_line() {
        assert_eq!(render(&[el(Title, "Annual\nReport  2024")]), "# Annual Report 2024\n");
    }

    #[test]
    fn nested_list_items_are_indented() {
        let out = render(&[
            el(ListItem, "top"),
            el(ListItem, "child").with_level(1),
            el(ListItem, "multi\n\nline"),
        ]);
        assert_eq!(out, "- top\n  - child\n- multi\n  line\n");
    }

    #[test]
    fn list_starting_deep_is_not_indented() {
        let out = render(&[el(NarrativeText, "p"), el(ListItem, "x").with_level(2)]);
        assert_eq!(out, "p\n\n- x\n");
    }

    #[test]
    fn level_jumps_nest_one_step_at_a_time() {
        let out = render(&[
            el(ListItem, "a"),
            el(ListItem, "b").with_level(3),
            el(ListItem, "c").with_level(3),
            el(ListItem, "d").with_level(5),
            el(ListItem, "e").with_level(1),
            el(ListItem, "f"),
        ]);
        assert_eq!(out, "- a\n  - b\n  - c\n    - d\n  - e\n- f\n");
    }

    #[test]
    fn list_after_other_block_restarts_at_top_level() {
        let out = render(&[
            el(ListItem, "a"),
            el(ListItem, "b").with_level(1),
            el(NarrativeText, "p"),
            el(ListItem, "c").with_level(1),
        ]);
        assert_eq!(out, "- a\n  - b\n\np\n\n- c\n");
    }

    #[test]
    fn table_keeps_leading_indentation() {
        let out = render(&[el(Table, "      Q1  Q2\nEU     1   2")]);
        assert_eq!(out, "```\n      Q1  Q2\nEU     1   2\n```\n");
    }

    #[test]
    fn table_is_fenced_verbatim() {
        let out = render(&[el(Table, "Name Age\nAda 36")]);
        assert_eq!(out, "```\nName Age\nAda 36\n```\n");
    }

    #[test]
    fn table_falls_back_to_html() {
        let t = el(Table, "").with_metadata("text_as_html", "<table><tr><td>1</td></tr></table>");
        assert_eq!(
            render(&[t]),
            "```\n<table><tr><td>1</td></tr></table>\n```\n"
        );
    }

    #[test]
    fn empty_table_emits_nothing() {
        assert_eq!(render(&[el(Table, "  ")]), "");
    }

    #[test]
    fn table_fence_survives_backticks() {
        let out = render(&[el(Table, "```sql\nselect 1\n```")]);
        assert!(out.starts_with("````\n"));
        assert!(out.ends_with("\n````\n"));
    }

    #[test]
    fn image_path_from_metadata() {
        let img = el(Image, "").with_metadata("path", "img1.png");
        assert_eq!(render(&[img]), "![image](img1.png)\n");
    }

    #[test]
    fn image_path_fallback_keys() {
        let img = el(Image, "caption").with_metadata("image_path", "figures/f1.jpg");
        assert_eq!(render(&[img]), "![image](figures/f1.jpg)\n");
    }

    #[test]
    fn image_without_path_is_placeholder() {
        assert_eq!(render(&[el(Image, "")]), "![]()\n");
    }

    #[test]
    fn image_from_base64() {
        let img = el(Image, "")
            .with_metadata("image_base64", "iVBORw0KGgo=")
            .with_metadata("image_mime_type", "image/jpeg");
        assert_eq!(render(&[img]), "![image](data:image/jpeg;base64,iVBORw0KGgo=)\n");
    }

    #[test]
    fn image_path_with_spaces_is_percent_encoded() {
        let img = el(Image, "").with_metadata("path", "my figs/a (1).png");
        assert_eq!(render(&[img]), "![image](my%20figs/a%20%281%29.png)\n");
    }

    #[test]
    fn image_path_line_breaks_are_percent_encoded() {
        let img = el(Image, "").with_metadata("path", "figs/a\nb\r.png");
        assert_eq!(render(&[img]), "![image](figs/a%0Ab%0D.png)\n");
    }

    #[test]
    fn footer_and_page_break() {
        let out = render(&[
            el(NarrativeText, "end of page"),
            el(Footer, "Confidential"),
            el(PageBreak, ""),
            el(NarrativeText, "next page"),
        ]);
        assert_eq!(out, "end of page\n\n*Confidential*\n\n---\n\nnext page\n");
    }

    #[test]
    fn unknown_kind_is_verbatim_paragraph() {
        let mut odd = el(Unknown, "E = mc^2");
        odd.type_name = "Formula".into();
        let out = render(&[el(Title, "T"), odd]);
        assert_eq!(out, "# T\n\nE = mc^2\n");
    }

    #[test]
    fn empty_text_elements_are_skipped() {
        let out = render(&[
            el(Title, "   "),
            el(NarrativeText, "kept"),
            el(ListItem, ""),
            el(Unknown, "\u{200B}"),
        ]);
        assert_eq!(out, "kept\n");
    }

    #[test]
    fn empty_input_renders_empty_string() {
        assert_eq!(render(&[] as &[DocumentElement]), "");
    }

    #[test]
    fn one_block_per_element_in_order() {
        let elements = vec![
            el(Title, "t"),
            el(Header, "h"),
            el(NarrativeText, "p"),
            el(Table, "cells"),
            el(Image, "").with_metadata("path", "i.png"),
            el(Unknown, "u"),
            el(Footer, "f"),
        ];
        let out = render(&elements);
        let blocks: Vec<&str> = out.trim_end().split("\n\n").collect();
        assert_eq!(blocks.len(), elements.len());
        assert_eq!(
            blocks,
            ["# t", "## h", "p", "```\ncells\n```", "![image](i.png)", "u", "*f*"]
        );
    }

    #[test]
    fn render_is_deterministic() {
        let elements = vec![
            el(Title, "Report"),
            el(ListItem, "a"),
            el(ListItem, "b"),
            el(Table, "x y"),
            el(Unknown, "z"),
        ];
        let first = render(&elements);
        for _ in 0..10 {
            assert_eq!(render(&elements), first);
        }
    }

    #[test]
    fn text_is_normalised() {
        let out = render(&[el(NarrativeText, "\u{FEFF}Hello  \r\nworld\r\n")]);
        assert_eq!(out, "Hello\nworld\n");
    }
}
