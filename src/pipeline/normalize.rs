//! Text normalisation: deterministic cleanup of element text before it is
//! placed into Markdown.
//!
//! Office and PDF extraction leaves artefacts the Markdown output should not
//! carry: Windows line endings, zero-width characters from copy-pasted web
//! content, soft hyphens from justified PDF text, trailing spaces (which
//! Markdown would read as hard line breaks) and stacks of empty lines.
//!
//! Each rule is a pure `&str → String` pass, applied in this order:
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Strip invisible Unicode (ZWSP, BOM, soft hyphen, ZWNJ, ZWJ, word joiner)
//! 3. Trim trailing whitespace per line
//! 4. Collapse runs of blank lines to a single blank line
//! 5. Trim leading and trailing blank space of the whole text

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every normalisation rule to one element's text.
pub fn normalize_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

/// Normalise preformatted text such as table cells laid out with spaces.
///
/// Leading indentation and inner blank lines are kept; only line endings,
/// invisible characters, trailing whitespace and blank edge lines go.
pub fn normalize_preformatted(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse blank-line runs ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

/// The shortest backtick fence that cannot be closed by `content`.
pub fn code_fence_for(content: &str) -> String {
    static RE_BACKTICKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"`+").unwrap());

    let longest = RE_BACKTICKS
        .find_iter(content)
        .map(|m| m.as_str().len())
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}
