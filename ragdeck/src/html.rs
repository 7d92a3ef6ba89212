//! HTML to plain-text conversion for loaded pages.
//!
//! Uses the `scraper` crate to parse the page and walk its element tree,
//! keeping visible text only. Block-level elements become paragraph breaks so
//! that downstream splitters can still see the document structure.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

/// Elements whose content is never visible text.
const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "svg", "head", "iframe"];

/// Elements rendered as their own paragraph.
const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li",
    "main", "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

/// Extract the visible text of an HTML document.
///
/// Skips `script`, `style`, `noscript`, `template`, `svg` and `head` content.
/// Block elements are separated by a blank line, `<br>` becomes a line break,
/// whitespace inside a line is collapsed, and runs of blank lines collapse to
/// one.
///
/// ```
/// use ragdeck::html::extract_text;
///
/// let text = extract_text("<html><body><h1>Hello</h1><p>big <b>world</b></p></body></html>");
/// assert_eq!(text, "Hello\n\nbig world");
/// ```
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    walk(document.root_element(), &mut raw);
    tidy(&raw)
}

/// The trimmed contents of the document's `<title>`, if present and non-empty.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document.select(&selector).next()?;
    let text = title.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// One pending step of the document walk.
enum Step<'a> {
    Enter(ElementRef<'a>),
    Text(&'a str),
    /// End of a block element.
    Close,
}

/// Depth-first walk with an explicit stack, so arbitrarily deep nesting
/// cannot exhaust the call stack.
fn walk(root: ElementRef<'_>, out: &mut String) {
    let mut stack = vec![Step::Enter(root)];
    while let Some(step) = stack.pop() {
        let element = match step {
            Step::Text(text) => {
                push_collapsed(text, out);
                continue;
            }
            Step::Close => {
                out.push_str("\n\n");
                continue;
            }
            Step::Enter(element) => element,
        };

        let name = element.value().name();
        if SKIPPED.contains(&name) {
            continue;
        }
        if name == "br" {
            out.push('\n');
            continue;
        }
        if BLOCKS.contains(&name) {
            out.push_str("\n\n");
            stack.push(Step::Close);
        }

        // Children are pushed in reverse so they pop in document order.
        for child in element.children().rev() {
            match child.value() {
                Node::Text(text) => stack.push(Step::Text(text)),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        stack.push(Step::Enter(child));
                    }
                }
                _ => {}
            }
        }
    }
}

fn push_collapsed(text: &str, out: &mut String) {
    for c in text.chars() {
        if c.is_whitespace() {
            if !out.ends_with(char::is_whitespace) {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
}

fn tidy(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut pending_blank = false;
    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            pending_blank = !lines.is_empty();
            continue;
        }
        if pending_blank {
            lines.push("");
            pending_blank = false;
        }
        lines.push(line);
    }
    lines.join("\n")
}
