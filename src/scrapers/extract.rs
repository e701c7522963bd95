//! Heuristic article extraction.
//!
//! Pages come from arbitrary sites, so there is no site-specific selector to
//! rely on. Instead the document is cleaned of chrome (scripts, navigation,
//! footers, ...) and then a fixed, ordered list of container rules is tried,
//! from "explicitly marked as content" down to "any div that looks like
//! content". The first rule that finds an element wins. When none does, every
//! paragraph and heading in the document is used.
//!
//! The result is whitespace-normalized, capped at [`MAX_CONTENT_CHARS`]
//! characters and never empty.

use crate::error::PipelineError;
use crate::utils::truncate_chars;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};

/// Upper bound on extracted text, in characters, before the ellipsis.
pub const MAX_CONTENT_CHARS: usize = 50_000;
/// Appended when the text was cut at [`MAX_CONTENT_CHARS`].
pub const TRUNCATION_MARKER: &str = "...";
/// Prefix of the first line when the page has an `<h1>`.
pub const TITLE_PREFIX: &str = "Title: ";

/// Class-name fragments of common article containers, most specific first.
const CONTENT_CLASS_FRAGMENTS: [&str; 12] = [
    "article-content",
    "article-body",
    "article-text",
    "content",
    "main-content",
    "post-content",
    "entry-content",
    "story-content",
    "detail-content",
    "article-detail",
    "article-main",
    "article",
];

static STRIPPED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script, style, nav, footer, header, aside, iframe, noscript, meta, link").unwrap()
});
static WITH_CLASS: Lazy<Selector> = Lazy::new(|| Selector::parse("[class]").unwrap());
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static MAIN: Lazy<Selector> = Lazy::new(|| Selector::parse("main").unwrap());
static DIV_WITH_CLASS: Lazy<Selector> = Lazy::new(|| Selector::parse("div[class]").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static CONTAINER_BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse("p, h2, h3, h4, h5, h6").unwrap());
static DOCUMENT_BLOCKS: Lazy<Selector> = Lazy::new(|| Selector::parse("p, h1, h2, h3, h4, h5, h6").unwrap());

static CONTENT_DIV_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)main|content|article|post").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

type ContainerRule = for<'a> fn(ElementRef<'a>) -> Option<ElementRef<'a>>;

/// Container rules in priority order. Each is strictly less precise than the
/// one before it.
const CONTAINER_RULES: [(&str, ContainerRule); 3] = [
    ("content_class", by_content_class),
    ("article_or_main", by_article_or_main),
    ("content_div", by_content_div),
];

/// Extract the readable article text from a full HTML document.
///
/// Fails with [`PipelineError::Extraction`] only when nothing textual is left
/// after every rule and the document-wide fallback.
#[instrument(level = "info", skip_all, fields(html_bytes = html.len()))]
pub fn extract(html: &str) -> Result<String, PipelineError> {
    let mut document = Html::parse_document(html);
    strip_non_content(&mut document);
    let root = document.root_element();

    let raw = match find_container(root) {
        Some((rule, container)) => {
            debug!(rule, tag = container.value().name(), "Found article container");
            let mut out = String::new();
            if let Some(title) = root.select(&H1).next().map(element_text).filter(|t| !t.is_empty()) {
                out.push_str(TITLE_PREFIX);
                out.push_str(&title);
                out.push_str("\n\n");
            }
            let blocks = container
                .select(&CONTAINER_BLOCKS)
                .filter(|el| el.id() != container.id());
            out.push_str(&join_blocks(blocks));
            out
        }
        None => {
            debug!("No article container; falling back to every paragraph and heading");
            join_blocks(root.select(&DOCUMENT_BLOCKS))
        }
    };

    let mut content = normalize_whitespace(&raw);
    if let Some(head) = truncate_chars(&content, MAX_CONTENT_CHARS) {
        content = format!("{head}{TRUNCATION_MARKER}");
    }

    if content.is_empty() {
        return Err(PipelineError::Extraction("no content found".into()));
    }

    info!(chars = content.chars().count(), "Extracted article text");
    Ok(content)
}

/// Detach every non-content element so none of its text can leak out.
fn strip_non_content(document: &mut Html) {
    let doomed: Vec<_> = document
        .root_element()
        .select(&STRIPPED)
        .map(|el| el.id())
        .collect();
    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn find_container(root: ElementRef<'_>) -> Option<(&'static str, ElementRef<'_>)> {
    CONTAINER_RULES
        .iter()
        .find_map(|(name, rule)| rule(root).map(|el| (*name, el)))
}

fn by_content_class(root: ElementRef<'_>) -> Option<ElementRef<'_>> {
    CONTENT_CLASS_FRAGMENTS.iter().find_map(|fragment| {
        root.select(&WITH_CLASS).find(|el| {
            el.value()
                .attr("class")
                .is_some_and(|class| class.to_lowercase().contains(fragment))
        })
    })
}

fn by_article_or_main(root: ElementRef<'_>) -> Option<ElementRef<'_>> {
    root.select(&ARTICLE)
        .next()
        .or_else(|| root.select(&MAIN).next())
}

fn by_content_div(root: ElementRef<'_>) -> Option<ElementRef<'_>> {
    root.select(&DIV_WITH_CLASS).find(|el| {
        el.value()
            .attr("class")
            .is_some_and(|class| CONTENT_DIV_CLASS.is_match(class))
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn join_blocks<'a>(blocks: impl Iterator<Item = ElementRef<'a>>) -> String {
    blocks
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse blank-line runs, then every whitespace run, then trim.
fn normalize_whitespace(s: &str) -> String {
    let s = BLANK_LINES.replace_all(s, "\n\n");
    let s = WHITESPACE.replace_all(&s, " ");
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_class_container_wins() {
        let html = r#"
            <html><body>
              <h1>Giá xăng tăng</h1>
              <div class="sidebar"><p>Quảng cáo</p></div>
              <div class="Article-Content">
                <p>Đoạn một.</p>
                <h2>Phần hai</h2>
                <p>   </p>
                <p>Đoạn ba.</p>
              </div>
              <p>Ngoài bài viết</p>
            </body></html>"#;

        let text = extract(html).unwrap();
        assert_eq!(text, "Title: Giá xăng tăng Đoạn một. Phần hai Đoạn ba.");
        assert!(!text.contains("Quảng cáo"));
        assert!(!text.contains("Ngoài bài viết"));
    }

    #[test]
    fn test_stripped_elements_never_leak() {
        let html = r#"
            <html><head><style>.x { color: red }</style></head><body>
              <div class="post-content">
                <script>var secret = "tracking";</script>
                <nav><p>Menu item</p></nav>
                <p>Real text</p>
                <aside><p>Related</p></aside>
                <footer><p>Copyright</p></footer>
                <noscript><p>Enable JS</p></noscript>
              </div>
            </body></html>"#;

        let text = extract(html).unwrap();
        assert_eq!(text, "Real text");
    }

    #[test]
    fn test_fragment_order_beats_document_order() {
        // "article-body" comes before "content" in the fragment list even
        // though the "content" element appears first in the page.
        let html = r#"
            <div class="content"><p>Generic</p></div>
            <div class="article-body"><p>Specific</p></div>"#;
        assert_eq!(extract(html).unwrap(), "Specific");
    }

    #[test]
    fn test_article_tag_then_main_tag() {
        let html = r#"<main><p>In main</p></main><article><p>In article</p></article>"#;
        assert_eq!(extract(html).unwrap(), "In article");

        let html = r#"<p>Outside</p><main><p>In main</p></main>"#;
        assert_eq!(extract(html).unwrap(), "In main");
    }

    #[test]
    fn test_title_comes_from_whole_document() {
        let html = r#"<h1>Headline</h1><article><h1>Ignored</h1><p>Body</p></article>"#;
        assert_eq!(extract(html).unwrap(), "Title: Headline Body");
    }

    #[test]
    fn test_title_inside_header_is_stripped() {
        let html = r#"<header><h1>Site name</h1></header><article><p>Body</p></article>"#;
        assert_eq!(extract(html).unwrap(), "Body");
    }

    #[test]
    fn test_only_first_h1_is_considered_for_title() {
        let html = r#"<h1></h1><h1>Second</h1><article><p>Body</p></article>"#;
        assert_eq!(extract(html).unwrap(), "Body");
    }

    #[test]
    fn test_fallback_uses_every_paragraph_and_heading() {
        let html = r#"
            <section>
              <h1>Heading</h1>
              <p>First</p>
              <span>Loose span</span>
              <h3>Sub</h3>
              <p>Second</p>
            </section>"#;
        assert_eq!(extract(html).unwrap(), "Heading First Sub Second");
    }

    #[test]
    fn test_no_paragraphs_is_an_error() {
        let html = r#"<html><body><span>only spans</span><script>x()</script></body></html>"#;
        let err = extract(html).unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(ref m) if m == "no content found"));
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(matches!(extract(""), Err(PipelineError::Extraction(_))));
    }

    #[test]
    fn test_long_content_is_truncated_exactly() {
        let body = "ế".repeat(MAX_CONTENT_CHARS + 100);
        let html = format!("<article><p>{body}</p></article>");
        let text = extract(&html).unwrap();
        assert_eq!(text.chars().count(), MAX_CONTENT_CHARS + TRUNCATION_MARKER.len());
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert!(text.starts_with("ếếế"));
    }

    #[test]
    fn test_content_at_limit_is_untouched() {
        let body = "a".repeat(MAX_CONTENT_CHARS);
        let html = format!("<article><p>{body}</p></article>");
        assert_eq!(extract(&html).unwrap(), body);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a\n\n\n b \t c\n"), "a b c");
        assert_eq!(normalize_whitespace("\n \n"), "");
    }
}
