//! Readability-style body extraction.
//!
//! Noise nodes are detached from the tree first, then an ordered list of
//! content candidates is tried. When no candidate holds enough text the
//! element with the most paragraph text wins, and as a last resort the
//! whole document text is used.

use crate::utils::normalize_text;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid CSS")
}

static NOISE_TAGS: Lazy<Selector> = Lazy::new(|| {
    selector(concat!(
        "script, style, noscript, template, nav, header, footer, aside, ",
        "form, iframe, svg, button, select"
    ))
});
static CLASSED: Lazy<Selector> = Lazy::new(|| selector("[class], [id]"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| selector("p"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));

/// Content candidates, most specific first.
static CANDIDATES: Lazy<Vec<(&'static str, Selector)>> = Lazy::new(|| {
    [
        r#"[itemprop="articleBody"]"#,
        "article",
        r#"[class*="article-body"]"#,
        r#"[class*="article__body"]"#,
        r#"[class*="article-content"]"#,
        r#"[class*="story-body"]"#,
        r#"[class*="entry-content"]"#,
        r#"[class*="post-content"]"#,
        r#"[class*="paywall"]"#,
        "#content",
        "main",
        r#"[role="main"]"#,
    ]
    .into_iter()
    .map(|css| (css, selector(css)))
    .collect()
});

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure", "h1",
    "h2", "h3", "h4", "h5", "h6", "li", "main", "ol", "p", "pre", "section", "table", "td", "th",
    "tr", "ul",
];

/// Class/id segments (split on `-` and `_`) that mark advertising.
const AD_TOKENS: &[&str] = &[
    "ad", "ads", "advert", "adverts", "advertisement", "advertising", "sponsored",
];

/// Class/id substrings that mark page chrome rather than article text.
const NOISE_MARKERS: &[&str] = &[
    "sidebar", "comment", "share", "social", "newsletter", "promo", "related", "cookie",
    "subscribe-",
];

/// How the body text was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySource {
    /// A content candidate matched; holds its selector.
    Candidate(&'static str),
    /// The element with the most `<p>` text.
    Paragraphs,
    /// Full document text.
    Document,
}

impl BodySource {
    pub fn describe(&self) -> String {
        match self {
            BodySource::Candidate(css) => (*css).to_string(),
            BodySource::Paragraphs => "paragraphs".to_string(),
            BodySource::Document => "document".to_string(),
        }
    }
}

fn is_noise_token(token: &str) -> bool {
    let token = token.to_ascii_lowercase();
    token.split(['-', '_']).any(|segment| AD_TOKENS.contains(&segment))
        || NOISE_MARKERS.iter().any(|m| token.contains(m))
}

/// Detach scripts, navigation, ads and other chrome from the document.
///
/// Returns how many subtrees were removed.
pub fn strip_noise(document: &mut Html) -> usize {
    let root = document.root_element();
    let mut ids: Vec<_> = root.select(&NOISE_TAGS).map(|el| el.id()).collect();

    ids.extend(
        root.select(&CLASSED)
            .filter(|el| !matches!(el.value().name(), "html" | "body"))
            .filter(|el| {
                let value = el.value();
                value.classes().any(is_noise_token)
                    || value.id().is_some_and(is_noise_token)
            })
            .map(|el| el.id()),
    );

    let tree_root = document.tree.root().id();
    let mut removed = 0;
    for id in ids {
        // skip nodes that left the tree with an ancestor
        let attached = document
            .tree
            .get(id)
            .is_some_and(|node| node.ancestors().any(|a| a.id() == tree_root));
        if !attached {
            continue;
        }
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
            removed += 1;
        }
    }
    removed
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            Node::Element(el) => {
                let block = BLOCK_TAGS.contains(&el.name());
                if block {
                    out.push('\n');
                }
                if let Some(child) = ElementRef::wrap(child) {
                    push_text(child, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Text of an element with block elements on their own lines, normalized.
pub fn block_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(element, &mut raw);
    normalize_text(&raw)
}

fn paragraph_parent(document: &Html) -> Option<ElementRef<'_>> {
    let mut totals: Vec<(ElementRef<'_>, usize)> = Vec::new();
    // `Html::select` would also visit detached subtrees
    for p in document.root_element().select(&PARAGRAPHS) {
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let len = p.text().map(|t| t.trim().chars().count()).sum::<usize>();
        match totals.iter_mut().find(|(el, _)| el.id() == parent.id()) {
            Some((_, total)) => *total += len,
            None => totals.push((parent, len)),
        }
    }
    // first parent wins ties
    totals
        .into_iter()
        .filter(|(_, total)| *total > 0)
        .fold(None, |best: Option<(ElementRef<'_>, usize)>, (el, total)| match best {
            Some((_, best_total)) if best_total >= total => best,
            _ => Some((el, total)),
        })
        .map(|(el, _)| el)
}

/// Find the article body in an already stripped document.
///
/// A candidate is accepted once its text is longer than `min_chars`
/// characters. Returns `None` only when the document holds no text at all.
pub fn extract_body(document: &Html, min_chars: usize) -> Option<(String, BodySource)> {
    for (css, candidate) in CANDIDATES.iter() {
        for element in document.root_element().select(candidate) {
            let text = block_text(element);
            if text.chars().count() > min_chars {
                return Some((text, BodySource::Candidate(css)));
            }
        }
    }

    if let Some(parent) = paragraph_parent(document) {
        let text = block_text(parent);
        if !text.is_empty() {
            return Some((text, BodySource::Paragraphs));
        }
    }

    let root = document.root_element();
    let text = block_text(root.select(&BODY).next().unwrap_or(root));
    (!text.is_empty()).then_some((text, BodySource::Document))
}
