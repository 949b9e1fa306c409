//! Title and metadata lookups.
//!
//! These run on the document before noise stripping, since `<head>` meta
//! tags, header `<h1>`s and JSON-LD `<script>` blocks are all removed by it.

use crate::utils::{contains_hangul, normalize_text};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid CSS")
}

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|css| selector(css)).collect()
}

static TITLE_META: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        r#"meta[property="og:title"]"#,
        r#"meta[name="twitter:title"], meta[property="twitter:title"]"#,
    ])
});
static TITLE_TEXT: Lazy<Vec<Selector>> = Lazy::new(|| selectors(&["h1", "title"]));
static DESCRIPTION: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        r#"meta[name="description"]"#,
        r#"meta[property="og:description"]"#,
    ])
});
static AUTHOR: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        r#"meta[name="author"]"#,
        r#"meta[property="article:author"]"#,
        r#"meta[name="byline"]"#,
    ])
});
static SITE_NAME: Lazy<Vec<Selector>> =
    Lazy::new(|| selectors(&[r#"meta[property="og:site_name"]"#]));
static IMAGE: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        r#"meta[property="og:image"]"#,
        r#"meta[name="twitter:image"], meta[property="twitter:image"]"#,
    ])
});
static DATE_META: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        r#"meta[property="article:published_time"]"#,
        r#"meta[name="pubdate"]"#,
        r#"meta[name="publishdate"]"#,
        r#"meta[name="date"]"#,
        r#"meta[itemprop="datePublished"]"#,
    ])
});
static DATE_TIME: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
static JSON_LD: Lazy<Selector> = Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));
static HTML_LANG: Lazy<Selector> = Lazy::new(|| selector("html[lang]"));
static HTTP_EQUIV: Lazy<Selector> = Lazy::new(|| selector("meta[http-equiv]"));

/// Everything read from the page apart from title and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub description: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
    pub published_at: Option<String>,
    pub image_url: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let value = normalize_text(value);
    (!value.is_empty()).then_some(value)
}

/// First non-empty `content` attribute over an ordered selector list.
fn first_meta(document: &Html, list: &[Selector]) -> Option<String> {
    list.iter()
        .flat_map(|sel| document.select(sel))
        .find_map(|el| el.value().attr("content").and_then(non_empty))
}

/// `og:title` → `twitter:title` → first `<h1>` → `<title>`.
pub fn extract_title(document: &Html) -> Option<String> {
    first_meta(document, &TITLE_META).or_else(|| {
        TITLE_TEXT
            .iter()
            .flat_map(|sel| document.select(sel))
            .find_map(|el| non_empty(&el.text().collect::<String>()))
    })
}

pub fn extract_metadata(document: &Html, url: &str) -> PageMetadata {
    let source = first_meta(document, &SITE_NAME).or_else(|| {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    });

    PageMetadata {
        description: first_meta(document, &DESCRIPTION),
        author: first_meta(document, &AUTHOR),
        source,
        published_at: extract_published_at(document),
        image_url: first_meta(document, &IMAGE),
    }
}

/// Meta tags, then `<time datetime>`, then JSON-LD `datePublished`.
pub fn extract_published_at(document: &Html) -> Option<String> {
    first_meta(document, &DATE_META)
        .or_else(|| {
            document
                .select(&DATE_TIME)
                .find_map(|el| el.value().attr("datetime").and_then(non_empty))
        })
        .or_else(|| {
            document.select(&JSON_LD).find_map(|script| {
                let raw = script.text().collect::<String>();
                serde_json::from_str::<Value>(raw.trim())
                    .ok()
                    .and_then(|json| find_date_published(&json))
            })
        })
}

/// Depth-first search for a `datePublished` string, `@graph` included.
fn find_date_published(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get("datePublished")
            .and_then(Value::as_str)
            .and_then(non_empty)
            .or_else(|| map.values().find_map(find_date_published)),
        Value::Array(items) => items.iter().find_map(find_date_published),
        _ => None,
    }
}

/// Primary subtag of a language tag, lowercased (`"en-US"` → `"en"`).
pub fn primary_subtag(tag: &str) -> Option<String> {
    tag.split([',', ';'])
        .next()
        .and_then(|first| first.trim().split(['-', '_']).next())
        .map(str::to_ascii_lowercase)
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic()))
}

/// `html[lang]` → `Content-Language` meta → Hangul → `"en"`.
pub fn detect_language(document: &Html, title: &str, content: &str) -> String {
    document
        .select(&HTML_LANG)
        .find_map(|el| el.value().attr("lang").and_then(primary_subtag))
        .or_else(|| {
            document
                .select(&HTTP_EQUIV)
                .filter(|el| {
                    el.value()
                        .attr("http-equiv")
                        .is_some_and(|v| v.eq_ignore_ascii_case("content-language"))
                })
                .find_map(|el| el.value().attr("content").and_then(primary_subtag))
        })
        .unwrap_or_else(|| {
            if contains_hangul(title) || contains_hangul(content) {
                "ko".to_string()
            } else {
                "en".to_string()
            }
        })
}
