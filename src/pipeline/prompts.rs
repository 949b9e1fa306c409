//! Prompt templates and typed LLM response schemas.
//!
//! User prompts are assembled from tagged sections (`<<<TITLE>>> ...
//! <<</TITLE>>>`) so the article, the query and the target length are
//! unambiguous to the model and can be read back by the offline provider.
//!
//! Every response the stages expect is a small struct with serde defaults.
//! [`parse_response`] never fails: a malformed response yields `None` and
//! the stage falls back to a well-defined default instead of erroring.
//! Field names use camelCase to match the JSON the prompts ask for.

use crate::models::ArticleData;
use crate::utils::{extract_json_object, looks_truncated, truncate_for_log};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

pub const TITLE: &str = "TITLE";
pub const CONTENT: &str = "CONTENT";
pub const QUERY: &str = "QUERY";
pub const SUMMARY: &str = "SUMMARY";
pub const NARRATION: &str = "NARRATION";
pub const LANGUAGE: &str = "LANGUAGE";
pub const LENGTH: &str = "LENGTH";
pub const EXAMPLES: &str = "EXAMPLES";

/// Wrap `body` in a tagged section.
pub fn tagged(tag: &str, body: &str) -> String {
    format!("<<<{tag}>>>\n{}\n<<</{tag}>>>\n", body.trim())
}

/// Read a tagged section back out of a prompt.
pub fn section<'a>(prompt: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<<<{tag}>>>");
    let close = format!("<<</{tag}>>>");
    let start = prompt.find(&open)? + open.len();
    let end = start + prompt[start..].find(&close)?;
    Some(prompt[start..end].trim())
}

/// Parse a JSON response into `T`, tolerating fences and chatter around it.
///
/// Returns `None` (and logs why) when the response does not fit the schema.
pub fn parse_response<T: DeserializeOwned>(purpose: &str, raw: &str) -> Option<T> {
    match serde_json::from_str::<T>(extract_json_object(raw)) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(
                purpose,
                truncated = looks_truncated(&e),
                error = %e,
                response_preview = %truncate_for_log(raw, 300),
                "Model returned non-conforming JSON; using defaults"
            );
            None
        }
    }
}

fn article_sections(article: &ArticleData) -> String {
    let mut prompt = tagged(TITLE, &article.title);
    prompt.push_str(&tagged(CONTENT, &article.content));
    prompt
}

// --- validation -------------------------------------------------------------

pub const VALIDATION_SYSTEM: &str = "You check whether extracted web page text is a real news article \
and not a login wall, cookie notice, error page or index page. Respond with a JSON object: \
{\"isNewsArticle\": boolean, \"confidence\": number between 0 and 1, \"reason\": string}.";

pub fn validation_user(article: &ArticleData) -> String {
    let excerpt: String = article.content.chars().take(2000).collect();
    let mut prompt = tagged(TITLE, &article.title);
    prompt.push_str(&tagged(CONTENT, &excerpt));
    prompt
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationVerdict {
    pub isNewsArticle: bool,
    pub confidence: f32,
    pub reason: String,
}

impl Default for ValidationVerdict {
    fn default() -> Self {
        Self {
            isNewsArticle: true,
            confidence: 0.5,
            reason: "validation unavailable; accepted by default".to_string(),
        }
    }
}

// --- analysis ---------------------------------------------------------------

pub fn analysis_system(target_language: &str) -> String {
    format!(
        "You are a news editor. Read the article and respond with a JSON object: \
{{\"translatedTitle\": string, \"translatedSummary\": string, \"keyPoints\": [string]}}. \
Write the title and summary in the language with code \"{target_language}\". \
The summary is three to five sentences. Give three to seven key points, each one sentence, \
ordered by importance."
    )
}

pub fn analysis_user(article: &ArticleData, target_language: &str) -> String {
    let mut prompt = tagged(LANGUAGE, target_language);
    prompt.push_str(&article_sections(article));
    prompt
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisResponse {
    pub translatedTitle: String,
    pub translatedSummary: String,
    pub keyPoints: Vec<String>,
}

// --- narration --------------------------------------------------------------

pub fn narration_system(target_language: &str, min_chars: usize) -> String {
    format!(
        "You write scripts for a spoken news briefing. Write plain prose in the language with \
code \"{target_language}\", no headings or lists, at least {min_chars} characters long. \
Explain what happened, who is involved and why it matters."
    )
}

pub fn narration_user(article: &ArticleData, summary: &str, min_chars: usize) -> String {
    let mut prompt = tagged(LENGTH, &min_chars.to_string());
    prompt.push_str(&tagged(SUMMARY, summary));
    prompt.push_str(&article_sections(article));
    prompt
}

// --- interpretation ---------------------------------------------------------

pub const INTERPRETATION_SYSTEM: &str = "You are a critical news analyst. If a reader query is \
given and it is too vague to act on, set needsClarification to true and ask one short question. \
Otherwise explain why the story is important and predict what happens next. Respond with a JSON \
object: {\"needsClarification\": boolean, \"clarificationQuestion\": string, \
\"clarificationReason\": string, \"whyImportant\": string, \"futurePrediction\": string}.";

pub fn interpretation_user(article: &ArticleData, summary: &str, query: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(query) = query {
        prompt.push_str(&tagged(QUERY, query));
    }
    prompt.push_str(&tagged(SUMMARY, summary));
    prompt.push_str(&article_sections(article));
    prompt
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterpretationResponse {
    pub needsClarification: bool,
    pub clarificationQuestion: String,
    pub clarificationReason: String,
    pub whyImportant: String,
    pub futurePrediction: String,
}

// --- style learning ---------------------------------------------------------

pub const STYLE_SYSTEM: &str = "You are a copy editor. Study the editorial examples, then rewrite \
the summary and the narration in the same voice without changing any facts. Respond with a JSON \
object: {\"summary\": string, \"narration\": string}.";

pub fn style_user(examples: &[String], summary: &str, narration: &str) -> String {
    let rendered = examples
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut prompt = tagged(EXAMPLES, &rendered);
    prompt.push_str(&tagged(SUMMARY, summary));
    prompt.push_str(&tagged(NARRATION, narration));
    prompt
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StyleResponse {
    pub summary: String,
    pub narration: String,
}

// --- illustration -----------------------------------------------------------

pub fn illustration_prompt(title: &str, summary: &str) -> String {
    let summary: String = summary.chars().take(400).collect();
    format!(
        "Editorial illustration for a news story titled \"{}\". {} \
Flat colors, no text, no logos, no real people's faces.",
        title.trim(),
        summary.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_section_roundtrip() {
        let prompt = format!("{}{}", tagged(TITLE, " Headline "), tagged(CONTENT, "Body"));
        assert_eq!(section(&prompt, TITLE), Some("Headline"));
        assert_eq!(section(&prompt, CONTENT), Some("Body"));
        assert_eq!(section(&prompt, QUERY), None);
    }

    #[test]
    fn test_section_ignores_appended_context() {
        let mut prompt = tagged(CONTENT, "Body");
        prompt.push_str("\n## Prior analyses\n- [similarity 0.90] older text\n");
        assert_eq!(section(&prompt, CONTENT), Some("Body"));
    }

    #[test]
    fn test_parse_response_with_fences() {
        let raw = "```json\n{\"translatedTitle\":\"제목\",\"keyPoints\":[\"a\"]}\n```";
        let parsed: AnalysisResponse = parse_response("analysis", raw).unwrap();
        assert_eq!(parsed.translatedTitle, "제목");
        assert_eq!(parsed.keyPoints, vec!["a"]);
        assert!(parsed.translatedSummary.is_empty());
    }

    #[test]
    fn test_parse_response_malformed_is_none() {
        let parsed: Option<InterpretationResponse> =
            parse_response("interpretation", "I cannot help with that.");
        assert!(parsed.is_none());
        let wrong_type: Option<AnalysisResponse> =
            parse_response("analysis", r#"{"keyPoints": "not a list"}"#);
        assert!(wrong_type.is_none());
    }

    #[test]
    fn test_validation_verdict_defaults_permissive() {
        let verdict: ValidationVerdict = parse_response("validation", "{}").unwrap();
        assert!(verdict.isNewsArticle);
        assert!((verdict.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_interpretation_prompt_includes_query_only_when_given() {
        let article = ArticleData::new("https://example.com", "T", "C");
        assert!(section(&interpretation_user(&article, "S", None), QUERY).is_none());
        let with_query = interpretation_user(&article, "S", Some("economy"));
        assert_eq!(section(&with_query, QUERY), Some("economy"));
    }
}
