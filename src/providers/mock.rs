//! Deterministic offline providers.
//!
//! Nothing here touches the network. Outputs are derived from the prompt
//! alone, so the same article always yields the same analysis, which is
//! what fast offline test suites need.

use super::{ChatProvider, CompletionOptions, EmbeddingProvider, ImageProvider};
use crate::error::Result;
use crate::pipeline::prompts::{self, CONTENT, LENGTH, NARRATION, QUERY, SUMMARY, TITLE};
use crate::utils::{sentences, slugify_title};
use async_trait::async_trait;
use itertools::Itertools;
use serde_json::json;

pub const MOCK_EMBEDDING_DIMENSIONS: usize = 64;

/// Offline chat provider answering from the prompt's tagged sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockChat;

impl MockChat {
    fn analysis(user_prompt: &str) -> String {
        let title = prompts::section(user_prompt, TITLE).unwrap_or("Untitled");
        let content = prompts::section(user_prompt, CONTENT).unwrap_or_default();
        let all = sentences(content);

        let summary = if all.is_empty() {
            title.to_string()
        } else {
            all.iter().take(3).join(" ")
        };
        let mut key_points: Vec<String> = all
            .iter()
            .filter(|s| s.chars().count() >= 20)
            .take(5)
            .cloned()
            .collect();
        if key_points.is_empty() {
            key_points.push(title.to_string());
        }

        json!({
            "translatedTitle": title,
            "translatedSummary": summary,
            "keyPoints": key_points,
        })
        .to_string()
    }

    fn narration(user_prompt: &str) -> String {
        let title = prompts::section(user_prompt, TITLE).unwrap_or("Untitled");
        let content = prompts::section(user_prompt, CONTENT).unwrap_or_default();
        let target: usize = prompts::section(user_prompt, LENGTH)
            .and_then(|l| l.parse().ok())
            .unwrap_or(0);

        let mut narration = format!("Here is today's story: {title}.");
        let body = sentences(content);
        if body.is_empty() {
            return narration;
        }
        for sentence in body.iter().cycle() {
            if narration.chars().count() >= target.max(1) {
                break;
            }
            narration.push(' ');
            narration.push_str(sentence);
        }
        narration
    }

    fn interpretation(user_prompt: &str) -> String {
        let title = prompts::section(user_prompt, TITLE).unwrap_or("this story");
        let query = prompts::section(user_prompt, QUERY).map(str::trim);

        if let Some(query) = query.filter(|q| q.split_whitespace().count() < 2) {
            let question = format!("Which aspect of \"{query}\" should the analysis focus on?");
            return json!({
                "needsClarification": true,
                "clarificationQuestion": question,
                "clarificationReason":
                    "The query is a single term and could refer to several angles of the story.",
            })
            .to_string();
        }

        let why =
            format!("\"{title}\" affects readers directly and is likely to shape public debate.");
        let next = format!(
            "Expect follow-up reporting and official responses to \"{title}\" in the coming weeks."
        );
        json!({
            "needsClarification": false,
            "whyImportant": why,
            "futurePrediction": next,
        })
        .to_string()
    }

    fn style(user_prompt: &str) -> String {
        json!({
            "summary": prompts::section(user_prompt, SUMMARY).unwrap_or_default(),
            "narration": prompts::section(user_prompt, NARRATION).unwrap_or_default(),
        })
        .to_string()
    }
}

#[async_trait]
impl ChatProvider for MockChat {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        Ok(match options.purpose {
            "validation" => json!({
                "isNewsArticle": true,
                "confidence": 0.9,
                "reason": "offline validation",
            })
            .to_string(),
            "analysis" => Self::analysis(user_prompt),
            "narration" => Self::narration(user_prompt),
            "interpretation" => Self::interpretation(user_prompt),
            "style" => Self::style(user_prompt),
            _ => "offline response".to_string(),
        })
    }
}

/// Offline embeddings: a normalized hashed bag of words.
///
/// Texts sharing words get similar vectors, which keeps retrieval
/// meaningful in tests. Blank text embeds to an empty vector.
#[derive(Debug, Clone, Copy)]
pub struct MockEmbeddings {
    pub dimensions: usize,
}

impl Default for MockEmbeddings {
    fn default() -> Self {
        Self {
            dimensions: MOCK_EMBEDDING_DIMENSIONS,
        }
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() || self.dimensions == 0 {
            return Ok(Vec::new());
        }
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let slot = (fnv1a(&word) % self.dimensions as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

/// Offline image generation returning a placeholder URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockImages;

#[async_trait]
impl ImageProvider for MockImages {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let slug = slugify_title(&prompt.split_whitespace().take(6).join(" "));
        if slug.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("https://placehold.co/1024x1024?text={slug}")))
    }
}
