//! External relevance scoring
//!
//! Wraps the reasoning service that re-scores candidate footage against a
//! query by reading the two captions. A batch call either returns one
//! validated `(path, score, explanation)` triple per covered item or fails
//! as a whole; partial or malformed replies never leak into results.

use crate::errors::{AppError, Result};
use crate::llm::ChatCompleter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Candidate payload submitted to the scorer.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreItem {
    pub path: String,
    pub caption_short: String,
    pub caption_long: String,
}

/// One validated scorer verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub path: String,
    /// Relevance on the scorer's 0-100 scale
    pub score: u8,
    pub explanation: String,
}

/// Trait for batch relevance scoring
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score one batch of candidates against the query. The reply should
    /// cover every submitted item but is not guaranteed to.
    async fn score_batch(&self, query: &str, items: &[ScoreItem]) -> Result<Vec<ScoredItem>>;
}

/// Prompt sent per batch. `{query}` and `{items_json}` are substituted.
const RELEVANCE_PROMPT: &str = r#"You are an expert news-footage analyst. Evaluate how well each candidate
matches the target query using factual context matching: prioritize
observable elements, main participants and the overall scenario; ignore
speculative or subjective caption details; extra content in a candidate does
not reduce relevance.

Each candidate carries a short factual caption and a longer free-form
caption. Treat the short caption as the factual anchor and use the long
caption for context, discarding anything the short caption contradicts.

Target query: {query}

Candidates:
{items_json}

Score every candidate from 0 to 100:
- 80-100: the query scenario is clearly present, even partially
- 50-79: relevant context with gaps
- 20-49: limited but real connection
- 0-19: no meaningful relationship

Respond with ONLY a JSON array, starting with `[` and ending with `]`, one
object per candidate, no markdown fences and no surrounding text:
[{"path": "<exact path from input>", "score": 85, "explanation": "<short reasoning>"}]
"#;

/// Raw reply entry before validation.
#[derive(Deserialize)]
struct RawScored {
    path: String,
    score: i64,
    #[serde(default)]
    explanation: String,
}

/// LLM-backed scorer
pub struct LlmScorer {
    chat: Arc<dyn ChatCompleter>,
}

impl LlmScorer {
    pub fn new(chat: Arc<dyn ChatCompleter>) -> Self {
        Self { chat }
    }

    fn build_prompt(query: &str, items: &[ScoreItem]) -> Result<String> {
        let items_json = serde_json::to_string_pretty(items)?;
        Ok(RELEVANCE_PROMPT
            .replace("{query}", query)
            .replace("{items_json}", &items_json))
    }

    /// Parse and validate a scorer reply. Anything other than a JSON array
    /// of in-range scores fails the whole batch.
    fn parse_reply(reply: &str) -> Result<Vec<ScoredItem>> {
        let trimmed = reply.trim();
        if !trimmed.starts_with('[') {
            let head: String = trimmed.chars().take(80).collect();
            return Err(AppError::ScorerError {
                message: format!("reply does not start with '[': {head}"),
            });
        }

        let raw: Vec<RawScored> =
            serde_json::from_str(trimmed).map_err(|e| AppError::ScorerError {
                message: format!("reply is not a valid JSON array: {e}"),
            })?;

        raw.into_iter()
            .map(|r| {
                if !(0..=100).contains(&r.score) {
                    return Err(AppError::ScorerError {
                        message: format!("score {} for '{}' is outside 0-100", r.score, r.path),
                    });
                }
                Ok(ScoredItem {
                    path: r.path,
                    score: r.score as u8,
                    explanation: r.explanation,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RelevanceScorer for LlmScorer {
    async fn score_batch(&self, query: &str, items: &[ScoreItem]) -> Result<Vec<ScoredItem>> {
        let prompt = Self::build_prompt(query, items)?;
        let reply = self.chat.complete(&prompt).await?;
        Self::parse_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StaticChat;

    fn items() -> Vec<ScoreItem> {
        vec![ScoreItem {
            path: "L01/V001/Shot_0.mp4".into(),
            caption_short: "a flooded street".into(),
            caption_long: "a street flooded after heavy rain".into(),
        }]
    }

    #[tokio::test]
    async fn test_valid_reply_parses() {
        let chat = Arc::new(StaticChat::new(
            r#"[{"path": "L01/V001/Shot_0.mp4", "score": 85, "explanation": "flooding visible"}]"#,
        ));
        let scorer = LlmScorer::new(chat);
        let scored = scorer.score_batch("flood", &items()).await.unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].score, 85);
    }

    #[tokio::test]
    async fn test_non_array_reply_fails_batch() {
        let chat = Arc::new(StaticChat::new("Sure! Here are the scores: ..."));
        let scorer = LlmScorer::new(chat);
        let err = scorer.score_batch("flood", &items()).await.unwrap_err();
        assert!(matches!(err, AppError::ScorerError { .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_score_fails_batch() {
        let chat = Arc::new(StaticChat::new(
            r#"[{"path": "L01/V001/Shot_0.mp4", "score": 150, "explanation": ""}]"#,
        ));
        let scorer = LlmScorer::new(chat);
        assert!(scorer.score_batch("flood", &items()).await.is_err());
    }

    #[test]
    fn test_missing_explanation_defaults_empty() {
        let scored =
            LlmScorer::parse_reply(r#"[{"path": "a.jpg", "score": 10}]"#).unwrap();
        assert_eq!(scored[0].explanation, "");
    }

    #[test]
    fn test_prompt_substitution() {
        let prompt = LlmScorer::build_prompt("flood rescue", &items()).unwrap();
        assert!(prompt.contains("flood rescue"));
        assert!(prompt.contains("L01/V001/Shot_0.mp4"));
        assert!(!prompt.contains("{query}"));
        assert!(!prompt.contains("{items_json}"));
    }
}
