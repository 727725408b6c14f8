//! Query planning
//!
//! Turns a free-form (possibly multilingual) event description into an
//! optimized retrieval plan using the chat capability: a compact search
//! query, a full chronologically-ordered query for temporal alignment, and
//! whether alignment is worth running at all. A malformed reply falls back
//! to using the raw text as the query rather than failing the call.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use shotscout_common::errors::Result;
use shotscout_common::llm::ChatCompleter;

use super::pipeline::PipelineRequest;
use super::temporal::split_sub_queries;

const PLAN_PROMPT: &str = r#"You turn verbose event descriptions into optimized queries for a two-stage
news-footage retrieval system. Stage one searches single frames with a short
query; stage two aligns a multi-sentence query against frame sequences in
chronological order.

Rules:
- Reorder scenes into true chronological order, honoring temporal markers
  ("earlier", "then", "finally") over description order.
- Keep only concrete, searchable elements: distinctive objects, clear
  actions, recognizable scenes. Drop vague positioning and abstract detail.
- Every sentence must be self-contained: repeat identifying features (e.g.
  "a girl in blue") instead of pronouns, because sentences are searched
  independently.
- "query": the 1-3 most searchable scenes, period-separated, chronological.
- "full_query": all scenes, simplified, chronological.
- "temporal": true when the description spans multiple scenes.

Respond with ONLY a JSON object, no markdown fences and no surrounding text:
{"query": "...", "full_query": "...", "temporal": true}

Description:
{description}
"#;

/// Parsed retrieval plan.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannedQuery {
    pub query: String,
    pub full_query: String,
    pub temporal: bool,
}

pub struct QueryPlanner {
    chat: Arc<dyn ChatCompleter>,
}

impl QueryPlanner {
    pub fn new(chat: Arc<dyn ChatCompleter>) -> Self {
        Self { chat }
    }

    /// Plan a retrieval run for a free-form description.
    pub async fn plan(&self, description: &str) -> Result<PlannedQuery> {
        let prompt = PLAN_PROMPT.replace("{description}", description);
        let reply = self.chat.complete(&prompt).await?;
        let trimmed = reply.trim();

        match serde_json::from_str::<PlannedQuery>(trimmed) {
            Ok(plan) => {
                debug!(temporal = plan.temporal, "Planned query");
                Ok(plan)
            }
            Err(e) => {
                warn!(error = %e, "Planner reply was not valid JSON, using raw text");
                Ok(PlannedQuery {
                    query: trimmed.to_string(),
                    full_query: trimmed.to_string(),
                    temporal: split_sub_queries(trimmed).len() > 1,
                })
            }
        }
    }

    /// Plan and expand into a ready pipeline request with the wide-funnel
    /// auto-mode defaults.
    pub async fn plan_request(&self, description: &str) -> Result<PipelineRequest> {
        let plan = self.plan(description).await?;
        Ok(PipelineRequest::from_plan(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotscout_common::catalog::{Granularity, Modality};
    use shotscout_common::llm::StaticChat;

    #[tokio::test]
    async fn test_plan_parses_json_reply() {
        let chat = Arc::new(StaticChat::new(
            r#"{"query": "birds flying. a bridge from above", "full_query": "A flock of birds flying. A bridge viewed from above.", "temporal": true}"#,
        ));
        let planner = QueryPlanner::new(chat);
        let plan = planner.plan("bridge, and before that birds").await.unwrap();
        assert!(plan.temporal);
        assert!(plan.full_query.starts_with("A flock"));
    }

    #[tokio::test]
    async fn test_plan_falls_back_to_raw_text() {
        let chat = Arc::new(StaticChat::new("A man being interviewed. A shark model."));
        let planner = QueryPlanner::new(chat);
        let plan = planner.plan("whatever").await.unwrap();
        assert_eq!(plan.query, "A man being interviewed. A shark model.");
        assert!(plan.temporal);
    }

    #[tokio::test]
    async fn test_plan_request_defaults() {
        let chat = Arc::new(StaticChat::new(
            r#"{"query": "a flooded street", "full_query": "a flooded street", "temporal": false}"#,
        ));
        let planner = QueryPlanner::new(chat);
        let request = planner.plan_request("flood footage").await.unwrap();
        assert_eq!(request.modality, Modality::Similarity);
        assert_eq!(request.granularity, Granularity::Frame);
        assert_eq!(request.top_k, 500);
        assert!(!request.refine_temporal);
        assert!(request.enable_rerank);
        assert_eq!(request.top_k_rerank, 50);
    }
}
