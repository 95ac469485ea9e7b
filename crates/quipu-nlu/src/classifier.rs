//! OpenAI-compatible chat-completions client implementing [`Classifier`].
//!
//! Transport failures surface as [`QuipuError::Classifier`]; malformed model
//! output never does — it degrades to [`Analysis::unknown`] / an empty match
//! set, because the router treats the model as untrusted either way.

use crate::prompts;
use async_trait::async_trait;
use quipu_core::{
    analysis::Analysis,
    config::ClassifierConfig,
    entity::Task,
    error::QuipuError,
    traits::{Classifier, TaskMatch, TaskMatchOutcome},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// LLM classifier over any OpenAI-compatible endpoint.
pub struct LlmClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// One chat-completions round trip; returns the assistant text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, QuipuError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!("classifier: POST {url} model={}", self.model);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| QuipuError::Classifier(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(QuipuError::Classifier(format!(
                "endpoint returned {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| QuipuError::Classifier(format!("failed to parse response: {e}")))?;

        Ok(parsed
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.clone())
            .unwrap_or_default())
    }
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        "llm"
    }

    async fn classify(
        &self,
        text: &str,
        original: Option<&str>,
    ) -> Result<Analysis, QuipuError> {
        let user = match original {
            Some(orig) if orig != text => {
                format!("Message: {text}\nOriginal (before translation): {orig}")
            }
            _ => format!("Message: {text}"),
        };

        let raw = self.complete(prompts::CLASSIFY, &user).await?;
        Ok(parse_analysis(&raw))
    }

    async fn match_task(
        &self,
        text: &str,
        tasks: &[Task],
    ) -> Result<TaskMatchOutcome, QuipuError> {
        let listing: Vec<Value> = tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "title": t.title,
                    "description": t.description,
                })
            })
            .collect();
        let user = format!(
            "Message: {text}\nTasks: {}",
            serde_json::to_string(&listing)?
        );

        let raw = self.complete(prompts::MATCH_TASK, &user).await?;
        Ok(parse_match(&raw, tasks))
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            warn!("classifier: no API key configured");
            return false;
        }
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("classifier not available: {e}");
                false
            }
        }
    }
}

/// Pull the first JSON object out of model text that may carry code fences
/// or prose around it.
fn extract_json(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

/// Model text to [`Analysis`]. Garbage in, `unknown` out.
fn parse_analysis(raw: &str) -> Analysis {
    match extract_json(raw) {
        Some(v) => Analysis::from_value(&v),
        None => {
            warn!("classifier returned unparseable output, degrading to unknown");
            Analysis::unknown()
        }
    }
}

/// Model text to a match outcome. Hallucinated task IDs are dropped, the
/// confirmation flag is computed here rather than trusted from the model:
/// shaky top confidence (< 0.8) or more than one candidate above 0.6.
fn parse_match(raw: &str, tasks: &[Task]) -> TaskMatchOutcome {
    let Some(v) = extract_json(raw) else {
        warn!("task matcher returned unparseable output");
        return TaskMatchOutcome::default();
    };

    let mut all: Vec<TaskMatch> = v
        .get("matches")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|m| {
                    let task_id = m.get("task_id").and_then(Value::as_i64)?;
                    // Only tasks we actually offered.
                    if !tasks.iter().any(|t| t.id == task_id) {
                        return None;
                    }
                    let confidence = m
                        .get("confidence")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0)
                        .clamp(0.0, 1.0);
                    let reason = m
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    Some(TaskMatch {
                        task_id,
                        confidence,
                        reason,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    all.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let best = all.first().cloned();
    let strong = all.iter().filter(|m| m.confidence > 0.6).count();
    let needs_confirmation = match &best {
        Some(b) => b.confidence < 0.8 || strong > 1,
        None => false,
    };

    TaskMatchOutcome {
        best,
        all,
        needs_confirmation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quipu_core::analysis::{EntityKind, Intent};
    use quipu_core::entity::EntityStatus;

    fn task(id: i64, title: &str) -> Task {
        Task {
            id,
            user_id: "u".to_string(),
            title: title.to_string(),
            description: None,
            status: EntityStatus::Pending,
            due_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_analysis_plain_json() {
        let raw = r#"{"intent": "create", "entity_type": "order", "parameters": {"product": "beans", "quantity": 2}}"#;
        let a = parse_analysis(raw);
        assert_eq!(a.intent, Intent::Create);
        assert_eq!(a.entity, EntityKind::Order);
        assert_eq!(a.param_str("product"), Some("beans"));
    }

    #[test]
    fn test_parse_analysis_with_fences_and_prose() {
        let raw = "Sure! Here is the JSON:\n```json\n{\"intent\": \"get\", \"entity_type\": \"task\", \"parameters\": {}}\n```";
        let a = parse_analysis(raw);
        assert_eq!(a.intent, Intent::Get);
        assert_eq!(a.entity, EntityKind::Task);
    }

    #[test]
    fn test_parse_analysis_garbage_degrades() {
        for raw in ["", "I don't know what you mean.", "}{", "[1, 2, 3]"] {
            let a = parse_analysis(raw);
            assert_eq!(a.intent, Intent::Unknown);
            assert_eq!(a.entity, EntityKind::None);
        }
    }

    #[test]
    fn test_parse_match_ranks_and_flags() {
        let tasks = vec![task(1, "Call dentist"), task(2, "Call mom")];
        let raw = r#"{"matches": [
            {"task_id": 2, "confidence": 0.65, "reason": "calling someone"},
            {"task_id": 1, "confidence": 0.75, "reason": "dentist mention"}
        ]}"#;
        let outcome = parse_match(raw, &tasks);
        assert_eq!(outcome.best.as_ref().unwrap().task_id, 1);
        // Top below 0.8 and two candidates above 0.6.
        assert!(outcome.needs_confirmation);
    }

    #[test]
    fn test_parse_match_confident_single() {
        let tasks = vec![task(1, "Call dentist")];
        let raw = r#"{"matches": [{"task_id": 1, "confidence": 0.95, "reason": "exact"}]}"#;
        let outcome = parse_match(raw, &tasks);
        assert_eq!(outcome.best.as_ref().unwrap().task_id, 1);
        assert!(!outcome.needs_confirmation);
    }

    #[test]
    fn test_parse_match_drops_hallucinated_ids() {
        let tasks = vec![task(1, "Call dentist")];
        let raw = r#"{"matches": [
            {"task_id": 99, "confidence": 0.9, "reason": "made up"},
            {"task_id": 1, "confidence": 0.85, "reason": "real"}
        ]}"#;
        let outcome = parse_match(raw, &tasks);
        assert_eq!(outcome.all.len(), 1);
        assert_eq!(outcome.best.as_ref().unwrap().task_id, 1);
    }

    #[test]
    fn test_parse_match_garbage_is_empty() {
        let outcome = parse_match("no idea", &[task(1, "X")]);
        assert!(outcome.best.is_none());
        assert!(outcome.all.is_empty());
        assert!(!outcome.needs_confirmation);
    }
}
