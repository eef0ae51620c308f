//! HTTP client for the cheap-model helper.
//!
//! Small structured calls (schedule parsing, appraisal, summaries) hit an
//! Anthropic-compatible messages endpoint with a cheap model. Transient
//! failures retry with bounded exponential backoff; exhaustion surfaces as a
//! runtime error.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AppraisalOutput;
use crate::domain::ports::{LlmHelper, ParsedSchedule};

#[derive(Debug, Clone)]
pub struct LlmHelperConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for LlmHelperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: None,
            model: "claude-haiku-4-5".to_string(),
            max_tokens: 1024,
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpLlmHelper {
    config: LlmHelperConfig,
    client: reqwest::Client,
}

impl HttpLlmHelper {
    pub fn new(config: LlmHelperConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DomainError::Runtime(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn generate(&self, prompt: &str) -> DomainResult<String> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(8))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let text = backoff::future::retry(backoff, || async {
            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.config.api_key {
                request = request.header("x-api-key", key);
            }
            request = request.header("anthropic-version", "2023-06-01");

            let response = request.send().await.map_err(|e| {
                backoff::Error::transient(DomainError::Runtime(format!("helper request failed: {e}")))
            })?;

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(backoff::Error::transient(DomainError::Runtime(format!(
                    "helper returned {status}"
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DomainError::Runtime(format!(
                    "helper returned {status}"
                ))));
            }

            let parsed: MessagesResponse = response.json().await.map_err(|e| {
                backoff::Error::permanent(DomainError::Serialization(e.to_string()))
            })?;
            Ok(parsed.text())
        })
        .await?;

        Ok(text)
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Strip an optional markdown code fence from a model response.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map_or(rest, str::trim).trim()
}

#[async_trait]
impl LlmHelper for HttpLlmHelper {
    async fn parse_schedule(&self, natural: &str) -> DomainResult<ParsedSchedule> {
        let prompt = format!(
            r#"Convert this natural language schedule to a cron expression.

Natural language: {natural}

Return ONLY a JSON object with these fields:
{{
  "cron": "standard 5-field cron expression (minute hour day month weekday)",
  "timezone": "IANA timezone like America/New_York or UTC",
  "explanation": "brief explanation of when this runs"
}}

Examples:
- "every day at 6pm" -> {{"cron": "0 18 * * *", "timezone": "UTC", "explanation": "Daily at 6:00 PM UTC"}}
- "weekdays at 8:30am" -> {{"cron": "30 8 * * 1-5", "timezone": "UTC", "explanation": "Monday through Friday at 8:30 AM"}}
- "every 2 hours" -> {{"cron": "0 */2 * * *", "timezone": "UTC", "explanation": "Every 2 hours at the top of the hour"}}

Output JSON only, no markdown formatting:"#
        );

        let response = self.generate(&prompt).await?;
        let parsed: ScheduleJson = serde_json::from_str(strip_code_fence(&response))
            .map_err(|e| {
                DomainError::Validation(format!("Failed to parse schedule '{natural}': {e}"))
            })?;
        Ok(ParsedSchedule {
            cron: parsed.cron,
            timezone: parsed.timezone.unwrap_or_else(|| "UTC".to_string()),
            explanation: parsed.explanation,
        })
    }

    async fn appraise(
        &self,
        stimulus: &serde_json::Value,
        current_state_summary: &str,
        persona_name: &str,
    ) -> DomainResult<AppraisalOutput> {
        let prompt = format!(
            r#"You are the emotional appraisal engine for {persona_name}.
Appraise the stimulus below along the OCC dimensions (event consequences,
agent actions, object aspects) and produce the resulting emotions.

Current emotional state: {current_state_summary}

Stimulus:
{stimulus}

Return ONLY a JSON object:
{{
  "event_outcome": {{"outcome": "desirable|undesirable|neutral", "prospect": "prospective|actual|none", "affected_goals": [], "desirability": -10..10}},
  "agent_action": {{"agent": "self|other", "judgement": "praiseworthy|blameworthy|neutral", "affected_standards": [], "praiseworthiness": -10..10}},
  "object_attribute": {{"familiarity": "familiar|unfamiliar|none", "judgement": "appealing|unappealing|neutral", "affected_attitudes": [], "appealingness": -10..10}},
  "resulting_emotions": [{{"type": "<occ emotion>", "intensity": 0..100, "eliciting": "why"}}],
  "reasoning": "one sentence"
}}

Output JSON only, no markdown formatting:"#
        );

        let response = self.generate(&prompt).await?;
        serde_json::from_str(strip_code_fence(&response))
            .map_err(|e| DomainError::Serialization(format!("Invalid appraisal output: {e}")))
    }

    async fn summarize(&self, text: &str) -> DomainResult<String> {
        // Long outputs keep their head and tail for context.
        const MAX_CONTEXT: usize = 2000;
        let context = if text.len() > MAX_CONTEXT * 2 {
            let head: String = text.chars().take(MAX_CONTEXT).collect();
            let tail: String = {
                let chars: Vec<char> = text.chars().collect();
                chars[chars.len().saturating_sub(MAX_CONTEXT)..].iter().collect()
            };
            format!("{head}\n\n[...]\n\n{tail}")
        } else {
            text.to_string()
        };

        let prompt = format!(
            "Summarize this mission output in 1-2 sentences. Focus on the main result or outcome.\n\nOutput:\n{context}\n\nSummary:"
        );
        let summary = self.generate(&prompt).await?;
        Ok(summary.trim().to_string())
    }
}

#[derive(Deserialize)]
struct ScheduleJson {
    cron: String,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn messages_response_concatenates_blocks() {
        let parsed: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"foo"},{"type":"text","text":"bar"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text(), "foobar");
    }
}
