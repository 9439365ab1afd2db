//! Dify HTTP client: blocking workflow and chat calls with bounded retry.
//!
//! Transport failures and non-success statuses are retried up to the
//! configured ceiling with a fixed inter-attempt delay. Malformed input
//! (empty query, missing settings) and response-shape mismatches are
//! deterministic, so they short-circuit without retrying. The retry loop
//! checks the run's cancellation token between attempts; in-flight calls
//! are bounded by the per-attempt timeout instead.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::DifySettings;
use crate::error::{Error, Result};
use crate::model::{Indicator, StageOutcome};

/// Sentinel returned when the chat answer carries no digits at all.
pub const UNKNOWN_STAGE: &str = "unknown";

#[derive(Debug, Deserialize)]
struct WorkflowResponse {
    data: WorkflowRunData,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunData {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    outputs: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    event: String,
    #[serde(default)]
    answer: String,
}

/// Client for the Dify enrichment service. Stateless between calls; safe
/// to share across pool workers behind an Arc.
pub struct DifyClient {
    http: reqwest::Client,
    settings: DifySettings,
    cancel: CancellationToken,
}

impl DifyClient {
    pub fn new(settings: DifySettings, cancel: CancellationToken) -> Result<Self> {
        if settings.base_url.trim().is_empty() {
            return Err(Error::Config("dify base URL is not set".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            settings,
            cancel,
        })
    }

    /// Classify one document's visit stage via the workflow endpoint.
    ///
    /// The workflow must report status "succeeded" and return a JSON
    /// string in `outputs.result` holding `{visit_number,
    /// gestational_weeks}`; anything else is a validation failure.
    pub async fn classify_stage(&self, query: &str) -> Result<StageOutcome> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query text is empty".into()));
        }

        let body = json!({
            "inputs": { "query_text": query },
            "response_mode": "blocking",
            "user": self.settings.user,
        });
        let response: WorkflowResponse = self
            .with_retry("classify_stage", || {
                self.post_once("workflows/run", &self.settings.workflow_api_key, &body)
            })
            .await?;

        let result = workflow_result_str(&response.data)?;
        let outcome: StageOutcome = serde_json::from_str(&result)
            .map_err(|e| Error::Validation(format!("stage result is not valid JSON: {e}")))?;
        debug!(
            visit_number = outcome.visit_number,
            gestational_weeks = outcome.gestational_weeks,
            "stage classified"
        );
        Ok(outcome)
    }

    /// Chat-message variant: send the query, extract the first run of
    /// digits from the answer. Returns [`UNKNOWN_STAGE`] when the answer
    /// is empty or carries no digits.
    pub async fn answer_digits(&self, query: &str) -> Result<String> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query text is empty".into()));
        }

        let body = json!({
            "inputs": {},
            "query": query,
            "response_mode": "blocking",
            "conversation_id": "",
            "user": self.settings.user,
        });
        let response: ChatResponse = self
            .with_retry("answer_digits", || {
                self.post_once("chat-messages", &self.settings.chat_api_key, &body)
            })
            .await?;

        if response.event != "message" || response.answer.is_empty() {
            return Ok(UNKNOWN_STAGE.to_string());
        }
        let answer = strip_think_block(&response.answer);
        Ok(first_digit_run(answer).unwrap_or_else(|| UNKNOWN_STAGE.to_string()))
    }

    /// Extract indicator values for one candidate chunk.
    ///
    /// The candidate list rides along as auxiliary workflow input and the
    /// response is cross-validated against it: every returned code must
    /// exist in the candidates with a matching name, and every candidate
    /// code must appear in the result.
    pub async fn extract_indicators(
        &self,
        query: &str,
        candidates: &[Indicator],
    ) -> Result<Vec<Indicator>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query text is empty".into()));
        }

        let candidates_json = serde_json::to_string(candidates)
            .map_err(|e| Error::Validation(format!("candidate list: {e}")))?;
        let body = json!({
            "inputs": { "query_text": query, "indicators": candidates_json },
            "response_mode": "blocking",
            "user": self.settings.user,
        });
        let response: WorkflowResponse = self
            .with_retry("extract_indicators", || {
                self.post_once("workflows/run", &self.settings.indicator_api_key, &body)
            })
            .await?;

        let result = workflow_result_str(&response.data)?;
        let extracted: Vec<Indicator> = serde_json::from_str(result.trim())
            .map_err(|e| Error::Validation(format!("indicator result is not valid JSON: {e}")))?;
        validate_indicators(&extracted, candidates)?;
        Ok(extracted)
    }

    /// One POST attempt. Non-success statuses become transport errors so
    /// the retry loop can see them; a body that fails to decode is a
    /// validation failure and is not retried.
    async fn post_once<R: DeserializeOwned>(
        &self,
        path: &str,
        api_key: &SecretString,
        body: &serde_json::Value,
    ) -> Result<R> {
        let url = format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                message: format!("{path} returned {status}: {text}"),
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::Validation(format!("malformed {path} response: {e}")))
    }

    /// Run `op` up to `max_retries` times with a fixed delay between
    /// attempts. Non-retryable errors and cancellation end the loop early.
    async fn with_retry<R, F, Fut>(&self, op_name: &str, op: F) -> Result<R>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let max = self.settings.max_retries.max(1);
        let mut last = None;
        for attempt in 1..=max {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(op = op_name, attempt, max, error = %e, "enrichment call failed");
                    last = Some(e);
                }
            }
            if attempt < max {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(Error::Cancelled(format!(
                            "{op_name} stopped while waiting to retry"
                        )));
                    }
                    _ = tokio::time::sleep(self.settings.retry_delay) => {}
                }
            }
        }
        Err(last.unwrap_or_else(|| Error::Transport {
            status: None,
            message: format!("{op_name} exhausted retries"),
        }))
    }
}

/// Pull the `outputs.result` string out of a succeeded workflow run.
fn workflow_result_str(data: &WorkflowRunData) -> Result<String> {
    if data.status != "succeeded" {
        return Err(Error::Validation(format!(
            "workflow status {}: {}",
            data.status,
            data.error.as_deref().unwrap_or("no detail")
        )));
    }
    let result = data
        .outputs
        .as_ref()
        .and_then(|o| o.get("result"))
        .and_then(|r| r.as_str())
        .ok_or_else(|| Error::Validation("workflow outputs carry no result string".into()))?;
    Ok(unquote(result.trim()).to_string())
}

/// Strip one pair of wrapping double quotes, if present. Some workflow
/// apps double-encode their result string.
fn unquote(s: &str) -> &str {
    if s.len() > 1 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Drop everything up to and including the last `</think>` marker, so
/// reasoning-model preambles never leak into digit extraction.
fn strip_think_block(answer: &str) -> &str {
    match answer.rfind("</think>") {
        Some(idx) => &answer[idx + "</think>".len()..],
        None => answer,
    }
}

/// First contiguous run of ASCII digits, if any.
fn first_digit_run(s: &str) -> Option<String> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(digits)
}

/// Cross-validate a returned indicator list against the candidates it was
/// derived from. Codes must match one-to-one and names must agree.
fn validate_indicators(returned: &[Indicator], candidates: &[Indicator]) -> Result<()> {
    use std::collections::{HashMap, HashSet};

    let expected: HashMap<&str, &str> = candidates
        .iter()
        .map(|c| (c.code.as_str(), c.name.as_str()))
        .collect();

    for indicator in returned {
        match expected.get(indicator.code.as_str()) {
            None => {
                return Err(Error::Validation(format!(
                    "result carries unknown indicator code {}",
                    indicator.code
                )));
            }
            Some(name) if *name != indicator.name => {
                return Err(Error::Validation(format!(
                    "indicator {} name mismatch: expected {name}, got {}",
                    indicator.code, indicator.name
                )));
            }
            Some(_) => {}
        }
    }

    let seen: HashSet<&str> = returned.iter().map(|i| i.code.as_str()).collect();
    for candidate in candidates {
        if !seen.contains(candidate.code.as_str()) {
            return Err(Error::Validation(format!(
                "result is missing indicator code {}",
                candidate.code
            )));
        }
    }
    Ok(())
}
