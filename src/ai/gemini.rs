//! Gemini `streamGenerateContent` client.
//!
//! The response is consumed as server-sent events; the text parts of every
//! chunk are concatenated into the final answer.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::ai::schema::response_schema;
use crate::ai::AnswerSource;
use crate::config::ModelConfig;
use crate::error::GradeError;

pub struct GeminiClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    thinking_budget: u32,
}

impl GeminiClient {
    /// Builds a client from the model settings. The API key comes from the
    /// environment variable named in the config.
    pub fn from_config(config: &ModelConfig) -> Result<Self, GradeError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GradeError::UpstreamFailure(format!(
                    "API key not set (expected in ${})",
                    config.api_key_env
                ))
            })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|e| GradeError::UpstreamFailure(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: stream_endpoint(&config.base_url, &config.model),
            api_key,
            thinking_budget: config.thinking_budget,
        })
    }
}

impl AnswerSource for GeminiClient {
    fn request_grading(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, GradeError> {
        let body = request_body(image, mime_type, prompt, self.thinking_budget);
        crate::log(&format!(
            "Sending {} byte image to {}",
            image.len(),
            self.endpoint
        ));

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| GradeError::UpstreamFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(GradeError::UpstreamFailure(format!(
                "HTTP {}: {}",
                status,
                detail.trim()
            )));
        }

        let text = read_sse_stream(BufReader::new(response))?;
        crate::log(&format!("Model response complete ({} chars)", text.len()));
        Ok(text)
    }
}

fn stream_endpoint(base_url: &str, model: &str) -> String {
    format!(
        "{}/models/{}:streamGenerateContent?alt=sse",
        base_url.trim_end_matches('/'),
        model
    )
}

fn request_body(image: &[u8], mime_type: &str, prompt: &str, thinking_budget: u32) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "inline_data": { "mime_type": mime_type, "data": BASE64.encode(image) } },
                { "text": prompt }
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
            "thinkingConfig": { "thinkingBudget": thinking_budget }
        }
    })
}

/// Extracts the text carried by one SSE line, if any.
///
/// Thought parts are skipped. An `error` payload is an upstream failure.
fn parse_sse_line(line: &str) -> Result<Option<String>, GradeError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments and event names
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let chunk: Value = serde_json::from_str(data)
        .map_err(|e| GradeError::UpstreamMalformed(format!("bad stream chunk: {}", e)))?;

    if let Some(error) = chunk.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(GradeError::UpstreamFailure(message));
    }

    let Some(parts) = chunk
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        return Ok(None);
    };

    let text: String = parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    Ok((!text.is_empty()).then_some(text))
}

/// Reads an SSE stream to the end and returns the concatenated text.
fn read_sse_stream<R: BufRead>(reader: R) -> Result<String, GradeError> {
    let mut json_response = String::new();

    for line in reader.lines() {
        let line = line.map_err(|e| GradeError::UpstreamFailure(e.to_string()))?;
        if let Some(text) = parse_sse_line(&line)? {
            json_response.push_str(&text);
        }
    }

    if json_response.trim().is_empty() {
        return Err(GradeError::UpstreamMalformed(
            "model returned no text".to_string(),
        ));
    }
    Ok(json_response)
}
