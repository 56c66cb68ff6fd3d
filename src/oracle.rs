//! The LLM collaborator: a text-in, text-out completion function.
//!
//! Workflow code only sees [`Oracle`]; replies that must be structured are
//! funnelled through [`OracleAnswer`] so parsing failures stay a value rather
//! than a transport concern.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::RemapConfig,
    error::{RemapError, RemapResult},
};

pub trait Oracle {
    fn complete(&self, prompt: &str) -> RemapResult<String>;

    /// Completion that ends before the first of `stop`.
    fn complete_until(&self, prompt: &str, stop: &[&str]) -> RemapResult<String> {
        let reply = self.complete(prompt)?;
        Ok(truncate_at_stop(&reply, stop).to_string())
    }
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn complete(&self, prompt: &str) -> RemapResult<String> {
        (**self).complete(prompt)
    }

    fn complete_until(&self, prompt: &str, stop: &[&str]) -> RemapResult<String> {
        (**self).complete_until(prompt, stop)
    }
}

impl<O: Oracle + ?Sized> Oracle for Box<O> {
    fn complete(&self, prompt: &str) -> RemapResult<String> {
        (**self).complete(prompt)
    }

    fn complete_until(&self, prompt: &str, stop: &[&str]) -> RemapResult<String> {
        (**self).complete_until(prompt, stop)
    }
}

/// A reply that either parsed into `T` or is kept raw with the reason it failed.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleAnswer<T> {
    Parsed(T),
    Malformed { raw: String, reason: String },
}

impl<T> OracleAnswer<T> {
    pub fn from_reply<F>(raw: String, parse: F) -> Self
    where
        F: FnOnce(&str) -> Result<T, String>,
    {
        match parse(&raw) {
            Ok(value) => OracleAnswer::Parsed(value),
            Err(reason) => OracleAnswer::Malformed { raw, reason },
        }
    }

    pub fn into_result(self) -> RemapResult<T> {
        match self {
            OracleAnswer::Parsed(value) => Ok(value),
            OracleAnswer::Malformed { raw, reason } => Err(RemapError::Parse { reason, raw }),
        }
    }
}

pub fn truncate_at_stop<'a>(text: &'a str, stop: &[&str]) -> &'a str {
    let cut = stop
        .iter()
        .filter(|marker| !marker.is_empty())
        .filter_map(|marker| text.find(marker))
        .min()
        .unwrap_or(text.len());
    &text[..cut]
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client using a blocking HTTP connection per call.
pub struct OpenAiOracle {
    client: reqwest::blocking::Client,
    token: String,
    url: String,
    model: String,
    temperature: f32,
}

impl OpenAiOracle {
    pub fn new(api_key: &str, config: &RemapConfig) -> RemapResult<Self> {
        if api_key.trim().is_empty() {
            return Err(RemapError::Oracle("an API key is required".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| RemapError::Oracle(format!("building HTTP client: {err}")))?;
        Ok(OpenAiOracle {
            client,
            token: format!("Bearer {}", api_key.trim()),
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn send(&self, prompt: &str, stop: &[&str]) -> RemapResult<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stop: stop.to_vec(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|err| RemapError::Oracle(format!("encoding request: {err}")))?;
        debug!("Oracle request to {} ({} byte prompt)", self.url, prompt.len());
        let resp = self
            .client
            .post(&self.url)
            .header("authorization", &self.token)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .map_err(|err| RemapError::Oracle(format!("request failed: {err}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .map_err(|err| RemapError::Oracle(format!("reading response: {err}")))?;
        if !status.is_success() {
            return Err(RemapError::Oracle(format!("HTTP {status}: {text}")));
        }
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|err| RemapError::Oracle(format!("response parse error {err}: {text:?}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RemapError::Oracle("response contained no completion".to_string()))
    }
}

impl Oracle for OpenAiOracle {
    fn complete(&self, prompt: &str) -> RemapResult<String> {
        self.send(prompt, &[])
    }

    fn complete_until(&self, prompt: &str, stop: &[&str]) -> RemapResult<String> {
        let reply = self.send(prompt, stop)?;
        // Servers may echo the stop marker back.
        Ok(truncate_at_stop(&reply, stop).to_string())
    }
}
