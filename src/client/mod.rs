pub mod conversation;
pub mod encode;
pub mod retry;
#[cfg(test)]
pub mod testing;
pub mod transport;

use std::path::PathBuf;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::info;

use conversation::{ImageDetail, QueryEnvelope, Turn, user_turn};
use encode::{FatalError, image_data_url};
use retry::{RetryExhausted, RetryPolicy, retry};
use transport::{ChatTransport, TransportError};

pub struct QueryRequest<'a> {
    pub image_paths: &'a [PathBuf],
    pub question: &'a str,
    pub history: &'a [Turn],
    pub model: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug)]
pub enum QueryOutcome {
    Answered(Value),
    Exhausted(RetryExhausted<TransportError>),
}

pub struct QueryClient<T> {
    transport: T,
    retry: RetryPolicy,
    image_detail: ImageDetail,
    final_answer_pattern: Regex,
}

impl<T: ChatTransport> QueryClient<T> {
    pub fn new(transport: T, retry: RetryPolicy, image_detail: ImageDetail) -> Result<Self> {
        let final_answer_pattern =
            Regex::new(r"\[\[([^\[\]]+)\]\]").context("failed to compile answer regex")?;

        Ok(Self {
            transport,
            retry,
            image_detail,
            final_answer_pattern,
        })
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encodes every image before anything touches the network. A missing
    /// image aborts here and is never retried.
    pub fn build_envelope(&self, request: &QueryRequest<'_>) -> Result<QueryEnvelope, FatalError> {
        let image_urls = request
            .image_paths
            .iter()
            .map(|path| image_data_url(path))
            .collect::<Result<Vec<String>, FatalError>>()?;

        let mut messages = request.history.to_vec();
        messages.push(user_turn(request.question, image_urls, self.image_detail));

        Ok(QueryEnvelope {
            model: request.model.to_string(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        })
    }

    pub fn query(&self, request: &QueryRequest<'_>) -> Result<QueryOutcome, FatalError> {
        let envelope = self.build_envelope(request)?;

        let attempt = retry(&self.retry, |_attempt| {
            let response = self.transport.post_chat(&envelope)?;
            let answer_text = extract_answer_text(&response)?;
            Ok::<_, TransportError>((response, answer_text))
        });

        match attempt {
            Ok((response, answer_text)) => {
                let final_answer = answer_text
                    .as_deref()
                    .and_then(|text| self.final_answer(text))
                    .unwrap_or_default();
                info!(
                    model = %envelope.model,
                    answer = %answer_text.unwrap_or_default(),
                    final_answer = %final_answer,
                    "received model response"
                );
                Ok(QueryOutcome::Answered(response))
            }
            Err(exhausted) => Ok(QueryOutcome::Exhausted(exhausted)),
        }
    }

    pub fn final_answer(&self, text: &str) -> Option<String> {
        self.final_answer_pattern
            .captures_iter(text)
            .last()
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}

pub fn extract_answer_text(response: &Value) -> Result<Option<String>, TransportError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| TransportError::Malformed("missing choices[0].message".to_string()))?;
    let content = message
        .get("content")
        .ok_or_else(|| TransportError::Malformed("missing choices[0].message.content".to_string()))?;

    Ok(content.as_str().map(ToOwned::to_owned))
}
