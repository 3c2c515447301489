use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::core::document::{Document, Sentence, Token};

/// Errors crossing the extraction pipeline boundary.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The caller handed us nothing to work with; raised before the parse
    /// server is ever contacted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The parse server could not be reached. Not retried.
    #[error("parse server unreachable at {url}: {message}")]
    ParserUnavailable { url: String, message: String },

    /// The parse server answered but the response was unusable.
    #[error("parse server error: {0}")]
    Parser(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    pub text: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedToken {
    pub text: String,
    pub lemma: String,
    pub pos: String,
    pub dep: String,
    /// Index of the governing token within the enclosing sentence; the
    /// root token points at itself.
    pub head: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSentence {
    pub tokens: Vec<ParsedToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResponse {
    pub model: String,
    pub sentences: Vec<ParsedSentence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

impl From<ParseResponse> for Document {
    fn from(response: ParseResponse) -> Self {
        let sentences = response
            .sentences
            .into_iter()
            .map(|sentence| {
                Sentence::new(
                    sentence
                        .tokens
                        .into_iter()
                        .map(|t| Token::new(t.text, t.lemma, t.pos.into(), t.dep, t.head))
                        .collect(),
                )
            })
            .collect();
        Document::new(sentences)
    }
}

/// HTTP client for the dependency-parse server.
///
/// The server keeps its parse model loaded for the life of the process, so
/// this client is constructed exactly once at startup, injected where
/// parsing is needed, and shared read-only from then on.
pub struct ParserClient {
    client: reqwest::Client,
    base_url: String,
    pub model: String,
}

impl ParserClient {
    pub fn new(base_url: String, model: String, timeout: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Parse models currently loaded on the server.
    pub async fn available_models(&self) -> Result<Vec<String>, ExtractionError> {
        let url = format!("{}/models", self.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            ExtractionError::ParserUnavailable {
                url: self.base_url.clone(),
                message: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            return Err(ExtractionError::Parser(format!(
                "models endpoint returned {}",
                response.status()
            )));
        }

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parser(format!("malformed models response: {}", e)))?;

        Ok(models.models)
    }

    /// Run the text through the server's dependency parser.
    ///
    /// An empty input string is valid and yields a document with zero
    /// sentences.
    pub async fn parse(&self, text: &str) -> Result<Document, ExtractionError> {
        let request = ParseRequest {
            text: text.to_string(),
            model: self.model.clone(),
        };

        debug!("sending {} bytes to parse server", text.len());

        let url = format!("{}/parse", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::ParserUnavailable {
                url: self.base_url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Parser(format!(
                "parse request failed with {}: {}",
                status, body
            )));
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parser(format!("malformed parse response: {}", e)))?;

        debug!(
            "parsed {} sentences with model {}",
            parsed.sentences.len(),
            parsed.model
        );

        Ok(Document::from(parsed))
    }
}
