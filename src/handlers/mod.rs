use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

/// A resolved source: the plain text that goes to the parse server plus
/// whatever the handler learned about its origin.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub source: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

/// Turns one kind of source argument into plain text in a single pass.
#[async_trait]
pub trait DocumentHandler: Send + Sync {
    async fn read(&self, source: &str) -> Result<ProcessedDocument>;
}

pub struct TextHandler;

#[async_trait]
impl DocumentHandler for TextHandler {
    async fn read(&self, source: &str) -> Result<ProcessedDocument> {
        let bytes = tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read text file: {}", source))?;

        // BOM wins; anything else is decoded as UTF-8
        let encoding = encoding_rs::Encoding::for_bom(&bytes)
            .map(|(encoding, _)| encoding)
            .unwrap_or(encoding_rs::UTF_8);

        let (text, _, had_errors) = encoding.decode(&bytes);
        if had_errors {
            tracing::warn!("Encoding errors detected in file: {}", source);
        }

        let metadata = HashMap::from([
            ("source".to_string(), source.to_string()),
            ("type".to_string(), "text".to_string()),
            ("size".to_string(), bytes.len().to_string()),
        ]);

        Ok(ProcessedDocument {
            source: source.to_string(),
            text: text.into_owned(),
            metadata,
        })
    }
}

pub struct UrlHandler {
    client: reqwest::Client,
}

impl UrlHandler {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("relation_graph_extractor/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for UrlHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentHandler for UrlHandler {
    async fn read(&self, source: &str) -> Result<ProcessedDocument> {
        let response = self
            .client
            .get(source)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {}", source))?;

        let html = response
            .text()
            .await
            .with_context(|| "Failed to read response body")?;

        let page = Html::parse_document(&html);

        let mut metadata = HashMap::from([
            ("source".to_string(), source.to_string()),
            ("type".to_string(), "url".to_string()),
        ]);
        if let Some(title) = first_element_text(&page, "title") {
            metadata.insert("title".to_string(), title);
        }

        Ok(ProcessedDocument {
            source: source.to_string(),
            text: visible_text(&page),
            metadata,
        })
    }
}

/// Visible text of the page: every text node outside head, script and
/// style subtrees, one line per node.
fn visible_text(page: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();

    for node in page.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| matches!(element.name(), "head" | "script" | "style"))
        });
        if hidden {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }

    parts.join("\n")
}

fn first_element_text(page: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let element = page.select(&selector).next()?;
    let text = element.text().collect::<Vec<_>>().join(" ");
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Resolves a source argument to the handler that can read it.
pub struct DocumentProcessor {
    handlers: HashMap<String, Box<dyn DocumentHandler>>,
}

impl DocumentProcessor {
    pub fn new() -> Self {
        let mut handlers: HashMap<String, Box<dyn DocumentHandler>> = HashMap::new();

        handlers.insert("txt".to_string(), Box::new(TextHandler));
        handlers.insert("text".to_string(), Box::new(TextHandler));
        handlers.insert("md".to_string(), Box::new(TextHandler));
        handlers.insert("url".to_string(), Box::new(UrlHandler::new()));

        Self { handlers }
    }

    pub async fn process(&self, source: &str) -> Result<ProcessedDocument> {
        self.handler_for(source)?.read(source).await
    }

    fn handler_for(&self, source: &str) -> Result<&dyn DocumentHandler> {
        if source.starts_with("http://") || source.starts_with("https://") {
            Url::parse(source).with_context(|| format!("Malformed URL: {}", source))?;
            return self
                .handlers
                .get("url")
                .map(|handler| handler.as_ref())
                .ok_or_else(|| anyhow::anyhow!("URL handler not registered"));
        }

        let extension = Path::new(source)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("txt");

        // unknown extensions are read as plain text
        self.handlers
            .get(extension)
            .or_else(|| self.handlers.get("txt"))
            .map(|handler| handler.as_ref())
            .ok_or_else(|| anyhow::anyhow!("No handler found for file type: {}", extension))
    }
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new()
    }
}
