use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    pub description: String,
    pub version: String,
    pub parser: ParserSettings,
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Where the dependency-parse server lives and which of its models to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserSettings {
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Json,
    Dot,
    Tsv,
}

fn default_model() -> String {
    "en_core_web_sm".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Configuration {
    /// Load configuration from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.parser.base_url.is_empty() {
            anyhow::bail!("No base URL defined for the parse server");
        }

        if !self.parser.base_url.starts_with("http://")
            && !self.parser.base_url.starts_with("https://")
        {
            anyhow::bail!("Parse server URL must be http(s): {}", self.parser.base_url);
        }

        if self.parser.model.is_empty() {
            anyhow::bail!("No parse model configured");
        }

        if self.parser.timeout == 0 {
            anyhow::bail!("Parse timeout must be at least one second");
        }

        Ok(())
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Configuration {
            name: "Example Relation Extraction Config".to_string(),
            description: "Extract relation triplets from text and build a labeled graph"
                .to_string(),
            version: "1.0".to_string(),
            parser: ParserSettings {
                base_url: "http://localhost:8080".to_string(),
                model: default_model(),
                timeout: default_timeout(),
            },
            output_format: OutputFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_example_is_valid() {
        assert!(Configuration::example().validate().is_ok());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            file,
            "name: test\ndescription: test config\nversion: \"1.0\"\n\
             parser:\n  base_url: http://localhost:9999\noutput_format: dot\n"
        )
        .unwrap();

        let config = Configuration::from_file(file.path()).unwrap();
        assert_eq!(config.name, "test");
        assert_eq!(config.parser.base_url, "http://localhost:9999");
        // defaults fill in what the file leaves out
        assert_eq!(config.parser.model, "en_core_web_sm");
        assert_eq!(config.parser.timeout, 30);
        assert_eq!(config.output_format, OutputFormat::Dot);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Configuration::example();
        config.parser.base_url = "localhost:8080".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Configuration::example();
        config.parser.timeout = 0;
        assert!(config.validate().is_err());
    }
}
