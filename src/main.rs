use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::ProgressBar;
use std::path::PathBuf;
use tracing::{error, warn};

use relation_graph_extractor::{
    config::{Configuration, OutputFormat},
    core::{ExtractionResult, ParserClient, RelationExtractor, TripletCollection},
    graph::RelationGraph,
    utils::{validate_triplets, GraphSerializer},
};

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(
    name = "relation_graph_extractor",
    about = "Extract relation triplets from text and build labeled relation graphs",
    long_about = None,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract relation triplets from documents or literal text
    Extract {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input documents or URLs
        #[arg(short, long)]
        input: Vec<String>,

        /// Literal text to extract from instead of documents
        #[arg(short, long)]
        text: Option<String>,

        /// Export triplets to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format for export
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormatArg,

        /// Parse server URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server_url: String,

        /// Parse model to use (overrides config)
        #[arg(long)]
        model: Option<String>,

        /// Merge results from multiple documents
        #[arg(long)]
        merge: bool,

        /// Validate extracted triplets
        #[arg(long)]
        validate: bool,
    },

    /// Build a relation graph from documents and export it
    Graph {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input documents or URLs
        #[arg(short, long)]
        input: Vec<String>,

        /// Literal text to extract from instead of documents
        #[arg(short, long)]
        text: Option<String>,

        /// Export graph to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format for export
        #[arg(short, long, value_enum, default_value = "dot")]
        format: OutputFormatArg,

        /// Parse server URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server_url: String,

        /// Parse model to use (overrides config)
        #[arg(long)]
        model: Option<String>,
    },

    /// Show relation graph statistics for the given inputs
    Stats {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input documents or URLs
        #[arg(short, long)]
        input: Vec<String>,

        /// Literal text to extract from instead of documents
        #[arg(short, long)]
        text: Option<String>,

        /// Parse server URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server_url: String,

        /// Parse model to use (overrides config)
        #[arg(long)]
        model: Option<String>,
    },

    /// List entities related to one entity in the extracted graph
    Related {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input documents or URLs
        #[arg(short, long)]
        input: Vec<String>,

        /// Literal text to extract from instead of documents
        #[arg(short, long)]
        text: Option<String>,

        /// Entity to start from
        #[arg(short, long)]
        entity: String,

        /// Maximum traversal depth
        #[arg(long, default_value_t = 2)]
        depth: usize,

        /// Parse server URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server_url: String,

        /// Parse model to use (overrides config)
        #[arg(long)]
        model: Option<String>,
    },

    /// Check parse server status
    CheckServer {
        /// Parse server URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server_url: String,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration format (yaml or json)
        #[arg(short, long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[derive(clap::ValueEnum, Clone)]
enum OutputFormatArg {
    Json,
    Dot,
    Tsv,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(format: OutputFormatArg) -> Self {
        match format {
            OutputFormatArg::Json => Self::Json,
            OutputFormatArg::Dot => Self::Dot,
            OutputFormatArg::Tsv => Self::Tsv,
        }
    }
}

#[derive(clap::ValueEnum, Clone)]
enum ConfigFormat {
    Yaml,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Extract {
            config,
            input,
            text,
            output,
            format,
            server_url,
            model,
            merge,
            validate,
        } => {
            extract_command(config, input, text, output, format, server_url, model, merge, validate)
                .await
        }
        Commands::Graph {
            config,
            input,
            text,
            output,
            format,
            server_url,
            model,
        } => graph_command(config, input, text, output, format, server_url, model).await,
        Commands::Stats {
            config,
            input,
            text,
            server_url,
            model,
        } => stats_command(config, input, text, server_url, model).await,
        Commands::Related {
            config,
            input,
            text,
            entity,
            depth,
            server_url,
            model,
        } => related_command(config, input, text, entity, depth, server_url, model).await,
        Commands::CheckServer { server_url } => check_server_command(server_url).await,
        Commands::Validate { config } => validate_command(config),
        Commands::GenerateConfig { output, format } => generate_config_command(output, format),
    }
}

fn load_config(
    config_path: Option<PathBuf>,
    server_url: &str,
    model_override: Option<String>,
) -> Result<Configuration> {
    let mut config = match config_path {
        Some(path) => {
            let config = Configuration::from_file(&path)?;
            config.validate()?;
            config
        }
        None => Configuration::example(),
    };

    // CLI flags win over the file
    if server_url != DEFAULT_SERVER_URL {
        config.parser.base_url = server_url.to_string();
    }
    if let Some(model) = model_override {
        config.parser.model = model;
    }

    Ok(config)
}

async fn build_extractor(config: &Configuration) -> Result<RelationExtractor> {
    let client = ParserClient::new(
        config.parser.base_url.clone(),
        config.parser.model.clone(),
        config.parser.timeout,
    )?;

    if !client.check_health().await {
        error!("Parse server is not responding at {}", config.parser.base_url);
        return Err(anyhow::anyhow!("parse server health check failed"));
    }

    println!(" Parse server is healthy");

    Ok(RelationExtractor::new(client))
}

async fn collect_results(
    extractor: &RelationExtractor,
    input: &[String],
    text: Option<&str>,
) -> Result<Vec<ExtractionResult>> {
    if let Some(text) = text {
        return Ok(vec![extractor.extract_text(text).await?]);
    }

    if input.is_empty() {
        anyhow::bail!("No inputs provided; pass --input or --text");
    }

    let progress = ProgressBar::new(input.len() as u64);
    let mut results = Vec::with_capacity(input.len());

    for source in input {
        progress.set_message(source.clone());
        results.push(extractor.extract_from_source(source).await?);
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(results)
}

fn report_errors(results: &[ExtractionResult]) {
    for result in results {
        if result.has_errors() {
            warn!(" Errors in {}: {}", result.source, result.errors.join(", "));
        }
    }
}

fn union_triplets(results: &[ExtractionResult]) -> TripletCollection {
    results
        .iter()
        .flat_map(|result| result.triplets.iter().cloned())
        .collect()
}

async fn extract_command(
    config_path: Option<PathBuf>,
    input: Vec<String>,
    text: Option<String>,
    output: Option<PathBuf>,
    format: OutputFormatArg,
    server_url: String,
    model_override: Option<String>,
    merge: bool,
    validate: bool,
) -> Result<()> {
    println!("{}", "Starting relation extraction...".bright_blue().bold());

    let config = load_config(config_path, &server_url, model_override)?;

    println!(" Configuration: {}", config.name.bright_green());
    println!(" Parse model: {}", config.parser.model);

    let extractor = build_extractor(&config).await?;

    let mut results = collect_results(&extractor, &input, text.as_deref()).await?;
    report_errors(&results);

    if merge && results.len() > 1 {
        results = vec![extractor.merge_results(results)?];
    }

    if validate {
        for result in &results {
            let issues = validate_triplets(&result.triplets.to_vec());
            if issues.is_empty() {
                println!(" {} {}", result.source, "valid".bright_green());
            } else {
                for issue in issues {
                    println!(" {} {}", result.source.bright_yellow(), issue);
                }
            }
        }
    }

    let total: usize = results.iter().map(|r| r.triplets.len()).sum();
    println!(
        " Extracted {} triplets from {} result(s)",
        total.to_string().bright_green(),
        results.len()
    );

    let serializer = GraphSerializer::new();
    let triplets = union_triplets(&results);
    let rendered = serializer.serialize_triplets(&triplets.to_vec(), &format.into())?;

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            println!(" Triplets written to {}", path.display().to_string().bright_green());
        }
        None => {
            for triplet in triplets.iter() {
                println!("  {}", triplet);
            }
        }
    }

    Ok(())
}

async fn graph_command(
    config_path: Option<PathBuf>,
    input: Vec<String>,
    text: Option<String>,
    output: Option<PathBuf>,
    format: OutputFormatArg,
    server_url: String,
    model_override: Option<String>,
) -> Result<()> {
    println!("{}", "Building relation graph...".bright_blue().bold());

    let config = load_config(config_path, &server_url, model_override)?;
    let extractor = build_extractor(&config).await?;

    let results = collect_results(&extractor, &input, text.as_deref()).await?;
    report_errors(&results);

    let graph = RelationGraph::build(&union_triplets(&results));
    println!(
        " Graph: {} nodes, {} edges",
        graph.node_count().to_string().bright_green(),
        graph.edge_count().to_string().bright_green()
    );

    let format: OutputFormat = format.into();
    match output {
        Some(path) => {
            graph.export_to_file(&path.to_string_lossy(), &format)?;
            println!(" Graph written to {}", path.display().to_string().bright_green());
        }
        None => {
            let rendered = GraphSerializer::new().serialize_graph(&graph, &format)?;
            println!("{}", rendered);
        }
    }

    Ok(())
}

async fn stats_command(
    config_path: Option<PathBuf>,
    input: Vec<String>,
    text: Option<String>,
    server_url: String,
    model_override: Option<String>,
) -> Result<()> {
    let config = load_config(config_path, &server_url, model_override)?;
    let extractor = build_extractor(&config).await?;

    let results = collect_results(&extractor, &input, text.as_deref()).await?;
    report_errors(&results);

    let graph = RelationGraph::build(&union_triplets(&results));
    println!("{}", graph.stats());

    Ok(())
}

async fn related_command(
    config_path: Option<PathBuf>,
    input: Vec<String>,
    text: Option<String>,
    entity: String,
    depth: usize,
    server_url: String,
    model_override: Option<String>,
) -> Result<()> {
    let config = load_config(config_path, &server_url, model_override)?;
    let extractor = build_extractor(&config).await?;

    let results = collect_results(&extractor, &input, text.as_deref()).await?;
    report_errors(&results);

    let graph = RelationGraph::build(&union_triplets(&results));

    if !graph.contains_node(&entity) {
        println!(" {} {}", entity.bright_yellow(), "is not in the graph");
        return Ok(());
    }

    let related = graph.related(&entity, depth);
    if related.is_empty() {
        println!(" No entities within {} hops of {}", depth, entity.bright_green());
    } else {
        println!(
            " {} entities within {} hops of {}:",
            related.len().to_string().bright_green(),
            depth,
            entity.bright_green()
        );
        for name in related {
            println!("  {}", name);
        }
    }

    Ok(())
}

async fn check_server_command(server_url: String) -> Result<()> {
    let client = ParserClient::new(server_url.clone(), "en_core_web_sm".to_string(), 10)?;

    if client.check_health().await {
        println!("{} {}", "Parse server is healthy:".bright_green(), server_url);
        match client.available_models().await {
            Ok(models) => {
                println!(" Loaded models:");
                for model in models {
                    println!("  {}", model);
                }
            }
            Err(e) => warn!("Could not list models: {}", e),
        }
    } else {
        println!("{} {}", "Parse server is not responding:".bright_red(), server_url);
    }

    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = Configuration::from_file(&config_path)?;
    config.validate()?;

    println!(
        "{} {}",
        "Configuration is valid:".bright_green(),
        config.name
    );
    Ok(())
}

fn generate_config_command(output: PathBuf, format: ConfigFormat) -> Result<()> {
    let config = Configuration::example();

    let content = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
    };

    std::fs::write(&output, content)?;
    println!(
        "{} {}",
        "Example configuration written to".bright_green(),
        output.display()
    );

    Ok(())
}
