use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use textembed::config::Config;
use textembed::embedder::TextEmbedder;
use textembed::embedder::onnx::InferenceEnvironment;

#[derive(Parser)]
#[command(name = "textembed", version, about = "Compute text embeddings locally or via a provider")]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "textembed.json", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed one or more texts and print the vectors as JSON
    Embed {
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// Check the configured model and print its output dimensionality
    Validate,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    // Only local models need the ONNX Runtime environment.
    let env = if config.is_remote() {
        None
    } else {
        Some(InferenceEnvironment::init("textembed").context("failed to load ONNX Runtime")?)
    };
    let embedder =
        TextEmbedder::from_config(&config, env.as_ref()).context("failed to create embedder")?;

    match cli.command {
        Command::Embed { texts } => {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = if let [single] = refs.as_slice() {
                vec![embedder.embed(single)?]
            } else {
                embedder.batch_embed(&refs)?
            };
            println!("{}", serde_json::to_string(&vectors)?);
        }
        Command::Validate => {
            let dims = embedder.validate()?;
            println!("{dims}");
        }
    }

    Ok(())
}
