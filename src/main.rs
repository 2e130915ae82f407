use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use registry_client::{ImageReference, RegistryClient, Settings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Registry address (host with optional repository prefix). Defaults to the
    /// registry of the first image reference.
    #[arg(long, global = true)]
    registry: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether an image reference exists (exit status 1 if it does not)
    Exists {
        /// Image reference (tag or digest)
        image: String,
    },
    /// Show digest, media type and size of an image reference
    Head {
        /// Image reference (tag or digest)
        image: String,
        /// Print the descriptor as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the image configuration (entrypoint, env, labels, history, ...)
    Inspect {
        /// Image reference (tag or digest)
        image: String,
    },
    /// Tag an existing image with a new tag
    Retag {
        /// Existing image reference (tag or digest)
        existing: String,
        /// New tag reference, e.g. registry.io/org/app:stable
        new: String,
    },
}

impl Commands {
    fn primary_image(&self) -> &str {
        match self {
            Commands::Exists { image }
            | Commands::Head { image, .. }
            | Commands::Inspect { image } => image,
            Commands::Retag { existing, .. } => existing,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for all commands
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::new().context("Failed to load registry settings")?;

    let address = match cli.registry {
        Some(address) => address,
        None => ImageReference::parse(cli.command.primary_image())?
            .registry()
            .to_string(),
    };

    let client = RegistryClient::from_settings(address, &settings)
        .context("Failed to create registry client")?;

    match &cli.command {
        Commands::Exists { image } => {
            if !cli::image::exists(&client, image).await? {
                std::process::exit(1);
            }
        }
        Commands::Head { image, json } => cli::image::head(&client, image, *json).await?,
        Commands::Inspect { image } => cli::image::inspect(&client, image).await?,
        Commands::Retag { existing, new } => cli::image::retag(&client, existing, new).await?,
    }

    Ok(())
}
