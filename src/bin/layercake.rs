use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use layercake::builder::{assemble_image, BuildAndCacheApplicationLayersStep, Step};
use layercake::cache::{Cache, CacheChecker, LayerType};
use layercake::config::{load_config, BuildConfig};
use layercake_oci::{AnyLayer, Layer};

#[derive(Parser)]
#[command(name = "layercake")]
#[command(about = "Build and cache application image layers", version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or reuse the dependencies, resources and classes layers
    Build {
        /// Build configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Report which layers would be rebuilt, without building
    Check {
        /// Build configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Validate a build configuration
    Validate {
        /// Build configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Build { config } => cmd_build(&load_config(&config)?).await?,
        Commands::Check { config } => cmd_check(&load_config(&config)?)?,
        Commands::Validate { config } => {
            let loaded = load_config(&config)?;
            println!(
                "valid: {} (api_version={}, cache_dir={})",
                config.display(),
                loaded.api_version,
                loaded.cache_dir().display()
            );
        }
    }

    Ok(())
}

async fn cmd_build(config: &BuildConfig) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let cache = Arc::new(Cache::open(config.cache_dir())?);
    let base_layers = config.base_layers()?;

    let step = BuildAndCacheApplicationLayersStep::new(
        config.source_files_configuration(),
        Arc::clone(&cache),
    );
    let application = step.run().await?;

    for (layer_type, outcome) in application.outcomes() {
        println!("{:<13} {}", layer_type, outcome);
    }

    let image = assemble_image(
        base_layers,
        application.into_layers(),
        config.environment.clone(),
        config.entrypoint.clone(),
    )?;

    println!("layers:");
    for layer in image.layers() {
        let (kind, location) = match layer {
            AnyLayer::Reference(_) => ("base", String::from("(remote)")),
            AnyLayer::Cached(cached) => ("app", cached.content_path().display().to_string()),
        };
        println!(
            "  {:<4} {} {:>10} {}",
            kind,
            layer.digest()?,
            layer.blob_descriptor()?.size(),
            location
        );
    }
    if !image.entrypoint().is_empty() {
        println!("entrypoint: {}", image.entrypoint().join(" "));
    }
    println!(
        "done in {}",
        humantime::format_duration(std::time::Duration::from_millis(
            started.elapsed().as_millis() as u64
        ))
    );
    Ok(())
}

fn cmd_check(config: &BuildConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cache = Cache::open(config.cache_dir())?;
    let checker = CacheChecker::new(&cache);
    let sources = config.source_files_configuration();

    for layer_type in LayerType::APPLICATION {
        let Some(layer_sources) = sources.for_type(layer_type) else {
            continue;
        };
        let reusable = checker.up_to_date_layer(
            layer_type,
            layer_sources.files(),
            layer_sources.extraction_path(),
        )?;
        let state = if reusable.is_none() {
            "needs rebuild"
        } else {
            "up to date"
        };
        println!("{:<13} {}", layer_type, state);
    }

    let base_layers = config.base_layers()?;
    if !base_layers.is_empty() {
        let cached = checker.are_base_image_layers_cached(&base_layers)?;
        println!(
            "{:<13} {}",
            LayerType::Base,
            if cached { "cached" } else { "not cached" }
        );
    }
    Ok(())
}
