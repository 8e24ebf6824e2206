//! LeafDisease CLI
//!
//! Thin command-line front-end over the classifier: loads the model once,
//! then predicts, lists classes or benchmarks latency.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use leaf_disease::backend::{backend_name, default_device, DefaultBackend};
use leaf_disease::inference::{run_benchmark, BenchmarkConfig, DEFAULT_TOP_K};
use leaf_disease::utils::logging::{init_logging, LogConfig};
use leaf_disease::utils::{format_latency, format_probability_bar};
use leaf_disease::{ClassRegistry, PredictionResult, Predictor, PredictorConfig};
use leaf_disease::{APP_DESCRIPTION, APP_TITLE};

/// Plant leaf disease classification with EfficientNet-B2
#[derive(Parser, Debug)]
#[command(name = "leaf_disease")]
#[command(version)]
#[command(about = "Classify plant leaf images into 38 PlantVillage classes", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify one or more images
    Predict {
        /// Path to the weights file (overrides the config file)
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Predictor configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of most probable classes to show
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Print the full distribution as JSON instead
        #[arg(long, default_value = "false")]
        json: bool,

        /// Images to classify
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },

    /// List the class registry
    Classes,

    /// Benchmark prediction latency on one image
    Benchmark {
        /// Path to the weights file (overrides the config file)
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Predictor configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of measured iterations
        #[arg(short, long, default_value = "100")]
        iterations: usize,

        /// Number of warmup iterations
        #[arg(long, default_value = "10")]
        warmup: usize,

        /// Output JSON file for benchmark results
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Image to classify repeatedly
        image: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        #[arg(default_value = "leaf_disease.toml")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config.with_env_override());

    match cli.command {
        Commands::Predict {
            weights,
            config,
            top_k,
            json,
            images,
        } => {
            if !json {
                print_banner();
            }
            let config = resolve_config(config.as_deref(), weights)?;
            cmd_predict(&config, &images, top_k, json)?;
        }

        Commands::Classes => {
            print_banner();
            cmd_classes();
        }

        Commands::Benchmark {
            weights,
            config,
            iterations,
            warmup,
            output,
            image,
        } => {
            print_banner();
            let config = resolve_config(config.as_deref(), weights)?;
            cmd_benchmark(&config, &image, iterations, warmup, output.as_deref())?;
        }

        Commands::InitConfig { path } => {
            PredictorConfig::default()
                .save_toml(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} {}", "Wrote default configuration to".green(), path.display());
        }
    }

    Ok(())
}

fn print_banner() {
    println!();
    println!("  {}", APP_TITLE.green().bold());
    println!("  {}", APP_DESCRIPTION.green());
    println!();
}

/// Config file if given, defaults otherwise, with `--weights` taking priority
fn resolve_config(path: Option<&Path>, weights: Option<PathBuf>) -> Result<PredictorConfig> {
    let mut config = match path {
        Some(path) => PredictorConfig::load_toml(path)?,
        None => PredictorConfig::default(),
    };

    if let Some(weights) = weights {
        config.weights = weights;
    }

    Ok(config)
}

fn load_predictor(config: &PredictorConfig) -> Result<Predictor<DefaultBackend>> {
    info!("Loading model from {:?} on {}", config.weights, backend_name());

    let predictor = Predictor::<DefaultBackend>::load(config, default_device())
        .context("Model failed to load; no predictions will be served")?;

    Ok(predictor)
}

fn cmd_predict(config: &PredictorConfig, images: &[PathBuf], top_k: usize, json: bool) -> Result<()> {
    if !json {
        println!("{}", "Inference Configuration:".cyan().bold());
        println!("  Weights: {}", config.weights.display());
        println!("  Backend: {}", backend_name());
        println!();
    }

    let predictor = load_predictor(config)?;
    let mut failures = 0usize;

    for path in images {
        let outcome = std::fs::read(path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| Ok(predictor.predict_encoded(&bytes)?));

        match outcome {
            Ok(result) if json => {
                let entry = serde_json::json!({
                    "image": path,
                    "probabilities": result.to_map(),
                    "latency_secs": result.latency_secs,
                });
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(result) => print_prediction(path, &result, top_k),
            Err(e) => {
                failures += 1;
                warn!("Prediction failed for {:?}: {}", path, e);
                eprintln!("{} {}: {}", "Error:".red(), path.display(), e);
            }
        }
    }

    if failures > 0 {
        eprintln!(
            "{} {} of {} images could not be classified",
            "Warning:".yellow(),
            failures,
            images.len()
        );
    }

    Ok(())
}

fn print_prediction(path: &Path, result: &PredictionResult, top_k: usize) {
    println!(
        "{}",
        path.file_name()
            .unwrap_or(path.as_os_str())
            .to_string_lossy()
            .bold()
    );

    for (rank, entry) in result.top_k(top_k).iter().enumerate() {
        let name = if entry.label.is_healthy() {
            entry.label.name.green()
        } else {
            entry.label.name.yellow()
        };
        println!(
            "  {}. {:<50} {}",
            rank + 1,
            name,
            format_probability_bar(entry.probability, 20)
        );
    }

    println!("  Prediction time: {}", format_latency(result.latency_secs));
    println!();
}

fn cmd_classes() {
    let registry = ClassRegistry::default();
    println!("{} ({} classes)", "Class registry".cyan().bold(), registry.len());

    for label in registry.labels() {
        let marker = if label.is_healthy() {
            "healthy".green()
        } else {
            "disease".yellow()
        };
        println!("  {:>2}  {:<50} {}", label.index, label.name, marker);
    }
}

fn cmd_benchmark(
    config: &PredictorConfig,
    image: &Path,
    iterations: usize,
    warmup: usize,
    output: Option<&Path>,
) -> Result<()> {
    let predictor = load_predictor(config)?;
    let image = image::open(image).with_context(|| format!("Failed to open {}", image.display()))?;

    let bench_config = BenchmarkConfig {
        warmup_iterations: warmup,
        iterations,
    };

    println!("{}", "Running benchmark...".cyan());
    let result = run_benchmark(&predictor, &image, bench_config, backend_name())?;
    println!();
    println!("{}", result);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        println!("{} {}", "Saved results to".green(), path.display());
    }

    Ok(())
}
