//! CLI wiring for splitexit.

use crate::dataset::EmbeddingDataset;
use crate::eval::{evaluate, predict_records};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use splitexit_classifier::{
    ClassifierConfig, ClassifierRecord, ClassifierRegistry, LabelPolicy, KMEANS_TAG,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "splitexit", about = "Clustering-based early-exit classifier toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct FitArgs {
    /// Classifier configuration (JSON). Flags below override its fields.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long, default_value = KMEANS_TAG)]
    pub kind: String,
    /// Number of clusters.
    #[arg(long)]
    pub k: Option<usize>,
    #[arg(long)]
    pub n_labels: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub max_iter: Option<usize>,
    #[arg(long)]
    pub n_init: Option<usize>,
    /// Fail on labels >= n_labels instead of skipping them.
    #[arg(long, default_value_t = false)]
    pub reject_out_of_range_labels: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fit a classifier on a labeled embedding dataset and save it.
    Fit {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        args: FitArgs,
    },
    /// Emit per-input confidences and early-exit decisions as JSON.
    Predict {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Measure exit rate and accuracy on a labeled dataset.
    Evaluate {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the metadata block of a saved classifier.
    Inspect {
        #[arg(long)]
        model: PathBuf,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    run_command(cli.command)
}

pub fn run_command(command: Command) -> Result<()> {
    let registry = ClassifierRegistry::with_default_classifiers();

    match command {
        Command::Fit {
            dataset,
            output,
            args,
        } => {
            let config = resolve_config(&args)?;
            let data = EmbeddingDataset::load_from_file(&dataset)?;
            let embeddings = data.embedding_matrix()?;
            let labels = data.labels()?;
            let confidences = data.confidences_or_default()?;

            let mut classifier = registry.create(&args.kind, config)?;
            let summary = classifier.fit(embeddings.view(), labels, &confidences)?;
            classifier
                .save(&output)
                .with_context(|| format!("cannot save classifier to '{}'", output.display()))?;

            let diagnostics = classifier.diagnostics()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "kind": classifier.kind(),
                    "key_param": classifier.key_param(),
                    "summary": summary,
                    "diagnostics": diagnostics,
                }))?
            );
        }
        Command::Predict {
            model,
            dataset,
            output,
        } => {
            let classifier = registry
                .load(&model)
                .with_context(|| format!("cannot load classifier '{}'", model.display()))?;
            let data = EmbeddingDataset::load_from_file(&dataset)?;
            let records = predict_records(classifier.as_ref(), &data)?;
            let exits = records.iter().filter(|r| r.early_exit).count();
            info!(inputs = records.len(), exits, "prediction completed");

            emit_json(&serde_json::to_string_pretty(&records)?, output.as_deref())?;
        }
        Command::Evaluate {
            model,
            dataset,
            output,
        } => {
            let classifier = registry
                .load(&model)
                .with_context(|| format!("cannot load classifier '{}'", model.display()))?;
            let data = EmbeddingDataset::load_from_file(&dataset)?;
            let report = evaluate(classifier.as_ref(), &data)?;

            println!(
                "kind={}, k={}, samples={}, threshold={:.4}, exit_rate={:.3}, overall_accuracy={:.3}",
                report.kind,
                report.key_param,
                report.n_samples,
                report.threshold,
                report.exit_rate,
                report.overall_accuracy
            );
            if let Some(path) = output {
                fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                info!(path = %path.display(), "wrote evaluation report");
            }
        }
        Command::Inspect { model } => {
            let record = ClassifierRecord::load(&model)
                .with_context(|| format!("cannot read classifier '{}'", model.display()))?;
            println!("{}", serde_json::to_string_pretty(&record.metadata)?);
        }
    }
    Ok(())
}

/// Start from the config file (or defaults) and apply flag overrides.
pub fn resolve_config(args: &FitArgs) -> Result<ClassifierConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let blob = fs::read_to_string(path)
                .with_context(|| format!("cannot read config '{}'", path.display()))?;
            serde_json::from_str::<ClassifierConfig>(&blob)
                .with_context(|| format!("cannot parse config '{}'", path.display()))?
        }
        None => ClassifierConfig::default(),
    };

    if let Some(k) = args.k {
        config.kmeans.n_clusters = k;
    }
    if let Some(n_labels) = args.n_labels {
        config.n_labels = n_labels;
    }
    if let Some(seed) = args.seed {
        config.kmeans.seed = Some(seed);
    }
    if let Some(max_iter) = args.max_iter {
        config.kmeans.max_iter = max_iter;
    }
    if let Some(n_init) = args.n_init {
        config.kmeans.n_init = n_init;
    }
    if args.reject_out_of_range_labels {
        config.label_policy = LabelPolicy::Reject;
    }

    config.validate()?;
    Ok(config)
}

fn emit_json(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("cannot write '{}'", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
