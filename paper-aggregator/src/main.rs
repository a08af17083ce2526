use anyhow::Context;
use clap::{Parser, ValueEnum};
use interfaces::BaselineDigestModel;
use paper_aggregator::{
    DateWindowSpec, DigestModel, DigestPreferences, PaperDigestModel, PipelineOrchestrator, PipelineResult, RunOptions,
};
use std::env;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DigestKind {
    Ranked,
    Baseline,
}

/// Fetch, filter and rank recent papers once.
#[derive(Debug, Parser)]
#[command(name = "paper-aggregator", version)]
struct Cli {
    /// JSON run configuration; defaults to arXiv plus the HF daily feed.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of ranked papers to keep.
    #[arg(long)]
    top_n: Option<i64>,

    /// Replace every source's date window with the last N days.
    #[arg(long)]
    days_back: Option<u32>,

    /// Abort outstanding work after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the full result as JSON instead of a digest.
    #[arg(long)]
    json: bool,

    #[arg(long, value_enum, default_value_t = DigestKind::Ranked)]
    digest: DigestKind,

    /// Free-text interest passed to the digest.
    #[arg(long, default_value = "")]
    interests: String,
}

fn load_options(cli: &Cli) -> anyhow::Result<RunOptions> {
    let mut options = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => RunOptions::default(),
    };

    if let Some(top_n) = cli.top_n {
        options.top_n = top_n;
    }
    if let Some(days) = cli.days_back {
        for source in &mut options.sources {
            source.filter.date_window = DateWindowSpec::last_days(days);
        }
    }
    if let Some(timeout) = cli.timeout_secs {
        options.run_timeout_seconds = Some(timeout);
    }
    if let Ok(base_url) = env::var("OLLAMA_BASE_URL") {
        options.oracle.ollama.base_url = base_url;
    }
    if let Ok(model) = env::var("OLLAMA_MODEL") {
        options.oracle.ollama.model = model;
    }
    Ok(options)
}

fn render(result: &PipelineResult, cli: &Cli) -> anyhow::Result<String> {
    if cli.json {
        return Ok(serde_json::to_string_pretty(result)?);
    }

    let preferences = DigestPreferences {
        uri: format!("run:{}", result.run_id),
        description: cli.interests.clone(),
    };
    let items = result.to_input_items();
    let output = match cli.digest {
        DigestKind::Ranked => PaperDigestModel::digest(&preferences, &items)?,
        DigestKind::Baseline => BaselineDigestModel::digest(&preferences, &items)?,
    };
    Ok(output.text)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let options = load_options(&cli)?;

    let pipeline = PipelineOrchestrator::from_options(options).context("invalid run configuration")?;
    let source_ids: Vec<String> = pipeline.source_ids().iter().map(ToString::to_string).collect();
    info!("Starting paper aggregator with sources [{}]", source_ids.join(", "));

    let result = pipeline.run().await.context("pipeline run failed")?;

    for report in &result.sources {
        if report.failed() {
            error!(
                "Source {} failed: {}",
                report.source,
                report.failure.as_deref().unwrap_or_default()
            );
        } else {
            info!(
                "Source {}: fetched {}, filtered out {}, selected {}",
                report.source, report.fetched, report.filtered_out, report.selected
            );
        }
    }
    for exclusion in result.scoring_exclusions() {
        warn!("Not ranked {}: {}", exclusion.key, exclusion.reason);
    }

    println!("{}", render(&result, &cli)?);
    Ok(())
}
