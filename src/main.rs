use anyhow::Result;
use clap::Parser;
use deep_research::batch::ProgressTracker;
use deep_research::config::Config;
use deep_research::metrics::SessionMetrics;
use deep_research::research::ResearchPipeline;
use deep_research::telemetry::{init_telemetry, shutdown_telemetry};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Deep Research - concurrent web research with batched LLM summarization
#[derive(Parser, Debug)]
#[command(name = "deep_research")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Research query
    #[arg(value_name = "QUERY", required_unless_present = "init")]
    query: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of web results to retrieve (overrides config file)
    #[arg(short = 'n', long, value_name = "N")]
    max_results: Option<usize>,

    /// Summarization tasks dispatched together (overrides config file)
    #[arg(short, long, value_name = "N")]
    batch_size: Option<usize>,

    /// Model identifier (overrides config file)
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Run a deeper pass with the drill-down result count
    #[arg(long)]
    drill_down: bool,

    /// Aggregate the summaries into a single answer
    #[arg(short, long)]
    answer: bool,

    /// Emit results as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Generate a template configuration file and exit
    #[arg(long, value_name = "FILE")]
    init: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --init flag: generate template config and exit
    if let Some(init_path) = args.init {
        let path = if init_path.as_os_str().is_empty() {
            PathBuf::from("deep_research.toml")
        } else {
            init_path
        };

        if path.exists() {
            eprintln!("Error: Config file already exists: {}", path.display());
            eprintln!("Remove it first or choose a different path.");
            std::process::exit(1);
        }

        Config::write_template(&path)?;
        println!("Generated config file: {}", path.display());
        println!("\nEdit the file, export your API key, then run a query with:");
        println!("  deep_research --config {} \"your query\"", path.display());
        return Ok(());
    }

    let config = load_config(&args)?;
    init_telemetry(&config.telemetry.clone().with_env_overrides(), args.verbose)?;

    info!(
        max_results = config.search.max_results,
        batch_size = config.engine.batch_size,
        model = %config.llm.model,
        "Configuration loaded"
    );

    let query = args.query.as_deref().unwrap_or_default();

    let metrics = Arc::new(SessionMetrics::new());
    let pipeline = ResearchPipeline::new(&config, metrics.clone())?;

    // Progress bar fed by the tracker; length follows the sent counter so
    // the bar grows if later rounds dispatch more work.
    let tracker = ProgressTracker::new();
    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓░"),
    );
    {
        let bar = bar.clone();
        tracker.register(move |snapshot| {
            if bar.is_hidden() && snapshot.sent > 0 {
                bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            }
            bar.set_length(snapshot.sent as u64);
            bar.set_position(snapshot.resolved() as u64);
            if snapshot.failed > 0 {
                bar.set_message(format!("{} failed", snapshot.failed));
            }
        });
    }

    let results = pipeline.run(query, args.drill_down, Some(&tracker)).await?;
    bar.finish_and_clear();

    let answer = if args.answer && !results.is_empty() {
        Some(pipeline.answer(query, &results).await)
    } else {
        None
    };

    if args.json {
        let output = serde_json::json!({
            "query": query,
            "results": results,
            "answer": answer,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for result in &results {
            println!("{}. {}", result.index, result.title);
            println!("   {}", result.url);
            println!("   {}\n", result.summary);
        }
        if let Some(ref answer) = answer {
            println!("=== Answer ===\n{answer}\n");
        }
    }

    let snapshot = tracker.snapshot();
    info!(
        results = results.len(),
        sent = snapshot.sent,
        completed = snapshot.completed,
        failed = snapshot.failed,
        "Search complete"
    );

    for line in metrics.report().render_text().lines() {
        info!("{line}");
    }

    shutdown_telemetry();
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let base_config = if let Some(ref config_path) = args.config {
        // Explicit config file specified
        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found: {}\nUse --init {} to generate a template.",
                config_path.display(),
                config_path.display()
            );
        }
        Config::from_file(config_path)?
    } else {
        // Try default locations
        match Config::from_default_locations()? {
            Some((config, _path)) => config,
            None => Config::default(),
        }
    };

    // Apply CLI overrides
    Ok(base_config.with_overrides(args.max_results, args.batch_size, args.model.clone()))
}
