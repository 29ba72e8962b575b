//! Whisker Simulator CLI
//!
//! Record whisker contact trials against scripted obstacle scenarios.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use whisker_core::KeyframeStore;
use whisker_sim::scenarios::ScenarioId;
use whisker_sim::{synthetic_store, ScenarioResult, ScenarioRunner, SimConfig, SimExport};

/// Whisker contact trial recorder
#[derive(Parser, Debug)]
#[command(name = "whisker-sim")]
#[command(about = "Animate keyframed whiskers against obstacles and record tactile trials", long_about = None)]
struct Args {
    /// Directory holding right_whiskers_frame_{i}.csv / left_whiskers_frame_{i}.csv
    /// (synthetic whiskers when omitted)
    #[arg(short = 'D', long)]
    data_dir: Option<PathBuf>,

    /// Whisker name list (default: <data-dir>/whisker_names.txt)
    #[arg(long)]
    names: Option<PathBuf>,

    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keyframes per whisking cycle
    #[arg(long)]
    frame_count: Option<usize>,

    /// Sampled frames per trial
    #[arg(long)]
    frame_cap: Option<u32>,

    /// Master seed (0 = random from time)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Scenario to run (empty, pole, wall, clutter, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Trials per scenario
    #[arg(short, long, default_value = "1")]
    trials: usize,

    /// Root directory for trial output
    #[arg(short, long, default_value = "trials")]
    out: PathBuf,

    /// Hold whiskers at the resting frame instead of whisking
    #[arg(long)]
    no_animate: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export all scenario results to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let mut config = match &args.config {
        Some(path) => SimConfig::load(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }),
        None => SimConfig::default(),
    };
    if let Some(frame_count) = args.frame_count {
        config.frame_count = frame_count;
    }
    if let Some(frame_cap) = args.frame_cap {
        config.frame_cap = frame_cap;
    }
    if args.no_animate {
        config.animate = false;
    }

    // Determine base seed
    config.seed = match args.seed.unwrap_or(config.seed) {
        0 => std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default(),
        seed => seed,
    };

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: empty, pole, wall, clutter, all");
            std::process::exit(1);
        })]
    };

    if !args.json {
        info!("Whisker Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let store = match &args.data_dir {
        Some(dir) => {
            let names = args.names.clone().unwrap_or_else(|| dir.join("whisker_names.txt"));
            KeyframeStore::load(dir, &names, config.frame_count)
        }
        None => {
            info!("No data directory given, using synthetic whiskers");
            synthetic_store(config.frame_count)
        }
    };
    let whisker_count = store.whisker_ids(config.rig.left_index_offset).len();
    if whisker_count == 0 {
        warn!("No whiskers loaded; trials will record zero lines");
    }

    let runner = ScenarioRunner::new(config.clone(), Arc::new(store), &args.out).with_trials(args.trials);
    let mut export = SimExport::new(runner.run_id().to_string(), &config, whisker_count);

    for scenario in &scenarios {
        let result = runner.run(*scenario);

        if !args.json {
            report(&result);
        }
        export.add_result(result);
    }

    let total = export.results.len();
    let failed_count = export.failed();

    if let Some(path) = &args.export {
        match export.write_to_file(path) {
            Ok(()) => info!("Exported {} results to {}", total, path.display()),
            Err(e) => error!("Failed to write export: {:?}", e),
        }
    }

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "run_id": export.run_id,
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": export.results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "trials": r.trials,
                    "contact_frames": r.metrics.contact_frames,
                    "mean_contact_s": r.metrics.mean_contact_s,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenarios passed (output in {})", total, args.out.display());
        } else {
            error!("❌ {}/{} scenarios failed!", failed_count, total);
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED: {} trials, {} contact frames",
            result.scenario.name(),
            result.seed,
            result.trials,
            result.metrics.contact_frames
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
