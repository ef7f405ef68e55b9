use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pthat_combine::pipeline::{run, RunOptions, UNIT_WEIGHT_TOLERANCE};

/// Scale pT-hat binned histogram containers, sum the selected histogram and
/// merge everything into one container plus a comparison plot.
#[derive(Parser)]
#[command(name = "pthat-combine")]
#[command(version)]
struct Cli {
    /// Path to the configuration JSON file
    #[arg(short, long, default_value = "pthat_add_config.json")]
    config: PathBuf,

    /// Histogram to draw (full path or final name). Defaults to the first one found.
    #[arg(long)]
    histogram: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    debug: bool,

    /// Directory holding the containers listed in the config. Defaults to the config's directory.
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory receiving the combined outputs. Defaults to the config's directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output container file name; plot and table reuse its stem
    #[arg(long, default_value = "combined.hcf")]
    output_name: String,

    /// Weights within this tolerance of 1 skip the scaled copy
    #[arg(long, default_value_t = UNIT_WEIGHT_TOLERANCE)]
    unit_weight_tolerance: f64,

    /// Skip the PNG plot and CSV table
    #[arg(long)]
    no_plot: bool,

    /// Delegate the merge to an external program run as `<PROGRAM> -f <output> <inputs...>`
    #[arg(long, value_name = "PROGRAM")]
    merge_tool: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let opts = RunOptions {
        config: cli.config,
        histogram: cli.histogram,
        input_dir: cli.input_dir.map(expand_home),
        output_dir: cli.output_dir.map(expand_home),
        output_name: cli.output_name,
        unit_weight_tolerance: cli.unit_weight_tolerance,
        plot: !cli.no_plot,
        merge_tool: cli.merge_tool,
    };

    match run(&opts) {
        Ok(summary) => {
            println!("combined: {}", summary.combined.display());
            if let Some(plot) = &summary.plot {
                println!("plot:     {}", plot.display());
            }
            if let Some(table) = &summary.table {
                println!("table:    {}", table.display());
            }
            println!(
                "histogram '{}' from {} bins ({} containers merged)",
                summary.histogram_path, summary.contributing_bins, summary.merged_inputs
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `~/x` → `$HOME/x`.
fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path,
    }
}
