//! Fleet power simulator entry point: CLI wiring around the replication runner.

use std::path::Path;
use std::process;

use fleet_power_sim::config::ScenarioConfig;
use fleet_power_sim::io::export::{export_histograms_csv, export_stats_csv};
use fleet_power_sim::runner::{build_fleet, run_replications};
use fleet_power_sim::telemetry::init_logging;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    horizon_override: Option<f64>,
    runs_override: Option<usize>,
    stats_out: Option<String>,
    histograms_out: Option<String>,
    debug: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("fleet-power-sim: power management simulator for computer fleets");
    eprintln!();
    eprintln!("Usage: fleet-power-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load scenario from TOML config file");
    eprintln!("  --preset <name>          Use a built-in preset (baseline, office_hours, aggressive)");
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --horizon <secs>         Override simulated seconds per run");
    eprintln!("  --runs <n>               Run exactly n replications");
    eprintln!("  --stats-out <path>       Export per-metric summary to CSV");
    eprintln!("  --histograms-out <path>  Export histogram bins to CSV");
    eprintln!("  --debug                  Log at debug level");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server after simulation");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the baseline preset is used.");
}

/// Returns the value following flag `args[*i]`, exiting if it is missing.
fn value_of<'a>(args: &'a [String], i: &mut usize, what: &str) -> &'a str {
    let flag = &args[*i];
    *i += 1;
    match args.get(*i) {
        Some(v) => v,
        None => {
            eprintln!("error: {flag} requires {what}");
            process::exit(1);
        }
    }
}

/// Parses `raw` or exits with a message naming the flag.
fn parse_or_exit<T: std::str::FromStr>(flag: &str, raw: &str, kind: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{raw}\" is not a valid {kind}");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        seed_override: None,
        horizon_override: None,
        runs_override: None,
        stats_out: None,
        histograms_out: None,
        debug: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                cli.config_path = Some(value_of(&args, &mut i, "a path argument").to_string());
            }
            "--preset" => {
                cli.preset = Some(value_of(&args, &mut i, "a name argument").to_string());
            }
            "--seed" => {
                let raw = value_of(&args, &mut i, "a u64 argument");
                cli.seed_override = Some(parse_or_exit("--seed", raw, "u64"));
            }
            "--horizon" => {
                let raw = value_of(&args, &mut i, "a number of seconds");
                cli.horizon_override = Some(parse_or_exit("--horizon", raw, "number"));
            }
            "--runs" => {
                let raw = value_of(&args, &mut i, "a count argument");
                cli.runs_override = Some(parse_or_exit("--runs", raw, "count"));
            }
            "--stats-out" => {
                cli.stats_out = Some(value_of(&args, &mut i, "a path argument").to_string());
            }
            "--histograms-out" => {
                cli.histograms_out = Some(value_of(&args, &mut i, "a path argument").to_string());
            }
            "--debug" => {
                cli.debug = true;
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                let raw = value_of(&args, &mut i, "a u16 argument");
                cli.port = parse_or_exit("--port", raw, "u16");
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    let cli = parse_args();
    init_logging(if cli.debug { "debug" } else { "info" });

    // --config takes priority, then --preset, then baseline
    let mut scenario = if let Some(ref path) = cli.config_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::baseline()
    };

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }
    if let Some(horizon) = cli.horizon_override {
        scenario.simulation.horizon_secs = horizon;
    }
    if let Some(runs) = cli.runs_override {
        scenario.simulation.min_runs = runs;
        scenario.simulation.max_runs = runs;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let summary = match build_fleet(&scenario).and_then(|fleet| run_replications(&scenario, &fleet)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    println!("{summary}");

    let snapshot = summary.snapshot();
    if let Some(ref path) = cli.stats_out {
        if let Err(e) = export_stats_csv(&snapshot, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Stats written to {path}");
    }
    if let Some(ref path) = cli.histograms_out {
        if let Err(e) = export_histograms_csv(&snapshot, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Histograms written to {path}");
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(fleet_power_sim::api::AppState::new(scenario, summary));
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        if let Err(e) = rt.block_on(fleet_power_sim::api::serve(state, addr)) {
            eprintln!("error: API server on {addr}: {e}");
            process::exit(1);
        }
    }
}
