use autocalibration::algorithms::AutocalibrationSolver;
use autocalibration::api::OutputFormat;
use autocalibration::processing::RangingRecords;
use autocalibration::utils::ConfigurationManager;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: autocalibrate <config.json> <data_dir> [--samples N] \
[--mode per-sample|aggregated|bootstrap] [--draws N] [--seed S] [--perturb M] [--align] \
[--format text|json|csv]";

/// How the logged readings are turned into solves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolveMode {
    PerSample,
    Aggregated,
    Bootstrap,
}

impl std::str::FromStr for SolveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-sample" => Ok(SolveMode::PerSample),
            "aggregated" => Ok(SolveMode::Aggregated),
            "bootstrap" => Ok(SolveMode::Bootstrap),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    config_path: PathBuf,
    data_dir: PathBuf,
    samples: Option<usize>,
    mode: SolveMode,
    draws: usize,
    seed: Option<u64>,
    perturb: Option<f64>,
    align: bool,
    format: OutputFormat,
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut positional = Vec::new();
    let mut options = CliOptions {
        config_path: PathBuf::new(),
        data_dir: PathBuf::new(),
        samples: None,
        mode: SolveMode::PerSample,
        draws: 100,
        seed: None,
        perturb: None,
        align: false,
        format: OutputFormat::Text,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} needs a value", name))
        };
        let flag = arg.as_str();
        match flag {
            "--samples" => {
                let v = value(flag)?;
                options.samples = Some(v.parse().map_err(|e| format!("--samples '{}': {}", v, e))?);
            }
            "--mode" => options.mode = value(flag)?.parse()?,
            "--draws" => {
                let v = value(flag)?;
                options.draws = v.parse().map_err(|e| format!("--draws '{}': {}", v, e))?;
            }
            "--seed" => {
                let v = value(flag)?;
                options.seed = Some(v.parse().map_err(|e| format!("--seed '{}': {}", v, e))?);
            }
            "--perturb" => {
                let v = value(flag)?;
                options.perturb = Some(v.parse().map_err(|e| format!("--perturb '{}': {}", v, e))?);
            }
            "--align" => options.align = true,
            "--format" => options.format = value(flag)?.parse()?,
            _ if flag.starts_with("--") => return Err(format!("unknown option '{}'", flag)),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    if positional.len() != 2 {
        return Err("expected <config.json> and <data_dir>".to_string());
    }
    options.data_dir = positional.pop().unwrap_or_default();
    options.config_path = positional.pop().unwrap_or_default();
    Ok(options)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", USAGE);
            return Err(e.into());
        }
    };

    init_logging();

    let manager = ConfigurationManager::from_file(&options.config_path)?;
    let anchor_ids = manager.anchor_ids();
    info!(
        config = %options.config_path.display(),
        anchors = anchor_ids.len(),
        fixed = manager.anchors().iter().filter(|a| a.fixed).count(),
        "loaded configuration"
    );

    let mut records = RangingRecords::load_dir(&options.data_dir, &anchor_ids)?;
    if let Some(samples) = options.samples {
        records.resize(samples);
    }

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut solver = AutocalibrationSolver::new(manager.anchors(), manager.solver_config().clone());
    if let Some(magnitude) = options.perturb {
        solver.perturb_initial_guess(magnitude, &mut rng);
    }

    let result = match options.mode {
        SolveMode::PerSample => solver.solve_records(&records)?,
        SolveMode::Aggregated => solver.solve_aggregated(&records)?,
        SolveMode::Bootstrap => solver.solve_bootstrap(&records, options.draws, &mut rng)?,
    };

    let report = if options.align {
        result.aligned_report()
    } else {
        result.report()
    };
    print!("{}", options.format.render(&report)?);

    Ok(())
}
