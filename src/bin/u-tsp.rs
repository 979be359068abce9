use clap::{arg, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use u_tsp::kernel::KernelSource;
use u_tsp::problem::{identity_order, load_tsplib};
use u_tsp::search::{Backend, SearchConfig, SearchResult, SearchStrategy, Strategy};
use u_tsp::Result;

fn cli() -> Command {
    Command::new("u-tsp")
        .about("Improves a TSPLIB tour with randomized 2-opt local search")
        .arg_required_else_help(true)
        .arg(
            arg!(<PROBLEM> "Path to a TSPLIB file with a NODE_COORD_SECTION")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--backend [BACKEND] "sequential, host, cuda, or both (accelerator then sequential)")
                .default_value("both"),
        )
        .arg(
            arg!(--config [CONFIG] "TOML search configuration; flags override it")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--kernel [KERNEL] "Kernel source file for the accelerator backends")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--iterations [ITERATIONS] "Move draws for the sequential backend")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(arg!(--seed [SEED] "Random seed").value_parser(clap::value_parser!(u64)))
        .arg(
            arg!(--workers [WORKERS] "Parallel workers (default: one per city)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--"work-group-size" [SIZE] "Work-items per work-group")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--trials [TRIALS] "Random 2-opt trials per worker")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--"time-limit-ms" [MILLIS] "Wall-clock limit per search")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_config(matches: &clap::ArgMatches) -> Result<SearchConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => SearchConfig::load(path)?,
        None => SearchConfig::default(),
    };
    if let Some(&n) = matches.get_one::<usize>("iterations") {
        config.iterations = n;
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.seed = Some(seed);
    }
    if let Some(&n) = matches.get_one::<usize>("workers") {
        config.workers = Some(n);
    }
    if let Some(&n) = matches.get_one::<usize>("work-group-size") {
        config.work_group_size = n;
    }
    if let Some(&n) = matches.get_one::<usize>("trials") {
        config.trials_per_worker = n;
    }
    if let Some(&ms) = matches.get_one::<u64>("time-limit-ms") {
        config.time_limit = Some(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}

fn report(label: &str, result: &SearchResult) {
    println!("Running TSP ({label}, {})", result.backend);
    let order: Vec<String> = result.order.iter().map(|c| c.to_string()).collect();
    println!("Best order: {}", order.join(" "));
    println!("Total distance: {}", result.fitness);
    println!("Execution time: {} milliseconds", result.elapsed.as_millis());
    if result.cancelled {
        println!("(stopped early)");
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let problem = matches
        .get_one::<PathBuf>("PROBLEM")
        .cloned()
        .unwrap_or_default();
    let backend = matches
        .get_one::<String>("backend")
        .map(String::as_str)
        .unwrap_or("both");
    let config = build_config(matches)?;

    let cities = load_tsplib(&problem)?;
    let initial = identity_order(cities.len());
    tracing::info!(event = "problem_loaded", path = %problem.display(), cities = cities.len());

    let kernel = match matches.get_one::<PathBuf>("kernel") {
        Some(path) => KernelSource::load(path)?,
        None => KernelSource::bundled(),
    };

    let plan: Vec<Backend> = if backend == "both" {
        let accelerator = if cfg!(feature = "cuda") {
            Backend::Cuda
        } else {
            Backend::Host
        };
        vec![accelerator, Backend::Sequential]
    } else {
        vec![backend.parse()?]
    };

    for backend in plan {
        let config = config.clone().with_backend(backend);
        let strategy = Strategy::from_config(&config, kernel.clone());
        let result = strategy.search(&cities, &initial, &mut config.rng())?;
        report(backend.as_str(), &result);
        println!();
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let matches = cli().get_matches();
    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
