use fdpool_core::config::FdPoolConfig;
use fdpool_core::{
    AmortizedFdCache, FilterMode, OpenScheduler, ProviderRegistry, RandomizedOpenScheduler,
    SelectError, SharedFdSlot, apply_filter, builtin_registry, filter_usage,
};

use clap::Parser;
use log::{info, warn};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::collections::HashSet;
use std::io::Write;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Only use these fd providers (comma separated).
    #[clap(long, value_name = "LIST", conflicts_with = "disable_fds")]
    enable_fds: Option<String>,
    /// Never use these fd providers (comma separated).
    #[clap(long, value_name = "LIST")]
    disable_fds: Option<String>,
    /// Print the known fd providers and exit.
    #[clap(long)]
    list_fds: bool,
    #[clap(short = 'C', long)]
    children: Option<u32>,
    #[clap(short, long)]
    seed: Option<u64>,
    #[clap(short, long)]
    iterations: Option<u64>,
}

impl Cli {
    fn filter(&self) -> Option<(FilterMode, String)> {
        match (&self.enable_fds, &self.disable_fds) {
            (Some(list), _) => Some((FilterMode::Enable, list.clone())),
            (None, Some(list)) => Some((FilterMode::Disable, list.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Default)]
struct WorkerStats {
    handed_out: u64,
    no_provider: u64,
    distinct: HashSet<RawFd>,
}

fn run_worker(
    id: u32,
    registry: &mut ProviderRegistry,
    cache: &mut AmortizedFdCache,
    seed: u64,
    iterations: u64,
) -> WorkerStats {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(u64::from(id) + 1));
    let mut stats = WorkerStats::default();

    for _ in 0..iterations {
        match cache.get_reused_fd(registry, &mut rng) {
            Ok(fd) => {
                stats.handed_out += 1;
                stats.distinct.insert(fd);
            }
            Err(SelectError::NoEligibleProviders) => stats.no_provider += 1,
        }
    }

    info!(
        "worker {}: {} fds handed out, {} distinct, {} calls without a provider",
        id,
        stats.handed_out,
        stats.distinct.len(),
        stats.no_provider
    );
    stats
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            FdPoolConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("fdpool.toml");
            if default_config_path.exists() {
                info!("No config file specified via CLI, loading default: {default_config_path:?}");
                FdPoolConfig::load_from_file(&default_config_path)?
            } else {
                FdPoolConfig::default()
            }
        }
    };

    if let Some(children) = cli.children {
        config.workers.children = children;
    }
    if let Some(seed) = cli.seed {
        config.workers.seed = seed;
    }
    if let Some(iterations) = cli.iterations {
        config.workers.iterations = iterations;
    }

    let mut registry = builtin_registry()?;

    if cli.list_fds {
        print!("{}", filter_usage(&registry));
        return Ok(());
    }

    // A filter on the command line replaces whatever the config file selected.
    if let Some((mode, list)) = cli.filter().or_else(|| config.providers.filter()) {
        if let Err(e) = apply_filter(&mut registry, mode, &list) {
            eprintln!("{e}");
            eprint!("{}", filter_usage(&registry));
            std::process::exit(libc::EXIT_FAILURE);
        }
    }

    let workers = config.workers.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(workers.seed);
    let summary = RandomizedOpenScheduler::new().open_all(&mut registry, &mut rng);
    if summary.enabled == 0 {
        warn!("No fd providers could be opened; every request will come back empty.");
    }

    let mut cache = AmortizedFdCache::new(SharedFdSlot::new()?, workers.children);
    let start_time = Instant::now();

    if workers.children == 0 {
        run_worker(0, &mut registry, &mut cache, workers.seed, workers.iterations);
    } else {
        std::io::stdout().flush()?;
        let mut pids = Vec::with_capacity(workers.children as usize);
        for id in 0..workers.children {
            let pid = unsafe { libc::fork() };
            if pid < 0 {
                return Err(anyhow::anyhow!(
                    "Failed to fork worker {}: {}",
                    id,
                    std::io::Error::last_os_error()
                ));
            }
            if pid == 0 {
                run_worker(id, &mut registry, &mut cache, workers.seed, workers.iterations);
                std::process::exit(libc::EXIT_SUCCESS);
            }
            pids.push(pid);
        }

        let mut failed = 0;
        for pid in pids {
            let mut status = 0;
            let waited = unsafe { libc::waitpid(pid, &mut status, 0) };
            if waited != pid || !libc::WIFEXITED(status) || libc::WEXITSTATUS(status) != 0 {
                warn!("worker pid {pid} did not exit cleanly (status {status:#x})");
                failed += 1;
            }
        }
        if failed > 0 {
            anyhow::bail!("{failed} of {} workers failed", workers.children);
        }
    }

    info!(
        "Run finished in {:.2?}; shared slot ended at {:?}.",
        start_time.elapsed(),
        cache.slot()
    );
    Ok(())
}
