//! BlockKV - Load Generator
//!
//! Opens a table and drives it with random small keys and values, printing
//! periodic statistics. Useful to watch directory growth, spilling and
//! compaction under a tight memory ceiling.

use anyhow::Context;
use blockkv::{Settings, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Driver configuration
struct Config {
    /// Directory receiving spill files
    path: PathBuf,
    /// Bytes per arena
    arena_size: usize,
    /// Declared memory that triggers maintenance
    memory: u64,
    initial_depth: u32,
    maximal_depth: u32,
    /// Number of `set` operations to run
    count: u64,
    /// Print statistics every this many operations
    report_every: u64,
    seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let settings = Settings::default();

        Self {
            path: std::env::temp_dir().join("blockkv"),
            arena_size: settings.arena_size,
            memory: settings.memory_ceiling,
            initial_depth: settings.initial_depth,
            maximal_depth: settings.maximal_depth,
            count: 10_000_000,
            report_every: 1_000_000,
            seed: None,
        }
    }
}

/// Parses the value following flag `args[i]`, exiting on failure.
fn value<T: std::str::FromStr>(args: &[String], i: usize) -> T {
    let Some(raw) = args.get(i + 1) else {
        eprintln!("Error: {} requires a value", args[i]);
        process::exit(1);
    };

    raw.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}: {}", args[i], raw);
        process::exit(1);
    })
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--path" | "-d" => config.path = value(&args, i),
                "--arena-size" | "-a" => config.arena_size = value(&args, i),
                "--memory" | "-m" => config.memory = value(&args, i),
                "--initial-depth" => config.initial_depth = value(&args, i),
                "--maximal-depth" => config.maximal_depth = value(&args, i),
                "--count" | "-n" => config.count = value(&args, i),
                "--report-every" | "-r" => config.report_every = value::<u64>(&args, i).max(1),
                "--seed" | "-s" => config.seed = Some(value(&args, i)),
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("BlockKV version {}", blockkv::VERSION);
                    process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    process::exit(1);
                }
            }
            i += 2;
        }

        config
    }

    fn settings(&self) -> Settings {
        Settings::new(&self.path)
            .with_arena_size(self.arena_size)
            .with_memory_ceiling(self.memory)
            .with_depth(self.initial_depth, self.maximal_depth)
            .on_archiving(|| debug!("Archiving started"))
            .on_compacting_start(|| debug!("Compaction started"))
            .on_compacting_end(|| debug!("Compaction finished"))
    }
}

fn print_help() {
    println!(
        r#"
BlockKV - An Embedded, Memory-Bounded Key-Value Engine

USAGE:
    blockkv [OPTIONS]

OPTIONS:
    -d, --path <DIR>             Spill directory (default: $TMPDIR/blockkv)
    -a, --arena-size <BYTES>     Bytes per memory arena (default: 67108864)
    -m, --memory <BYTES>         Memory ceiling triggering maintenance (default: 2147483648)
        --initial-depth <BITS>   Initial directory depth (default: 4)
        --maximal-depth <BITS>   Maximal directory depth (default: 24)
    -n, --count <N>              Number of set operations (default: 10000000)
    -r, --report-every <N>       Statistics interval in operations (default: 1000000)
    -s, --seed <SEED>            Seed for the random load (default: random)
    -v, --version                Print version information
    -h, --help                   Print this help message

EXAMPLES:
    blockkv                                  # Ten million random writes
    blockkv -n 1000000 -m 67108864           # Small run under a 64 MiB ceiling
    RUST_LOG=blockkv=debug blockkv -n 100000 # Show growth and spill events
"#
    );
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let mut table = Table::open(config.settings())
        .with_context(|| format!("failed to open table in {}", config.path.display()))?;

    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    info!(
        path = %config.path.display(),
        arena_size = config.arena_size,
        memory = config.memory,
        count = config.count,
        seed,
        "BlockKV v{} load started",
        blockkv::VERSION
    );

    let started = Instant::now();
    let mut lap = Instant::now();
    let mut value = [0u8; 76];

    for done in 1..=config.count {
        let key: [u8; 4] = rng.gen();
        let length = rng.gen_range(32..76);
        rng.fill(&mut value[..length]);

        table
            .set(&key, &value[..length])
            .with_context(|| format!("set #{} failed", done))?;

        if done % config.report_every == 0 {
            report(&table, done, config.report_every, lap.elapsed().as_secs_f64());
            lap = Instant::now();
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let stats = table.stats();
    let memory = table.memory_info();

    info!(
        keys = stats.keys,
        sets = stats.sets,
        growths = stats.growths,
        maintenance = stats.maintenance_runs,
        promotions = stats.promotions,
        depth = table.depth(),
        capacity = table.capacity(),
        spilled = memory.spilled,
        files = memory.files,
        footprint = table.size_in_bytes(),
        seconds = %format!("{:.2}", elapsed),
        "Load finished"
    );

    Ok(())
}

/// Prints one statistics line.
fn report(table: &Table, done: u64, interval: u64, seconds: f64) {
    let memory = table.memory_info();
    let rate = if seconds > 0.0 {
        interval as f64 / seconds
    } else {
        0.0
    };

    info!(
        done,
        keys = table.size(),
        depth = table.depth(),
        level = table.level(),
        declared = memory.declared,
        used = memory.used,
        wasted = memory.wasted,
        arenas = memory.arenas,
        files = memory.files,
        ops_per_sec = rate as u64,
        "Progress"
    );
}
