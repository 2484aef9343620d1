//! ThreatSieve CLI Client
//!
//! Command-line interface for querying a running server and for loading
//! indicator feeds into a data directory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use threatsieve::network::Client;
use threatsieve::{
    IndicatorRecord, LookupMode, RebuildOutcome, Resolution, Result, SieveError, TableStore,
};

/// ThreatSieve CLI
#[derive(Parser, Debug)]
#[command(name = "threatsieve-cli")]
#[command(about = "CLI for the ThreatSieve indicator lookup service")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up an indicator
    Lookup {
        /// The indicator value (IP, domain, ...)
        value: String,

        /// Skip the membership index and always ask the store
        #[arg(long)]
        direct: bool,
    },

    /// Rebuild the server's membership index
    Rebuild {
        /// Expected number of indicators
        #[arg(short = 'n', long, default_value = "2000000")]
        expected_count: u64,

        /// Target false-positive rate
        #[arg(short = 'p', long, default_value = "0.01")]
        false_positive_rate: f64,
    },

    /// Show resolver counters
    Stats,

    /// Ping the server
    Ping,

    /// Import a JSON-lines feed into a data directory (offline)
    Import {
        /// File with one indicator record per line
        file: PathBuf,

        /// Data directory of the store
        #[arg(short, long, default_value = "./threatsieve_data")]
        data_dir: PathBuf,
    },
}

fn main() {
    let args = Args::parse();

    let result = match args.command {
        Commands::Import { file, data_dir } => import(&file, &data_dir),
        command => connect(&args.server, args.timeout_ms).and_then(|mut client| run(&mut client, command)),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn connect(addr: &str, timeout_ms: u64) -> Result<Client> {
    let mut client = Client::connect(addr)?;
    if timeout_ms > 0 {
        client.set_timeout(Some(Duration::from_millis(timeout_ms)))?;
    }
    Ok(client)
}

fn run(client: &mut Client, command: Commands) -> Result<()> {
    match command {
        Commands::Lookup { value, direct } => {
            let mode = if direct {
                LookupMode::Direct
            } else {
                LookupMode::Accelerated
            };
            match client.resolve(mode, &value)? {
                Resolution::Found(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                Resolution::NotFoundConfirmed => println!("(not found)"),
                Resolution::NotFoundFiltered => println!("(not found, filtered)"),
            }
        }
        Commands::Rebuild {
            expected_count,
            false_positive_rate,
        } => match client.rebuild(expected_count, false_positive_rate)? {
            RebuildOutcome::Rebuilt(report) => {
                println!(
                    "rebuilt generation {}: {} keys, {} skipped, m={} k={} in {:?}",
                    report.generation,
                    report.keys_inserted,
                    report.rows_skipped,
                    report.size_bits,
                    report.hash_count,
                    report.elapsed
                );
            }
            RebuildOutcome::AlreadyInProgress => println!("rebuild already in progress"),
        },
        Commands::Stats => {
            let stats = client.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
        Commands::Import { .. } => {
            return Err(SieveError::Config("import does not use a server".to_string()));
        }
    }
    Ok(())
}

fn import(file: &Path, data_dir: &Path) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let mut records = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: IndicatorRecord = serde_json::from_str(&line).map_err(|e| {
            SieveError::Serialization(format!("line {}: {}", n + 1, e))
        })?;
        records.push(record);
    }

    let store = TableStore::open(data_dir, 1, 1)?;
    let meta = store.import(records)?;
    println!(
        "imported {} indicators into {}",
        meta.entry_count,
        meta.path.display()
    );
    Ok(())
}
