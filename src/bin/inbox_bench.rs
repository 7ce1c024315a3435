use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use kernel_tps_bench::{inbox, results, DEFAULT_ROLLUP_ADDRESS};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an inbox of ERC-20 style transfers.
    Generate {
        /// Output inbox file.
        #[arg(long, value_name = "FILE", default_value = "inbox.json")]
        inbox_file: PathBuf,

        /// Number of transfers.
        #[arg(long)]
        transfers: u64,

        /// Rollup address the messages target.
        #[arg(long, default_value = DEFAULT_ROLLUP_ADDRESS)]
        address: String,
    },

    /// Report throughput from run logs.
    Results {
        /// Inbox the runs consumed.
        #[arg(long, value_name = "FILE")]
        inbox: PathBuf,

        #[arg(long)]
        expected_transfers: u64,

        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Run logs, in iteration order.
        #[arg(value_name = "LOG", num_args = 1.., required = true)]
        logs: Vec<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "inbox-bench")]
#[command(about = "Inbox generation and results reporting for TPS benchmarks")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Generate {
            inbox_file,
            transfers,
            address,
        } => {
            ensure!(transfers > 0, "--transfers must be greater than zero");
            let start = std::time::Instant::now();
            inbox::handle_generate(&address, &inbox_file, transfers)
                .with_context(|| format!("writing {}", inbox_file.display()))?;
            info!(
                transfers,
                accounts = inbox::accounts_for_transfers(transfers),
                inbox = %inbox_file.display(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "inbox generated"
            );
        }
        Command::Results {
            inbox,
            expected_transfers,
            json,
            logs,
        } => {
            let report = results::handle_results(&inbox, &logs, expected_transfers)
                .context("collecting results")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
    }
    Ok(())
}
