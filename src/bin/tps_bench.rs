use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use kernel_tps_bench::config::{RunArgs, RunConfig};
use kernel_tps_bench::error::{BenchError, Result};
use kernel_tps_bench::harness::{Session, SessionLayout, Tools};
use kernel_tps_bench::tools::{
    self, CargoBuilder, InboxBench, NoProfiler, ProcessExecutor, Profile, Samply,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cfg: &RunConfig, out: Option<&Path>) -> Result<()> {
    let layout = SessionLayout::create(cfg.workdir.as_deref())?;

    let inbox_bench = InboxBench::new(cfg.tools.inbox_bench.clone());
    let samply = Samply {
        binary: cfg.tools.profiler.clone(),
    };
    let profiler: &dyn Profile = if cfg.profile { &samply } else { &NoProfiler };
    let tools = Tools {
        generator: &inbox_bench,
        builder: &CargoBuilder,
        executor: &ProcessExecutor,
        collector: &inbox_bench,
        profiler,
    };

    let summary = Session::new(cfg, layout, tools).run()?;

    eprintln!("\nSession directory: {}", summary.workdir.display());
    if let Some(metrics) = &summary.metrics_file {
        eprintln!("Block metrics: {}", metrics.display());
    }

    if let Some(out) = out {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| BenchError::Io(std::io::Error::other(e)))?;
        fs::write(out, json)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    let mut args = match RunArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    if args.inbox_bench.is_none() {
        args.inbox_bench = tools::sibling_binary("inbox-bench");
    }

    let cfg = match RunConfig::resolve(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}\n\n{}", RunArgs::command().render_usage());
            return ExitCode::from(1);
        }
    };

    match run(&cfg, args.out.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
