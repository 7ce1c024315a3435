//! Run configuration: command-line flags in, validated [`RunConfig`] out.
//!
//! Resolution is pure. Nothing here touches the filesystem or spawns a process,
//! so a rejected configuration never leaves side effects behind.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;

use crate::error::ConfigError;
use crate::{ExecutionMode, InputFeed, MetricsMode, DEFAULT_ROLLUP_ADDRESS};

/// Environment variable overriding the session working directory.
pub const WORKDIR_ENV: &str = "TPS_BENCH_DIR";

#[derive(Parser, Debug, Clone)]
#[command(name = "tps-bench")]
#[command(about = "Throughput benchmark for rollup kernels (emulated or native)")]
#[command(version)]
pub struct RunArgs {
    /// Number of transfers in the generated workload (required).
    #[arg(short = 't', value_name = "TRANSFERS")]
    pub transfers: Option<u64>,

    /// Number of times the kernel is run.
    #[arg(short = 'i', value_name = "ITERATIONS", default_value_t = 1)]
    pub iterations: u32,

    /// Embed the inbox into the kernel instead of streaming it at run time.
    #[arg(short = 's')]
    pub static_inbox: bool,

    /// Wrap every run in the sampling profiler. Only the last run's profile is kept.
    #[arg(short = 'p')]
    pub profile: bool,

    /// Build and run the kernel natively (requires -s).
    #[arg(short = 'n')]
    pub native: bool,

    /// Enable the inline JIT in the sandbox.
    #[arg(short = 'j')]
    pub jit: bool,

    /// Collect block metrics.
    #[arg(short = 'm', value_name = "MODE", value_enum)]
    pub metrics: Option<MetricsMode>,

    /// Session working directory. A fresh temporary directory is used if unset.
    #[arg(long, env = WORKDIR_ENV, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Target-address parameter passed to every run.
    #[arg(long, default_value = DEFAULT_ROLLUP_ADDRESS)]
    pub address: String,

    /// Target triple used for native builds.
    #[arg(long, env = "TPS_BENCH_NATIVE_TARGET", value_name = "TRIPLE")]
    pub native_target: Option<String>,

    /// RISC-V sandbox binary.
    #[arg(long, env = "TPS_BENCH_SANDBOX", default_value = "riscv-sandbox")]
    pub sandbox: PathBuf,

    /// Sandbox manifest; when set the sandbox is rebuilt with the session's features.
    #[arg(long, env = "TPS_BENCH_SANDBOX_MANIFEST", value_name = "FILE")]
    pub sandbox_manifest: Option<PathBuf>,

    /// Kernel manifest.
    #[arg(long, env = "TPS_BENCH_KERNEL_MANIFEST", default_value = "kernel/Cargo.toml")]
    pub kernel_manifest: PathBuf,

    /// Kernel binary name produced by the kernel manifest.
    #[arg(long, default_value = "revm-kernel")]
    pub kernel_bin: String,

    /// Cargo target directory. Defaults to `target/` next to the kernel manifest.
    #[arg(long, value_name = "DIR")]
    pub target_dir: Option<PathBuf>,

    /// Workload generator and results collector binary.
    #[arg(long, env = "TPS_BENCH_INBOX_BENCH", value_name = "FILE")]
    pub inbox_bench: Option<PathBuf>,

    /// Sampling profiler binary.
    #[arg(long, env = "TPS_BENCH_PROFILER", default_value = "samply")]
    pub profiler: PathBuf,

    /// Where to write the JSON session summary.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

/// Locations of the external collaborators.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ToolPaths {
    pub sandbox: PathBuf,
    pub sandbox_manifest: Option<PathBuf>,
    pub kernel_manifest: PathBuf,
    pub kernel_bin: String,
    pub target_dir: PathBuf,
    pub inbox_bench: PathBuf,
    pub profiler: PathBuf,
}

/// Immutable parameters for one session.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RunConfig {
    pub transfers: u64,
    pub iterations: u32,
    pub execution: ExecutionMode,
    pub input_feed: InputFeed,
    pub profile: bool,
    pub jit: bool,
    pub metrics: Option<MetricsMode>,
    pub address: String,
    pub native_target: Option<String>,
    pub workdir: Option<PathBuf>,
    pub tools: ToolPaths,
}

impl RunConfig {
    /// Validate raw flags.
    pub fn resolve(args: &RunArgs) -> Result<Self, ConfigError> {
        let transfers = match args.transfers {
            None => return Err(ConfigError::MissingTransfers),
            Some(0) => return Err(ConfigError::ZeroTransfers),
            Some(t) => t,
        };
        if args.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }

        let input_feed = if args.static_inbox {
            InputFeed::Static
        } else {
            InputFeed::Streamed
        };
        let execution = if args.native {
            ExecutionMode::Native
        } else {
            ExecutionMode::Emulated
        };

        if execution == ExecutionMode::Native {
            if input_feed != InputFeed::Static {
                return Err(ConfigError::NativeRequiresStatic);
            }
            if args.native_target.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingNativeTarget);
            }
        } else if args.jit && args.sandbox_manifest.is_none() {
            return Err(ConfigError::JitRequiresSandboxManifest);
        }

        let target_dir = args
            .target_dir
            .clone()
            .unwrap_or_else(|| default_target_dir(&args.kernel_manifest));

        Ok(Self {
            transfers,
            iterations: args.iterations,
            execution,
            input_feed,
            profile: args.profile,
            jit: args.jit,
            metrics: args.metrics,
            address: args.address.clone(),
            native_target: args.native_target.clone().filter(|_| args.native),
            workdir: args.workdir.clone(),
            tools: ToolPaths {
                sandbox: args.sandbox.clone(),
                sandbox_manifest: args.sandbox_manifest.clone(),
                kernel_manifest: args.kernel_manifest.clone(),
                kernel_bin: args.kernel_bin.clone(),
                target_dir,
                inbox_bench: args
                    .inbox_bench
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("inbox-bench")),
                profiler: args.profiler.clone(),
            },
        })
    }

    pub fn is_static(&self) -> bool {
        self.input_feed == InputFeed::Static
    }

    pub fn is_native(&self) -> bool {
        self.execution == ExecutionMode::Native
    }
}

fn default_target_dir(manifest: &Path) -> PathBuf {
    match manifest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("target"),
        _ => PathBuf::from("target"),
    }
}
