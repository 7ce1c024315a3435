use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Rejected run configuration. Always fatal and always reported with usage text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("transfer count (-t) is required")]
    MissingTransfers,

    #[error("transfer count must be greater than zero")]
    ZeroTransfers,

    #[error("iteration count must be greater than zero")]
    ZeroIterations,


    #[error("native mode (-n) requires static input-feed mode (-s)")]
    NativeRequiresStatic,

    #[error("native mode (-n) requires a target triple (--native-target or TPS_BENCH_NATIVE_TARGET)")]
    MissingNativeTarget,

    #[error("inline JIT (-j) is built into the sandbox; set --sandbox-manifest or TPS_BENCH_SANDBOX_MANIFEST")]
    JitRequiresSandboxManifest,
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Workload generation failed: {0}")]
    Generate(String),

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Run {iteration} failed: {reason}")]
    Run { iteration: u32, reason: String },

    #[error("Result aggregation failed: {0}")]
    Aggregate(String),

    #[error("Profiler failed: {0}")]
    Profile(String),

    #[error("Workload file {} changed during the session", path.display())]
    WorkloadChanged { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Describe a non-successful exit for error messages.
pub fn describe_status(program: &str, status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("{program} exited with status {code}"),
        None => format!("{program} was terminated by a signal"),
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
