use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod build;
pub mod config;
pub mod error;
pub mod harness;
pub mod inbox;
pub mod results;
pub mod schema;
pub mod tools;

/// Default target-address parameter handed to every run.
pub const DEFAULT_ROLLUP_ADDRESS: &str = "sr1UNDWPUYVeomgG15wn5jSw689EJ4RNnVQa";

/// Where the workload executes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Kernel runs inside the RISC-V sandbox.
    #[default]
    Emulated,
    /// Kernel compiled for the host and run directly.
    Native,
}

/// How the workload reaches the kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputFeed {
    /// Inbox file is read at run time.
    #[default]
    Streamed,
    /// Inbox contents are embedded into the built kernel.
    Static,
}

/// Block-metrics instrumentation variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricsMode {
    /// Record metrics for every block.
    All,
    /// Record metrics only for blocks containing instructions the JIT cannot compile.
    JitUnsupported,
}

impl MetricsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsMode::All => "all",
            MetricsMode::JitUnsupported => "jit-unsupported",
        }
    }
}

impl fmt::Display for MetricsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
