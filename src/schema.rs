use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::build::ExecutableArtifact;
use crate::config::RunConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    /// RFC 3339, second precision.
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

impl RunMeta {
    pub fn current() -> Self {
        Self {
            schema_version: 1,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            git_sha: git_sha(),
        }
    }
}

/// The generated inbox for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadFile {
    pub path: PathBuf,
    pub transfers: u64,
    /// Hex SHA-256 of the file right after generation.
    pub sha256: String,
}

/// Outcome of one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// 1-based.
    pub iteration: u32,
    pub log: PathBuf,
    pub profile: Option<PathBuf>,
}

/// What the results collector is handed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub inbox: PathBuf,
    pub expected_transfers: u64,
    /// Ordered by iteration.
    pub logs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub run: RunMeta,
    pub config: RunConfig,
    pub workdir: PathBuf,
    pub workload: WorkloadFile,
    pub artifact: ExecutableArtifact,
    pub runs: Vec<RunRecord>,
    pub report: AggregateReport,
    pub metrics_file: Option<PathBuf>,
    pub profile_file: Option<PathBuf>,
}

/// Commit of the checkout being benchmarked, when CI exports one.
fn git_sha() -> Option<String> {
    ["GIT_SHA", "GITHUB_SHA"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|sha| !sha.is_empty()))
        .map(|sha| sha.chars().take(12).collect())
}
