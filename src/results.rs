//! Throughput results from kernel run logs.
//!
//! A run log interleaves two kinds of lines:
//! - kernel messages, one JSON `LogType` value per line (`"Deploy"`,
//!   `{"Execute":"0x.."}`, `{"Error":".."}`, ...);
//! - the runner's timing line, `Run took <value><unit>` with unit `s`, `ms`,
//!   `us` or `ns`. When several are present the last one wins.
//!
//! Anything else is ignored.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::inbox::{accounts_for_transfers, Inbox};

const TIMING_PREFIX: &str = "Run took ";

/// Messages emitted by the kernel into the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogType {
    StartOfLevel,
    Deploy,
    Execute(String),
    EndOfLevel,
    Error(String),
    Info(String),
}

/// Counters for one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogSummary {
    pub levels: u64,
    pub deploys: u64,
    pub executes: u64,
    pub errors: u64,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub iteration: usize,
    pub log: PathBuf,
    pub summary: LogSummary,
    pub transfers_observed: u64,
    pub tps: Option<f64>,
}

impl RunStats {
    pub fn transfers_match(&self, expected: u64) -> bool {
        self.transfers_observed == expected
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsReport {
    pub expected_transfers: u64,
    pub inbox_messages: usize,
    pub runs: Vec<RunStats>,
}

impl ResultsReport {
    fn timed(&self) -> impl Iterator<Item = f64> + '_ {
        self.runs.iter().filter_map(|r| r.tps)
    }

    pub fn mean_tps(&self) -> Option<f64> {
        let (sum, n) = self.timed().fold((0.0, 0usize), |(s, n), t| (s + t, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    pub fn min_tps(&self) -> Option<f64> {
        self.timed().reduce(f64::min)
    }

    pub fn max_tps(&self) -> Option<f64> {
        self.timed().reduce(f64::max)
    }
}

/// Parse `Run took 1.25s` style lines.
pub fn parse_timing(line: &str) -> Option<Duration> {
    let rest = line.trim().strip_prefix(TIMING_PREFIX)?.trim();
    let split = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (value, unit) = rest.split_at(split);
    let value: f64 = value.parse().ok()?;
    let nanos_per_unit = match unit.trim() {
        "s" => 1e9,
        "ms" => 1e6,
        "us" | "µs" => 1e3,
        "ns" => 1.0,
        _ => return None,
    };
    let nanos = (value * nanos_per_unit).round();
    (nanos.is_finite() && nanos >= 0.0 && nanos < u64::MAX as f64)
        .then(|| Duration::from_nanos(nanos as u64))
}

pub fn parse_log<R: BufRead>(reader: R) -> io::Result<LogSummary> {
    let mut summary = LogSummary::default();
    for line in reader.lines() {
        let line = line?;
        if let Some(elapsed) = parse_timing(&line) {
            summary.elapsed = Some(elapsed);
            continue;
        }
        match serde_json::from_str::<LogType>(line.trim()) {
            Ok(LogType::StartOfLevel) => summary.levels += 1,
            Ok(LogType::Deploy) => summary.deploys += 1,
            Ok(LogType::Execute(_)) => summary.executes += 1,
            Ok(LogType::Error(_)) => summary.errors += 1,
            Ok(LogType::EndOfLevel | LogType::Info(_)) | Err(_) => {}
        }
    }
    Ok(summary)
}

/// Summarise the ordered `logs` of one session.
pub fn handle_results(
    inbox: &Path,
    logs: &[PathBuf],
    expected_transfers: u64,
) -> io::Result<ResultsReport> {
    let inbox_messages = Inbox::load(inbox)?.message_count();
    let mints = accounts_for_transfers(expected_transfers);

    let mut runs = Vec::with_capacity(logs.len());
    for (i, log) in logs.iter().enumerate() {
        let summary = parse_log(BufReader::new(File::open(log)?))?;
        let transfers_observed = summary.executes.saturating_sub(mints);
        let tps = summary
            .elapsed
            .filter(|d| !d.is_zero())
            .map(|d| expected_transfers as f64 / d.as_secs_f64());
        let stats = RunStats {
            iteration: i + 1,
            log: log.clone(),
            summary,
            transfers_observed,
            tps,
        };
        if !stats.transfers_match(expected_transfers) {
            warn!(
                log = %log.display(),
                expected = expected_transfers,
                observed = transfers_observed,
                "transfer count mismatch"
            );
        }
        runs.push(stats);
    }

    Ok(ResultsReport {
        expected_transfers,
        inbox_messages,
        runs,
    })
}

fn fmt_tps(tps: Option<f64>) -> String {
    tps.map_or_else(|| "-".to_string(), |t| format!("{t:.2}"))
}

impl fmt::Display for ResultsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Expected transfers: {} ({} inbox messages)",
            self.expected_transfers, self.inbox_messages
        )?;
        writeln!(
            f,
            "{:>4}  {:>10}  {:>8}  {:>12}  {:>12}",
            "run", "transfers", "errors", "elapsed (s)", "TPS"
        )?;
        for run in &self.runs {
            let flag = if run.transfers_match(self.expected_transfers) {
                ""
            } else {
                "  (mismatch)"
            };
            writeln!(
                f,
                "{:>4}  {:>10}  {:>8}  {:>12}  {:>12}{}",
                run.iteration,
                run.transfers_observed,
                run.summary.errors,
                run.summary
                    .elapsed
                    .map_or_else(|| "-".to_string(), |d| format!("{:.6}", d.as_secs_f64())),
                fmt_tps(run.tps),
                flag
            )?;
        }
        writeln!(
            f,
            "TPS mean {} / min {} / max {}",
            fmt_tps(self.mean_tps()),
            fmt_tps(self.min_tps()),
            fmt_tps(self.max_tps())
        )
    }
}
