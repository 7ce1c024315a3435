//! One benchmark session, end to end.
//!
//! The stages run strictly in sequence: generate the inbox once, build once,
//! run the kernel `iterations` times (each run finishing before the next one
//! starts), then hand the ordered logs to the collector.
//!
//! With profiling enabled every run records into the same profile file, so only
//! the last iteration's profile survives the session.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::build::{BuildPlan, ExecutableArtifact};
use crate::config::RunConfig;
use crate::error::{BenchError, Result};
use crate::inbox::Inbox;
use crate::schema::{AggregateReport, RunMeta, RunRecord, SessionSummary, WorkloadFile};
use crate::tools::{Build, Collect, Execute, Exit, Generate, GenerateRequest, Profile};

/// File layout inside a session working directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLayout {
    root: PathBuf,
}

impl SessionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `workdir` if given, otherwise a fresh temporary directory that outlives the process.
    ///
    /// The root is always absolute: collaborators may run in another directory.
    pub fn create(workdir: Option<&Path>) -> io::Result<Self> {
        let root = match workdir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                fs::canonicalize(dir)?
            }
            None => tempfile::Builder::new()
                .prefix("tps-bench-")
                .tempdir()?
                .keep(),
        };
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inbox(&self) -> PathBuf {
        self.root.join("inbox.json")
    }

    pub fn placeholder(&self) -> PathBuf {
        self.root.join("empty-inbox.json")
    }

    pub fn log(&self, iteration: u32) -> PathBuf {
        self.root.join(format!("run-{iteration}.log"))
    }

    pub fn metrics(&self) -> PathBuf {
        self.root.join("block-metrics.out")
    }

    pub fn profile(&self) -> PathBuf {
        self.root.join("profile.json.gz")
    }
}

/// The collaborators a session drives.
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    pub generator: &'a dyn Generate,
    pub builder: &'a dyn Build,
    pub executor: &'a dyn Execute,
    pub collector: &'a dyn Collect,
    pub profiler: &'a dyn Profile,
}

pub struct Session<'a> {
    config: &'a RunConfig,
    layout: SessionLayout,
    tools: Tools<'a>,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a RunConfig, layout: SessionLayout, tools: Tools<'a>) -> Self {
        Self {
            config,
            layout,
            tools,
        }
    }

    pub fn run(&self) -> Result<SessionSummary> {
        let cfg = self.config;
        info!(
            workdir = %self.layout.root().display(),
            transfers = cfg.transfers,
            iterations = cfg.iterations,
            "starting session"
        );
        if cfg.is_native() && (cfg.jit || cfg.metrics.is_some()) {
            warn!("inline JIT and block metrics are sandbox features; ignored in native mode");
        }

        let workload = self.generate()?;

        let plan = BuildPlan::for_config(cfg, &workload.path);
        info!(variant = plan.artifact.variant.as_str(), "building kernel");
        if cfg.tools.sandbox_manifest.is_none() && !plan.artifact.sandbox_features.is_empty() {
            warn!(
                sandbox = %cfg.tools.sandbox.display(),
                features = %plan.artifact.sandbox_features.join(","),
                "sandbox is not rebuilt; it must already include these features"
            );
        }
        self.tools.builder.build(&plan)?;

        let input = self.run_input(&workload)?;
        let runs = self.iterate(&plan.artifact, &input)?;

        self.verify_workload(&workload)?;

        let report = AggregateReport {
            inbox: workload.path.clone(),
            expected_transfers: cfg.transfers,
            logs: runs.iter().map(|r| r.log.clone()).collect(),
        };
        self.tools.collector.collect(&report)?;

        let profile_file = cfg.profile.then(|| self.layout.profile());
        if let Some(profile) = &profile_file {
            info!(profile = %profile.display(), "opening profile of the last run");
            self.tools.profiler.view(profile)?;
        }

        let metrics_file = self.metrics_file();
        if let Some(metrics) = &metrics_file {
            info!(metrics = %metrics.display(), "block metrics written");
        }

        Ok(SessionSummary {
            run: RunMeta::current(),
            config: cfg.clone(),
            workdir: self.layout.root().to_path_buf(),
            workload,
            artifact: plan.artifact,
            runs,
            report,
            metrics_file,
            profile_file,
        })
    }

    fn generate(&self) -> Result<WorkloadFile> {
        let path = self.layout.inbox();
        info!(transfers = self.config.transfers, inbox = %path.display(), "generating inbox");
        self.tools.generator.generate(&GenerateRequest {
            workdir: self.layout.root(),
            transfers: self.config.transfers,
            output: &path,
            address: &self.config.address,
        })?;
        if !path.is_file() {
            return Err(BenchError::Generate(format!(
                "generator did not produce {}",
                path.display()
            )));
        }
        let sha256 = sha256_file(&path)?;
        Ok(WorkloadFile {
            path,
            transfers: self.config.transfers,
            sha256,
        })
    }

    /// Static builds already carry the inbox, so runs read an empty one.
    fn run_input(&self, workload: &WorkloadFile) -> Result<PathBuf> {
        if !self.config.is_static() {
            return Ok(workload.path.clone());
        }
        let placeholder = self.layout.placeholder();
        Inbox::empty().save(&placeholder)?;
        Ok(placeholder)
    }

    fn metrics_file(&self) -> Option<PathBuf> {
        match self.config.metrics {
            Some(_) if !self.config.is_native() => Some(self.layout.metrics()),
            _ => None,
        }
    }

    fn iterate(&self, artifact: &ExecutableArtifact, input: &Path) -> Result<Vec<RunRecord>> {
        let cfg = self.config;
        let metrics_file = self.metrics_file();
        let metrics = cfg.metrics.zip(metrics_file.as_deref());
        let profile = self.layout.profile();

        let mut runs = Vec::with_capacity(cfg.iterations as usize);
        for iteration in 1..=cfg.iterations {
            info!("run {iteration}/{}", cfg.iterations);

            let mut invocation = artifact.run_invocation(input, &cfg.address, metrics);
            if cfg.profile {
                invocation = self.tools.profiler.wrap(invocation, &profile);
            }

            let log = self.layout.log(iteration);
            let exit = self
                .tools
                .executor
                .execute(&invocation, &log)
                .map_err(|e| BenchError::Run {
                    iteration,
                    reason: format!("{}: {e}", invocation.program_name()),
                })?;
            if exit != Exit::Success {
                return Err(BenchError::Run {
                    iteration,
                    reason: format!(
                        "{} (log: {})",
                        exit.describe(&invocation.program_name()),
                        log.display()
                    ),
                });
            }

            runs.push(RunRecord {
                iteration,
                log,
                profile: cfg.profile.then(|| profile.clone()),
            });
        }
        Ok(runs)
    }

    fn verify_workload(&self, workload: &WorkloadFile) -> Result<()> {
        if sha256_file(&workload.path)? != workload.sha256 {
            return Err(BenchError::WorkloadChanged {
                path: workload.path.clone(),
            });
        }
        Ok(())
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex32(hasher.finalize().into()))
}

fn hex32(d: [u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in d {
        s.push_str(&format!("{:02x}", b));
    }
    s
}
