//! External collaborators.
//!
//! Each collaborator sits behind a trait with exactly one capability so that a
//! session can be driven by fakes in tests and by real processes otherwise.

use std::env;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use serde::Serialize;
use tracing::debug;

use crate::build::BuildPlan;
use crate::error::{describe_status, BenchError, Result};
use crate::schema::AggregateReport;

/// A fully specified process invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.to_string_lossy().into_owned())
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut out = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// How a run process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Success,
    Code(i32),
    Signal,
}

impl From<ExitStatus> for Exit {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            Exit::Success
        } else {
            status.code().map_or(Exit::Signal, Exit::Code)
        }
    }
}

impl Exit {
    pub fn describe(&self, program: &str) -> String {
        match self {
            Exit::Success => format!("{program} exited successfully"),
            Exit::Code(code) => format!("{program} exited with status {code}"),
            Exit::Signal => format!("{program} was terminated by a signal"),
        }
    }
}

/// Input to workload generation.
#[derive(Clone, Debug)]
pub struct GenerateRequest<'a> {
    pub workdir: &'a Path,
    pub transfers: u64,
    pub output: &'a Path,
    pub address: &'a str,
}

pub trait Generate {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<()>;
}

pub trait Build {
    fn build(&self, plan: &BuildPlan) -> Result<()>;
}

pub trait Execute {
    /// Run to completion with stdout and stderr captured into `log`.
    fn execute(&self, invocation: &Invocation, log: &Path) -> io::Result<Exit>;
}

pub trait Collect {
    fn collect(&self, report: &AggregateReport) -> Result<()>;
}

pub trait Profile {
    /// Wrap a run so that it records into `output`.
    fn wrap(&self, run: Invocation, output: &Path) -> Invocation;

    /// Open a recorded profile.
    fn view(&self, output: &Path) -> Result<()>;
}

fn run_inherited(invocation: &Invocation) -> io::Result<ExitStatus> {
    debug!(command = %invocation.display(), "spawning");
    invocation.command().status()
}

/// The `inbox-bench` tool: generates workloads and collects results.
#[derive(Clone, Debug)]
pub struct InboxBench {
    pub binary: PathBuf,
}

impl InboxBench {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn generate_invocation(&self, request: &GenerateRequest<'_>) -> Invocation {
        Invocation::new(&self.binary)
            .arg("generate")
            .arg("--inbox-file")
            .path_arg(request.output)
            .arg("--transfers")
            .arg(request.transfers.to_string())
            .arg("--address")
            .arg(request.address)
            .current_dir(request.workdir)
    }

    pub fn results_invocation(&self, report: &AggregateReport) -> Invocation {
        let mut inv = Invocation::new(&self.binary)
            .arg("results")
            .arg("--inbox")
            .path_arg(&report.inbox)
            .arg("--expected-transfers")
            .arg(report.expected_transfers.to_string());
        for log in &report.logs {
            inv = inv.path_arg(log);
        }
        inv
    }
}

impl Generate for InboxBench {
    fn generate(&self, request: &GenerateRequest<'_>) -> Result<()> {
        let inv = self.generate_invocation(request);
        let status = run_inherited(&inv)
            .map_err(|e| BenchError::Generate(format!("{}: {e}", inv.program_name())))?;
        if !status.success() {
            return Err(BenchError::Generate(describe_status(
                &inv.program_name(),
                status,
            )));
        }
        Ok(())
    }
}

impl Collect for InboxBench {
    fn collect(&self, report: &AggregateReport) -> Result<()> {
        let inv = self.results_invocation(report);
        let status = run_inherited(&inv)
            .map_err(|e| BenchError::Aggregate(format!("{}: {e}", inv.program_name())))?;
        if !status.success() {
            return Err(BenchError::Aggregate(describe_status(
                &inv.program_name(),
                status,
            )));
        }
        Ok(())
    }
}

/// Runs every cargo step of a [`BuildPlan`] in order.
#[derive(Clone, Copy, Debug, Default)]
pub struct CargoBuilder;

impl Build for CargoBuilder {
    fn build(&self, plan: &BuildPlan) -> Result<()> {
        for step in &plan.steps {
            let status = run_inherited(step)
                .map_err(|e| BenchError::Build(format!("{}: {e}", step.display())))?;
            if !status.success() {
                return Err(BenchError::Build(describe_status(&step.display(), status)));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExecutor;

impl Execute for ProcessExecutor {
    fn execute(&self, invocation: &Invocation, log: &Path) -> io::Result<Exit> {
        let stdout = File::create(log)?;
        let stderr = stdout.try_clone()?;
        debug!(command = %invocation.display(), log = %log.display(), "running");
        let status = invocation
            .command()
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()?;
        Ok(status.into())
    }
}

/// `samply` sampling profiler.
#[derive(Clone, Debug)]
pub struct Samply {
    pub binary: PathBuf,
}

impl Profile for Samply {
    fn wrap(&self, run: Invocation, output: &Path) -> Invocation {
        let mut args = vec![
            "record".to_string(),
            "--save-only".to_string(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
            "--".to_string(),
            run.program.to_string_lossy().into_owned(),
        ];
        args.extend(run.args);
        Invocation {
            program: self.binary.clone(),
            args,
            env: run.env,
            current_dir: run.current_dir,
        }
    }

    fn view(&self, output: &Path) -> Result<()> {
        let inv = Invocation::new(&self.binary).arg("load").path_arg(output);
        let status = run_inherited(&inv)
            .map_err(|e| BenchError::Profile(format!("{}: {e}", inv.program_name())))?;
        if !status.success() {
            return Err(BenchError::Profile(describe_status(
                &inv.program_name(),
                status,
            )));
        }
        Ok(())
    }
}

/// Profiling disabled: runs are left untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProfiler;

impl Profile for NoProfiler {
    fn wrap(&self, run: Invocation, _output: &Path) -> Invocation {
        run
    }

    fn view(&self, _output: &Path) -> Result<()> {
        Ok(())
    }
}

/// Locate a binary installed next to the running executable.
pub fn sibling_binary(name: &str) -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    let candidate = exe
        .parent()?
        .join(format!("{name}{}", env::consts::EXE_SUFFIX));
    candidate.is_file().then_some(candidate)
}
