//! Build variant selection and the cargo steps that produce the kernel.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::RunConfig;
use crate::tools::Invocation;
use crate::MetricsMode;

/// Target triple the sandbox executes.
pub const EMULATED_TARGET: &str = "riscv64gc-unknown-linux-musl";

/// Environment variable read by the kernel's `static-inbox` feature at compile time.
pub const STATIC_INBOX_ENV: &str = "INBOX_FILE";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildVariant {
    EmulatedStatic,
    EmulatedStreamed,
    Native,
}

impl BuildVariant {
    pub fn select(cfg: &RunConfig) -> Self {
        match (cfg.is_native(), cfg.is_static()) {
            (true, _) => BuildVariant::Native,
            (false, true) => BuildVariant::EmulatedStatic,
            (false, false) => BuildVariant::EmulatedStreamed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVariant::EmulatedStatic => "emulated-static",
            BuildVariant::EmulatedStreamed => "emulated-streamed",
            BuildVariant::Native => "native",
        }
    }

    pub fn is_emulated(&self) -> bool {
        !matches!(self, BuildVariant::Native)
    }
}

/// The built kernel and whatever runs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutableArtifact {
    pub variant: BuildVariant,
    pub kernel: PathBuf,
    /// `None` when the kernel runs natively.
    pub sandbox: Option<PathBuf>,
    pub kernel_features: Vec<String>,
    pub sandbox_features: Vec<String>,
}

impl ExecutableArtifact {
    /// Command line for one run against `input`.
    pub fn run_invocation(
        &self,
        input: &Path,
        address: &str,
        metrics: Option<(MetricsMode, &Path)>,
    ) -> Invocation {
        let base = match &self.sandbox {
            Some(sandbox) => Invocation::new(sandbox)
                .arg("run")
                .arg("--input")
                .path_arg(&self.kernel),
            None => Invocation::new(&self.kernel),
        };
        let mut inv = base
            .arg("--inbox-file")
            .path_arg(input)
            .arg("--address")
            .arg(address)
            .arg("--timings");

        if let (Some((mode, file)), true) = (metrics, self.variant.is_emulated()) {
            inv = inv.arg("--block-metrics").path_arg(file);
            if mode == MetricsMode::JitUnsupported {
                inv = inv.arg("--exclude-supported-instructions");
            }
        }
        inv
    }
}

/// Everything needed to produce an [`ExecutableArtifact`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub steps: Vec<Invocation>,
    pub artifact: ExecutableArtifact,
}

impl BuildPlan {
    /// `workload` is embedded into the kernel for static variants.
    pub fn for_config(cfg: &RunConfig, workload: &Path) -> Self {
        let variant = BuildVariant::select(cfg);
        let tools = &cfg.tools;

        let mut kernel_features = Vec::new();
        if cfg.is_static() {
            kernel_features.push("static-inbox".to_string());
        }
        if variant == BuildVariant::Native {
            kernel_features.push("native".to_string());
        }

        let mut sandbox_features = Vec::new();
        if variant.is_emulated() {
            if cfg.jit {
                sandbox_features.push("inline-jit".to_string());
            }
            if cfg.metrics.is_some() {
                sandbox_features.push("metrics".to_string());
            }
            if cfg.profile {
                sandbox_features.push("profiling".to_string());
            }
        }

        let triple = match variant {
            BuildVariant::Native => cfg.native_target.clone().unwrap_or_default(),
            _ => EMULATED_TARGET.to_string(),
        };

        let mut kernel_step = cargo_release(&tools.kernel_manifest, &tools.target_dir)
            .arg("--target")
            .arg(triple.as_str())
            .arg("--bin")
            .arg(tools.kernel_bin.as_str());
        if !kernel_features.is_empty() {
            kernel_step = kernel_step.arg("--features").arg(kernel_features.join(","));
        }
        if cfg.is_static() {
            kernel_step = kernel_step.env(STATIC_INBOX_ENV, workload.to_string_lossy());
        }
        let kernel = tools
            .target_dir
            .join(&triple)
            .join("release")
            .join(&tools.kernel_bin);

        let mut steps = Vec::new();
        let sandbox = match (variant.is_emulated(), &tools.sandbox_manifest) {
            (false, _) => None,
            (true, None) => Some(tools.sandbox.clone()),
            (true, Some(manifest)) => {
                let bin = tools
                    .sandbox
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "riscv-sandbox".to_string());
                let mut step = cargo_release(manifest, &tools.target_dir)
                    .arg("--bin")
                    .arg(bin.as_str());
                if !sandbox_features.is_empty() {
                    step = step.arg("--features").arg(sandbox_features.join(","));
                }
                steps.push(step);
                Some(tools.target_dir.join("release").join(bin))
            }
        };
        steps.push(kernel_step);

        Self {
            steps,
            artifact: ExecutableArtifact {
                variant,
                kernel,
                sandbox,
                kernel_features,
                sandbox_features,
            },
        }
    }
}

fn cargo_release(manifest: &Path, target_dir: &Path) -> Invocation {
    Invocation::new("cargo")
        .args(["build", "--release", "--manifest-path"])
        .path_arg(manifest)
        .arg("--target-dir")
        .path_arg(target_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunArgs;
    use clap::Parser;

    fn config(argv: &[&str]) -> RunConfig {
        config_with_sandbox(argv, None)
    }

    fn config_with_sandbox(argv: &[&str], manifest: Option<&str>) -> RunConfig {
        let mut full = vec![
            "tps-bench",
            "--kernel-manifest",
            "kernel/Cargo.toml",
            "--target-dir",
            "/build",
            "--sandbox",
            "/usr/bin/riscv-sandbox",
        ];
        full.extend_from_slice(argv);
        let mut args = RunArgs::try_parse_from(full).unwrap();
        args.sandbox_manifest = manifest.map(PathBuf::from);
        RunConfig::resolve(&args).unwrap()
    }

    #[test]
    fn decision_table() {
        assert_eq!(
            BuildVariant::select(&config(&["-t", "1"])),
            BuildVariant::EmulatedStreamed
        );
        assert_eq!(
            BuildVariant::select(&config(&["-t", "1", "-s"])),
            BuildVariant::EmulatedStatic
        );
        assert_eq!(
            BuildVariant::select(&config(&["-t", "1", "-s", "-n", "--native-target", "x86_64-unknown-linux-gnu"])),
            BuildVariant::Native
        );
    }

    #[test]
    fn streamed_build_does_not_embed_the_inbox() {
        let plan = BuildPlan::for_config(&config(&["-t", "100"]), Path::new("/w/inbox.json"));
        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert!(step.env.is_empty());
        assert!(!step.args.iter().any(|a| a == "--features"));
        assert_eq!(
            plan.artifact.kernel,
            PathBuf::from("/build/riscv64gc-unknown-linux-musl/release/revm-kernel")
        );
        assert_eq!(plan.artifact.sandbox, Some(PathBuf::from("/usr/bin/riscv-sandbox")));
    }

    #[test]
    fn static_build_embeds_the_inbox() {
        let plan = BuildPlan::for_config(&config(&["-t", "500", "-s"]), Path::new("/w/inbox.json"));
        let step = &plan.steps[0];
        assert_eq!(
            step.env,
            [(STATIC_INBOX_ENV.to_string(), "/w/inbox.json".to_string())]
        );
        let features = step.args.iter().position(|a| a == "--features").unwrap();
        assert_eq!(step.args[features + 1], "static-inbox");
    }

    #[test]
    fn native_build_targets_the_host_triple() {
        let cfg = config(&["-t", "10", "-s", "-n", "-j", "--native-target", "aarch64-apple-darwin"]);
        let plan = BuildPlan::for_config(&cfg, Path::new("/w/inbox.json"));
        assert_eq!(plan.artifact.variant, BuildVariant::Native);
        assert_eq!(plan.artifact.sandbox, None);
        assert!(plan.artifact.sandbox_features.is_empty());
        assert_eq!(plan.artifact.kernel_features, ["static-inbox", "native"]);
        assert_eq!(
            plan.artifact.kernel,
            PathBuf::from("/build/aarch64-apple-darwin/release/revm-kernel")
        );
        let target = plan.steps[0].args.iter().position(|a| a == "--target").unwrap();
        assert_eq!(plan.steps[0].args[target + 1], "aarch64-apple-darwin");
    }

    #[test]
    fn sandbox_is_rebuilt_with_session_features() {
        let cfg = config_with_sandbox(&["-t", "10", "-j", "-p", "-m", "all"], Some("sandbox/Cargo.toml"));
        let plan = BuildPlan::for_config(&cfg, Path::new("/w/inbox.json"));
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps[0].args.contains(&"inline-jit,metrics,profiling".to_string()));
        assert_eq!(
            plan.artifact.sandbox,
            Some(PathBuf::from("/build/release/riscv-sandbox"))
        );
    }

    #[test]
    fn prebuilt_sandbox_is_used_as_is() {
        let plan = BuildPlan::for_config(&config(&["-t", "10", "-p", "-m", "all"]), Path::new("/w/inbox.json"));
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.steps[0].args.iter().all(|a| !a.contains("metrics")));
        assert_eq!(plan.artifact.sandbox, Some(PathBuf::from("/usr/bin/riscv-sandbox")));
        assert_eq!(plan.artifact.sandbox_features, ["metrics", "profiling"]);
    }

    #[test]
    fn run_invocation_carries_metrics_arguments() {
        let plan = BuildPlan::for_config(&config(&["-t", "10"]), Path::new("/w/inbox.json"));
        let inv = plan.artifact.run_invocation(
            Path::new("/w/inbox.json"),
            "sr1addr",
            Some((MetricsMode::JitUnsupported, Path::new("/w/block-metrics.out"))),
        );
        assert_eq!(inv.program, PathBuf::from("/usr/bin/riscv-sandbox"));
        assert_eq!(
            inv.args,
            [
                "run",
                "--input",
                "/build/riscv64gc-unknown-linux-musl/release/revm-kernel",
                "--inbox-file",
                "/w/inbox.json",
                "--address",
                "sr1addr",
                "--timings",
                "--block-metrics",
                "/w/block-metrics.out",
                "--exclude-supported-instructions"
            ]
        );
    }
}
