//! Implementation of `cmakeup test`.
//!
//! Runs ctest in the generated project directory, converts the CTest report
//! to JUnit, and only then looks at ctest's return code. A failed run still
//! produces a report.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::ops::ctest_report::write_report;
use crate::ops::errors::{require_dir, ConfigError, ReturnCodeError};
use crate::ops::toolchain::{Toolchain, ToolchainOptions};
use crate::util::{GlobalContext, ProcessBuilder};

/// Options for the test command.
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    /// Generated project directory (default `<build>/cmake`)
    pub project_dir: Option<PathBuf>,

    /// Build configuration for multi-config generators
    pub config: Option<String>,

    /// Number of tests run in parallel (0 or unset = logical CPUs)
    pub threads: Option<usize>,

    /// Dashboard to submit results to, e.g. "Experimental"
    pub dashboard: Option<String>,

    /// Report test failures as warnings
    pub ignore_failure: bool,

    /// Skip the tests entirely
    pub skip: bool,

    /// Deprecated spelling of `project_dir`
    pub build_directory: Option<PathBuf>,

    /// Deprecated spelling of `skip`
    pub ctest_skip: bool,

    /// Deprecated spelling of `dashboard`
    pub ctest_dashboard: Option<String>,

    pub toolchain: ToolchainOptions,
}

/// Outcome of the test command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Skipped,
    Completed { report: PathBuf, return_code: i32 },
}

/// Run the project's tests with ctest.
pub fn run_tests(ctx: &GlobalContext, opts: &TestOptions) -> Result<TestOutcome> {
    reject_deprecated(opts)?;

    if opts.skip {
        tracing::info!("Tests are skipped.");
        return Ok(TestOutcome::Skipped);
    }

    let project_dir = opts
        .project_dir
        .as_deref()
        .map(|p| ctx.resolve(p))
        .unwrap_or_else(|| ctx.default_project_dir());
    require_dir("project directory", &project_dir)?;
    let threads = thread_count(opts.threads);

    let toolchain = Toolchain::resolve(ctx, &opts.toolchain)?;
    toolchain.provision()?;

    let cmd = test_command(&toolchain, opts, &project_dir, threads)?;
    tracing::debug!("Number of threads used: {}", threads);
    let return_code = cmd.run()?;

    let report = write_report(&project_dir, &ctx.reports_dir())?;

    if let Err(e) = ReturnCodeError::check(&cmd, return_code) {
        if !opts.ignore_failure {
            return Err(e.into());
        }
        tracing::warn!("{}; ignoring failure", e);
    }
    Ok(TestOutcome::Completed {
        report,
        return_code,
    })
}

fn reject_deprecated(opts: &TestOptions) -> Result<(), ConfigError> {
    if opts.build_directory.is_some() {
        return Err(ConfigError::Renamed {
            old: "--build-directory",
            new: "--project-dir",
        });
    }
    if opts.ctest_skip {
        return Err(ConfigError::Renamed {
            old: "--ctest-skip",
            new: "--skip",
        });
    }
    if opts.ctest_dashboard.is_some() {
        return Err(ConfigError::Renamed {
            old: "--ctest-dashboard",
            new: "--dashboard",
        });
    }
    Ok(())
}

/// Requested thread count, with 0 meaning one per logical CPU.
pub fn thread_count(requested: Option<usize>) -> usize {
    match requested {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1),
    }
}

/// `ctest --test-action Test --output-on-failure --parallel N [--build-config C] [-D D] <options>`.
pub fn test_command(
    toolchain: &Toolchain,
    opts: &TestOptions,
    project_dir: &Path,
    threads: usize,
) -> Result<ProcessBuilder> {
    let mut cmd = toolchain
        .command("ctest")?
        .cwd(project_dir)
        .args(["--test-action", "Test", "--output-on-failure"])
        .arg("--parallel")
        .arg(threads.to_string());
    if let Some(ref config) = opts.config {
        cmd = cmd.arg("--build-config").arg(config);
    }
    if let Some(ref dashboard) = opts.dashboard {
        cmd = cmd.arg("-D").arg(dashboard);
    }
    Ok(cmd.options(toolchain.options()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{Classifier, Environment, Platform};
    use crate::util::config::Config;
    use tempfile::TempDir;

    fn ctx(cwd: PathBuf) -> GlobalContext {
        GlobalContext::from_parts(cwd, Platform::new(Classifier::LinuxX86_64), Config::default())
    }

    #[test]
    fn test_skip_returns_before_validation() {
        let tmp = TempDir::new().unwrap();
        let opts = TestOptions {
            skip: true,
            ..Default::default()
        };

        let outcome = run_tests(&ctx(tmp.path().to_path_buf()), &opts).unwrap();
        assert_eq!(outcome, TestOutcome::Skipped);
    }

    #[test]
    fn test_deprecated_options_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(tmp.path().to_path_buf());
        let cases = [
            TestOptions {
                build_directory: Some(PathBuf::from("x")),
                skip: true,
                ..Default::default()
            },
            TestOptions {
                ctest_skip: true,
                ..Default::default()
            },
            TestOptions {
                ctest_dashboard: Some("Nightly".to_string()),
                ..Default::default()
            },
        ];
        for opts in &cases {
            let err = run_tests(&ctx, opts).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<ConfigError>(),
                Some(ConfigError::Renamed { .. })
            ));
        }
    }

    #[test]
    fn test_thread_count() {
        assert_eq!(thread_count(Some(3)), 3);
        assert!(thread_count(Some(0)) >= 1);
        assert!(thread_count(None) >= 1);
    }

    #[test]
    fn test_command_line() {
        let tmp = TempDir::new().unwrap();
        let ctx = ctx(tmp.path().to_path_buf());
        let opts = TestOptions {
            config: Some("Debug".to_string()),
            dashboard: Some("Experimental".to_string()),
            toolchain: ToolchainOptions {
                options: vec!["-R".to_string(), "unit".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let toolchain = Toolchain::resolve_with_env(
            &ctx,
            &opts.toolchain,
            Environment::empty(&ctx.platform()),
        )
        .unwrap();
        let project = tmp.path().join("target/cmake");

        let cmd = test_command(&toolchain, &opts, &project, 4).unwrap();

        assert_eq!(
            cmd.get_args(),
            [
                "--test-action",
                "Test",
                "--output-on-failure",
                "--parallel",
                "4",
                "--build-config",
                "Debug",
                "-D",
                "Experimental",
                "-R",
                "unit"
            ]
        );
        assert_eq!(cmd.get_cwd(), Some(project.as_path()));
        assert!(cmd.get_program().ends_with("bin/ctest"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_run_still_writes_report() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let tools = tmp.path().join("tools");
        std::fs::create_dir_all(&tools).unwrap();
        // Fake ctest: records a run, then fails.
        let ctest = tools.join("ctest");
        std::fs::write(
            &ctest,
            "#!/bin/sh\n\
             mkdir -p Testing/run1\n\
             echo run1 > Testing/TAG\n\
             echo '<Site Name=\"h\" BuildName=\"b\"><Testing><TestList/></Testing></Site>' > Testing/run1/Test.xml\n\
             exit 8\n",
        )
        .unwrap();
        std::fs::set_permissions(&ctest, std::fs::Permissions::from_mode(0o755)).unwrap();
        let project = tmp.path().join("target/cmake");
        std::fs::create_dir_all(&project).unwrap();

        let ctx = ctx(tmp.path().to_path_buf());
        let mut opts = TestOptions {
            threads: Some(1),
            toolchain: ToolchainOptions {
                download: Some(false),
                cmake_dir: Some(tools),
                ..Default::default()
            },
            ..Default::default()
        };

        let err = run_tests(&ctx, &opts).unwrap_err();
        assert_eq!(err.downcast_ref::<ReturnCodeError>().map(|e| e.code), Some(8));
        let report = ctx.reports_dir().join("CTestResults.xml");
        assert!(report.is_file());

        std::fs::remove_file(&report).unwrap();
        opts.ignore_failure = true;
        let outcome = run_tests(&ctx, &opts).unwrap();
        assert_eq!(
            outcome,
            TestOutcome::Completed {
                report,
                return_code: 8
            }
        );
    }
}
