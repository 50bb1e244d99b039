//! `cmakeup test` command

use anyhow::Result;

use crate::cli::TestArgs;
use cmakeup::ops::{run_tests, TestOptions, TestOutcome};

pub fn execute(args: TestArgs) -> Result<()> {
    let ctx = super::context(args.toolchain.build_dir.clone())?;

    let opts = TestOptions {
        project_dir: args.project_dir,
        config: args.config,
        threads: args.threads,
        dashboard: args.dashboard,
        ignore_failure: args.ignore_failure,
        skip: args.skip,
        build_directory: args.build_directory,
        ctest_skip: args.ctest_skip,
        ctest_dashboard: args.ctest_dashboard,
        toolchain: super::toolchain_options(&args.toolchain),
    };

    if let TestOutcome::Completed { report, .. } = run_tests(&ctx, &opts)? {
        eprintln!("      Report {}", report.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cli::TestArgs;
    use clap::Parser;

    fn parse_test_args(args: &[&str]) -> TestArgs {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            test: TestArgs,
        }
        TestCli::parse_from(args).test
    }

    // =========================================================================
    // TestArgs Default Values Tests
    // =========================================================================

    #[test]
    fn test_test_args_defaults() {
        let args = parse_test_args(&["test"]);

        assert!(args.project_dir.is_none());
        assert!(args.threads.is_none());
        assert!(!args.skip);
        assert!(!args.ignore_failure);
        assert!(!args.ctest_skip);
    }

    // =========================================================================
    // Flag Tests
    // =========================================================================

    #[test]
    fn test_test_args_flags() {
        let args = parse_test_args(&[
            "test",
            "--threads",
            "0",
            "--dashboard",
            "Experimental",
            "--ignore-failure",
            "--config",
            "Debug",
            "--",
            "-R",
            "unit",
        ]);

        assert_eq!(args.threads, Some(0));
        assert_eq!(args.dashboard.as_deref(), Some("Experimental"));
        assert!(args.ignore_failure);
        assert_eq!(args.config.as_deref(), Some("Debug"));
        assert_eq!(args.toolchain.options, vec!["-R", "unit"]);
    }

    #[test]
    fn test_deprecated_flags_still_parse() {
        let args = parse_test_args(&[
            "test",
            "--build-directory",
            "out",
            "--ctest-skip",
            "--ctest-dashboard",
            "Nightly",
        ]);

        assert!(args.build_directory.is_some());
        assert!(args.ctest_skip);
        assert_eq!(args.ctest_dashboard.as_deref(), Some("Nightly"));
    }
}
